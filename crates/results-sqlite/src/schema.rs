pub const MIG_0001_INIT: &str = r#"
BEGIN;

CREATE TABLE scans (
  scan_id           TEXT PRIMARY KEY,
  domain            TEXT NOT NULL,
  status            TEXT NOT NULL CHECK (status IN ('pending','running','completed','failed')),
  progress          INTEGER NOT NULL DEFAULT 0 CHECK (progress BETWEEN 0 AND 100),
  config_json       TEXT NOT NULL,
  tool_version      TEXT NOT NULL,
  harvested         INTEGER NOT NULL DEFAULT 0,
  total_candidates  INTEGER NOT NULL DEFAULT 0,
  live_count        INTEGER NOT NULL DEFAULT 0,
  vulnerabilities   INTEGER NOT NULL DEFAULT 0,
  high_risk         INTEGER NOT NULL DEFAULT 0,
  started_at        INTEGER NOT NULL,
  completed_at      INTEGER,
  error             TEXT
);

CREATE TABLE scan_results (
  result_id            INTEGER PRIMARY KEY AUTOINCREMENT,
  scan_id              TEXT NOT NULL REFERENCES scans(scan_id) ON DELETE CASCADE,
  hostname             TEXT NOT NULL,
  ip                   TEXT,
  http_status          INTEGER,
  server_header        TEXT,
  risk                 TEXT NOT NULL CHECK (risk IN ('low','medium','high','critical')),
  open_ports_json      TEXT NOT NULL,
  cors_issues_json     TEXT NOT NULL,
  technologies_json    TEXT NOT NULL,
  vulnerabilities_json TEXT NOT NULL,
  fingerprints_json    TEXT NOT NULL,
  takeover_json        TEXT NOT NULL,
  cloud_findings_json  TEXT NOT NULL,
  UNIQUE (scan_id, hostname)
);

CREATE TABLE errors (
  error_id        INTEGER PRIMARY KEY AUTOINCREMENT,
  scan_id         TEXT NOT NULL REFERENCES scans(scan_id) ON DELETE CASCADE,
  scope           TEXT NOT NULL,
  code            TEXT NOT NULL,
  message         TEXT NOT NULL,
  at_ms           INTEGER NOT NULL
);

CREATE INDEX idx_results_scan ON scan_results(scan_id);
CREATE INDEX idx_results_risk ON scan_results(risk);
CREATE INDEX idx_errors_scan ON errors(scan_id);

COMMIT;
"#
;
