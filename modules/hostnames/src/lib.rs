//! Normalization and scope filtering of candidate hostnames.
//!
//! Everything here is pure: the same raw set and domain always yield the same
//! validated set.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;

static IPV4_LITERAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}$").unwrap());

static LABEL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?$").unwrap());

const MAX_HOSTNAME_LEN: usize = 253;

/// Lower-case, then drop a leading `*.` and a leading `www.`.
pub fn normalize(candidate: &str) -> String {
    let lowered = candidate.trim().trim_end_matches('.').to_lowercase();
    let s = lowered.strip_prefix("*.").unwrap_or(&lowered);
    let s = s.strip_prefix("www.").unwrap_or(s);
    s.to_string()
}

pub fn is_ipv4_literal(s: &str) -> bool {
    IPV4_LITERAL.is_match(s)
}

/// Dot-separated labels of lowercase alphanumerics and hyphens, no label
/// starting or ending with a hyphen, at least two labels.
pub fn is_valid_hostname(s: &str) -> bool {
    if s.is_empty() || s.len() > MAX_HOSTNAME_LEN {
        return false;
    }
    let labels: Vec<&str> = s.split('.').collect();
    labels.len() >= 2 && labels.iter().all(|l| LABEL.is_match(l))
}

pub fn in_scope(host: &str, domain: &str) -> bool {
    host == domain || host.strip_suffix(domain).map_or(false, |rest| rest.ends_with('.'))
}

/// Validate one candidate against `domain`, returning its normalized form.
pub fn validate_one(candidate: &str, domain: &str) -> Option<String> {
    let host = normalize(candidate);
    if is_ipv4_literal(&host) || !is_valid_hostname(&host) {
        return None;
    }
    in_scope(&host, domain).then_some(host)
}

/// Normalized target domain, or `None` when it is not a usable hostname.
pub fn normalize_domain(domain: &str) -> Option<String> {
    let d = domain.trim().trim_end_matches('.').to_lowercase();
    (!is_ipv4_literal(&d) && is_valid_hostname(&d)).then_some(d)
}

pub fn validate<I, S>(raw: I, domain: &str) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let domain = domain.trim().to_lowercase();
    raw.into_iter().filter_map(|c| validate_one(c.as_ref(), &domain)).collect()
}
