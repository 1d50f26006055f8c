mod open;
mod models;
mod insert;
mod query;
mod schema;
mod sink;

pub use open::Db;
pub use models::*;
pub use sink::SqliteSink;
