mod error;
mod insert;
mod models;
mod open;
mod query;
mod schema;

pub use error::CatalogError;
pub use insert::*;
pub use models::*;
pub use open::{Db, DbOptions};
pub use query::*;

/// Current wall-clock time as fractional unix seconds.
pub fn now_unix_secs() -> f64 {
    time::OffsetDateTime::now_utc().unix_timestamp_nanos() as f64 / 1e9
}

pub fn now_unix_ms() -> i64 {
    (time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}
