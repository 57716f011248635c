use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use std::fmt;

use crate::CatalogError;

pub type HostId = i64;
pub type VersionId = i64;
pub type MotdId = i64;
pub type IconId = i64;
pub type PlayerId = i64;
pub type SnapshotId = i64;

/// Icon content stored when a server sends no favicon.
pub const NO_ICON: &str = "NO_ICON";

/// Verification state of an observed player UUID.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validity {
    True,
    False,
    Waiting,
}

impl Validity {
    pub fn as_str(self) -> &'static str {
        match self {
            Validity::True => "true",
            Validity::False => "false",
            Validity::Waiting => "waiting",
        }
    }
}

impl fmt::Display for Validity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Validity {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "true" => Ok(Validity::True),
            "false" => Ok(Validity::False),
            "waiting" => Ok(Validity::Waiting),
            other => Err(CatalogError::UnknownValidity(other.to_string())),
        }
    }
}

impl ToSql for Validity {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Validity {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value.as_str()?.parse().map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

/// Row ids touched by one recorded observation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub snapshot_id: SnapshotId,
    pub host_id: HostId,
    pub version_id: VersionId,
    pub motd_id: MotdId,
    pub icon_id: IconId,
    pub player_ids: Vec<PlayerId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotRow {
    pub snapshot_id: SnapshotId,
    pub host_id: HostId,
    pub port: u16,
    pub captured_at: f64,
    pub players_online: i64,
    pub players_max: i64,
    pub version_id: VersionId,
    pub protocol: i64,
    pub motd_id: MotdId,
    pub player_ids: Vec<PlayerId>,
    pub enforces_secure_chat: Option<bool>,
    pub icon_id: IconId,
    pub latency_ms: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LivenessRow {
    pub event_id: i64,
    pub snapshot_id: SnapshotId,
    pub online: bool,
    pub observed_at: f64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerRow {
    pub player_id: PlayerId,
    pub username: String,
    pub uuid: String,
    pub validity: Validity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Ingest,
    Update,
    Verify,
}

impl RunMode {
    pub fn as_str(self) -> &'static str {
        match self {
            RunMode::Ingest => "ingest",
            RunMode::Update => "update",
            RunMode::Verify => "verify",
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunMeta {
    pub run_id: uuid::Uuid,
    pub mode: RunMode,
    pub started_at: i64,
    pub tool_version: String,
}

/// Totals written when a run finishes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunTotals {
    pub endpoint_count: i64,
    pub online_count: i64,
    pub error_count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRow {
    pub run_id: String,
    pub mode: String,
    pub started_at: i64,
    pub finished_at: Option<i64>,
    pub tool_version: String,
    pub totals: RunTotals,
}
