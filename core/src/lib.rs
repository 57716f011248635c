//! Core types shared by the prober, the catalog and the worker pool.

pub mod queue;

pub use queue::WorkQueue;

use std::fmt;

pub const fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// A (host, port) pair identifying one server instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Endpoint { host: host.into(), port }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// One entry of the online-player sample a server chose to expose.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerSample {
    pub username: String,
    pub uuid: String,
}

/// Normalized result of one successful status poll.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusSnapshot {
    pub endpoint: Endpoint,
    /// Round trip of the status exchange in milliseconds.
    pub latency_ms: f64,
    pub version_name: String,
    pub protocol: i64,
    pub players_online: i64,
    pub players_max: i64,
    pub sample: Vec<PlayerSample>,
    /// MOTD with legacy `§` formatting codes.
    pub motd: String,
    pub motd_plain: String,
    /// `None` when the server does not report it (pre-1.19).
    pub enforces_secure_chat: Option<bool>,
    /// Favicon data URL as sent by the server.
    pub icon: Option<String>,
}

impl StatusSnapshot {
    pub fn usernames(&self) -> Vec<&str> {
        self.sample.iter().map(|p| p.username.as_str()).collect()
    }

    pub fn uuids(&self) -> Vec<&str> {
        self.sample.iter().map(|p| p.uuid.as_str()).collect()
    }
}

/// What a worker hands to the persistence side after one poll.
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeOutcome {
    Success(StatusSnapshot),
    Failure(Endpoint),
}

impl ProbeOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ProbeOutcome::Success(_))
    }
}
