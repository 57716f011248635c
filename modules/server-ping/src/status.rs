use crate::{motd, ProbeError};
use novacolumn_core::{Endpoint, PlayerSample, StatusSnapshot};
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
struct RawStatus {
    version: RawVersion,
    players: RawPlayers,
    #[serde(default)]
    description: Value,
    #[serde(default)]
    favicon: Option<String>,
    #[serde(rename = "enforcesSecureChat", default)]
    enforces_secure_chat: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct RawVersion {
    name: String,
    protocol: i64,
}

#[derive(Debug, Deserialize)]
struct RawPlayers {
    max: i64,
    online: i64,
    #[serde(default)]
    sample: Option<Vec<RawSample>>,
}

#[derive(Debug, Deserialize)]
struct RawSample {
    name: String,
    id: String,
}

/// Decode the JSON document of a status response.
pub fn parse_status(endpoint: Endpoint, json: &str, latency_ms: f64) -> Result<StatusSnapshot, ProbeError> {
    let raw: RawStatus = serde_json::from_str(json)?;
    let motd = motd::to_legacy(&raw.description);
    let motd_plain = motd::strip_codes(&motd);
    let sample = raw
        .players
        .sample
        .unwrap_or_default()
        .into_iter()
        .map(|p| PlayerSample { username: p.name, uuid: p.id })
        .collect();
    Ok(StatusSnapshot {
        endpoint,
        latency_ms,
        version_name: raw.version.name,
        protocol: raw.version.protocol,
        players_online: raw.players.online,
        players_max: raw.players.max,
        sample,
        motd,
        motd_plain,
        enforces_secure_chat: raw.enforces_secure_chat,
        icon: raw.favicon.filter(|f| !f.is_empty()),
    })
}
