//! Scanner output (masscan JSON) to endpoints.

use anyhow::{bail, Context, Result};
use novacolumn_core::Endpoint;
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct ScanRecord {
    ip: String,
    ports: Vec<ScanPort>,
}

#[derive(Debug, Deserialize)]
struct ScanPort {
    port: u16,
}

/// One endpoint per record, in file order: the record's `ip` and the first
/// entry of its `ports` list.
pub fn parse_endpoints(text: &str) -> Result<Vec<Endpoint>> {
    let records: Vec<ScanRecord> = serde_json::from_str(text)
        .context("input is not in the expected format (a masscan JSON array with ip and ports[].port)")?;
    let mut endpoints = Vec::with_capacity(records.len());
    for (i, rec) in records.into_iter().enumerate() {
        let Some(first) = rec.ports.first() else {
            bail!("record {i} ({}) has an empty ports list", rec.ip);
        };
        endpoints.push(Endpoint::new(rec.ip.trim(), first.port));
    }
    Ok(endpoints)
}

pub fn load_endpoints(path: &Path) -> Result<Vec<Endpoint>> {
    if !path.exists() {
        bail!("input file {} does not exist", path.display());
    }
    let text = std::fs::read_to_string(path).with_context(|| format!("reading input file {}", path.display()))?;
    parse_endpoints(&text).with_context(|| format!("parsing input file {}", path.display()))
}
