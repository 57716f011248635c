use anyhow::Result;
use catalog_sqlite::{Db, Validity};
use name_lookup::NameResolver;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct VerifyReport {
    pub checked: usize,
    pub valid: usize,
    pub invalid: usize,
}

/// Resolve every `waiting` player once, one at a time. Each verdict is
/// committed before the next lookup starts.
pub async fn verify_players(db: &Db, resolver: &dyn NameResolver) -> Result<VerifyReport> {
    let pending = db.waiting_players()?;
    tracing::info!(count = pending.len(), resolver = resolver.name(), "verifying player names");
    let mut report = VerifyReport::default();
    for player in pending {
        let verdict = match resolver.resolve(&player.uuid).await {
            Ok(name) => {
                tracing::debug!(uuid = %player.uuid, stored = %player.username, resolved = %name, "resolved");
                report.valid += 1;
                Validity::True
            }
            Err(e) => {
                tracing::warn!(uuid = %player.uuid, "lookup failed: {e}");
                report.invalid += 1;
                Validity::False
            }
        };
        db.set_validity(player.player_id, verdict)?;
        report.checked += 1;
    }
    Ok(report)
}
