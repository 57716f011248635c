use crate::schema::TABLES;
use crate::{CatalogError, Db, LivenessRow, PlayerRow, RunRow, RunTotals, SnapshotId, SnapshotRow, Validity};
use anyhow::{Context, Result};
use novacolumn_core::Endpoint;
use rusqlite::{Connection, OptionalExtension};

/// Newest snapshot of `host:port`. Ids only grow, so the newest is the largest.
pub(crate) fn latest_snapshot_id(conn: &Connection, host: &str, port: u16) -> rusqlite::Result<Option<SnapshotId>> {
    conn.query_row(
        "SELECT MAX(s.snapshot_id) FROM snapshots s JOIN hosts h ON h.host_id = s.host_id WHERE h.address=? AND s.port=?",
        rusqlite::params![host, port],
        |r| r.get(0),
    )
}

impl Db {
    pub fn table_exists(&self, name: &str) -> Result<bool> {
        let cnt: i64 = self.conn.query_row(
            "SELECT COUNT(1) FROM sqlite_master WHERE type='table' AND name=?",
            [name],
            |r| r.get(0),
        )?;
        Ok(cnt > 0)
    }

    pub fn row_count(&self, table: &str) -> Result<i64> {
        if !TABLES.contains(&table) {
            return Err(CatalogError::UnknownTable(table.to_string()).into());
        }
        Ok(self.conn.query_row(&format!("SELECT COUNT(1) FROM {table}"), [], |r| r.get(0))?)
    }

    /// Every distinct (host, port) with at least one snapshot, in order of
    /// first appearance, minus blacklisted endpoints.
    pub fn known_endpoints(&self) -> Result<Vec<Endpoint>> {
        let mut stmt = self.conn.prepare(
            "SELECT h.address, s.port FROM snapshots s JOIN hosts h ON h.host_id = s.host_id
             WHERE NOT EXISTS (SELECT 1 FROM blacklist b WHERE b.address = h.address AND b.port = s.port)
             GROUP BY s.host_id, s.port
             ORDER BY MIN(s.snapshot_id)",
        )?;
        let rows = stmt.query_map([], |r| Ok(Endpoint::new(r.get::<_, String>(0)?, r.get(1)?)))?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn latest_snapshot_id(&self, host: &str, port: u16) -> Result<Option<SnapshotId>> {
        Ok(latest_snapshot_id(&self.conn, host, port)?)
    }

    pub fn snapshot(&self, snapshot_id: SnapshotId) -> Result<Option<SnapshotRow>> {
        let row = self
            .conn
            .query_row(
                "SELECT snapshot_id,host_id,port,captured_at,players_online,players_max,version_id,protocol,motd_id,player_ids,enforces_secure_chat,icon_id,latency_ms
                 FROM snapshots WHERE snapshot_id=?",
                [snapshot_id],
                |r| {
                    Ok((
                        SnapshotRow {
                            snapshot_id: r.get(0)?,
                            host_id: r.get(1)?,
                            port: r.get(2)?,
                            captured_at: r.get(3)?,
                            players_online: r.get(4)?,
                            players_max: r.get(5)?,
                            version_id: r.get(6)?,
                            protocol: r.get(7)?,
                            motd_id: r.get(8)?,
                            player_ids: Vec::new(),
                            enforces_secure_chat: r.get(10)?,
                            icon_id: r.get(11)?,
                            latency_ms: r.get(12)?,
                        },
                        r.get::<_, String>(9)?,
                    ))
                },
            )
            .optional()?;
        let Some((mut snap, ids)) = row else { return Ok(None) };
        snap.player_ids = serde_json::from_str(&ids)
            .with_context(|| format!("player id list of snapshot {snapshot_id}"))?;
        Ok(Some(snap))
    }

    pub fn liveness_for(&self, snapshot_id: SnapshotId) -> Result<Vec<LivenessRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT event_id, snapshot_id, online, observed_at FROM liveness WHERE snapshot_id=? ORDER BY event_id",
        )?;
        let rows = stmt.query_map([snapshot_id], |r| {
            Ok(LivenessRow { event_id: r.get(0)?, snapshot_id: r.get(1)?, online: r.get(2)?, observed_at: r.get(3)? })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn players_with(&self, validity: Validity) -> Result<Vec<PlayerRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT player_id, username, uuid, validity FROM players WHERE validity=? ORDER BY player_id",
        )?;
        let rows = stmt.query_map([validity], |r| {
            Ok(PlayerRow { player_id: r.get(0)?, username: r.get(1)?, uuid: r.get(2)?, validity: r.get(3)? })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn waiting_players(&self) -> Result<Vec<PlayerRow>> {
        self.players_with(Validity::Waiting)
    }

    pub fn run(&self, run_id: &uuid::Uuid) -> Result<Option<RunRow>> {
        Ok(self
            .conn
            .query_row(
                "SELECT run_id, mode, started_at, finished_at, tool_version, endpoint_count, online_count, error_count FROM runs WHERE run_id=?",
                [run_id.to_string()],
                |r| {
                    Ok(RunRow {
                        run_id: r.get(0)?,
                        mode: r.get(1)?,
                        started_at: r.get(2)?,
                        finished_at: r.get(3)?,
                        tool_version: r.get(4)?,
                        totals: RunTotals { endpoint_count: r.get(5)?, online_count: r.get(6)?, error_count: r.get(7)? },
                    })
                },
            )
            .optional()?)
    }
}
