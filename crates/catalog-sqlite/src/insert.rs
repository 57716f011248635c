use crate::{
    now_unix_secs, CatalogError, Db, HostId, IconId, MotdId, Observation, PlayerId, RunMeta, RunTotals,
    SnapshotId, Validity, VersionId, NO_ICON,
};
use anyhow::{Context, Result};
use base64::Engine;
use novacolumn_core::{PlayerSample, StatusSnapshot};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use uuid::Uuid;

// Every get-or-create is one statement: the no-op DO UPDATE makes RETURNING
// yield the existing row, so racing connections always agree on the id and
// stored columns keep their first-observed values.

fn host_id(conn: &Connection, address: &str) -> Result<HostId> {
    Ok(conn.query_row(
        "INSERT INTO hosts(address) VALUES (?) ON CONFLICT(address) DO UPDATE SET address=excluded.address RETURNING host_id",
        [address],
        |r| r.get(0),
    )?)
}

fn version_id(conn: &Connection, text: &str) -> Result<VersionId> {
    Ok(conn.query_row(
        "INSERT INTO versions(text) VALUES (?) ON CONFLICT(text) DO UPDATE SET text=excluded.text RETURNING version_id",
        [text],
        |r| r.get(0),
    )?)
}

fn motd_id(conn: &Connection, text: &str, plain: &str) -> Result<MotdId> {
    Ok(conn.query_row(
        "INSERT INTO motds(text, plain) VALUES (?,?) ON CONFLICT(text) DO UPDATE SET text=excluded.text RETURNING motd_id",
        params![text, plain],
        |r| r.get(0),
    )?)
}

fn icon_id(conn: &Connection, data: &str) -> Result<IconId> {
    Ok(conn.query_row(
        "INSERT INTO icons(data) VALUES (?) ON CONFLICT(data) DO UPDATE SET data=excluded.data RETURNING icon_id",
        [data],
        |r| r.get(0),
    )?)
}

fn player_id(conn: &Connection, player: &PlayerSample) -> Result<PlayerId> {
    Ok(conn.query_row(
        "INSERT INTO players(username, uuid) VALUES (?,?) ON CONFLICT(uuid) DO UPDATE SET uuid=excluded.uuid RETURNING player_id",
        params![player.username, player.uuid],
        |r| r.get(0),
    )?)
}

/// Map an optional favicon to the stored icon content. A present favicon must
/// be a base64 image data URL.
pub fn normalize_icon(icon: Option<&str>) -> Result<&str, CatalogError> {
    let Some(data) = icon else { return Ok(NO_ICON) };
    let payload = data
        .strip_prefix("data:image/")
        .and_then(|rest| rest.split_once(";base64,"))
        .map(|(_, payload)| payload)
        .ok_or_else(|| CatalogError::MalformedIcon("not a base64 image data url".into()))?;
    // Older servers wrap the base64 text with newlines.
    let compact: String = payload.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    base64::engine::general_purpose::STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| CatalogError::MalformedIcon(e.to_string()))?;
    Ok(data)
}

impl Db {
    pub fn host_id(&self, address: &str) -> Result<HostId> { host_id(&self.conn, address) }

    pub fn version_id(&self, text: &str) -> Result<VersionId> { version_id(&self.conn, text) }

    pub fn player_id(&self, player: &PlayerSample) -> Result<PlayerId> { player_id(&self.conn, player) }

    /// Store one successful poll: reference rows, a new snapshot and an online
    /// liveness event, all in one transaction. Nothing is written on error.
    pub fn record_observation(&mut self, status: &StatusSnapshot) -> Result<Observation> {
        let icon = normalize_icon(status.icon.as_deref())?;
        let tx = self.conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let host_id = host_id(&tx, &status.endpoint.host)?;
        let version_id = version_id(&tx, &status.version_name)?;
        let motd_id = motd_id(&tx, &status.motd, &status.motd_plain)?;
        let icon_id = icon_id(&tx, icon)?;
        let player_ids = status
            .sample
            .iter()
            .map(|p| player_id(&tx, p))
            .collect::<Result<Vec<_>>>()?;
        let player_ids_json = serde_json::to_string(&player_ids)?;

        let captured_at = now_unix_secs();
        let snapshot_id: SnapshotId = tx.query_row(
            "INSERT INTO snapshots(host_id,port,captured_at,players_online,players_max,version_id,protocol,motd_id,player_ids,enforces_secure_chat,icon_id,latency_ms)
             VALUES (?,?,?,?,?,?,?,?,?,?,?,?) RETURNING snapshot_id",
            params![
                host_id,
                status.endpoint.port,
                captured_at,
                status.players_online,
                status.players_max,
                version_id,
                status.protocol,
                motd_id,
                player_ids_json,
                status.enforces_secure_chat,
                icon_id,
                status.latency_ms,
            ],
            |r| r.get(0),
        )?;
        insert_liveness(&tx, snapshot_id, true)?;
        tx.commit()?;

        tracing::debug!(snapshot_id, endpoint = %status.endpoint, "recorded observation");
        Ok(Observation { snapshot_id, host_id, version_id, motd_id, icon_id, player_ids })
    }

    /// Mark the latest snapshot of `host:port` as offline now. Fails with
    /// [`CatalogError::NoPriorSnapshot`] if the endpoint was never recorded.
    pub fn record_offline(&mut self, host: &str, port: u16) -> Result<SnapshotId> {
        let tx = self.conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let latest = crate::query::latest_snapshot_id(&tx, host, port)?;
        let snapshot_id = latest.ok_or_else(|| CatalogError::NoPriorSnapshot { host: host.to_string(), port })?;
        insert_liveness(&tx, snapshot_id, false)?;
        tx.commit()?;
        tracing::debug!(snapshot_id, "{}:{} recorded offline", host, port);
        Ok(snapshot_id)
    }

    pub fn set_validity(&self, player_id: PlayerId, validity: Validity) -> Result<()> {
        let n = self.conn.execute(
            "UPDATE players SET validity=? WHERE player_id=?",
            params![validity, player_id],
        )?;
        anyhow::ensure!(n == 1, "no player with id {player_id}");
        Ok(())
    }

    pub fn begin_run(&self, meta: &RunMeta) -> Result<Uuid> {
        self.conn.execute(
            "INSERT INTO runs(run_id, mode, started_at, tool_version) VALUES (?,?,?,?)",
            params![meta.run_id.to_string(), meta.mode.as_str(), meta.started_at, meta.tool_version],
        )?;
        Ok(meta.run_id)
    }

    pub fn finish_run(&self, run_id: &Uuid, finished_at: i64, totals: RunTotals) -> Result<()> {
        self.conn.execute(
            "UPDATE runs SET finished_at=?, endpoint_count=?, online_count=?, error_count=? WHERE run_id=?",
            params![finished_at, totals.endpoint_count, totals.online_count, totals.error_count, run_id.to_string()],
        )?;
        Ok(())
    }

    pub fn blacklist_add(&self, address: &str, port: u16) -> Result<()> {
        self.conn
            .execute("INSERT INTO blacklist(address, port) VALUES (?,?) ON CONFLICT DO NOTHING", params![address, port])
            .with_context(|| format!("blacklisting {address}:{port}"))?;
        Ok(())
    }

    pub fn is_blacklisted(&self, address: &str, port: u16) -> Result<bool> {
        Ok(self
            .conn
            .query_row("SELECT 1 FROM blacklist WHERE address=? AND port=?", params![address, port], |_| Ok(()))
            .optional()?
            .is_some())
    }
}

fn insert_liveness(conn: &Connection, snapshot_id: SnapshotId, online: bool) -> Result<()> {
    conn.execute(
        "INSERT INTO liveness(snapshot_id, online, observed_at) VALUES (?,?,?)",
        params![snapshot_id, online, now_unix_secs()],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use novacolumn_core::Endpoint;
    use std::sync::{Arc, Barrier};

    const ICON: &str = "data:image/png;base64,iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNk+M9QDwADhgGAWjR9awAAAABJRU5ErkJggg==";

    fn status(host: &str, port: u16, version: &str) -> StatusSnapshot {
        StatusSnapshot {
            endpoint: Endpoint::new(host, port),
            latency_ms: 3.5,
            version_name: version.into(),
            protocol: 765,
            players_online: 2,
            players_max: 20,
            sample: vec![
                PlayerSample { username: "alice".into(), uuid: "4566e69f-c907-48ee-8d71-d7ba5aa00d20".into() },
                PlayerSample { username: "bob".into(), uuid: "069a79f4-44e9-4726-a5be-fca90e38aaf5".into() },
            ],
            motd: "§aWelcome".into(),
            motd_plain: "Welcome".into(),
            enforces_secure_chat: Some(true),
            icon: Some(ICON.into()),
        }
    }

    fn fresh() -> (tempfile::TempDir, Db) {
        let dir = tempfile::tempdir().unwrap();
        let db = Db::open_or_create(dir.path().join("catalog.db")).unwrap();
        (dir, db)
    }

    #[test]
    fn observation_writes_one_snapshot_and_one_online_event() {
        let (_dir, mut db) = fresh();
        let obs = db.record_observation(&status("10.0.0.1", 25565, "1.20.4")).unwrap();
        assert_eq!(db.row_count("snapshots").unwrap(), 1);
        let events = db.liveness_for(obs.snapshot_id).unwrap();
        assert_eq!(events.len(), 1);
        assert!(events[0].online);

        let row = db.snapshot(obs.snapshot_id).unwrap().unwrap();
        assert_eq!(row.port, 25565);
        assert_eq!(row.player_ids, obs.player_ids);
        assert_eq!(row.enforces_secure_chat, Some(true));
        assert_eq!(row.version_id, obs.version_id);
    }

    #[test]
    fn repeated_content_reuses_reference_rows() {
        let (_dir, mut db) = fresh();
        let a = db.record_observation(&status("10.0.0.1", 25565, "1.20.4")).unwrap();
        let b = db.record_observation(&status("10.0.0.1", 25565, "1.20.4")).unwrap();
        assert_ne!(a.snapshot_id, b.snapshot_id);
        assert!(b.snapshot_id > a.snapshot_id);
        assert_eq!(a.host_id, b.host_id);
        assert_eq!(a.version_id, b.version_id);
        assert_eq!(a.motd_id, b.motd_id);
        assert_eq!(a.icon_id, b.icon_id);
        assert_eq!(a.player_ids, b.player_ids);
        for t in ["hosts", "versions", "motds", "icons"] {
            assert_eq!(db.row_count(t).unwrap(), 1, "{t}");
        }
        assert_eq!(db.row_count("players").unwrap(), 2);
        assert_eq!(db.row_count("liveness").unwrap(), 2);
    }

    #[test]
    fn servers_without_icon_share_the_sentinel() {
        let (_dir, mut db) = fresh();
        let mut a = status("10.0.0.1", 25565, "1.20.4");
        a.icon = None;
        let mut b = status("10.0.0.2", 25565, "1.19");
        b.icon = None;
        let oa = db.record_observation(&a).unwrap();
        let ob = db.record_observation(&b).unwrap();
        assert_eq!(oa.icon_id, ob.icon_id);
        let data: String = db.conn.query_row("SELECT data FROM icons WHERE icon_id=?", [oa.icon_id], |r| r.get(0)).unwrap();
        assert_eq!(data, NO_ICON);
    }

    #[test]
    fn renamed_player_keeps_first_username() {
        let (_dir, mut db) = fresh();
        db.record_observation(&status("10.0.0.1", 25565, "1.20.4")).unwrap();
        let mut later = status("10.0.0.1", 25565, "1.20.4");
        later.sample[0].username = "alice_renamed".into();
        let obs = db.record_observation(&later).unwrap();
        let name: String = db
            .conn
            .query_row("SELECT username FROM players WHERE player_id=?", [obs.player_ids[0]], |r| r.get(0))
            .unwrap();
        assert_eq!(name, "alice");
    }

    #[test]
    fn malformed_icon_aborts_the_whole_observation() {
        let (_dir, mut db) = fresh();
        let mut s = status("10.0.0.1", 25565, "1.20.4");
        s.icon = Some("data:image/png;base64,!!!not-base64!!!".into());
        let err = db.record_observation(&s).unwrap_err();
        assert!(matches!(err.downcast_ref::<CatalogError>(), Some(CatalogError::MalformedIcon(_))));
        for t in ["hosts", "versions", "motds", "icons", "players", "snapshots", "liveness"] {
            assert_eq!(db.row_count(t).unwrap(), 0, "{t}");
        }
    }

    #[test]
    fn wrapped_base64_icon_is_accepted() {
        let wrapped = format!("{}\n{}", &ICON[..60], &ICON[60..]);
        assert!(normalize_icon(Some(&wrapped)).is_ok());
        assert!(normalize_icon(Some("http://example.com/icon.png")).is_err());
        assert_eq!(normalize_icon(None).unwrap(), NO_ICON);
    }

    #[test]
    fn offline_references_latest_snapshot() {
        let (_dir, mut db) = fresh();
        db.record_observation(&status("10.0.0.1", 25565, "1.20.4")).unwrap();
        let latest = db.record_observation(&status("10.0.0.1", 25565, "1.20.4")).unwrap();
        db.record_observation(&status("10.0.0.1", 25566, "1.20.4")).unwrap();
        let snapshots_before = db.row_count("snapshots").unwrap();

        let sid = db.record_offline("10.0.0.1", 25565).unwrap();
        assert_eq!(sid, latest.snapshot_id);
        assert_eq!(db.latest_snapshot_id("10.0.0.1", 25565).unwrap(), Some(sid));
        assert_eq!(db.row_count("snapshots").unwrap(), snapshots_before);
        let events = db.liveness_for(sid).unwrap();
        assert_eq!(events.len(), 2);
        assert!(!events[1].online);
    }

    #[test]
    fn offline_without_history_fails_loudly() {
        let (_dir, mut db) = fresh();
        let err = db.record_offline("10.9.9.9", 25565).unwrap_err();
        assert!(matches!(err.downcast_ref::<CatalogError>(), Some(CatalogError::NoPriorSnapshot { port: 25565, .. })));
        assert_eq!(db.row_count("liveness").unwrap(), 0);
    }

    #[test]
    fn racing_connections_agree_on_reference_ids() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.db");
        Db::open_or_create(&path).unwrap();
        let workers = 8;
        let barrier = Arc::new(Barrier::new(workers));
        let handles: Vec<_> = (0..workers)
            .map(|_| {
                let path = path.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    let db = Db::open_or_create(&path).unwrap();
                    barrier.wait();
                    (db.version_id("1.20.4").unwrap(), db.host_id("10.0.0.1").unwrap())
                })
            })
            .collect();
        let ids: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(ids.iter().all(|id| *id == ids[0]));
        let db = Db::open_or_create(&path).unwrap();
        assert_eq!(db.row_count("versions").unwrap(), 1);
        assert_eq!(db.row_count("hosts").unwrap(), 1);
    }

    #[test]
    fn validity_updates_and_blacklist() {
        let (_dir, mut db) = fresh();
        let obs = db.record_observation(&status("10.0.0.1", 25565, "1.20.4")).unwrap();
        db.set_validity(obs.player_ids[0], Validity::True).unwrap();
        let waiting = db.waiting_players().unwrap();
        assert_eq!(waiting.len(), 1);
        assert_eq!(waiting[0].player_id, obs.player_ids[1]);
        assert!(db.set_validity(9999, Validity::False).is_err());

        assert!(!db.is_blacklisted("10.0.0.1", 25565).unwrap());
        db.blacklist_add("10.0.0.1", 25565).unwrap();
        db.blacklist_add("10.0.0.1", 25565).unwrap();
        assert!(db.is_blacklisted("10.0.0.1", 25565).unwrap());
    }
}
