//! Run driver: open the catalog, fill the work queue for the chosen mode, run
//! the pool or the verify pass, and book-keep the run.

use crate::pool::{run_pool, PersistStrategy, PollMode, PoolConfig, PoolReport};
use crate::verify::{verify_players, VerifyReport};
use anyhow::{Context, Result};
use catalog_sqlite::{now_unix_ms, Db, DbOptions, RunMeta, RunMode, RunTotals};
use name_lookup::NameResolver;
use novacolumn_core::{Endpoint, WorkQueue};
use std::time::{Duration, Instant};
use tokio::runtime::Runtime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy)]
pub struct PollSettings {
    pub threads: usize,
    pub timeout: Duration,
    pub strategy: PersistStrategy,
}

#[derive(Debug, Clone)]
pub struct PollSummary {
    pub run_id: Uuid,
    pub enqueued: usize,
    pub report: PoolReport,
}

#[derive(Debug, Clone)]
pub struct VerifySummary {
    pub run_id: Uuid,
    pub report: VerifyReport,
}

fn open_control(opts: &DbOptions) -> Result<Db> {
    opts.open().with_context(|| format!("connecting to catalog {}", opts.path.display()))
}

fn begin(db: &Db, mode: RunMode) -> Result<Uuid> {
    db.begin_run(&RunMeta {
        run_id: Uuid::now_v7(),
        mode,
        started_at: now_unix_ms(),
        tool_version: novacolumn_core::version().to_string(),
    })
}

/// Input endpoints in file order, minus blacklisted ones.
pub fn ingest_queue(db: &Db, endpoints: Vec<Endpoint>) -> Result<WorkQueue<Endpoint>> {
    let queue = WorkQueue::new();
    for ep in endpoints {
        if db.is_blacklisted(&ep.host, ep.port)? {
            tracing::debug!(endpoint = %ep, "blacklisted, skipping");
            continue;
        }
        queue.push(ep);
    }
    Ok(queue)
}

/// One item per distinct endpoint already in the catalog.
pub fn update_queue(db: &Db) -> Result<WorkQueue<Endpoint>> {
    let queue = WorkQueue::new();
    queue.extend(db.known_endpoints()?);
    Ok(queue)
}

pub fn run_ingest(rt: &Runtime, opts: &DbOptions, endpoints: Vec<Endpoint>, settings: PollSettings) -> Result<PollSummary> {
    let db = open_control(opts)?;
    let queue = ingest_queue(&db, endpoints)?;
    run_poll(rt, &db, opts, queue, PollMode::Ingest, settings)
}

pub fn run_update(rt: &Runtime, opts: &DbOptions, settings: PollSettings) -> Result<PollSummary> {
    let db = open_control(opts)?;
    let queue = update_queue(&db)?;
    run_poll(rt, &db, opts, queue, PollMode::Update, settings)
}

fn run_poll(
    rt: &Runtime,
    db: &Db,
    opts: &DbOptions,
    queue: WorkQueue<Endpoint>,
    mode: PollMode,
    settings: PollSettings,
) -> Result<PollSummary> {
    let run_mode = match mode {
        PollMode::Ingest => RunMode::Ingest,
        PollMode::Update => RunMode::Update,
    };
    let run_id = begin(db, run_mode)?;
    let enqueued = queue.len();
    tracing::info!(%run_id, mode = run_mode.as_str(), endpoints = enqueued, threads = settings.threads, "starting run");

    let started = Instant::now();
    let cfg = PoolConfig { threads: settings.threads, timeout: settings.timeout, mode, strategy: settings.strategy };
    let report = rt.block_on(run_pool(queue, opts.clone(), cfg))?;

    db.finish_run(
        &run_id,
        now_unix_ms(),
        RunTotals {
            endpoint_count: enqueued as i64,
            online_count: report.online as i64,
            error_count: (report.offline + report.persist_failures) as i64,
        },
    )?;
    tracing::info!(
        %run_id,
        online = report.online,
        offline = report.offline,
        saved = report.persisted,
        failed_saves = report.persist_failures,
        "run finished in {:.1}s",
        started.elapsed().as_secs_f64()
    );
    Ok(PollSummary { run_id, enqueued, report })
}

pub fn run_verify(rt: &Runtime, opts: &DbOptions, resolver: &dyn NameResolver) -> Result<VerifySummary> {
    let db = open_control(opts)?;
    let run_id = begin(&db, RunMode::Verify)?;
    let report = rt.block_on(verify_players(&db, resolver))?;
    db.finish_run(
        &run_id,
        now_unix_ms(),
        RunTotals {
            endpoint_count: report.checked as i64,
            online_count: report.valid as i64,
            error_count: report.invalid as i64,
        },
    )?;
    tracing::info!(%run_id, checked = report.checked, valid = report.valid, invalid = report.invalid, "verify finished");
    Ok(VerifySummary { run_id, report })
}

#[cfg(test)]
mod tests {
    use super::*;
    use novacolumn_core::{PlayerSample, StatusSnapshot};
    use server_ping::fake::{FakeServer, Reply};

    fn seen(host: &str, version: &str) -> StatusSnapshot {
        StatusSnapshot {
            endpoint: Endpoint::new(host, 25565),
            latency_ms: 3.5,
            version_name: version.into(),
            protocol: 765,
            players_online: 1,
            players_max: 10,
            sample: vec![PlayerSample { username: "alice".into(), uuid: "4566e69f-c907-48ee-8d71-d7ba5aa00d20".into() }],
            motd: "§6hello".into(),
            motd_plain: "hello".into(),
            enforces_secure_chat: Some(true),
            icon: None,
        }
    }

    #[test]
    fn update_enqueues_each_endpoint_once() {
        let dir = tempfile::tempdir().unwrap();
        let mut db = Db::open_or_create(dir.path().join("catalog.db")).unwrap();
        for v in ["1.20.1", "1.20.2", "1.20.4"] {
            db.record_observation(&seen("host1", v)).unwrap();
        }
        db.record_observation(&seen("host2", "1.20.4")).unwrap();
        db.record_observation(&seen("host2", "1.21")).unwrap();

        let queue = update_queue(&db).unwrap();
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.try_take(), Some(Endpoint::new("host1", 25565)));
        assert_eq!(queue.try_take(), Some(Endpoint::new("host2", 25565)));
        assert_eq!(queue.try_take(), None);
    }

    #[test]
    fn blacklisted_endpoints_are_not_enqueued() {
        let dir = tempfile::tempdir().unwrap();
        let db = Db::open_or_create(dir.path().join("catalog.db")).unwrap();
        db.blacklist_add("10.0.0.2", 25565).unwrap();
        let input = vec![Endpoint::new("10.0.0.1", 25565), Endpoint::new("10.0.0.2", 25565), Endpoint::new("10.0.0.2", 25566)];
        let queue = ingest_queue(&db, input).unwrap();
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.try_take(), Some(Endpoint::new("10.0.0.1", 25565)));
        assert_eq!(queue.try_take(), Some(Endpoint::new("10.0.0.2", 25566)));
    }

    #[test]
    fn ingest_run_is_booked() {
        let rt = tokio::runtime::Builder::new_multi_thread().worker_threads(2).enable_all().build().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let opts = DbOptions::new(dir.path().join("catalog.db"));
        let json = r#"{"version":{"name":"Paper 1.20.4","protocol":765},"players":{"max":50,"online":0},"description":"hello"}"#;
        let server = rt.block_on(FakeServer::start(Reply::Status(json.into()))).unwrap();

        let settings = PollSettings { threads: 2, timeout: Duration::from_secs(2), strategy: PersistStrategy::PerWorker };
        let summary = run_ingest(&rt, &opts, vec![Endpoint::new("127.0.0.1", server.port())], settings).unwrap();
        assert_eq!(summary.enqueued, 1);
        assert_eq!(summary.report.persisted, 1);

        let db = opts.open().unwrap();
        let run = db.run(&summary.run_id).unwrap().unwrap();
        assert_eq!(run.mode, "ingest");
        assert!(run.finished_at.is_some());
        assert_eq!(run.totals, RunTotals { endpoint_count: 1, online_count: 1, error_count: 0 });
        assert_eq!(db.row_count("snapshots").unwrap(), 1);
        drop(server);
    }

    #[test]
    fn unopenable_catalog_is_fatal() {
        let rt = Runtime::new().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let opts = DbOptions::new(dir.path().join("missing").join("catalog.db"));
        let settings = PollSettings { threads: 1, timeout: Duration::from_millis(100), strategy: PersistStrategy::PerWorker };
        assert!(run_update(&rt, &opts, settings).is_err());
    }
}
