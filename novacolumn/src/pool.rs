//! Fixed-size worker pool: drain the work queue, probe each endpoint, persist
//! each outcome.

use anyhow::{anyhow, ensure, Result};
use catalog_sqlite::{Db, DbOptions, NO_ICON};
use novacolumn_core::{Endpoint, ProbeOutcome, StatusSnapshot, WorkQueue};
use std::ops::AddAssign;
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollMode {
    /// Failed probes are logged and dropped.
    Ingest,
    /// Failed probes are recorded as offline against the latest snapshot.
    Update,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PersistStrategy {
    /// Every worker writes through a connection of its own.
    #[default]
    PerWorker,
    /// Workers only probe; one writer thread owns the only connection.
    SingleWriter,
}

#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub threads: usize,
    pub timeout: Duration,
    pub mode: PollMode,
    pub strategy: PersistStrategy,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PoolReport {
    pub probed: usize,
    pub online: usize,
    pub offline: usize,
    pub persisted: usize,
    pub persist_failures: usize,
}

impl AddAssign for PoolReport {
    fn add_assign(&mut self, o: Self) {
        self.probed += o.probed;
        self.online += o.online;
        self.offline += o.offline;
        self.persisted += o.persisted;
        self.persist_failures += o.persist_failures;
    }
}

impl PoolReport {
    fn count_probe(&mut self, outcome: &ProbeOutcome) {
        self.probed += 1;
        if outcome.is_success() { self.online += 1 } else { self.offline += 1 }
    }

    fn count_apply(&mut self, applied: Applied) {
        match applied {
            Applied::Persisted => self.persisted += 1,
            Applied::Failed => self.persist_failures += 1,
            Applied::Skipped => {}
        }
    }
}

/// Messages for the dedicated writer. `Stop` is sent once every probe worker
/// has finished.
#[derive(Debug)]
pub enum WriterMsg {
    Outcome(ProbeOutcome),
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Applied {
    Persisted,
    Skipped,
    Failed,
}

/// Run `cfg.threads` workers until `queue` is drained.
pub async fn run_pool(queue: WorkQueue<Endpoint>, db: DbOptions, cfg: PoolConfig) -> Result<PoolReport> {
    ensure!(cfg.threads >= 1, "thread count must be at least 1");
    ensure!(!cfg.timeout.is_zero(), "timeout must be positive");
    match cfg.strategy {
        PersistStrategy::PerWorker => run_per_worker(queue, db, cfg).await,
        PersistStrategy::SingleWriter => run_single_writer(queue, db, cfg).await,
    }
}

async fn run_per_worker(queue: WorkQueue<Endpoint>, db: DbOptions, cfg: PoolConfig) -> Result<PoolReport> {
    let mut handles = Vec::with_capacity(cfg.threads);
    for id in 0..cfg.threads {
        handles.push(tokio::spawn(worker(id, queue.clone(), db.clone(), cfg.clone())));
    }
    let mut report = PoolReport::default();
    for h in handles {
        match h.await {
            Ok(tally) => report += tally,
            Err(e) => tracing::error!("worker task failed: {e}"),
        }
    }
    Ok(report)
}

async fn worker(id: usize, queue: WorkQueue<Endpoint>, opts: DbOptions, cfg: PoolConfig) -> PoolReport {
    let mut tally = PoolReport::default();
    let mut db = match open_blocking(&opts).await {
        Ok(db) => db,
        Err(e) => {
            tracing::error!(worker = id, "cannot open catalog: {e:#}");
            return tally;
        }
    };
    while let Some(endpoint) = queue.try_take() {
        let outcome = server_ping::probe_outcome(&endpoint, cfg.timeout).await;
        tally.count_probe(&outcome);
        if !needs_store(&outcome, cfg.mode) {
            continue;
        }
        let mode = cfg.mode;
        let task = tokio::task::spawn_blocking(move || {
            let applied = apply(&mut db, &outcome, mode);
            (db, applied)
        });
        match task.await {
            Ok((returned, applied)) => {
                db = returned;
                tally.count_apply(applied);
            }
            Err(e) => {
                // The connection went down with the panicking task.
                tracing::error!(worker = id, %endpoint, "persistence task failed: {e}");
                tally.count_apply(Applied::Failed);
                db = match open_blocking(&opts).await {
                    Ok(db) => db,
                    Err(e) => {
                        tracing::error!(worker = id, "cannot reopen catalog, worker stopping: {e:#}");
                        return tally;
                    }
                };
            }
        }
    }
    tracing::debug!(worker = id, probed = tally.probed, "worker done");
    tally
}

async fn run_single_writer(queue: WorkQueue<Endpoint>, opts: DbOptions, cfg: PoolConfig) -> Result<PoolReport> {
    let db = open_blocking(&opts).await?;
    let (tx, rx) = mpsc::channel::<WriterMsg>(cfg.threads.saturating_mul(64).max(1));
    let mode = cfg.mode;
    let writer = std::thread::spawn(move || writer_loop(db, rx, mode));

    let mut handles = Vec::with_capacity(cfg.threads);
    for id in 0..cfg.threads {
        let queue = queue.clone();
        let tx = tx.clone();
        let timeout = cfg.timeout;
        handles.push(tokio::spawn(async move {
            let mut tally = PoolReport::default();
            while let Some(endpoint) = queue.try_take() {
                let outcome = server_ping::probe_outcome(&endpoint, timeout).await;
                tally.count_probe(&outcome);
                if needs_store(&outcome, mode) && tx.send(WriterMsg::Outcome(outcome)).await.is_err() {
                    tracing::error!(worker = id, %endpoint, "writer is gone, outcome dropped");
                    tally.count_apply(Applied::Failed);
                }
            }
            tally
        }));
    }
    let mut report = PoolReport::default();
    for h in handles {
        match h.await {
            Ok(tally) => report += tally,
            Err(e) => tracing::error!("worker task failed: {e}"),
        }
    }
    tracing::info!("all probes finished, waiting for the writer to catch up");
    if tx.send(WriterMsg::Stop).await.is_err() {
        tracing::error!("writer stopped before the drain signal");
    }
    drop(tx);
    match tokio::task::spawn_blocking(move || writer.join()).await? {
        Ok(tally) => report += tally,
        Err(_) => tracing::error!("writer thread panicked"),
    }
    Ok(report)
}

fn writer_loop(mut db: Db, mut rx: mpsc::Receiver<WriterMsg>, mode: PollMode) -> PoolReport {
    let mut tally = PoolReport::default();
    while let Some(msg) = rx.blocking_recv() {
        match msg {
            WriterMsg::Outcome(outcome) => tally.count_apply(apply(&mut db, &outcome, mode)),
            WriterMsg::Stop => break,
        }
    }
    tally
}

async fn open_blocking(opts: &DbOptions) -> Result<Db> {
    let opts = opts.clone();
    tokio::task::spawn_blocking(move || opts.open())
        .await
        .map_err(|e| anyhow!("opening catalog: {e}"))?
}

fn needs_store(outcome: &ProbeOutcome, mode: PollMode) -> bool {
    outcome.is_success() || mode == PollMode::Update
}

fn apply(db: &mut Db, outcome: &ProbeOutcome, mode: PollMode) -> Applied {
    match outcome {
        ProbeOutcome::Success(status) => match db.record_observation(status) {
            Ok(obs) => {
                tracing::debug!(snapshot_id = obs.snapshot_id, endpoint = %status.endpoint, "saved");
                Applied::Persisted
            }
            Err(e) => {
                log_failed_observation(status, &e);
                Applied::Failed
            }
        },
        ProbeOutcome::Failure(ep) if mode == PollMode::Update => match db.record_offline(&ep.host, ep.port) {
            Ok(_) => Applied::Persisted,
            Err(e) => {
                tracing::error!(endpoint = %ep, "could not record offline: {e:#}");
                Applied::Failed
            }
        },
        ProbeOutcome::Failure(_) => Applied::Skipped,
    }
}

fn log_failed_observation(status: &StatusSnapshot, err: &anyhow::Error) {
    let icon = status.icon.as_deref().map(|i| snippet(i, 22, 64)).unwrap_or_else(|| NO_ICON.to_string());
    tracing::warn!(
        endpoint = %status.endpoint,
        version = %snippet(&status.version_name, 0, 32),
        motd = %snippet(&status.motd, 0, 16),
        icon = %icon,
        usernames = ?status.usernames(),
        uuids = ?status.uuids(),
        "could not save observation: {err:#}"
    );
}

fn snippet(s: &str, from: usize, to: usize) -> String {
    s.chars().skip(from).take(to.saturating_sub(from)).collect()
}
