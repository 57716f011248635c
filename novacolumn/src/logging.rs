//! Console plus per-run log file.

use anyhow::{Context, Result};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use time::format_description::FormatItem;
use time::macros::format_description;
use time::OffsetDateTime;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Our crates at DEBUG, everything else (HTTP and TLS stacks) at INFO.
const FILE_DIRECTIVES: &str =
    "info,novacolumn=debug,novacolumn_core=debug,catalog_sqlite=debug,server_ping=debug,name_lookup=debug";

const FILE_STAMP: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day]_[hour]-[minute]-[second]");

/// Install the global subscriber. The console shows INFO (DEBUG when
/// `verbose`), unless `RUST_LOG` says otherwise; the file, when `log_dir` is
/// set, records this workspace's crates at DEBUG. Returns the log file path.
pub fn init(verbose: bool, log_dir: Option<&Path>) -> Result<Option<PathBuf>> {
    let console_level = if verbose { LevelFilter::DEBUG } else { LevelFilter::INFO };
    let console_filter = EnvFilter::builder()
        .with_default_directive(console_level.into())
        .from_env_lossy();
    let console = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(console_filter);

    let (file_layer, path) = match log_dir {
        Some(dir) => {
            fs::create_dir_all(dir).with_context(|| format!("creating log directory {}", dir.display()))?;
            let path = dir.join(log_file_name(OffsetDateTime::now_utc())?);
            let file = File::create(&path).with_context(|| format!("creating log file {}", path.display()))?;
            let layer = fmt::layer()
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .with_filter(file_filter()?);
            (Some(layer), Some(path))
        }
        None => (None, None),
    };

    tracing_subscriber::registry().with(console).with(file_layer).try_init()?;
    Ok(path)
}

fn file_filter() -> Result<EnvFilter> {
    EnvFilter::try_new(FILE_DIRECTIVES).context("building log file filter")
}

/// Log files are stamped in UTC.
fn log_file_name(at: OffsetDateTime) -> Result<String> {
    Ok(format!("novacolumn_{}.log", at.format(FILE_STAMP)?))
}
