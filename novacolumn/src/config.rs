use anyhow::{anyhow, Context, Result};
use catalog_sqlite::DbOptions;
use name_lookup::{LookupOptions, ResolverKind};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "novacolumn.yaml";
pub const DEFAULT_THREADS: usize = 4;
pub const DEFAULT_TIMEOUT_SECS: f64 = 0.3;

const TEMPLATE: &str = r#"# novacolumn configuration.
# The catalog is a SQLite database file; it is created on first use.
# Keep it on local storage: many workers write to it concurrently.
database:
  path: novacolumn.db
  # How long a worker waits for another worker's write lock (milliseconds).
  busy_timeout_ms: 30000

poll:
  threads: 4
  # Per-server timeout in seconds; fractions are allowed.
  timeout_secs: 0.3

verify:
  # http (default) or mojang
  resolver: http
  http_url: "https://api.minecraftservices.com/minecraft/profile/lookup/{uuid}"
"#;

#[derive(Debug, Default, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub path: Option<PathBuf>,
    pub busy_timeout_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize, Clone)]
pub struct PollConfig {
    pub threads: Option<usize>,
    pub timeout_secs: Option<f64>,
}

#[derive(Debug, Default, Deserialize, Clone)]
pub struct VerifyConfig {
    pub resolver: Option<String>,
    pub http_url: Option<String>,
    pub session_base: Option<String>,
    pub timeout_secs: Option<f64>,
}

#[derive(Debug, Default, Deserialize, Clone)]
pub struct Config {
    pub database: Option<DatabaseConfig>,
    pub poll: Option<PollConfig>,
    pub verify: Option<VerifyConfig>,
}

/// `Ok(None)` when the file does not exist. A file that exists but does not
/// parse is an error.
pub fn load_config(path: &Path) -> Result<Option<Config>> {
    if !path.exists() {
        return Ok(None);
    }
    let s = fs::read_to_string(path).with_context(|| format!("reading config {}", path.display()))?;
    let cfg = serde_yaml::from_str(&s).with_context(|| format!("parsing config {}", path.display()))?;
    Ok(Some(cfg))
}

pub fn write_template(path: &Path) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    fs::write(path, TEMPLATE).with_context(|| format!("writing config template {}", path.display()))
}

impl Config {
    /// Catalog location: `--database` wins over the config file.
    pub fn database_options(&self, override_path: Option<&Path>) -> Result<DbOptions> {
        let db = self.database.clone().unwrap_or_default();
        let path = override_path
            .map(Path::to_path_buf)
            .or(db.path)
            .ok_or_else(|| anyhow!("no database path configured (set database.path or pass --database)"))?;
        let mut opts = DbOptions::new(path);
        if let Some(ms) = db.busy_timeout_ms {
            opts.busy_timeout = Duration::from_millis(ms);
        }
        Ok(opts)
    }

    pub fn threads(&self, cli: Option<usize>) -> Result<usize> {
        let threads = cli
            .or_else(|| self.poll.as_ref().and_then(|p| p.threads))
            .unwrap_or(DEFAULT_THREADS);
        if threads == 0 {
            return Err(anyhow!("thread count must be at least 1"));
        }
        Ok(threads)
    }

    pub fn timeout(&self, cli: Option<f64>) -> Result<Duration> {
        let secs = cli
            .or_else(|| self.poll.as_ref().and_then(|p| p.timeout_secs))
            .unwrap_or(DEFAULT_TIMEOUT_SECS);
        positive_secs(secs).context("invalid timeout")
    }

    pub fn resolver_kind(&self, cli: Option<ResolverKind>) -> Result<ResolverKind> {
        if let Some(kind) = cli {
            return Ok(kind);
        }
        match self.verify.as_ref().and_then(|v| v.resolver.as_deref()) {
            None | Some("http") => Ok(ResolverKind::Http),
            Some("mojang") => Ok(ResolverKind::Mojang),
            Some(other) => Err(anyhow!("unknown resolver {other:?} (expected http or mojang)")),
        }
    }

    pub fn lookup_options(&self) -> Result<LookupOptions> {
        let mut opts = LookupOptions::default();
        if let Some(v) = &self.verify {
            if let Some(url) = &v.http_url { opts.http_url = url.clone(); }
            if let Some(base) = &v.session_base { opts.session_base = base.clone(); }
            if let Some(secs) = v.timeout_secs { opts.timeout = positive_secs(secs).context("invalid verify timeout")?; }
        }
        Ok(opts)
    }
}

fn positive_secs(secs: f64) -> Result<Duration> {
    if !secs.is_finite() || secs <= 0.0 {
        return Err(anyhow!("{secs} is not a positive number of seconds"));
    }
    Duration::try_from_secs_f64(secs).map_err(|e| anyhow!("{secs}: {e}"))
}
