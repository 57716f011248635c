use anyhow::{bail, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use name_lookup::ResolverKind;
use std::path::PathBuf;
use std::process::ExitCode;

mod config;
mod driver;
mod input;
mod logging;
mod pool;
mod verify;

use config::Config;
use driver::PollSettings;
use pool::PersistStrategy;

#[derive(Debug, Parser)]
#[command(name = "novacolumn", version, about = "Minecraft server status crawler and catalog")]
struct Cli {
    /// Debug-level console output
    #[arg(short, long, global = true)]
    verbose: bool,
    /// Config file (YAML). A template is written here if it does not exist.
    #[arg(long, global = true, default_value = config::DEFAULT_CONFIG_PATH)]
    config: PathBuf,
    /// Catalog database file; overrides database.path from the config
    #[arg(long, global = true, value_name = "PATH")]
    database: Option<PathBuf>,
    /// Directory for the per-run log file
    #[arg(long, global = true, default_value = "logs")]
    log_dir: PathBuf,
    /// Log to the console only
    #[arg(long, global = true)]
    no_log_file: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print version information
    Version,
    /// Poll every server listed in a scanner output file
    Poll {
        /// masscan JSON output
        file: PathBuf,
        #[command(flatten)]
        args: PollArgs,
    },
    /// Re-poll every server already in the catalog
    Update {
        #[command(flatten)]
        args: PollArgs,
    },
    /// Check waiting player UUIDs against a profile service
    Verify {
        #[arg(long, value_enum)]
        resolver: Option<ResolverArg>,
    },
}

#[derive(Debug, Args)]
struct PollArgs {
    /// Number of workers
    #[arg(short, long)]
    threads: Option<usize>,
    /// Per-server timeout in seconds (fractions allowed)
    #[arg(short = 'm', long)]
    timeout: Option<f64>,
    /// Workers only probe; one thread writes to the catalog
    #[arg(long)]
    single_writer: bool,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum ResolverArg {
    Http,
    Mojang,
}

impl From<ResolverArg> for ResolverKind {
    fn from(a: ResolverArg) -> Self {
        match a {
            ResolverArg::Http => ResolverKind::Http,
            ResolverArg::Mojang => ResolverKind::Mojang,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Commands::Version = cli.command {
        println!("novacolumn {} (core {})", env!("CARGO_PKG_VERSION"), novacolumn_core::version());
        return ExitCode::SUCCESS;
    }
    let log_dir = (!cli.no_log_file).then_some(cli.log_dir.as_path());
    match logging::init(cli.verbose, log_dir) {
        Ok(Some(path)) => tracing::debug!("logging to {}", path.display()),
        Ok(None) => {}
        Err(e) => {
            eprintln!("cannot set up logging: {e:#}");
            return ExitCode::from(1);
        }
    }
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("critical: {e:#}");
            ExitCode::from(1)
        }
    }
}

fn load(cli: &Cli) -> Result<Config> {
    match config::load_config(&cli.config)? {
        Some(cfg) => Ok(cfg),
        None if cli.database.is_some() => Ok(Config::default()),
        None => {
            config::write_template(&cli.config)?;
            bail!("no config found; wrote a template to {}, edit it and rerun", cli.config.display());
        }
    }
}

fn poll_settings(cfg: &Config, args: &PollArgs) -> Result<PollSettings> {
    Ok(PollSettings {
        threads: cfg.threads(args.threads)?,
        timeout: cfg.timeout(args.timeout)?,
        strategy: if args.single_writer { PersistStrategy::SingleWriter } else { PersistStrategy::PerWorker },
    })
}

fn run(cli: Cli) -> Result<()> {
    let cfg = load(&cli)?;
    let db = cfg.database_options(cli.database.as_deref())?;
    match &cli.command {
        Commands::Version => {}
        Commands::Poll { file, args } => {
            let settings = poll_settings(&cfg, args)?;
            let endpoints = input::load_endpoints(file)?;
            tracing::info!("{} endpoints read from {}", endpoints.len(), file.display());
            let rt = tokio::runtime::Runtime::new()?;
            driver::run_ingest(&rt, &db, endpoints, settings)?;
        }
        Commands::Update { args } => {
            let settings = poll_settings(&cfg, args)?;
            let rt = tokio::runtime::Runtime::new()?;
            driver::run_update(&rt, &db, settings)?;
        }
        Commands::Verify { resolver } => {
            let kind = cfg.resolver_kind(resolver.map(Into::into))?;
            let resolver = name_lookup::build_resolver(kind, &cfg.lookup_options()?)?;
            let rt = tokio::runtime::Runtime::new()?;
            driver::run_verify(&rt, &db, resolver.as_ref())?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn cli_parses_poll_with_globals() {
        let cli = Cli::try_parse_from([
            "novacolumn", "-v", "--database", "x.db", "poll", "scan.json", "-t", "8", "-m", "0.5", "--single-writer",
        ])
        .unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.database.as_deref(), Some(Path::new("x.db")));
        match cli.command {
            Commands::Poll { file, args } => {
                assert_eq!(file, PathBuf::from("scan.json"));
                assert_eq!(args.threads, Some(8));
                assert_eq!(args.timeout, Some(0.5));
                assert!(args.single_writer);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn verify_takes_a_resolver() {
        let cli = Cli::try_parse_from(["novacolumn", "verify", "--resolver", "mojang"]).unwrap();
        assert!(matches!(cli.command, Commands::Verify { resolver: Some(ResolverArg::Mojang) }));
        assert!(Cli::try_parse_from(["novacolumn", "verify", "--resolver", "ldap"]).is_err());
    }

    #[test]
    fn a_mode_is_required() {
        assert!(Cli::try_parse_from(["novacolumn"]).is_err());
        assert!(Cli::try_parse_from(["novacolumn", "poll"]).is_err());
    }

    #[test]
    fn missing_config_writes_template_and_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("novacolumn.yaml");
        let cli = Cli::try_parse_from(["novacolumn", "--config", path.to_str().unwrap(), "update"]).unwrap();
        assert!(load(&cli).is_err());
        assert!(path.exists());
        let written = config::load_config(&path).unwrap().unwrap();
        assert!(written.database_options(None).is_ok());
    }

    #[test]
    fn database_flag_stands_in_for_missing_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.yaml");
        let cli = Cli::try_parse_from([
            "novacolumn", "--config", path.to_str().unwrap(), "--database", "cat.db", "update",
        ])
        .unwrap();
        let cfg = load(&cli).unwrap();
        assert!(!path.exists());
        assert_eq!(cfg.database_options(cli.database.as_deref()).unwrap().path, PathBuf::from("cat.db"));
    }

    #[test]
    fn single_writer_flag_selects_strategy() {
        let args = PollArgs { threads: None, timeout: None, single_writer: true };
        let s = poll_settings(&Config::default(), &args).unwrap();
        assert_eq!(s.strategy, PersistStrategy::SingleWriter);
        assert_eq!(s.threads, config::DEFAULT_THREADS);
    }
}
