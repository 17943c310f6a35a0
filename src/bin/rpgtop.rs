//! rpgtop - top-like monitor for PostgreSQL statistics.
//!
//! Usage:
//!   rpgtop                    # activity view, 1 second refresh
//!   rpgtop 5                  # refresh every 5 seconds
//!   rpgtop --view statements  # start with pg_stat_statements
//!   rpgtop --extra disks      # show per-device I/O under the view

use std::sync::mpsc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tracing::{Level, info};
use tracing_subscriber::EnvFilter;

use rpgtop::collector::{
    Collector, CollectorConfig, ConnectionArgs, ConnectionConfig, DEFAULT_TRUNCATE, Database,
    OsSource, PostgresDb, RealFs,
};
use rpgtop::collector::procfs::LocalProc;
use rpgtop::tui::{App, MAX_REFRESH, MIN_REFRESH, UiState};
use rpgtop::util::CancelToken;
use rpgtop::view::{ExtraStat, ViewRegistry};

use tikv_jemallocator::Jemalloc;
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ExtraArg {
    Disks,
    Net,
}

impl From<ExtraArg> for ExtraStat {
    fn from(arg: ExtraArg) -> Self {
        match arg {
            ExtraArg::Disks => ExtraStat::Diskstats,
            ExtraArg::Net => ExtraStat::Netdev,
        }
    }
}

/// Top-like monitor for PostgreSQL statistics.
#[derive(Parser)]
#[command(name = "rpgtop", version, about = "PostgreSQL statistics monitor")]
struct Args {
    /// Refresh interval in seconds (default: 1).
    #[arg(value_name = "INTERVAL")]
    interval: Option<u64>,

    #[command(flatten)]
    connection: ConnectionArgs,

    /// View shown at startup.
    #[arg(long, default_value = "activity")]
    view: String,

    /// Cut values this long (0 disables truncation).
    #[arg(long, default_value_t = DEFAULT_TRUNCATE)]
    truncate: usize,

    /// Let columns grow to fit their values.
    #[arg(long)]
    dynamic_widths: bool,

    /// Show a per-device or per-interface table under the view.
    #[arg(long, value_enum)]
    extra: Option<ExtraArg>,

    /// Increase log verbosity (-v = DEBUG, -vv = TRACE).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors.
    #[arg(short, long)]
    quiet: bool,
}

fn main() {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    let refresh = Duration::from_secs(args.interval.unwrap_or(1));
    if refresh < MIN_REFRESH || refresh > MAX_REFRESH {
        eprintln!(
            "Error: interval must be between {} and {} seconds",
            MIN_REFRESH.as_secs(),
            MAX_REFRESH.as_secs()
        );
        std::process::exit(1);
    }

    let config = match ConnectionConfig::from_env() {
        Ok(c) => c.with_args(&args.connection),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };
    let db = match PostgresDb::connect(&config) {
        Ok(db) => db,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let registry = ViewRegistry::builtin(db.server_version_num());
    let Some(view) = registry.get(&args.view) else {
        let names: Vec<&str> = registry.names().collect();
        eprintln!(
            "Error: unknown view {:?}, expected one of: {}",
            args.view,
            names.join(", ")
        );
        std::process::exit(1);
    };
    let mut view = view.clone();
    if let Some(extra) = args.extra {
        view.extra = extra.into();
    }

    let os = if config.is_local() {
        OsSource::Local(Box::new(LocalProc::new(RealFs::new())))
    } else {
        OsSource::remote()
    };
    info!(
        view = %view.name,
        local = config.is_local(),
        "connected to {}",
        config.host
    );

    let collector_config = CollectorConfig {
        truncate: args.truncate,
        dynamic_widths: args.dynamic_widths,
        refresh,
    };
    let ui = UiState::new(view.clone(), refresh);
    let collector = Collector::new(db, os, view, collector_config);

    let cancel = CancelToken::new();
    if let Err(e) = cancel.cancel_on_ctrlc() {
        eprintln!("Error: cannot install signal handler: {}", e);
        std::process::exit(1);
    }

    let (tx, rx) = mpsc::channel();
    let handle = match rpgtop::collector::spawn(collector, tx, cancel.clone()) {
        Ok(h) => h,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let app = App::new(registry, ui, handle, cancel);
    if let Err(e) = app.run(rx) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Logs go to stderr; the default WARN level keeps them off the screen.
fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::WARN,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let mut filter = EnvFilter::from_default_env();
    if let Ok(directive) = format!("rpgtop={}", level).parse() {
        filter = filter.add_directive(directive);
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
