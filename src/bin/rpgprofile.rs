//! rpgprofile - wait-event profiler for one PostgreSQL backend.
//!
//! Usage:
//!   rpgprofile -P 12345             # sample every 10 ms
//!   rpgprofile -P 12345 -i 50       # sample every 50 ms
//!   rpgprofile -P 12345 --no-workers

use std::io;
use std::time::Duration;

use clap::Parser;
use tracing::Level;
use tracing_subscriber::EnvFilter;

use rpgtop::collector::{ConnectionArgs, ConnectionConfig, PostgresDb};
use rpgtop::profile::{ProfileConfig, Profiler};
use rpgtop::util::CancelToken;

use tikv_jemallocator::Jemalloc;
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

/// Wait-event profiler for a single backend.
#[derive(Parser)]
#[command(name = "rpgprofile", version, about = "PostgreSQL wait-event profiler")]
struct Args {
    /// PID of the backend to profile.
    #[arg(short = 'P', long)]
    pid: i32,

    /// Sampling interval in milliseconds.
    #[arg(short, long, default_value_t = 10)]
    interval: u64,

    /// Characters of query text shown in report headers.
    #[arg(long, default_value_t = 128)]
    strsize: usize,

    /// Ignore parallel workers of the backend.
    #[arg(long)]
    no_workers: bool,

    #[command(flatten)]
    connection: ConnectionArgs,

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

    if args.interval == 0 {
        eprintln!("Error: interval must be at least 1 ms");
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

    let cancel = CancelToken::new();
    if let Err(e) = cancel.cancel_on_ctrlc() {
        eprintln!("Error: cannot install signal handler: {}", e);
        std::process::exit(1);
    }

    let profile = ProfileConfig {
        pid: args.pid,
        interval: Duration::from_millis(args.interval),
        strsize: args.strsize,
        include_workers: !args.no_workers,
    };
    let mut profiler = Profiler::new(db, io::stdout().lock(), profile);
    if let Err(e) = profiler.run(&cancel) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let mut filter = EnvFilter::from_default_env();
    for target in ["rpgprofile", "rpgtop"] {
        if let Ok(directive) = format!("{}={}", target, level).parse() {
            filter = filter.add_directive(directive);
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}
