//! pagedex - offline index maintenance
//!
//! `pagedex precache <backend> --path <storage> --mount <dir>` rebuilds a
//! persistent page index and exits.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Args, CommandFactory, Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use pagedex::core::config::{BackendKind, Config};
use pagedex::core::error::Result;
use pagedex::fs::local::LocalFileSystem;
use pagedex::page::{FormatProvider, Mount};
use pagedex::precache::{self, MountProvider, PageProvider};

#[derive(Parser)]
#[command(name = "pagedex", version, about = "Page index maintenance")]
struct Cli {
    /// Raise log verbosity (-v debug, -vv trace); RUST_LOG wins when set
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rebuild a persistent index from mounted directories
    Precache {
        #[command(subcommand)]
        backend: Backend,
    },
}

#[derive(Subcommand)]
enum Backend {
    /// In-memory index (dry run)
    Memory(PrecacheArgs),
    /// redb single-file index
    Redb(PrecacheArgs),
    /// SQLite index
    Sqlite(PrecacheArgs),
}

#[derive(Args)]
struct PrecacheArgs {
    /// Storage file of the index
    #[arg(long)]
    path: Option<PathBuf>,

    /// Directory to index, optionally as `/point=dir`; repeatable
    #[arg(long = "mount", value_name = "DIR")]
    mounts: Vec<String>,

    /// TOML configuration applied before the command line
    #[arg(long)]
    config: Option<PathBuf>,
}

impl Backend {
    fn parts(&self) -> (BackendKind, &PrecacheArgs) {
        match self {
            Backend::Memory(args) => (BackendKind::Memory, args),
            Backend::Redb(args) => (BackendKind::Redb, args),
            Backend::Sqlite(args) => (BackendKind::Sqlite, args),
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let Commands::Precache { backend } = &cli.command;
    let (kind, args) = backend.parts();
    if kind.is_file_backed() && args.path.is_none() {
        print_backend_help(kind);
        return ExitCode::from(1);
    }

    match run_precache(kind, args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run_precache(kind: BackendKind, args: &PrecacheArgs) -> Result<bool> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    config.backend = kind;
    config.storage_path = args.path.clone();

    let formats = Arc::new(FormatProvider::with_defaults());
    let mut provider = MountProvider::new("local", formats, &config.default_language);
    let mounts = if args.mounts.is_empty() { vec![".".to_string()] } else { args.mounts.clone() };
    for arg in &mounts {
        let (point, dir) = match arg.split_once('=') {
            Some((point, dir)) => (point, dir),
            None => ("/", arg.as_str()),
        };
        provider = provider.with_mount(Mount::new(point, Arc::new(LocalFileSystem::new(dir)?)));
    }
    let providers: Vec<Arc<dyn PageProvider>> = vec![Arc::new(provider)];

    let report = precache::run(config, &providers)?;
    println!(
        "indexed {} of {} pages ({} failed), {} keywords, {} attributes in {:.2?}",
        report.indexed, report.files, report.failed, report.keywords, report.attributes, report.elapsed
    );
    Ok(report.is_success())
}

fn print_backend_help(kind: BackendKind) {
    let mut command = Cli::command();
    let help = command
        .find_subcommand_mut("precache")
        .and_then(|precache| precache.find_subcommand_mut(kind.name()))
        .map(|sub| sub.render_help());
    match help {
        Some(help) => eprintln!("{help}"),
        None => eprintln!("{}", command.render_help()),
    }
}

fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => "info",
        1 => "info,pagedex=debug",
        _ => "debug,pagedex=trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}
