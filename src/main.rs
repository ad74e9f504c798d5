mod error;

use crate::error::{ErrorKind, Result};
use clap::{Parser, Subcommand};
use exn::ResultExt;
use futures::StreamExt;
use librarian_archive::exts::TokioScheduler;
use librarian_archive::{Analysis, Archive, ContentType, Database, GetOptions, ScanOptions, callback};
use librarian_config::Config;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "LIBRARIAN_LOG";

/// Content metadata archive for a file library.
#[derive(Parser, Debug)]
#[command(name = "librarian", version, about)]
struct Cli {
    /// Configuration file (TOML, YAML or JSON).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Empty the archive and rebuild it from the library.
    Reload,
    /// Analyze a directory tree and store the results.
    Scan {
        /// Directory to start from; the library root by default.
        #[arg(default_value = "")]
        path: String,
        /// Deepest level to descend to; 0 scans PATH alone.
        #[arg(long)]
        maxdepth: Option<usize>,
        /// Schedule each subdirectory as its own task, `archive.scan_step_delay` apart.
        #[arg(long)]
        background: bool,
    },
    /// Print stored records, analyzing the ones that are missing.
    Get {
        #[arg(required = true)]
        paths: Vec<String>,
        /// Only paths this content type can process.
        #[arg(short = 't', long = "type")]
        content_type: Option<String>,
        /// Run full extraction on missing paths instead of a quick look.
        #[arg(long)]
        full: bool,
        /// Leave missing paths out.
        #[arg(long)]
        ignore_missing: bool,
    },
    /// Print the records directly under a directory.
    Children {
        path: String,
        #[arg(short = 't', long = "type")]
        content_type: Option<String>,
    },
    /// Find records whose searchable values contain TERMS.
    Search {
        terms: String,
        #[arg(short = 't', long = "type")]
        content_type: Option<String>,
        #[arg(short, long)]
        language: Option<String>,
    },
    /// Delete paths and everything beneath them.
    #[command(alias = "rm")]
    Remove {
        #[arg(required = true)]
        paths: Vec<String>,
    },
    /// Apply pending library changes.
    Refresh,
    /// Empty the archive.
    Clear,
}

fn setup_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

#[tokio::main]
async fn main() -> ExitCode {
    setup_tracing();
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err:?}");
            ExitCode::FAILURE
        },
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.config.as_deref()).or_raise(|| ErrorKind::Config)?;
    let db = Database::connect(&config.database.path).await.or_raise(|| ErrorKind::Open)?;
    let scheduler = TokioScheduler::new();
    let archive = Archive::builder(&db, &config)
        .tasks(Arc::new(scheduler.clone()))
        .build()
        .or_raise(|| ErrorKind::Open)?;

    let outcome = dispatch(&archive, &config, &scheduler, cli.command).await;
    scheduler.shutdown().await;
    db.close().await;
    outcome
}

async fn dispatch(archive: &Archive, config: &Config, scheduler: &TokioScheduler, command: Command) -> Result<()> {
    match command {
        Command::Reload => {
            archive.clear_and_reload().await.or_raise(|| ErrorKind::Command("reload"))?;
            tracing::info!("archive reloaded");
        },
        Command::Scan { path, maxdepth, background } => {
            let mut options = ScanOptions::new(path).delay(config.archive.scan_step_delay());
            options.maxdepth = maxdepth;
            if background {
                scan_in_background(archive, options, scheduler).await?;
            } else {
                let mut levels = archive.scan(options);
                let mut count = 0;
                while let Some(analysis) = levels.next().await {
                    count += analysis.len();
                    archive.save_many(analysis).await.or_raise(|| ErrorKind::Command("scan"))?;
                }
                tracing::info!(count, "scan finished");
            }
        },
        Command::Get { paths, content_type, full, ignore_missing } => {
            let mut options = GetOptions::default().partial(!full).ignore_missing(ignore_missing);
            if let Some(content_type) = parse_type(content_type)? {
                options = options.content_type(content_type);
            }
            let found = archive.get(paths, options).await.or_raise(|| ErrorKind::Command("get"))?;
            print(&found)?;
        },
        Command::Children { path, content_type } => {
            let content_type = parse_type(content_type)?;
            let found = archive.for_parent(&path, content_type).await.or_raise(|| ErrorKind::Command("children"))?;
            print(&found)?;
        },
        Command::Search { terms, content_type, language } => {
            let content_type = parse_type(content_type)?;
            let found = archive
                .search(&terms, content_type, language.as_deref())
                .await
                .or_raise(|| ErrorKind::Command("search"))?;
            print(&found)?;
        },
        Command::Remove { paths } => {
            archive.remove(paths).await.or_raise(|| ErrorKind::Command("remove"))?;
        },
        Command::Refresh => {
            let changed = archive.refresh_changes().await.or_raise(|| ErrorKind::Command("refresh"))?;
            tracing::info!(changed, "refresh finished");
        },
        Command::Clear => {
            archive.clear().await.or_raise(|| ErrorKind::Command("clear"))?;
            tracing::info!("archive cleared");
        },
    }
    Ok(())
}

/// Run a callback scan and wait for every scheduled level to finish.
async fn scan_in_background(archive: &Archive, options: ScanOptions, scheduler: &TokioScheduler) -> Result<()> {
    let saver = archive.clone();
    let persist = callback(move |analysis: Analysis| {
        let archive = saver.clone();
        async move {
            if let Err(err) = archive.save_many(analysis).await {
                tracing::error!(error = ?err, "could not store scanned level");
            }
        }
    });
    archive.scan_with_callback(options, persist).await.or_raise(|| ErrorKind::Command("scan"))?;
    while !scheduler.is_empty() {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    Ok(())
}

fn parse_type(name: Option<String>) -> Result<Option<ContentType>> {
    name.map(|name| name.parse::<ContentType>().or_raise(|| ErrorKind::Argument(name.clone()))).transpose()
}

fn print(found: &Analysis) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, found).or_raise(|| ErrorKind::Output)?;
    writeln!(stdout).or_raise(|| ErrorKind::Output)
}
