use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};
use tvc::{HashAlgorithm, PullMetrics, PullOptions, ReconcileOptions, Repository};

#[derive(Parser)]
#[command(name = "tvc")]
#[command(about = "Track data files by content hash and pull them from a remote directory")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Repository root (defaults to the current directory)
    #[arg(long, global = true)]
    repo: Option<PathBuf>,

    /// Log level
    #[arg(short, long, global = true, default_value = "info")]
    log_level: String,

    /// Also write logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Initiate a tvc repository
    Init {
        /// Path to the remote data repository
        remote: PathBuf,
    },
    /// Add a file extension to the list of tracked file types
    AddExtension {
        /// Extension to track, including the leading '.'
        extension: String,
    },
    /// Update logs and hash associations of local and remote data
    UpdateLogs {
        /// Files hashed concurrently per directory
        #[arg(short, long, default_value_t = 4)]
        jobs: usize,
        /// Hash algorithm for recomputed hashes
        #[arg(long, default_value = "md5")]
        algorithm: HashAlgorithm,
    },
    /// Sync local data with remote by matching hashes
    Pull {
        /// Only report what would be copied
        #[arg(long)]
        dry_run: bool,
        /// Keep copying when a single file fails
        #[arg(long)]
        continue_on_error: bool,
    },
}

fn init_tracing(level: &str, log_file: Option<&PathBuf>) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_new(level).with_context(|| format!("invalid log level '{}'", level))?;
    let console = fmt::layer().with_target(false).with_writer(std::io::stderr);

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let directory = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(std::path::Path::new("."));
            let file_name = path.file_name().context("log file path has no file name")?;
            let appender = tracing_appender::rolling::never(directory, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_ansi(false).with_writer(writer).boxed()), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file_layer)
        .init();

    Ok(guard)
}

/// Error out when any copy failed
fn check_pull(metrics: &PullMetrics) -> Result<()> {
    if !metrics.is_successful() {
        bail!("{} file(s) failed to copy", metrics.failures.len());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = init_tracing(&cli.log_level, cli.log_file.as_ref())?;

    let root = match cli.repo {
        Some(root) => root,
        None => std::env::current_dir().context("failed to read current directory")?,
    };

    match cli.command {
        Commands::Init { remote } => {
            let repo = Repository::init(&root, &remote)
                .with_context(|| format!("failed to initialize repository in {}", root.display()))?;
            println!(
                "Initialized tvc repository in {} (remote: {})",
                repo.root().display(),
                repo.config().remote.display()
            );
        }
        Commands::AddExtension { extension } => {
            let mut repo = Repository::open(&root)?;
            if repo.add_extension(&extension)? {
                println!("Tracking {}", extension);
            } else {
                println!("{} is already tracked", extension);
            }
        }
        Commands::UpdateLogs { jobs, algorithm } => {
            let mut repo = Repository::open(&root)?;
            let options = ReconcileOptions {
                hash_algorithm: algorithm,
                max_concurrency: jobs.max(1),
                ..Default::default()
            };
            info!("Updating logs for {}", root.display());
            let report = repo.update(options).await.context("update failed")?;
            println!("{}", report.local.summary());
            println!("{}", report.remote.summary());
            println!("last_update: {}", tvc::config::format_checkpoint(&report.checkpoint));
        }
        Commands::Pull { dry_run, continue_on_error } => {
            let repo = Repository::open(&root)?;
            let report = repo
                .pull(PullOptions { dry_run, continue_on_error })
                .await
                .context("pull failed")?;
            println!("{}", report.metrics.summary());
            check_pull(&report.metrics)?;
        }
    }

    Ok(())
}
