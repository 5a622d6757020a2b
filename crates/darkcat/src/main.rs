use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use clap::{Parser, Subcommand};
use log::{error, info, warn};

use darkcat::archive::{self, ArchiveProcessor, ArchiverConfig, SmtpNotifier};
use darkcat::config::{load_config, Config};
use darkcat::db::Database;
use darkcat::error::{ConfigError, DarkcatError, Result};
use darkcat::indexer::{Indexer, IndexerConfig};
use darkcat::logging;
use darkcat::scheduler::Scheduler;

#[derive(Parser, Debug)]
#[command(
    name = "darkcat",
    version,
    about = "Dark-archive catalog indexer and download bundler"
)]
struct Cli {
    /// Path to the JSON configuration file
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Index new manifests, periodically unless --once is given
    Index {
        #[arg(long)]
        once: bool,
    },
    /// Process pending archive jobs and sweep old bundles
    Archive {
        #[arg(long)]
        once: bool,
    },
    /// Remove expired bundles and orphaned temporary files
    Clean,
    /// Queue an archive job for the given catalog file ids
    Submit {
        /// Comma-separated list of addresses to notify
        #[arg(long)]
        emails: String,
        #[arg(required = true)]
        file_ids: Vec<i64>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("darkcat: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = logging::init(&config.log_level, config.log_json) {
        eprintln!("darkcat: {}", e);
        return ExitCode::FAILURE;
    }

    match run(cli.command, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(command: Command, config: &Config) -> Result<()> {
    let db = Database::open(&config.database_path, config.storage_timeout())?;

    match command {
        Command::Index { once } => run_indexer(db, config, once),
        Command::Archive { once } => run_archiver(db, config, once),
        Command::Clean => {
            let summary = archive::sweep(
                &config.archive_output_directory,
                config.archive_lifetime(),
                config.orphan_grace(),
                std::time::SystemTime::now(),
            )?;
            info!(
                "Sweep removed {} bundle(s) and {} orphan(s)",
                summary.bundles_removed, summary.orphans_removed
            );
            Ok(())
        }
        Command::Submit { emails, file_ids } => {
            let job_id = archive::submit_job(&db, &emails, &file_ids)?;
            println!("{}", job_id);
            Ok(())
        }
    }
}

fn run_indexer(db: Database, config: &Config, once: bool) -> Result<()> {
    let indexer = Arc::new(Indexer::new(db, IndexerConfig::from_config(config)?));

    if once {
        let handle = indexer.handle();
        install_signal_handler(move || handle.stop())?;
        let summary = indexer.run()?;
        info!("{:?}", summary);
        return Ok(());
    }

    let scheduler = Arc::new(Scheduler::new("indexer", config.index_interval()));
    let worker = Arc::clone(&indexer);
    let thread = scheduler.start(move || {
        if let Err(e) = worker.run() {
            error!("Indexing pass failed: {}", e);
        }
    });

    let handle = indexer.handle();
    let stopper = Arc::clone(&scheduler);
    install_signal_handler(move || {
        stopper.stop();
        handle.stop();
    })?;

    join(thread);
    indexer.wait();
    Ok(())
}

fn run_archiver(db: Database, config: &Config, once: bool) -> Result<()> {
    let smtp = config.smtp.as_ref().ok_or_else(|| ConfigError::Validation {
        message: "the archive command needs an smtp section".to_string(),
    })?;
    let notifier = SmtpNotifier::new(smtp).map_err(darkcat::ArchiveError::from)?;

    let processor = Arc::new(ArchiveProcessor::new(
        db,
        ArchiverConfig::from_config(config),
        Arc::new(notifier),
    ));

    let recovered = processor.recover_interrupted()?;
    if recovered > 0 {
        warn!("Recovered {} interrupted archive job(s)", recovered);
    }

    if once {
        let processed = processor.run_pending_jobs()?;
        let summary = processor.sweep()?;
        info!(
            "Processed {} job(s); swept {} bundle(s), {} orphan(s)",
            processed, summary.bundles_removed, summary.orphans_removed
        );
        return Ok(());
    }

    let scheduler = Arc::new(Scheduler::new("archiver", config.archive_poll_interval()));
    let worker = Arc::clone(&processor);
    let thread = scheduler.start(move || {
        if let Err(e) = worker.run_pending_jobs() {
            error!("Archive job processing failed: {}", e);
        }
        if let Err(e) = worker.sweep() {
            error!("Archive sweep failed: {}", e);
        }
    });

    let stopper = Arc::clone(&scheduler);
    install_signal_handler(move || stopper.stop())?;

    join(thread);
    Ok(())
}

/// First SIGINT/SIGTERM runs `on_stop`; a second one exits at once.
fn install_signal_handler<F>(on_stop: F) -> Result<()>
where
    F: Fn() + Send + 'static,
{
    let signals = AtomicUsize::new(0);
    ctrlc::set_handler(move || {
        if signals.fetch_add(1, Ordering::SeqCst) == 0 {
            info!("Stopping after the current unit of work (signal again to exit now)");
            on_stop();
        } else {
            warn!("Exiting immediately");
            std::process::exit(130);
        }
    })
    .map_err(|e| DarkcatError::Signal(e.to_string()))
}

fn join(thread: JoinHandle<()>) {
    if thread.join().is_err() {
        error!("Scheduler thread panicked");
    }
}
