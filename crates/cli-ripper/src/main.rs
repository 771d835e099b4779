use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info, warn};
use ripper::{
    dedupe, sweep, DiscType, Job, JobLifecycle, JobStore, Notifier, ProcessProbe, RipConfig,
    RipError, RipOutcome, SystemProbe,
};

/// Optical media ripping job runner
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Device path of the disc drive (e.g. /dev/sr0)
    #[arg(short, long)]
    device: Option<String>,

    /// Volume label of the inserted disc
    #[arg(short, long, default_value = "")]
    label: String,

    /// Disc classification: dvd, bluray, music, data or unknown
    #[arg(short = 't', long, default_value = "unknown")]
    disc_type: String,

    /// Content fingerprint of the disc, when identification already computed one
    #[arg(long)]
    fingerprint: Option<String>,

    /// Path to configuration file (JSON or TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Only reconcile abandoned jobs, then exit
    #[arg(long)]
    sweep_only: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let mut builder = env_logger::Builder::from_default_env();
    builder.format_timestamp_secs();
    if args.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.init();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:#}");
            let code = err
                .downcast_ref::<RipError>()
                .map(RipError::exit_code)
                .unwrap_or(2);
            ExitCode::from(code)
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let cfg = RipConfig::load_config(args.config.as_deref())
        .context("Failed to load configuration")?;

    info!("Autorip starting");
    info!("  Database: {}", cfg.db_path.display());
    info!("  Raw path: {}", cfg.raw_path.display());
    info!("  Completed path: {}", cfg.completed_path.display());
    info!("  Log path: {}", cfg.log_path.display());

    for dir in [&cfg.raw_path, &cfg.completed_path, &cfg.log_path] {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
    }

    let store = JobStore::open(&cfg.db_path, cfg.db_wait_time)
        .context("Failed to open the job database")?;
    let probe = SystemProbe;

    // every invocation reconciles jobs orphaned by a crash or kill
    let corrected = sweep::sweep(&store, &probe).map_err(RipError::from)?;
    if corrected > 0 {
        info!("Reconciled {corrected} abandoned job(s)");
    }
    if args.sweep_only {
        return Ok(());
    }

    let device = args
        .device
        .context("--device is required unless --sweep-only is used")?;
    let disctype: DiscType = args.disc_type.parse()?;

    // two triggers moments apart on one drive means a double-fired event
    dedupe::check_running(&store, &device)?;

    let mut job = Job::new(&device, &args.label, disctype, PathBuf::new());
    job.logfile = cfg.job_logfile(&args.label, &job.job_id);
    job.crc_id = args.fingerprint.clone();
    job.pid_hash = probe.identity(job.pid).unwrap_or_default();
    if job.pid_hash == 0 {
        warn!("Could not fingerprint own process; reconciliation will rely on the PID alone");
    }
    store.add_job(&job).map_err(RipError::from)?;
    info!("Created job {} for {} ({})", job.job_id, device, disctype);

    let notifier = Notifier::from_config(&cfg);
    let lifecycle = JobLifecycle::new(cfg, args.config.clone(), &store, &notifier);
    match lifecycle.run(&mut job).await? {
        RipOutcome::Success => info!("✅ Job {} completed successfully", job.job_id),
        RipOutcome::Failed(err) => error!("❌ Job {} failed: {err}", job.job_id),
    }

    Ok(())
}
