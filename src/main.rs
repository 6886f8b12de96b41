use std::path::PathBuf;
use std::process::ExitCode;

use bucketsync::{
    generate_bucket_name, run_backup, run_restore, store_from_url, FixedAnswer,
    OverwriteResolver, PromptResolver, SyncError, SyncOptions, SyncReport,
};
use clap::{Parser, Subcommand};
use log::error;
use regex::Regex;

/// Command-line interface for bucketsync
#[derive(Parser, Debug)]
#[command(
    name = "bucketsync",
    version,
    about = "Back up a directory to an object-storage bucket and restore it"
)]
struct Cli {
    /// Store to talk to: `s3`, `s3+https://host[:port]` or `file:///path/to/root` (global)
    #[arg(long, value_name = "URL", global = true, env = "BUCKETSYNC_STORE", default_value = "s3")]
    store: String,

    /// Region for the store client and for newly created buckets (global)
    #[arg(long, value_name = "REGION", global = true, env = "BUCKETSYNC_REGION", default_value = bucketsync::DEFAULT_REGION)]
    region: String,

    /// Regex on object keys to include (global)
    #[arg(short, long, value_name = "INCLUDE", global = true)]
    include: Option<String>,

    /// Regex on object keys to exclude (global)
    #[arg(short, long, value_name = "EXCLUDE", global = true)]
    exclude: Option<String>,

    /// Report what would be transferred without transferring (global)
    #[arg(long, global = true)]
    dry_run: bool,

    /// Disables the progress bar (global)
    #[arg(long, global = true)]
    no_progress: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Upload new and changed files from a directory into a bucket
    Backup {
        /// Directory to back up
        source: PathBuf,
        /// Bucket to back up into (default: a generated name)
        #[arg(long)]
        bucket: Option<String>,
        /// Number of upload workers
        #[arg(short, long, value_name = "THREADS", default_value_t = 1)]
        threads: usize,
    },
    /// Download a bucket's objects into a directory
    Restore {
        /// Directory to restore into
        target: PathBuf,
        /// Bucket to restore from
        bucket: String,
        /// Overwrite older local files without asking
        #[arg(short, long, conflicts_with = "no")]
        yes: bool,
        /// Keep older local files without asking
        #[arg(short, long)]
        no: bool,
    },
}

fn main() -> ExitCode {
    // Initialize logging using env_logger and BUCKETSYNC_LOG
    env_logger::Builder::from_env(env_logger::Env::new().filter("BUCKETSYNC_LOG")).init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if e.is_usage() {
                eprintln!("{e}");
            } else {
                error!("{e:?}");
                eprintln!("Sync failed: {e}");
            }
            ExitCode::FAILURE
        }
    }
}

fn compile(pattern: Option<&str>) -> Result<Option<Regex>, SyncError> {
    Ok(pattern.map(Regex::new).transpose()?)
}

fn run(cli: Cli) -> Result<(), SyncError> {
    let include_re = compile(cli.include.as_deref())?;
    let exclude_re = compile(cli.exclude.as_deref())?;
    let mut options = SyncOptions {
        threads: 1,
        include: include_re.as_ref(),
        exclude: exclude_re.as_ref(),
        dry_run: cli.dry_run,
        no_progress: cli.no_progress,
    };

    let store = store_from_url(&cli.store, &cli.region)?;

    match cli.command {
        Commands::Backup {
            source,
            bucket,
            threads,
        } => {
            options.threads = threads;
            let bucket = bucket.unwrap_or_else(|| generate_bucket_name(bucketsync::BUCKET_PREFIX));
            println!("Backing up {} to bucket {}", source.display(), bucket);
            let report = run_backup(store, &source, &bucket, &cli.region, &options)?;
            print_backup_summary(&report);
        }
        Commands::Restore {
            target,
            bucket,
            yes,
            no,
        } => {
            let mut resolver: Box<dyn OverwriteResolver> = if yes || no {
                Box::new(FixedAnswer(yes))
            } else {
                Box::new(PromptResolver::stdio())
            };
            let report = run_restore(store, &target, &bucket, resolver.as_mut(), &options)?;
            print_restore_summary(&report);
        }
    }
    Ok(())
}

fn print_backup_summary(report: &SyncReport) {
    if report.dry_run {
        println!("Number of files that would be backed up: {}", report.transferred);
    } else {
        println!("Number of files backed up: {}", report.transferred);
    }
}

fn print_restore_summary(report: &SyncReport) {
    match (report.transferred, report.dry_run) {
        (0, _) => println!("No files were downloaded."),
        (n, true) => println!("Number of files that would be restored: {n}"),
        (n, false) => println!("Number of files restored: {n}"),
    }
}
