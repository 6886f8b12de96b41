//! Project overview:
//! - Backs a local directory up into an object-storage bucket and restores it back
//! - Decisions are per file: skip, transfer, or (restore only) ask before overwriting
//! - Comparison uses existence plus last-modified times truncated to whole seconds
//! - Stores sit behind the `RemoteStore` trait: S3 (feature `s3`), a directory-backed
//!   store, and an in-memory store
//!
//! Key behaviors:
//! - Backup: uploads files missing from the bucket or strictly newer locally; ties skip
//! - Restore: downloads objects missing locally, skips when the local copy is as new,
//!   and asks the resolver when the bucket copy is strictly newer
//! - Bucket lifecycle: backup creates its bucket when absent; restore requires it to exist
//!
//! Flags:
//! - dry_run: decide and report, transfer nothing
//! - no_progress: disables progress bar

pub mod backends;
pub mod paths;
pub mod resolver;
pub mod sync;
pub mod utils;

pub use backends::{
    store_from_url, LocalStore, MemoryStore, ObjectStat, RemoteEntry, RemoteStore, SyncError,
};
pub use resolver::{Conflict, FixedAnswer, OverwriteResolver, PromptResolver};
pub use sync::{backup, restore, SyncOptions, SyncReport, TransferDecision};

use std::path::Path;
use std::sync::Arc;

use log::info;
use rand::Rng;

/// Region new buckets are created in unless configured otherwise.
pub const DEFAULT_REGION: &str = "us-west-2";

/// Prefix of generated backup bucket names.
pub const BUCKET_PREFIX: &str = "bucketsync-backup-";

/// `prefix` followed by a random four-digit suffix.
pub fn generate_bucket_name(prefix: &str) -> String {
    let suffix: u16 = rand::thread_rng().gen_range(1000..=9999);
    format!("{prefix}{suffix}")
}

pub fn validate_directory(path: &Path) -> Result<(), SyncError> {
    if path.is_dir() {
        Ok(())
    } else {
        Err(SyncError::InvalidDirectory(path.to_path_buf()))
    }
}

/// Create `bucket` in `region` unless it already exists. Returns whether it
/// was created. A dry run only reports what it would do.
pub fn ensure_bucket(
    store: &dyn RemoteStore,
    bucket: &str,
    region: &str,
    dry_run: bool,
) -> Result<bool, SyncError> {
    if store.bucket_exists(bucket)? {
        info!("Bucket {} already exists", bucket);
        return Ok(false);
    }
    if dry_run {
        info!("Dry-run: would create bucket {} in {}", bucket, region);
    } else {
        store.create_bucket(bucket, region)?;
        info!("Created bucket {} in {}", bucket, region);
    }
    Ok(true)
}

/// Validate the source, make sure the bucket exists, then run one backup pass.
pub fn run_backup(
    store: Arc<dyn RemoteStore>,
    source: &Path,
    bucket: &str,
    region: &str,
    options: &SyncOptions,
) -> Result<SyncReport, SyncError> {
    validate_directory(source)?;
    ensure_bucket(store.as_ref(), bucket, region, options.dry_run)?;
    backup(store, bucket, source, options)
}

/// Require the bucket to exist, then run one restore pass into `target`.
pub fn run_restore(
    store: Arc<dyn RemoteStore>,
    target: &Path,
    bucket: &str,
    resolver: &mut dyn OverwriteResolver,
    options: &SyncOptions,
) -> Result<SyncReport, SyncError> {
    if !store.bucket_exists(bucket)? {
        return Err(SyncError::BucketNotFound(bucket.to_string()));
    }
    restore(store, bucket, target, resolver, options)
}
