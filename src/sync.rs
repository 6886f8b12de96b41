//! One-way, timestamp-based reconciliation between a local tree and a bucket.
//!
//! Backup walks the local tree and uploads files that are missing remotely or
//! strictly newer locally. Restore lists the bucket and downloads objects that
//! are missing locally; an object strictly newer than an existing local file
//! is handed to an [`OverwriteResolver`]. Both sides are compared in whole
//! seconds. Nothing is cached between passes, so rerunning a pass is safe:
//! already-synced pairs resolve to `Skip`.
//!
//! Backup entries are independent, so workers share them through an atomic
//! index. Restore stays sequential because a conflict blocks on the resolver.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

use log::{debug, info, warn};
use regex::Regex;
use walkdir::WalkDir;

use crate::backends::{ObjectStat, RemoteEntry, RemoteStore, SyncError};
use crate::paths;
use crate::resolver::{Conflict, OverwriteResolver};
use crate::utils::{unix_seconds, Progress};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferDecision {
    Skip,
    Upload,
    Download,
    PromptUser,
}

/// Upload when the object is missing or strictly older; ties skip.
pub fn decide_backup(local_modified: i64, remote: &ObjectStat) -> TransferDecision {
    match remote {
        ObjectStat::NotFound => TransferDecision::Upload,
        ObjectStat::Found(entry) if entry.last_modified < local_modified => TransferDecision::Upload,
        ObjectStat::Found(_) => TransferDecision::Skip,
    }
}

/// Download when there is no local file; ask when the object is strictly newer.
pub fn decide_restore(local_modified: Option<i64>, remote_modified: i64) -> TransferDecision {
    match local_modified {
        None => TransferDecision::Download,
        Some(local) if remote_modified > local => TransferDecision::PromptUser,
        Some(_) => TransferDecision::Skip,
    }
}

/// A file found under the backup root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalEntry {
    pub path: PathBuf,
    /// Path relative to the root, in key form.
    pub key: String,
    pub modified: i64,
}

pub struct SyncOptions<'a> {
    pub threads: usize,
    pub include: Option<&'a Regex>,
    pub exclude: Option<&'a Regex>,
    pub dry_run: bool,
    pub no_progress: bool,
}

impl Default for SyncOptions<'_> {
    fn default() -> Self {
        Self {
            threads: 1,
            include: None,
            exclude: None,
            dry_run: false,
            no_progress: false,
        }
    }
}

impl SyncOptions<'_> {
    fn selects(&self, key: &str) -> bool {
        self.include.map_or(true, |re| re.is_match(key))
            && !self.exclude.map_or(false, |re| re.is_match(key))
    }
}

/// Outcome of one pass. With `dry_run`, `transferred` counts the transfers
/// that would have happened.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    pub transferred: u64,
    pub skipped: u64,
    pub dry_run: bool,
}

/// Collect every file below `root`, recursing into all subdirectories.
/// Directories themselves never become entries. Symlinks to files count as
/// the file they point at; symlinked directories are not entered.
pub fn scan_local(root: &Path, options: &SyncOptions) -> Result<Vec<LocalEntry>, SyncError> {
    let mut entries = Vec::new();
    for entry in WalkDir::new(root).min_depth(1) {
        let entry = entry?;
        let is_file = entry.file_type().is_file()
            || (entry.path_is_symlink() && entry.path().is_file());
        if !is_file {
            continue;
        }
        let key = match paths::to_remote_key(root, entry.path()) {
            Ok(key) => key,
            Err(e @ SyncError::InvalidPath { .. }) => {
                warn!("Skipping file that cannot be backed up: {}", e);
                continue;
            }
            Err(e) => return Err(e),
        };
        if !options.selects(&key) {
            debug!("Filtered out {}", key);
            continue;
        }
        let modified = fs::metadata(entry.path())?.modified()?;
        entries.push(LocalEntry {
            path: entry.into_path(),
            key,
            modified: unix_seconds(modified),
        });
    }
    Ok(entries)
}

/// Back up `root` into `bucket`. The first store error stops the pass.
pub fn backup(
    store: Arc<dyn RemoteStore>,
    bucket: &str,
    root: &Path,
    options: &SyncOptions,
) -> Result<SyncReport, SyncError> {
    let entries = scan_local(root, options)?;
    info!("Found {} files under {}", entries.len(), root.display());

    let progress = Progress::bar(entries.len() as u64, options.no_progress);
    let index = AtomicUsize::new(0);
    let transferred = AtomicU64::new(0);
    let skipped = AtomicU64::new(0);
    let aborted = AtomicBool::new(false);
    let failure: Mutex<Option<SyncError>> = Mutex::new(None);
    let workers = options.threads.clamp(1, entries.len().max(1));

    thread::scope(|scope| {
        for _ in 0..workers {
            scope.spawn(|| loop {
                if aborted.load(Ordering::Relaxed) {
                    break;
                }
                let Some(entry) = entries.get(index.fetch_add(1, Ordering::Relaxed)) else {
                    break;
                };
                match backup_entry(store.as_ref(), bucket, entry, options.dry_run, &progress) {
                    Ok(true) => {
                        transferred.fetch_add(1, Ordering::Relaxed);
                    }
                    Ok(false) => {
                        skipped.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => {
                        aborted.store(true, Ordering::Relaxed);
                        failure
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .get_or_insert(e);
                        break;
                    }
                }
                progress.inc(1);
            });
        }
    });

    if let Some(e) = failure.into_inner().unwrap_or_else(PoisonError::into_inner) {
        progress.abandon("Backup failed");
        return Err(e);
    }
    progress.finish("Backup complete");
    Ok(SyncReport {
        transferred: transferred.into_inner(),
        skipped: skipped.into_inner(),
        dry_run: options.dry_run,
    })
}

/// Returns whether the entry was (or, in a dry run, would be) uploaded.
fn backup_entry(
    store: &dyn RemoteStore,
    bucket: &str,
    entry: &LocalEntry,
    dry_run: bool,
    progress: &Progress,
) -> Result<bool, SyncError> {
    let remote = store.stat(bucket, &entry.key)?;
    match decide_backup(entry.modified, &remote) {
        TransferDecision::Upload => {
            if let ObjectStat::Found(_) = remote {
                progress.println(format!("{} is newer on the local machine.", entry.key));
            }
            progress.println(format!(
                "Uploading file: {} to {}",
                entry.path.display(),
                store.location(bucket, &entry.key)
            ));
            if dry_run {
                debug!("Dry-run: would upload {:?}", entry.path);
            } else {
                store.upload(bucket, &entry.key, &entry.path)?;
            }
            Ok(true)
        }
        _ => {
            progress.println(format!(
                "File {} in the bucket is newer than the local file or unchanged, skipping..",
                entry.key
            ));
            Ok(false)
        }
    }
}

/// Restore every object of `bucket` under `root`.
pub fn restore(
    store: Arc<dyn RemoteStore>,
    bucket: &str,
    root: &Path,
    resolver: &mut dyn OverwriteResolver,
    options: &SyncOptions,
) -> Result<SyncReport, SyncError> {
    let progress = Progress::spinner("Restoring...", options.no_progress);
    let mut report = SyncReport {
        dry_run: options.dry_run,
        ..SyncReport::default()
    };

    for remote in store.list_all(bucket)? {
        let remote = remote?;
        if remote.key.ends_with(paths::KEY_SEPARATOR) {
            debug!("Skipping directory marker {}", remote.key);
            continue;
        }
        if !options.selects(&remote.key) {
            debug!("Filtered out {}", remote.key);
            continue;
        }
        let downloaded = restore_entry(store.as_ref(), bucket, root, &remote, resolver, options, &progress)?;
        if downloaded {
            report.transferred += 1;
        } else {
            report.skipped += 1;
        }
        progress.inc(1);
    }

    progress.finish("Restore complete");
    Ok(report)
}

/// Returns whether the object was (or, in a dry run, would be) downloaded.
fn restore_entry(
    store: &dyn RemoteStore,
    bucket: &str,
    root: &Path,
    remote: &RemoteEntry,
    resolver: &mut dyn OverwriteResolver,
    options: &SyncOptions,
    progress: &Progress,
) -> Result<bool, SyncError> {
    let local_path = match paths::to_local_path(root, &remote.key) {
        Ok(path) => path,
        Err(e) => {
            warn!("Skipping object that cannot be restored: {}", e);
            return Ok(false);
        }
    };
    ensure_parent(&local_path, options.dry_run)?;

    let local_modified = match fs::metadata(&local_path) {
        Ok(meta) if meta.is_dir() => {
            warn!(
                "Skipping {}: a directory occupies {}",
                remote.key,
                local_path.display()
            );
            return Ok(false);
        }
        Ok(meta) => Some(unix_seconds(meta.modified()?)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => None,
        Err(e) => return Err(e.into()),
    };

    let download = match decide_restore(local_modified, remote.last_modified) {
        TransferDecision::Download => {
            progress.println(format!(
                "Downloading file {} to {}",
                store.location(bucket, &remote.key),
                local_path.display()
            ));
            true
        }
        TransferDecision::PromptUser => {
            let conflict = Conflict {
                key: &remote.key,
                local_path: &local_path,
                local_modified: local_modified.unwrap_or_default(),
                remote_modified: remote.last_modified,
            };
            let overwrite = progress.suspend(|| resolver.should_overwrite(&conflict))?;
            if overwrite {
                progress.println(format!(
                    "Downloading and overwriting file {} to {}",
                    remote.key,
                    local_path.display()
                ));
            } else {
                progress.println("Skipping file");
            }
            overwrite
        }
        // restore never yields Upload
        TransferDecision::Skip | TransferDecision::Upload => {
            progress.println(format!(
                "File {} already exists on the local folder. Skipping.",
                remote.key
            ));
            false
        }
    };

    if download {
        if options.dry_run {
            debug!("Dry-run: would download {} to {:?}", remote.key, local_path);
        } else {
            store.download(bucket, &remote.key, &local_path)?;
        }
    }
    Ok(download)
}

/// Create the missing ancestors of `path`. This happens as soon as an object
/// is discovered, whether or not it ends up being downloaded.
fn ensure_parent(path: &Path, dry_run: bool) -> Result<(), SyncError> {
    let Some(parent) = path.parent() else {
        return Ok(());
    };
    if parent.exists() {
        return Ok(());
    }
    if dry_run {
        debug!("Dry-run: would create directory {:?}", parent);
    } else {
        fs::create_dir_all(parent)?;
        debug!("Created directory {:?}", parent);
    }
    Ok(())
}
