pub mod local;
pub mod memory;
#[cfg(feature = "s3")]
pub mod s3;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("invalid filter: {0}")]
    Filter(#[from] regex::Error),

    #[error("invalid directory {}, exiting", .0.display())]
    InvalidDirectory(PathBuf),

    #[error("bucket {0} is either invalid or does not exist")]
    BucketNotFound(String),

    #[error("invalid path {}: {reason}", .path.display())]
    InvalidPath { path: PathBuf, reason: &'static str },

    #[error("invalid object key {key:?}: {reason}")]
    InvalidKey { key: String, reason: &'static str },

    #[error("store error ({code}): {message}")]
    Store { code: String, message: String },

    #[error("unsupported store: {0}")]
    UnsupportedStore(String),

    #[error("input closed before an overwrite answer was given")]
    PromptClosed,
}

impl SyncError {
    /// Errors caused by how the tool was invoked rather than by the store.
    pub fn is_usage(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidDirectory(_) | SyncError::Filter(_) | SyncError::UnsupportedStore(_)
        )
    }
}

/// An object as seen by the store at query time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    pub key: String,
    /// Whole seconds since the Unix epoch.
    pub last_modified: i64,
}

/// Outcome of an existence query. Anything other than a store-classified
/// "not found" comes back as an `Err` instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectStat {
    Found(RemoteEntry),
    NotFound,
}

pub type ObjectIter<'a> = Box<dyn Iterator<Item = Result<RemoteEntry, SyncError>> + 'a>;

/// Capability interface over an object store. Every operation is scoped to
/// one named bucket.
pub trait RemoteStore: Send + Sync {
    fn bucket_exists(&self, bucket: &str) -> Result<bool, SyncError>;
    fn create_bucket(&self, bucket: &str, region: &str) -> Result<(), SyncError>;
    fn stat(&self, bucket: &str, key: &str) -> Result<ObjectStat, SyncError>;
    fn upload(&self, bucket: &str, key: &str, local_path: &Path) -> Result<(), SyncError>;
    fn download(&self, bucket: &str, key: &str, local_path: &Path) -> Result<(), SyncError>;
    /// Lazily enumerate every object in the bucket. Calling it again starts over.
    fn list_all<'a>(&'a self, bucket: &str) -> Result<ObjectIter<'a>, SyncError>;

    fn object_exists(&self, bucket: &str, key: &str) -> Result<bool, SyncError> {
        Ok(matches!(self.stat(bucket, key)?, ObjectStat::Found(_)))
    }

    fn last_modified(&self, bucket: &str, key: &str) -> Result<Option<i64>, SyncError> {
        Ok(match self.stat(bucket, key)? {
            ObjectStat::Found(entry) => Some(entry.last_modified),
            ObjectStat::NotFound => None,
        })
    }

    /// Human-readable identifier of an object, used in progress lines.
    fn location(&self, bucket: &str, key: &str) -> String {
        format!("{bucket}/{key}")
    }
}

pub use local::LocalStore;
pub use memory::MemoryStore;
#[cfg(feature = "s3")]
pub use s3::S3Backend;

/// Build a store from a URL-ish description.
/// - `s3` / `s3://`: AWS S3 with the default credential chain
/// - `s3+http://host:port`, `s3+https://host`: S3-compatible endpoint
/// - `file:///srv/buckets`: directory-backed store rooted at that path
pub fn store_from_url(url: &str, region: &str) -> Result<Arc<dyn RemoteStore>, SyncError> {
    if let Some(root) = url.strip_prefix("file://") {
        if root.is_empty() {
            return Err(SyncError::UnsupportedStore(url.to_string()));
        }
        return Ok(Arc::new(LocalStore::new(root)));
    }
    connect_s3(url, region)
}

#[cfg(feature = "s3")]
fn connect_s3(url: &str, region: &str) -> Result<Arc<dyn RemoteStore>, SyncError> {
    match url {
        "s3" | "s3://" => Ok(Arc::new(S3Backend::connect(region, None)?)),
        _ => match url.strip_prefix("s3+") {
            Some(endpoint) if endpoint.starts_with("http://") || endpoint.starts_with("https://") => {
                Ok(Arc::new(S3Backend::connect(region, Some(endpoint))?))
            }
            _ => Err(SyncError::UnsupportedStore(url.to_string())),
        },
    }
}

#[cfg(not(feature = "s3"))]
fn connect_s3(url: &str, _region: &str) -> Result<Arc<dyn RemoteStore>, SyncError> {
    Err(SyncError::UnsupportedStore(url.to_string()))
}
