use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;

use super::{ObjectIter, ObjectStat, RemoteEntry, RemoteStore, SyncError};
use crate::utils::{commit, staging_file, unix_seconds};

#[derive(Debug, Clone)]
struct StoredObject {
    data: Vec<u8>,
    last_modified: i64,
}

type Buckets = BTreeMap<String, BTreeMap<String, StoredObject>>;

/// In-process object store.
///
/// Uploads are stamped with the current time; `insert` pins an explicit
/// timestamp. `deny` makes every call touching a bucket fail the way a store
/// answers a caller without permission.
#[derive(Default)]
pub struct MemoryStore {
    buckets: Mutex<Buckets>,
    denied: Mutex<HashSet<String>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `data` under `key`, creating the bucket if needed.
    pub fn insert(&self, bucket: &str, key: &str, data: &[u8], last_modified: i64) {
        lock(&self.buckets)
            .entry(bucket.to_string())
            .or_default()
            .insert(
                key.to_string(),
                StoredObject {
                    data: data.to_vec(),
                    last_modified,
                },
            );
    }

    pub fn object(&self, bucket: &str, key: &str) -> Option<(Vec<u8>, i64)> {
        lock(&self.buckets)
            .get(bucket)
            .and_then(|objects| objects.get(key))
            .map(|o| (o.data.clone(), o.last_modified))
    }

    pub fn keys(&self, bucket: &str) -> Vec<String> {
        lock(&self.buckets)
            .get(bucket)
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn deny(&self, bucket: &str) {
        lock(&self.denied).insert(bucket.to_string());
    }

    fn check_access(&self, bucket: &str) -> Result<(), SyncError> {
        if lock(&self.denied).contains(bucket) {
            return Err(SyncError::Store {
                code: "AccessDenied".to_string(),
                message: format!("access to bucket {bucket} denied"),
            });
        }
        Ok(())
    }
}

fn no_such_bucket(bucket: &str) -> SyncError {
    SyncError::Store {
        code: "NoSuchBucket".to_string(),
        message: format!("bucket {bucket} does not exist"),
    }
}

impl RemoteStore for MemoryStore {
    fn bucket_exists(&self, bucket: &str) -> Result<bool, SyncError> {
        self.check_access(bucket)?;
        Ok(lock(&self.buckets).contains_key(bucket))
    }

    fn create_bucket(&self, bucket: &str, _region: &str) -> Result<(), SyncError> {
        self.check_access(bucket)?;
        let mut buckets = lock(&self.buckets);
        if buckets.contains_key(bucket) {
            return Err(SyncError::Store {
                code: "BucketAlreadyOwnedByYou".to_string(),
                message: format!("bucket {bucket} already exists"),
            });
        }
        buckets.insert(bucket.to_string(), BTreeMap::new());
        Ok(())
    }

    fn stat(&self, bucket: &str, key: &str) -> Result<ObjectStat, SyncError> {
        self.check_access(bucket)?;
        Ok(match self.object(bucket, key) {
            Some((_, last_modified)) => ObjectStat::Found(RemoteEntry {
                key: key.to_string(),
                last_modified,
            }),
            None => ObjectStat::NotFound,
        })
    }

    fn upload(&self, bucket: &str, key: &str, local_path: &Path) -> Result<(), SyncError> {
        self.check_access(bucket)?;
        let data = fs::read(local_path)?;
        let mut buckets = lock(&self.buckets);
        let objects = buckets
            .get_mut(bucket)
            .ok_or_else(|| no_such_bucket(bucket))?;
        objects.insert(
            key.to_string(),
            StoredObject {
                data,
                last_modified: unix_seconds(SystemTime::now()),
            },
        );
        Ok(())
    }

    fn download(&self, bucket: &str, key: &str, local_path: &Path) -> Result<(), SyncError> {
        self.check_access(bucket)?;
        let (data, _) = self.object(bucket, key).ok_or_else(|| SyncError::Store {
            code: "NoSuchKey".to_string(),
            message: format!("object {key} does not exist in {bucket}"),
        })?;
        let mut staged = staging_file(local_path)?;
        staged.write_all(&data)?;
        commit(staged, local_path)?;
        Ok(())
    }

    fn list_all<'a>(&'a self, bucket: &str) -> Result<ObjectIter<'a>, SyncError> {
        self.check_access(bucket)?;
        let buckets = lock(&self.buckets);
        let objects = buckets.get(bucket).ok_or_else(|| no_such_bucket(bucket))?;
        let entries: Vec<_> = objects
            .iter()
            .map(|(key, o)| RemoteEntry {
                key: key.clone(),
                last_modified: o.last_modified,
            })
            .collect();
        Ok(Box::new(entries.into_iter().map(Ok)))
    }

    fn location(&self, bucket: &str, key: &str) -> String {
        format!("memory://{bucket}/{key}")
    }
}
