use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use log::debug;
use walkdir::WalkDir;

use super::{ObjectIter, ObjectStat, RemoteEntry, RemoteStore, SyncError};
use crate::paths;
use crate::utils::{commit, staging_file, unix_seconds};

const COPY_BUFFER_SIZE: usize = 1 << 20;

/// Directory-backed object store.
///
/// Each bucket is a directory under `root` and each object a file below it.
/// An object's last-modified time is the mtime of its file, which a copy sets
/// to the time of the copy, as an object store stamps the time of the upload.
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn bucket_dir(&self, bucket: &str) -> Result<PathBuf, SyncError> {
        if bucket.contains(paths::KEY_SEPARATOR) {
            return Err(SyncError::InvalidKey {
                key: bucket.to_string(),
                reason: "bucket names cannot contain a separator",
            });
        }
        paths::to_local_path(&self.root, bucket)
    }

    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf, SyncError> {
        paths::to_local_path(&self.bucket_dir(bucket)?, key)
    }

    /// Copy `src` over `dst`, returning the number of bytes copied.
    /// The data is streamed through `buf` into a temp file beside `dst` which
    /// then replaces it, so a failed copy never leaves a partial file behind.
    pub fn copy_file(&self, src: &Path, dst: &Path, buf: &mut [u8]) -> Result<u64, SyncError> {
        let mut src_file = fs::File::open(src)?;
        let mut staged = staging_file(dst)?;
        let mut total_bytes = 0u64;
        loop {
            let n = match src_file.read(buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };
            staged.write_all(&buf[..n])?;
            total_bytes += n as u64;
        }
        commit(staged, dst)?;
        Ok(total_bytes)
    }

    fn entry_for(dir: &Path, entry: walkdir::DirEntry) -> Result<RemoteEntry, SyncError> {
        let key = paths::to_remote_key(dir, entry.path())?;
        let modified = entry.metadata()?.modified()?;
        Ok(RemoteEntry {
            key,
            last_modified: unix_seconds(modified),
        })
    }
}

impl RemoteStore for LocalStore {
    fn bucket_exists(&self, bucket: &str) -> Result<bool, SyncError> {
        let dir = self.bucket_dir(bucket)?;
        match fs::metadata(&dir) {
            Ok(meta) => Ok(meta.is_dir()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn create_bucket(&self, bucket: &str, region: &str) -> Result<(), SyncError> {
        let dir = self.bucket_dir(bucket)?;
        debug!("Creating bucket directory {:?} (region {} ignored)", dir, region);
        fs::create_dir_all(dir)?;
        Ok(())
    }

    fn stat(&self, bucket: &str, key: &str) -> Result<ObjectStat, SyncError> {
        let path = self.object_path(bucket, key)?;
        match fs::metadata(&path) {
            Ok(meta) if meta.is_file() => Ok(ObjectStat::Found(RemoteEntry {
                key: key.to_string(),
                last_modified: unix_seconds(meta.modified()?),
            })),
            Ok(_) => Ok(ObjectStat::NotFound),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(ObjectStat::NotFound),
            Err(e) => Err(e.into()),
        }
    }

    fn upload(&self, bucket: &str, key: &str, local_path: &Path) -> Result<(), SyncError> {
        let dst = self.object_path(bucket, key)?;
        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut buf = vec![0u8; COPY_BUFFER_SIZE];
        let bytes = self.copy_file(local_path, &dst, &mut buf)?;
        debug!("Stored {} bytes at {:?}", bytes, dst);
        Ok(())
    }

    fn download(&self, bucket: &str, key: &str, local_path: &Path) -> Result<(), SyncError> {
        let src = self.object_path(bucket, key)?;
        let mut buf = vec![0u8; COPY_BUFFER_SIZE];
        let bytes = self.copy_file(&src, local_path, &mut buf)?;
        debug!("Fetched {} bytes from {:?}", bytes, src);
        Ok(())
    }

    fn list_all<'a>(&'a self, bucket: &str) -> Result<ObjectIter<'a>, SyncError> {
        let dir = self.bucket_dir(bucket)?;
        if !dir.is_dir() {
            return Err(SyncError::Store {
                code: "NoSuchBucket".to_string(),
                message: format!("bucket directory {} does not exist", dir.display()),
            });
        }
        let walker = WalkDir::new(&dir).min_depth(1).into_iter();
        Ok(Box::new(walker.filter_map(move |entry| match entry {
            Ok(entry) if entry.file_type().is_file() => Some(Self::entry_for(&dir, entry)),
            Ok(_) => None,
            Err(e) => Some(Err(e.into())),
        })))
    }

    fn location(&self, bucket: &str, key: &str) -> String {
        format!("file://{}/{}/{}", self.root.display(), bucket, key)
    }
}
