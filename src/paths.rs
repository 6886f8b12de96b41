//! Mapping between paths under a local root and flat object keys.
//!
//! A key is the path relative to the root with its components joined by `/`.
//! No component may contain a platform separator, so splitting a key on `/`
//! recovers exactly the components it was built from.

use std::path::{Component, Path, PathBuf};

use crate::backends::SyncError;

pub const KEY_SEPARATOR: char = '/';

/// Key for `local`, a path somewhere below `root`.
pub fn to_remote_key(root: &Path, local: &Path) -> Result<String, SyncError> {
    let invalid = |reason| SyncError::InvalidPath {
        path: local.to_path_buf(),
        reason,
    };
    let relative = local
        .strip_prefix(root)
        .map_err(|_| invalid("not under the sync root"))?;

    let mut key = String::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => {
                let part = part.to_str().ok_or_else(|| invalid("not valid UTF-8"))?;
                if !key.is_empty() {
                    key.push(KEY_SEPARATOR);
                }
                key.push_str(part);
            }
            Component::CurDir => {}
            _ => return Err(invalid("contains a parent, root or prefix component")),
        }
    }
    if key.is_empty() {
        return Err(invalid("is the sync root itself"));
    }
    Ok(key)
}

/// Local path under `root` for `key`. Keys that would escape the root or
/// that cannot be spelled on this platform are rejected.
pub fn to_local_path(root: &Path, key: &str) -> Result<PathBuf, SyncError> {
    if key.is_empty() {
        return Err(SyncError::InvalidKey {
            key: key.to_string(),
            reason: "empty key",
        });
    }
    let mut path = root.to_path_buf();
    for segment in key.split(KEY_SEPARATOR) {
        let mut parts = Path::new(segment).components();
        match (parts.next(), parts.next()) {
            (Some(Component::Normal(part)), None) if part == segment => path.push(part),
            _ => {
                return Err(SyncError::InvalidKey {
                    key: key.to_string(),
                    reason: "segment is empty, relative or not a plain file name",
                })
            }
        }
    }
    Ok(path)
}
