// SPDX-License-Identifier: Apache-2.0

use crate::error::StoreError;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

pub fn write_and_sync(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let mut file = File::create(path)
        .map_err(|e| StoreError::io(&format!("create {}", path.display()), &e))?;
    file.write_all(bytes)
        .map_err(|e| StoreError::io(&format!("write {}", path.display()), &e))?;
    file.sync_all()
        .map_err(|e| StoreError::io(&format!("sync {}", path.display()), &e))
}

#[cfg(unix)]
pub fn sync_dir(dir: &Path) -> Result<(), StoreError> {
    let f = File::open(dir).map_err(|e| StoreError::io(&format!("open {}", dir.display()), &e))?;
    f.sync_all()
        .map_err(|e| StoreError::io(&format!("sync {}", dir.display()), &e))
}

// Directory handles cannot be fsynced on this platform.
#[cfg(not(unix))]
pub fn sync_dir(_dir: &Path) -> Result<(), StoreError> {
    Ok(())
}

/// Writes `bytes` next to `target` under a `.tmp` name and renames it into
/// place, so `target` is either absent, the old content or the new content.
pub fn write_atomic(target: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let tmp = tmp_path_for(target);
    if let Err(err) = write_and_sync(&tmp, bytes) {
        let _ = fs::remove_file(&tmp);
        return Err(err);
    }
    if let Err(e) = fs::rename(&tmp, target) {
        let _ = fs::remove_file(&tmp);
        return Err(StoreError::io(
            &format!("rename {} -> {}", tmp.display(), target.display()),
            &e,
        ));
    }
    Ok(())
}

#[must_use]
pub fn tmp_path_for(target: &Path) -> PathBuf {
    let mut name = target
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    target.with_file_name(name)
}

/// Removes `path`, treating an already missing file as success.
pub fn remove_if_exists(path: &Path) -> Result<bool, StoreError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(StoreError::io(&format!("remove {}", path.display()), &e)),
    }
}
