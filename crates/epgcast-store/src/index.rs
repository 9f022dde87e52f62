// SPDX-License-Identifier: Apache-2.0

use crate::error::{StoreError, StoreErrorCode};
use crate::fsio::{remove_if_exists, sync_dir, write_and_sync, write_atomic};
use crate::paths::PublishLayout;
use epgcast_core::{is_short_checksum, short_checksum};
use epgcast_model::{
    manifest_checksum_from_file_name, parse_partition_date, EpgIndex, ARTIFACT_FILE_SUFFIX,
};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedIndex {
    pub checksum: String,
    pub index_file: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexOutcome {
    /// A manifest with the same checksum was already published.
    Unchanged(PublishedIndex),
    Changed {
        published: PublishedIndex,
        previous: Option<String>,
    },
}

impl IndexOutcome {
    #[must_use]
    pub fn published(&self) -> &PublishedIndex {
        match self {
            Self::Unchanged(published) | Self::Changed { published, .. } => published,
        }
    }

    #[must_use]
    pub fn is_changed(&self) -> bool {
        matches!(self, Self::Changed { .. })
    }
}

/// Manifest bytes written under the staging name but not yet visible to
/// readers. Dropping it without [`IndexPublisher::commit`] leaves the
/// previously published manifest current.
#[derive(Debug)]
#[must_use = "a staged index is only published by commit"]
pub struct StagedIndex {
    path: PathBuf,
    checksum: String,
    len: usize,
}

impl StagedIndex {
    #[must_use]
    pub fn checksum(&self) -> &str {
        &self.checksum
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PruneReport {
    pub artifacts: usize,
    pub directories: usize,
}

pub struct IndexPublisher<'a> {
    layout: &'a PublishLayout,
}

impl<'a> IndexPublisher<'a> {
    #[must_use]
    pub fn new(layout: &'a PublishLayout) -> Self {
        Self { layout }
    }

    pub fn encode(index: &EpgIndex) -> Result<Vec<u8>, StoreError> {
        let mut bytes = serde_json::to_vec_pretty(index)
            .map_err(|e| StoreError::new(StoreErrorCode::Serialize, e.to_string()))?;
        bytes.push(b'\n');
        Ok(bytes)
    }

    pub fn stage(&self, index: &EpgIndex) -> Result<StagedIndex, StoreError> {
        let root = self.layout.root();
        fs::create_dir_all(root)
            .map_err(|e| StoreError::io(&format!("create {}", root.display()), &e))?;
        let bytes = Self::encode(index)?;
        let checksum = short_checksum(&bytes);
        let path = self.layout.staging_manifest_path();
        write_and_sync(&path, &bytes)?;
        debug!(checksum = %checksum, bytes = bytes.len(), "index staged");
        Ok(StagedIndex {
            path,
            checksum,
            len: bytes.len(),
        })
    }

    /// Makes a staged manifest current. The rename is the visibility point:
    /// the marker and the removal of older manifests follow it, so a reader
    /// always finds a complete manifest under a name that matches its content.
    pub fn commit(&self, staged: StagedIndex) -> Result<IndexOutcome, StoreError> {
        let target = self.layout.manifest_path(&staged.checksum);
        let previous = self.current_checksum()?;
        let published = PublishedIndex {
            checksum: staged.checksum.clone(),
            index_file: self.layout.manifest_public_path(&staged.checksum),
        };

        if target.exists() {
            remove_if_exists(&staged.path)?;
            if previous.as_deref() != Some(staged.checksum.as_str()) {
                warn!(
                    checksum = %staged.checksum,
                    previous = ?previous,
                    "marker did not match the published index; rewriting"
                );
                self.write_marker(&staged.checksum)?;
            }
            self.prune_manifests(&staged.checksum);
            info!(checksum = %staged.checksum, "index unchanged");
            return Ok(IndexOutcome::Unchanged(published));
        }

        fs::rename(&staged.path, &target).map_err(|e| {
            StoreError::io(
                &format!("rename {} -> {}", staged.path.display(), target.display()),
                &e,
            )
        })?;
        sync_dir(self.layout.root())?;
        self.write_marker(&staged.checksum)?;
        let removed = self.prune_manifests(&staged.checksum);
        info!(
            checksum = %staged.checksum,
            previous = ?previous,
            removed_manifests = removed,
            "index published"
        );
        Ok(IndexOutcome::Changed {
            published,
            previous,
        })
    }

    pub fn publish(&self, index: &EpgIndex) -> Result<IndexOutcome, StoreError> {
        let staged = self.stage(index)?;
        self.commit(staged)
    }

    /// Checksum held by the marker file. A missing or malformed marker reads
    /// as `None`.
    pub fn current_checksum(&self) -> Result<Option<String>, StoreError> {
        let path = self.layout.marker_path();
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::io(&format!("read {}", path.display()), &e)),
        };
        let checksum = raw.trim();
        if is_short_checksum(checksum) {
            Ok(Some(checksum.to_string()))
        } else {
            warn!(path = %path.display(), "ignoring malformed checksum marker");
            Ok(None)
        }
    }

    /// The published index named by the marker, if its manifest file exists.
    pub fn current(&self) -> Result<Option<PublishedIndex>, StoreError> {
        Ok(self.current_checksum()?.and_then(|checksum| {
            self.layout
                .manifest_path(&checksum)
                .exists()
                .then(|| PublishedIndex {
                    index_file: self.layout.manifest_public_path(&checksum),
                    checksum,
                })
        }))
    }

    pub fn load_current(&self) -> Result<Option<EpgIndex>, StoreError> {
        let Some(checksum) = self.current_checksum()? else {
            return Ok(None);
        };
        let path = self.layout.manifest_path(&checksum);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::new(
                    StoreErrorCode::NotFound,
                    format!("marker names {checksum} but {} is missing", path.display()),
                ))
            }
            Err(e) => return Err(StoreError::io(&format!("read {}", path.display()), &e)),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| StoreError::new(StoreErrorCode::Validation, e.to_string()))
    }

    /// Deletes artifacts under date directories that `index` does not
    /// reference, including `.tmp` leftovers, and then empty date directories.
    pub fn prune_artifacts(&self, index: &EpgIndex) -> Result<PruneReport, StoreError> {
        let referenced: HashSet<(&str, &str)> = index
            .artifacts()
            .map(|a| (a.date.as_str(), a.file_name()))
            .collect();
        let root = self.layout.root();
        let entries =
            fs::read_dir(root).map_err(|e| StoreError::io(&format!("list {}", root.display()), &e))?;

        let mut report = PruneReport::default();
        for entry in entries.flatten() {
            let Some(date) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if parse_partition_date(&date).is_none() || !entry.path().is_dir() {
                continue;
            }
            let dir = entry.path();
            let files = match fs::read_dir(&dir) {
                Ok(files) => files,
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "cannot list date directory");
                    continue;
                }
            };
            for file in files.flatten() {
                let Some(name) = file.file_name().to_str().map(str::to_string) else {
                    continue;
                };
                let prunable = name.ends_with(ARTIFACT_FILE_SUFFIX) || name.ends_with(".tmp");
                if !prunable || referenced.contains(&(date.as_str(), name.as_str())) {
                    continue;
                }
                match fs::remove_file(file.path()) {
                    Ok(()) => report.artifacts += 1,
                    Err(e) => warn!(file = %file.path().display(), error = %e, "prune failed"),
                }
            }
            let is_empty = fs::read_dir(&dir)
                .map(|mut rest| rest.next().is_none())
                .unwrap_or(false);
            if is_empty && fs::remove_dir(&dir).is_ok() {
                report.directories += 1;
            }
        }
        if report.artifacts > 0 || report.directories > 0 {
            info!(
                artifacts = report.artifacts,
                directories = report.directories,
                "stale artifacts pruned"
            );
        }
        Ok(report)
    }

    fn write_marker(&self, checksum: &str) -> Result<(), StoreError> {
        write_atomic(&self.layout.marker_path(), checksum.as_bytes())
    }

    fn prune_manifests(&self, keep: &str) -> usize {
        let root = self.layout.root();
        let entries = match fs::read_dir(root) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(root = %root.display(), error = %e, "cannot list manifests");
                return 0;
            }
        };
        let mut removed = 0;
        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            match manifest_checksum_from_file_name(name) {
                Some(checksum) if checksum != keep => match fs::remove_file(entry.path()) {
                    Ok(()) => removed += 1,
                    Err(e) => warn!(file = name, error = %e, "stale manifest not removed"),
                },
                _ => {}
            }
        }
        removed
    }
}
