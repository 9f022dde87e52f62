// SPDX-License-Identifier: Apache-2.0

use epgcast_model::{manifest_file_name, CHECKSUM_MARKER_FILE, MANIFEST_STAGING_FILE};
use std::path::{Path, PathBuf};

pub const DEFAULT_PUBLIC_PREFIX: &str = "EPG_DATA";

/// Where published files live on disk and how they are addressed by
/// readers. `public_prefix` is the URL segment under which `root` is served;
/// manifest `file` entries are relative to the server origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishLayout {
    root: PathBuf,
    public_prefix: String,
}

impl PublishLayout {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, public_prefix: impl Into<String>) -> Self {
        let prefix: String = public_prefix.into();
        Self {
            root: root.into(),
            public_prefix: prefix.trim_matches('/').to_string(),
        }
    }

    #[must_use]
    pub fn with_default_prefix(root: impl Into<PathBuf>) -> Self {
        Self::new(root, DEFAULT_PUBLIC_PREFIX)
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn public_prefix(&self) -> &str {
        &self.public_prefix
    }

    #[must_use]
    pub fn date_dir(&self, date: &str) -> PathBuf {
        self.root.join(date)
    }

    #[must_use]
    pub fn artifact_path(&self, date: &str, file_name: &str) -> PathBuf {
        self.date_dir(date).join(file_name)
    }

    #[must_use]
    pub fn artifact_public_path(&self, date: &str, file_name: &str) -> String {
        self.public_path(&format!("{date}/{file_name}"))
    }

    #[must_use]
    pub fn manifest_path(&self, checksum: &str) -> PathBuf {
        self.root.join(manifest_file_name(checksum))
    }

    #[must_use]
    pub fn manifest_public_path(&self, checksum: &str) -> String {
        self.public_path(&manifest_file_name(checksum))
    }

    #[must_use]
    pub fn staging_manifest_path(&self) -> PathBuf {
        self.root.join(MANIFEST_STAGING_FILE)
    }

    #[must_use]
    pub fn marker_path(&self) -> PathBuf {
        self.root.join(CHECKSUM_MARKER_FILE)
    }

    fn public_path(&self, relative: &str) -> String {
        if self.public_prefix.is_empty() {
            relative.to_string()
        } else {
            format!("{}/{relative}", self.public_prefix)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_paths_follow_the_static_route_prefix() {
        let layout = PublishLayout::new("/srv/epg", "/EPG_DATA/");
        assert_eq!(layout.public_prefix(), "EPG_DATA");
        assert_eq!(
            layout.artifact_public_path("2024-03-06", "globo_2024-03-06_deadbeef.xml.gz"),
            "EPG_DATA/2024-03-06/globo_2024-03-06_deadbeef.xml.gz"
        );
        assert_eq!(
            layout.manifest_public_path("deadbeef"),
            "EPG_DATA/epg_index_deadbeef.json"
        );
        assert_eq!(
            layout.artifact_path("2024-03-06", "x.xml.gz"),
            PathBuf::from("/srv/epg/2024-03-06/x.xml.gz")
        );
    }

    #[test]
    fn empty_prefix_yields_root_relative_paths() {
        let layout = PublishLayout::new("/srv/epg", "");
        assert_eq!(
            layout.manifest_public_path("deadbeef"),
            "epg_index_deadbeef.json"
        );
    }
}
