// SPDX-License-Identifier: Apache-2.0

use crate::channel::ChannelId;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

pub const MANIFEST_FILE_PREFIX: &str = "epg_index_";
pub const MANIFEST_FILE_SUFFIX: &str = ".json";
pub const MANIFEST_STAGING_FILE: &str = "epg_index.json.staging";
pub const CHECKSUM_MARKER_FILE: &str = "checksum.txt";
pub const ARTIFACT_FILE_SUFFIX: &str = ".xml.gz";

#[must_use]
pub fn manifest_file_name(checksum: &str) -> String {
    format!("{MANIFEST_FILE_PREFIX}{checksum}{MANIFEST_FILE_SUFFIX}")
}

/// Returns the checksum encoded in a published manifest name, or `None`
/// when `name` does not follow the `epg_index_<checksum>.json` pattern.
#[must_use]
pub fn manifest_checksum_from_file_name(name: &str) -> Option<&str> {
    let checksum = name
        .strip_prefix(MANIFEST_FILE_PREFIX)?
        .strip_suffix(MANIFEST_FILE_SUFFIX)?;
    if checksum.is_empty() {
        None
    } else {
        Some(checksum)
    }
}

#[must_use]
pub fn artifact_file_name(channel: &ChannelId, date: &str, checksum: &str) -> String {
    format!("{channel}_{date}_{checksum}{ARTIFACT_FILE_SUFFIX}")
}

/// Manifest entry for one published (channel, date) artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArtifactDescriptor {
    pub channel: String,
    pub date: String,
    pub checksum: String,
    pub file: String,
}

impl ArtifactDescriptor {
    /// File name component of `file`.
    #[must_use]
    pub fn file_name(&self) -> &str {
        self.file.rsplit('/').next().unwrap_or(&self.file)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct DateEntry {
    date: String,
    artifacts: Vec<ArtifactDescriptor>,
}

/// Date-keyed index of every artifact of one run. Dates and the artifacts
/// under each date keep insertion order, which is also the serialized order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EpgIndex {
    entries: Vec<DateEntry>,
}

impl EpgIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, artifact: ArtifactDescriptor) {
        match self.entries.iter_mut().find(|e| e.date == artifact.date) {
            Some(entry) => entry.artifacts.push(artifact),
            None => self.entries.push(DateEntry {
                date: artifact.date.clone(),
                artifacts: vec![artifact],
            }),
        }
    }

    pub fn dates(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.date.as_str())
    }

    #[must_use]
    pub fn artifacts_for(&self, date: &str) -> &[ArtifactDescriptor] {
        self.entries
            .iter()
            .find(|e| e.date == date)
            .map(|e| e.artifacts.as_slice())
            .unwrap_or(&[])
    }

    pub fn artifacts(&self) -> impl Iterator<Item = &ArtifactDescriptor> {
        self.entries.iter().flat_map(|e| e.artifacts.iter())
    }

    #[must_use]
    pub fn date_count(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn artifact_count(&self) -> usize {
        self.entries.iter().map(|e| e.artifacts.len()).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<ArtifactDescriptor> for EpgIndex {
    fn from_iter<I: IntoIterator<Item = ArtifactDescriptor>>(iter: I) -> Self {
        let mut index = Self::new();
        for artifact in iter {
            index.push(artifact);
        }
        index
    }
}

impl Serialize for EpgIndex {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for entry in &self.entries {
            map.serialize_entry(&entry.date, &entry.artifacts)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for EpgIndex {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(EpgIndexVisitor)
    }
}

struct EpgIndexVisitor;

impl<'de> Visitor<'de> for EpgIndexVisitor {
    type Value = EpgIndex;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a map from date to artifact descriptors")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut index = EpgIndex::new();
        while let Some((date, artifacts)) =
            access.next_entry::<String, Vec<ArtifactDescriptor>>()?
        {
            if index.entries.iter().any(|e| e.date == date) {
                return Err(serde::de::Error::custom(format!("duplicate date key {date}")));
            }
            index.entries.push(DateEntry { date, artifacts });
        }
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artifact(channel: &str, date: &str, checksum: &str) -> ArtifactDescriptor {
        ArtifactDescriptor {
            channel: channel.to_string(),
            date: date.to_string(),
            checksum: checksum.to_string(),
            file: format!("EPG_DATA/{date}/{channel}_{date}_{checksum}.xml.gz"),
        }
    }

    #[test]
    fn index_serializes_dates_in_insertion_order() {
        let index: EpgIndex = [
            artifact("globo", "2024-03-07", "bbbbbbbb"),
            artifact("globo", "2024-03-06", "aaaaaaaa"),
            artifact("sbt", "2024-03-07", "cccccccc"),
        ]
        .into_iter()
        .collect();

        let text = serde_json::to_string(&index).expect("json");
        let first = text.find("2024-03-07").expect("first date");
        let second = text.find("2024-03-06").expect("second date");
        assert!(first < second, "{text}");
        assert_eq!(index.artifacts_for("2024-03-07").len(), 2);
        assert_eq!(index.artifact_count(), 3);

        let decoded: EpgIndex = serde_json::from_str(&text).expect("decode");
        assert_eq!(decoded, index);
    }

    #[test]
    fn index_rejects_unknown_descriptor_fields() {
        let raw = r#"{"2024-03-06":[{"channel":"a","date":"2024-03-06","checksum":"x","file":"f","extra":1}]}"#;
        assert!(serde_json::from_str::<EpgIndex>(raw).is_err());
    }

    #[test]
    fn manifest_names_round_trip_through_the_pattern() {
        assert_eq!(manifest_file_name("0a1b2c3d"), "epg_index_0a1b2c3d.json");
        assert_eq!(
            manifest_checksum_from_file_name("epg_index_0a1b2c3d.json"),
            Some("0a1b2c3d")
        );
        assert_eq!(manifest_checksum_from_file_name(MANIFEST_STAGING_FILE), None);
        assert_eq!(manifest_checksum_from_file_name("epg_index_.json"), None);
        assert_eq!(manifest_checksum_from_file_name("checksum.txt"), None);
    }

    #[test]
    fn artifact_names_embed_channel_date_and_checksum() {
        let channel = ChannelId::parse("Globo").expect("id");
        assert_eq!(
            artifact_file_name(&channel, "2024-03-06", "deadbeef"),
            "globo_2024-03-06_deadbeef.xml.gz"
        );
        assert_eq!(
            artifact("globo", "2024-03-06", "deadbeef").file_name(),
            "globo_2024-03-06_deadbeef.xml.gz"
        );
    }
}
