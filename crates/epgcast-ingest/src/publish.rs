// SPDX-License-Identifier: Apache-2.0

use crate::error::IngestError;
use epgcast_core::short_checksum;
use epgcast_model::{artifact_file_name, ArtifactDescriptor, Partition};
use epgcast_store::{write_atomic, PublishLayout};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs;
use std::io::Write;
use tracing::debug;

pub const XML_DECLARATION: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n";
pub const DEFAULT_COMPRESSION_LEVEL: u32 = 6;

/// Renders a partition as a standalone XMLTV document: the channel element
/// followed by one programme element per line.
#[must_use]
pub fn serialize_partition(partition: &Partition) -> Vec<u8> {
    let body: usize = partition.programmes.iter().map(|p| p.markup.len() + 1).sum();
    let mut doc = String::with_capacity(XML_DECLARATION.len() + partition.channel.markup.len() + body + 16);
    doc.push_str(XML_DECLARATION);
    doc.push_str("<tv>\n");
    doc.push_str(&partition.channel.markup);
    doc.push('\n');
    for programme in &partition.programmes {
        doc.push_str(&programme.markup);
        doc.push('\n');
    }
    doc.push_str("</tv>\n");
    doc.into_bytes()
}

pub fn gzip(bytes: &[u8], level: u32) -> Result<Vec<u8>, IngestError> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::new(level));
    encoder
        .write_all(bytes)
        .map_err(|e| IngestError::io(format!("gzip: {e}")))?;
    encoder
        .finish()
        .map_err(|e| IngestError::io(format!("gzip: {e}")))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedArtifact {
    pub descriptor: ArtifactDescriptor,
    /// False when an identical artifact was already on disk.
    pub written: bool,
}

pub struct PartitionPublisher<'a> {
    layout: &'a PublishLayout,
    level: u32,
}

impl<'a> PartitionPublisher<'a> {
    #[must_use]
    pub fn new(layout: &'a PublishLayout, level: u32) -> Self {
        Self {
            layout,
            level: level.min(9),
        }
    }

    pub fn publish(&self, partition: &Partition) -> Result<PublishedArtifact, IngestError> {
        let date = partition.key.date_string();
        let document = serialize_partition(partition);
        let checksum = short_checksum(&document);
        let name = artifact_file_name(&partition.key.channel, &date, &checksum);
        let descriptor = ArtifactDescriptor {
            channel: partition.key.channel.to_string(),
            date: date.clone(),
            checksum,
            file: self.layout.artifact_public_path(&date, &name),
        };

        let path = self.layout.artifact_path(&date, &name);
        if path.is_file() {
            debug!(file = %descriptor.file, "artifact already published");
            return Ok(PublishedArtifact {
                descriptor,
                written: false,
            });
        }

        let dir = self.layout.date_dir(&date);
        fs::create_dir_all(&dir)
            .map_err(|e| IngestError::io(format!("create {}: {e}", dir.display())))?;
        let compressed = gzip(&document, self.level)?;
        write_atomic(&path, &compressed)?;
        debug!(
            file = %descriptor.file,
            programmes = partition.programmes.len(),
            bytes = compressed.len(),
            "artifact written"
        );
        Ok(PublishedArtifact {
            descriptor,
            written: true,
        })
    }
}
