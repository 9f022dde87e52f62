// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]
//! Feed to published tree: parse an XMLTV document, split it into
//! per-(channel, day) partitions, write one compressed artifact per
//! partition and swap in a new index.

mod error;
mod logging;
mod parse;
mod partition;
mod publish;

use epgcast_model::{ChannelId, EpgIndex};
use epgcast_store::{IndexOutcome, IndexPublisher, PruneReport, PublishLayout};
use std::fs;
use std::path::Path;

pub use error::{IngestError, IngestErrorCode};
pub use logging::{IngestEvent, IngestLog, IngestStage};
pub use parse::{parse_feed, ParsedFeed};
pub use partition::{partition_feed, OrphanPolicy, PartitionPlan};
pub use publish::{
    gzip, serialize_partition, PartitionPublisher, PublishedArtifact, DEFAULT_COMPRESSION_LEVEL,
    XML_DECLARATION,
};

use logging::fields;

pub const CRATE_NAME: &str = "epgcast-ingest";

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub layout: PublishLayout,
    pub orphan_policy: OrphanPolicy,
    pub compression_level: u32,
}

impl PipelineOptions {
    #[must_use]
    pub fn new(layout: PublishLayout) -> Self {
        Self {
            layout,
            orphan_policy: OrphanPolicy::default(),
            compression_level: DEFAULT_COMPRESSION_LEVEL,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineResult {
    pub outcome: IndexOutcome,
    pub index: EpgIndex,
    pub channels: usize,
    pub programmes: usize,
    pub duplicate_channels: usize,
    pub skipped_orphans: usize,
    pub synthesized_channels: Vec<ChannelId>,
    pub artifacts_written: usize,
    pub artifacts_reused: usize,
    pub pruned: PruneReport,
    pub log: IngestLog,
}

impl PipelineResult {
    #[must_use]
    pub fn checksum(&self) -> &str {
        &self.outcome.published().checksum
    }

    #[must_use]
    pub fn index_file(&self) -> &str {
        &self.outcome.published().index_file
    }

    #[must_use]
    pub fn changed(&self) -> bool {
        self.outcome.is_changed()
    }
}

/// Runs the whole pipeline over an in-memory feed. Nothing under the
/// publish root is modified when parsing fails.
pub fn run_pipeline(feed: &[u8], options: &PipelineOptions) -> Result<PipelineResult, IngestError> {
    let mut log = IngestLog::default();

    let parsed = parse_feed(feed)?;
    let channels = parsed.channels.len();
    let programmes = parsed.programmes.len();
    let duplicate_channels = parsed.duplicate_channels;
    log.emit(
        IngestStage::Parse,
        "feed_parsed",
        fields([
            ("bytes", feed.len().to_string()),
            ("channels", channels.to_string()),
            ("programmes", programmes.to_string()),
            ("duplicate_channels", duplicate_channels.to_string()),
        ]),
    );

    let plan = partition_feed(parsed, options.orphan_policy);
    log.emit(
        IngestStage::Partition,
        "partitioned",
        fields([
            ("partitions", plan.partitions.len().to_string()),
            ("orphan_policy", options.orphan_policy.to_string()),
            ("skipped_orphans", plan.skipped_orphans.to_string()),
            ("synthesized_channels", plan.synthesized_channels.len().to_string()),
        ]),
    );

    let layout = &options.layout;
    fs::create_dir_all(layout.root())
        .map_err(|e| IngestError::io(format!("create {}: {e}", layout.root().display())))?;
    let publisher = PartitionPublisher::new(layout, options.compression_level);
    let mut index = EpgIndex::new();
    let (mut written, mut reused) = (0usize, 0usize);
    for partition in &plan.partitions {
        let artifact = publisher.publish(partition)?;
        if artifact.written {
            written += 1;
        } else {
            reused += 1;
        }
        index.push(artifact.descriptor);
    }
    log.emit(
        IngestStage::Publish,
        "artifacts_published",
        fields([
            ("written", written.to_string()),
            ("reused", reused.to_string()),
        ]),
    );

    let index_publisher = IndexPublisher::new(layout);
    let outcome = index_publisher.publish(&index)?;
    let pruned = index_publisher.prune_artifacts(&index)?;
    log.emit(
        IngestStage::Index,
        "index_committed",
        fields([
            ("checksum", outcome.published().checksum.clone()),
            ("index_file", outcome.published().index_file.clone()),
            ("changed", outcome.is_changed().to_string()),
            ("dates", index.date_count().to_string()),
            ("pruned_artifacts", pruned.artifacts.to_string()),
        ]),
    );

    Ok(PipelineResult {
        outcome,
        index,
        channels,
        programmes,
        duplicate_channels,
        skipped_orphans: plan.skipped_orphans,
        synthesized_channels: plan.synthesized_channels,
        artifacts_written: written,
        artifacts_reused: reused,
        pruned,
        log,
    })
}

pub fn run_pipeline_from_file(
    path: &Path,
    options: &PipelineOptions,
) -> Result<PipelineResult, IngestError> {
    let bytes = fs::read(path)
        .map_err(|e| IngestError::io(format!("read {}: {e}", path.display())))?;
    run_pipeline(&bytes, options)
}
