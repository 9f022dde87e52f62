// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]
//! Domain model for the EPG partition-publish pipeline: channels,
//! programmes, per-(channel, day) partitions and the published index.

mod channel;
mod manifest;
mod partition;
mod programme;

pub use channel::{ChannelDescriptor, ChannelId, ValidationError, CHANNEL_ID_MAX_LEN};
pub use manifest::{
    artifact_file_name, manifest_checksum_from_file_name, manifest_file_name, ArtifactDescriptor,
    EpgIndex, ARTIFACT_FILE_SUFFIX, CHECKSUM_MARKER_FILE, MANIFEST_FILE_PREFIX,
    MANIFEST_FILE_SUFFIX, MANIFEST_STAGING_FILE,
};
pub use partition::{parse_partition_date, Partition, PartitionKey, DATE_FORMAT};
pub use programme::{parse_xmltv_time, ProgrammeRecord, XMLTV_TIME_FORMAT};

pub const CRATE_NAME: &str = "epgcast-model";
