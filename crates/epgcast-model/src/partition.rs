// SPDX-License-Identifier: Apache-2.0

use crate::channel::{ChannelDescriptor, ChannelId};
use crate::programme::ProgrammeRecord;
use chrono::NaiveDate;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PartitionKey {
    pub channel: ChannelId,
    pub date: NaiveDate,
}

impl PartitionKey {
    #[must_use]
    pub fn new(channel: ChannelId, date: NaiveDate) -> Self {
        Self { channel, date }
    }

    #[must_use]
    pub fn date_string(&self) -> String {
        self.date.format(DATE_FORMAT).to_string()
    }
}

/// All programmes of one channel starting on one local calendar day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    pub key: PartitionKey,
    pub channel: ChannelDescriptor,
    pub programmes: Vec<ProgrammeRecord>,
}

#[must_use]
pub fn parse_partition_date(raw: &str) -> Option<NaiveDate> {
    if raw.len() != 10 {
        return None;
    }
    NaiveDate::parse_from_str(raw, DATE_FORMAT).ok()
}
