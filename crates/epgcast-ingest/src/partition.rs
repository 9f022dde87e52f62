// SPDX-License-Identifier: Apache-2.0

use crate::parse::ParsedFeed;
use epgcast_model::{ChannelDescriptor, ChannelId, Partition, PartitionKey};
use std::collections::{BTreeMap, HashMap};
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use tracing::warn;

/// What to do with programmes whose channel has no `<channel>` element.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OrphanPolicy {
    /// Publish them under an id-only channel descriptor.
    #[default]
    Synthesize,
    /// Drop them.
    Skip,
}

impl OrphanPolicy {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Synthesize => "synthesize",
            Self::Skip => "skip",
        }
    }
}

impl Display for OrphanPolicy {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrphanPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "synthesize" => Ok(Self::Synthesize),
            "skip" => Ok(Self::Skip),
            other => Err(format!("unknown orphan policy {other:?}, expected synthesize|skip")),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartitionPlan {
    /// Sorted by (date, channel).
    pub partitions: Vec<Partition>,
    /// Programmes dropped under [`OrphanPolicy::Skip`].
    pub skipped_orphans: usize,
    /// Channels given an id-only descriptor under [`OrphanPolicy::Synthesize`].
    pub synthesized_channels: Vec<ChannelId>,
}

impl PartitionPlan {
    #[must_use]
    pub fn programme_count(&self) -> usize {
        self.partitions.iter().map(|p| p.programmes.len()).sum()
    }
}

/// Groups programmes by channel and by the calendar date of their start
/// time in their own UTC offset.
#[must_use]
pub fn partition_feed(feed: ParsedFeed, policy: OrphanPolicy) -> PartitionPlan {
    let mut channels: HashMap<ChannelId, ChannelDescriptor> = feed
        .channels
        .into_iter()
        .map(|c| (c.id.clone(), c))
        .collect();

    let mut grouped: BTreeMap<(chrono::NaiveDate, ChannelId), Vec<_>> = BTreeMap::new();
    let mut plan = PartitionPlan::default();
    for programme in feed.programmes {
        if !channels.contains_key(&programme.channel) {
            match policy {
                OrphanPolicy::Skip => {
                    plan.skipped_orphans += 1;
                    continue;
                }
                OrphanPolicy::Synthesize => {
                    warn!(channel = %programme.channel, "programme references undeclared channel");
                    plan.synthesized_channels.push(programme.channel.clone());
                    channels.insert(
                        programme.channel.clone(),
                        ChannelDescriptor::id_only(programme.channel.clone()),
                    );
                }
            }
        }
        grouped
            .entry((programme.local_date(), programme.channel.clone()))
            .or_default()
            .push(programme);
    }
    if plan.skipped_orphans > 0 {
        warn!(count = plan.skipped_orphans, "programmes without channel skipped");
    }

    plan.partitions = grouped
        .into_iter()
        .filter_map(|((date, channel_id), programmes)| {
            let channel = channels.get(&channel_id)?.clone();
            Some(Partition {
                key: PartitionKey::new(channel_id, date),
                channel,
                programmes,
            })
        })
        .collect();
    plan
}
