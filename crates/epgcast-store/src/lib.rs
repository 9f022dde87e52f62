// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]
//! On-disk layout and atomic publication of the EPG index.

mod error;
mod fsio;
mod index;
mod paths;

pub use error::{StoreError, StoreErrorCode};
pub use fsio::{remove_if_exists, sync_dir, tmp_path_for, write_and_sync, write_atomic};
pub use index::{IndexOutcome, IndexPublisher, PruneReport, PublishedIndex, StagedIndex};
pub use paths::{PublishLayout, DEFAULT_PUBLIC_PREFIX};

pub const CRATE_NAME: &str = "epgcast-store";
