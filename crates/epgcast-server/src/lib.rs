// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]

mod config;
mod coordinator;
mod error;
mod fetch;
mod http;
mod response;
mod scheduler;

pub use config::{
    FeedSource, ServerConfig, DEFAULT_BIND, DEFAULT_DATA_ROOT, DEFAULT_FEED_CACHE_FILE,
    DEFAULT_FEED_URL,
};
pub use coordinator::{ChecksumState, RunReport, UpdateCoordinator};
pub use error::{UpdateError, UpdateErrorCode};
pub use fetch::{
    fetcher_for, FeedFetcher, FetchError, FileFeedFetcher, HttpFeedFetcher, RawFeed, RetryPolicy,
};
pub use http::{build_router, AppState};
pub use response::{
    UpdateData, UpdateResponse, CODE_FAILED, CODE_OK, MESSAGE_CHANGED, MESSAGE_UNCHANGED,
};
pub use scheduler::UpdateScheduler;

pub const CRATE_NAME: &str = "epgcast-server";
