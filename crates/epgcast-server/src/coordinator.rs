// SPDX-License-Identifier: Apache-2.0

use crate::error::{UpdateError, UpdateErrorCode};
use crate::fetch::FeedFetcher;
use crate::response::{UpdateResponse, MESSAGE_CHANGED, MESSAGE_UNCHANGED};
use epgcast_ingest::{run_pipeline, PipelineOptions};
use epgcast_store::{
    write_atomic, IndexPublisher, PublishLayout, PublishedIndex, StoreError, StoreErrorCode,
};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info, instrument, warn};

/// Last successfully published index, shared by the trigger and status
/// handlers.
///
/// Starts empty. The first read falls back to the marker on disk, and only
/// adopts it when the manifest it names exists. Every successful run
/// replaces the value; failed runs leave it alone.
#[derive(Debug, Default)]
pub struct ChecksumState {
    current: RwLock<Option<PublishedIndex>>,
}

impl ChecksumState {
    pub async fn get(&self) -> Option<PublishedIndex> {
        self.current.read().await.clone()
    }

    pub async fn set(&self, published: PublishedIndex) {
        *self.current.write().await = Some(published);
    }

    pub async fn get_or_load(
        &self,
        layout: &PublishLayout,
    ) -> Result<Option<PublishedIndex>, StoreError> {
        if let Some(known) = self.get().await {
            return Ok(Some(known));
        }
        let mut guard = self.current.write().await;
        if guard.is_none() {
            let layout = layout.clone();
            *guard = tokio::task::spawn_blocking(move || IndexPublisher::new(&layout).current())
                .await
                .map_err(|e| {
                    StoreError::new(StoreErrorCode::Io, format!("marker read task failed: {e}"))
                })??;
        }
        Ok(guard.clone())
    }
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub published: PublishedIndex,
    pub changed: bool,
    pub artifacts_written: usize,
    pub elapsed: Duration,
}

/// Serializes update runs. Callers that arrive while a run is in flight
/// wait for it and then perform their own complete run.
pub struct UpdateCoordinator {
    run_lock: Mutex<()>,
    state: ChecksumState,
    fetcher: Arc<dyn FeedFetcher>,
    options: PipelineOptions,
    feed_cache: PathBuf,
    lock_timeout: Option<Duration>,
}

impl UpdateCoordinator {
    #[must_use]
    pub fn new(fetcher: Arc<dyn FeedFetcher>, options: PipelineOptions, feed_cache: PathBuf) -> Self {
        Self {
            run_lock: Mutex::new(()),
            state: ChecksumState::default(),
            fetcher,
            options,
            feed_cache,
            lock_timeout: None,
        }
    }

    #[must_use]
    pub fn with_lock_timeout(mut self, lock_timeout: Option<Duration>) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    #[must_use]
    pub fn layout(&self) -> &PublishLayout {
        &self.options.layout
    }

    #[must_use]
    pub fn state(&self) -> &ChecksumState {
        &self.state
    }

    /// Runs one update and reports the outcome in-band. Never panics and
    /// never returns an unstructured error.
    #[instrument(name = "epg_update", skip(self), fields(source = %self.fetcher.describe()))]
    pub async fn update(&self) -> UpdateResponse {
        match self.run().await {
            Ok(report) => {
                let message = if report.changed {
                    MESSAGE_CHANGED
                } else {
                    MESSAGE_UNCHANGED
                };
                UpdateResponse::success(message, &report.published)
            }
            Err(err) => {
                error!(code = err.code.as_str(), error = %err.message, "update failed");
                UpdateResponse::failure(&err)
            }
        }
    }

    pub async fn run(&self) -> Result<RunReport, UpdateError> {
        let _guard = match self.lock_timeout {
            Some(limit) => tokio::time::timeout(limit, self.run_lock.lock())
                .await
                .map_err(|_| {
                    UpdateError::new(
                        UpdateErrorCode::LockTimeout,
                        format!("update already running, gave up after {}ms", limit.as_millis()),
                    )
                })?,
            None => self.run_lock.lock().await,
        };
        let started = Instant::now();

        match tokio::fs::remove_file(&self.feed_cache).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(UpdateError::new(
                    UpdateErrorCode::Io,
                    format!("remove {}: {e}", self.feed_cache.display()),
                ))
            }
        }
        let raw = self.fetcher.fetch().await?;
        info!(source = %raw.source, bytes = raw.bytes.len(), "feed fetched");

        let options = self.options.clone();
        let cache = self.feed_cache.clone();
        let result = tokio::task::spawn_blocking(move || -> Result<_, UpdateError> {
            if let Some(parent) = cache.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent).map_err(|e| {
                    UpdateError::new(UpdateErrorCode::Io, format!("create {}: {e}", parent.display()))
                })?;
            }
            write_atomic(&cache, &raw.bytes)?;
            Ok(run_pipeline(&raw.bytes, &options)?)
        })
        .await
        .map_err(|e| UpdateError::new(UpdateErrorCode::Internal, format!("pipeline task failed: {e}")))??;

        let published = result.outcome.published().clone();
        self.state.set(published.clone()).await;
        let report = RunReport {
            published,
            changed: result.changed(),
            artifacts_written: result.artifacts_written,
            elapsed: started.elapsed(),
        };
        info!(
            checksum = %report.published.checksum,
            changed = report.changed,
            artifacts_written = report.artifacts_written,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "update finished"
        );
        Ok(report)
    }

    /// Reports the last published index without waiting for a running
    /// update. A run is forced only when nothing has been published yet.
    pub async fn status(&self) -> UpdateResponse {
        match self.state.get_or_load(self.layout()).await {
            Ok(Some(published)) => UpdateResponse::success(MESSAGE_CHANGED, &published),
            Ok(None) => {
                info!("no published index yet, forcing an update");
                self.update().await
            }
            Err(err) => {
                warn!(error = %err, "cannot read checksum marker");
                UpdateResponse::failure(&UpdateError::from(err))
            }
        }
    }
}
