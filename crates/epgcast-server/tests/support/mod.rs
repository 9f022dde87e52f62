// SPDX-License-Identifier: Apache-2.0

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use epgcast_ingest::PipelineOptions;
use epgcast_server::{FeedFetcher, FetchError, RawFeed, UpdateCoordinator};
use epgcast_store::PublishLayout;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<tv>
  <channel id="globo"><display-name>Globo</display-name></channel>
  <programme channel="globo" start="20240306200000 -0300"><title>Jornal Nacional</title></programme>
  <programme channel="globo" start="20240307003000 -0300"><title>Corujão</title></programme>
</tv>
"#;

/// In-memory feed source that records how it was called.
pub struct ScriptedFetcher {
    body: Mutex<Result<Vec<u8>, String>>,
    delay: Duration,
    pub calls: AtomicUsize,
    pub completed: AtomicUsize,
    in_flight: AtomicUsize,
    pub overlapped: AtomicBool,
}

impl ScriptedFetcher {
    pub fn serving(body: &str) -> Self {
        Self {
            body: Mutex::new(Ok(body.as_bytes().to_vec())),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            overlapped: AtomicBool::new(false),
        }
    }

    pub fn failing(message: &str) -> Self {
        let fetcher = Self::serving("");
        *fetcher.body.lock().expect("body lock") = Err(message.to_string());
        fetcher
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn set_body(&self, body: Result<&str, &str>) {
        *self.body.lock().expect("body lock") = body
            .map(|b| b.as_bytes().to_vec())
            .map_err(str::to_string);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FeedFetcher for ScriptedFetcher {
    async fn fetch(&self) -> Result<RawFeed, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.in_flight.fetch_add(1, Ordering::SeqCst) > 0 {
            self.overlapped.store(true, Ordering::SeqCst);
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        let body = self.body.lock().expect("body lock").clone();
        self.completed.fetch_add(1, Ordering::SeqCst);
        body.map(|bytes| RawFeed {
            source: "scripted".to_string(),
            bytes,
            fetched_at: Utc::now(),
        })
        .map_err(FetchError)
    }

    fn describe(&self) -> String {
        "scripted".to_string()
    }
}

pub fn coordinator(root: &Path, fetcher: Arc<ScriptedFetcher>) -> UpdateCoordinator {
    let options = PipelineOptions::new(PublishLayout::with_default_prefix(root));
    UpdateCoordinator::new(fetcher, options, root.join("feed.xml"))
}
