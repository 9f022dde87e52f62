// SPDX-License-Identifier: Apache-2.0

use crate::fetch::RetryPolicy;
use epgcast_ingest::{OrphanPolicy, PipelineOptions, DEFAULT_COMPRESSION_LEVEL};
use epgcast_store::{PublishLayout, DEFAULT_PUBLIC_PREFIX};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_BIND: &str = "0.0.0.0:2096";
pub const DEFAULT_DATA_ROOT: &str = "EPG_DATA";
pub const DEFAULT_FEED_URL: &str = "https://www.bevy.be/bevyfiles/brazil.xml";
pub const DEFAULT_FEED_CACHE_FILE: &str = "feed.xml";

/// Where the raw feed comes from. A `file:` prefixed source reads a local
/// path instead of issuing an HTTP request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedSource {
    Http(String),
    File(PathBuf),
}

impl FeedSource {
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        match raw.strip_prefix("file:") {
            Some(path) => Self::File(PathBuf::from(path.trim_start_matches("//"))),
            None => Self::Http(raw.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: String,
    pub data_root: PathBuf,
    pub public_prefix: String,
    pub feed_source: FeedSource,
    /// Raw feed copy of the last run, relative to `data_root` unless absolute.
    pub feed_cache_file: PathBuf,
    pub update_interval: Duration,
    pub run_on_start: bool,
    pub fetch_timeout: Duration,
    pub retry: RetryPolicy,
    pub lock_timeout: Option<Duration>,
    pub orphan_policy: OrphanPolicy,
    pub gzip_level: u32,
    pub log_json: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            data_root: PathBuf::from(DEFAULT_DATA_ROOT),
            public_prefix: DEFAULT_PUBLIC_PREFIX.to_string(),
            feed_source: FeedSource::Http(DEFAULT_FEED_URL.to_string()),
            feed_cache_file: PathBuf::from(DEFAULT_FEED_CACHE_FILE),
            update_interval: Duration::from_secs(900),
            run_on_start: true,
            fetch_timeout: Duration::from_millis(60_000),
            retry: RetryPolicy::default(),
            lock_timeout: None,
            orphan_policy: OrphanPolicy::default(),
            gzip_level: DEFAULT_COMPRESSION_LEVEL,
            log_json: true,
        }
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw {
        "1" | "true" | "TRUE" | "yes" | "YES" => Some(true),
        "0" | "false" | "FALSE" | "no" | "NO" => Some(false),
        _ => None,
    }
}

impl ServerConfig {
    /// Reads `EPGCAST_*` variables from the process environment.
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds a config from any variable source. Unset variables keep their
    /// defaults; variables that are set but unparseable are an error.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let string = |name: &str, default: &str| lookup(name).unwrap_or_else(|| default.to_string());
        let number = |name: &str, default: u64| -> Result<u64, String> {
            match lookup(name) {
                Some(v) => v
                    .trim()
                    .parse::<u64>()
                    .map_err(|e| format!("invalid {name}={v}: {e}")),
                None => Ok(default),
            }
        };
        let flag = |name: &str, default: bool| -> Result<bool, String> {
            match lookup(name) {
                Some(v) => parse_bool(v.trim()).ok_or_else(|| format!("invalid {name}={v}")),
                None => Ok(default),
            }
        };

        let lock_timeout = match lookup("EPGCAST_LOCK_TIMEOUT_MS") {
            Some(v) if !v.trim().is_empty() => Some(Duration::from_millis(
                v.trim()
                    .parse::<u64>()
                    .map_err(|e| format!("invalid EPGCAST_LOCK_TIMEOUT_MS={v}: {e}"))?,
            )),
            _ => None,
        };
        let orphan_policy = match lookup("EPGCAST_ORPHAN_POLICY") {
            Some(v) => v.parse::<OrphanPolicy>()?,
            None => defaults.orphan_policy,
        };
        let gzip_level = u32::try_from(number("EPGCAST_GZIP_LEVEL", u64::from(defaults.gzip_level))?)
            .map_err(|e| format!("invalid EPGCAST_GZIP_LEVEL: {e}"))?;
        let max_attempts = usize::try_from(number(
            "EPGCAST_FETCH_RETRY_ATTEMPTS",
            defaults.retry.max_attempts as u64,
        )?)
        .map_err(|e| format!("invalid EPGCAST_FETCH_RETRY_ATTEMPTS: {e}"))?;

        Ok(Self {
            bind: string("EPGCAST_BIND", DEFAULT_BIND),
            data_root: PathBuf::from(string("EPGCAST_DATA_ROOT", DEFAULT_DATA_ROOT)),
            public_prefix: string("EPGCAST_PUBLIC_PREFIX", DEFAULT_PUBLIC_PREFIX)
                .trim_matches('/')
                .to_string(),
            feed_source: FeedSource::parse(&string("EPGCAST_FEED_URL", DEFAULT_FEED_URL)),
            feed_cache_file: PathBuf::from(string(
                "EPGCAST_FEED_CACHE_FILE",
                DEFAULT_FEED_CACHE_FILE,
            )),
            update_interval: Duration::from_secs(number(
                "EPGCAST_UPDATE_INTERVAL_SECS",
                defaults.update_interval.as_secs(),
            )?),
            run_on_start: flag("EPGCAST_RUN_ON_START", defaults.run_on_start)?,
            fetch_timeout: Duration::from_millis(number(
                "EPGCAST_FETCH_TIMEOUT_MS",
                60_000,
            )?),
            retry: RetryPolicy {
                max_attempts,
                base_backoff_ms: number(
                    "EPGCAST_FETCH_RETRY_BASE_MS",
                    defaults.retry.base_backoff_ms,
                )?,
            },
            lock_timeout,
            orphan_policy,
            gzip_level,
            log_json: flag("EPGCAST_LOG_JSON", defaults.log_json)?,
        })
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.update_interval.is_zero() {
            return Err("EPGCAST_UPDATE_INTERVAL_SECS must be > 0".to_string());
        }
        if self.fetch_timeout.is_zero() {
            return Err("EPGCAST_FETCH_TIMEOUT_MS must be > 0".to_string());
        }
        if self.retry.max_attempts == 0 {
            return Err("EPGCAST_FETCH_RETRY_ATTEMPTS must be > 0".to_string());
        }
        if self.gzip_level > 9 {
            return Err(format!(
                "EPGCAST_GZIP_LEVEL must be within 0..=9, got {}",
                self.gzip_level
            ));
        }
        if self.public_prefix.contains('/') || self.public_prefix.contains("..") {
            return Err(format!(
                "EPGCAST_PUBLIC_PREFIX must be a single path segment, got {}",
                self.public_prefix
            ));
        }
        if let FeedSource::Http(url) = &self.feed_source {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(format!("EPGCAST_FEED_URL must be http(s) or file:, got {url}"));
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn layout(&self) -> PublishLayout {
        PublishLayout::new(self.data_root.clone(), self.public_prefix.clone())
    }

    #[must_use]
    pub fn feed_cache_path(&self) -> PathBuf {
        if self.feed_cache_file.is_absolute() {
            self.feed_cache_file.clone()
        } else {
            self.data_root.join(&self.feed_cache_file)
        }
    }

    #[must_use]
    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            layout: self.layout(),
            orphan_policy: self.orphan_policy,
            compression_level: self.gzip_level,
        }
    }
}
