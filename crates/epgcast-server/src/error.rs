// SPDX-License-Identifier: Apache-2.0

use crate::fetch::FetchError;
use epgcast_ingest::{IngestError, IngestErrorCode};
use epgcast_store::StoreError;
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum UpdateErrorCode {
    Fetch,
    Parse,
    Io,
    LockTimeout,
    Internal,
}

impl UpdateErrorCode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Fetch => "fetch_error",
            Self::Parse => "parse_error",
            Self::Io => "io_error",
            Self::LockTimeout => "lock_timeout",
            Self::Internal => "internal_error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateError {
    pub code: UpdateErrorCode,
    pub message: String,
}

impl UpdateError {
    #[must_use]
    pub fn new(code: UpdateErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl Display for UpdateError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code.as_str(), self.message)
    }
}

impl std::error::Error for UpdateError {}

impl From<FetchError> for UpdateError {
    fn from(err: FetchError) -> Self {
        Self::new(UpdateErrorCode::Fetch, err.0)
    }
}

impl From<IngestError> for UpdateError {
    fn from(err: IngestError) -> Self {
        let code = match err.code {
            IngestErrorCode::Parse => UpdateErrorCode::Parse,
            IngestErrorCode::Io => UpdateErrorCode::Io,
            _ => UpdateErrorCode::Internal,
        };
        let mut message = err.message;
        for (key, value) in &err.details {
            message.push_str(&format!(" {key}={value}"));
        }
        Self::new(code, message)
    }
}

impl From<StoreError> for UpdateError {
    fn from(err: StoreError) -> Self {
        Self::new(UpdateErrorCode::Io, err.message)
    }
}
