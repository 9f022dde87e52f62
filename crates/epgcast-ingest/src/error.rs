// SPDX-License-Identifier: Apache-2.0

use epgcast_store::{StoreError, StoreErrorCode};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum IngestErrorCode {
    Parse,
    Io,
    Serialize,
}

impl IngestErrorCode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Parse => "parse_error",
            Self::Io => "io_error",
            Self::Serialize => "serialize_error",
        }
    }
}

/// Pipeline failure. `details` carries diagnostic context such as the
/// record index, channel id, field or byte position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestError {
    pub code: IngestErrorCode,
    pub message: String,
    pub details: BTreeMap<String, String>,
}

impl IngestError {
    #[must_use]
    pub fn new(code: IngestErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(IngestErrorCode::Parse, message)
    }

    #[must_use]
    pub fn io(message: impl Into<String>) -> Self {
        Self::new(IngestErrorCode::Io, message)
    }

    #[must_use]
    pub fn with_detail(mut self, key: &str, value: impl ToString) -> Self {
        self.details.insert(key.to_string(), value.to_string());
        self
    }
}

impl Display for IngestError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code.as_str(), self.message)?;
        for (key, value) in &self.details {
            write!(f, " {key}={value}")?;
        }
        Ok(())
    }
}

impl std::error::Error for IngestError {}

impl From<StoreError> for IngestError {
    fn from(err: StoreError) -> Self {
        let code = match err.code {
            StoreErrorCode::Serialize => IngestErrorCode::Serialize,
            _ => IngestErrorCode::Io,
        };
        Self::new(code, err.message).with_detail("store_code", err.code.as_str())
    }
}
