// SPDX-License-Identifier: Apache-2.0

use crate::error::UpdateError;
use epgcast_store::PublishedIndex;
use serde::{Deserialize, Serialize};

pub const CODE_OK: u8 = 0;
pub const CODE_FAILED: u8 = 1;
pub const MESSAGE_CHANGED: &str = "ok";
pub const MESSAGE_UNCHANGED: &str = "no change";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_file: Option<String>,
}

/// Body of the trigger and status endpoints. Failures are reported in-band
/// with `code: 1` and an empty `data` object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateResponse {
    pub code: u8,
    pub message: String,
    pub data: UpdateData,
}

impl UpdateResponse {
    #[must_use]
    pub fn success(message: &str, published: &PublishedIndex) -> Self {
        Self {
            code: CODE_OK,
            message: message.to_string(),
            data: UpdateData {
                checksum: Some(published.checksum.clone()),
                index_file: Some(published.index_file.clone()),
            },
        }
    }

    #[must_use]
    pub fn failure(err: &UpdateError) -> Self {
        Self {
            code: CODE_FAILED,
            message: err.to_string(),
            data: UpdateData::default(),
        }
    }

    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.code == CODE_OK
    }
}
