// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestStage {
    Parse,
    Partition,
    Publish,
    Index,
}

impl IngestStage {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Parse => "parse",
            Self::Partition => "partition",
            Self::Publish => "publish",
            Self::Index => "index",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IngestEvent {
    pub stage: IngestStage,
    pub name: String,
    pub fields: BTreeMap<String, String>,
}

/// Stage events of one pipeline run, kept for the caller and mirrored to
/// `tracing`.
#[derive(Debug, Default, Clone)]
pub struct IngestLog {
    events: Vec<IngestEvent>,
}

impl IngestLog {
    pub fn emit(
        &mut self,
        stage: IngestStage,
        name: impl Into<String>,
        fields: BTreeMap<String, String>,
    ) {
        let name = name.into();
        tracing::info!(stage = stage.as_str(), event = %name, fields = ?fields, "ingest");
        self.events.push(IngestEvent {
            stage,
            name,
            fields,
        });
    }

    #[must_use]
    pub fn events(&self) -> &[IngestEvent] {
        &self.events
    }

    #[must_use]
    pub fn find(&self, stage: IngestStage, name: &str) -> Option<&IngestEvent> {
        self.events
            .iter()
            .find(|e| e.stage == stage && e.name == name)
    }
}

/// Builds an event field map from `(key, value)` pairs.
pub(crate) fn fields<const N: usize>(pairs: [(&str, String); N]) -> BTreeMap<String, String> {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}
