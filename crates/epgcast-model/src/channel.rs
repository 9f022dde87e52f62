// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError(pub String);

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for ValidationError {}

pub const CHANNEL_ID_MAX_LEN: usize = 128;

/// Case-folded channel identifier. Channel ids end up in artifact file
/// names, so anything that could escape a directory is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(String);

impl ChannelId {
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let s = input.trim();
        if s.is_empty() {
            return Err(ValidationError("channel id must not be empty".to_string()));
        }
        if s.len() > CHANNEL_ID_MAX_LEN {
            return Err(ValidationError(format!(
                "channel id exceeds max length {CHANNEL_ID_MAX_LEN}"
            )));
        }
        if s.contains('/') || s.contains('\\') || s.contains("..") {
            return Err(ValidationError(format!(
                "channel id must not contain path separators: {s}"
            )));
        }
        if s.chars().any(char::is_control) {
            return Err(ValidationError(
                "channel id must not contain control characters".to_string(),
            ));
        }
        Ok(Self(s.to_lowercase()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ChannelId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A `<channel>` entry of the feed. `markup` is the element exactly as it
/// appeared in the source document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelDescriptor {
    pub id: ChannelId,
    pub display_names: Vec<String>,
    pub markup: String,
    pub synthesized: bool,
}

impl ChannelDescriptor {
    #[must_use]
    pub fn new(id: ChannelId, display_names: Vec<String>, markup: String) -> Self {
        Self {
            id,
            display_names,
            markup,
            synthesized: false,
        }
    }

    /// Minimal descriptor for a programme whose channel is not declared in the feed.
    #[must_use]
    pub fn id_only(id: ChannelId) -> Self {
        let markup = format!("<channel id=\"{}\"/>", escape_attribute(id.as_str()));
        Self {
            id,
            display_names: Vec::new(),
            markup,
            synthesized: true,
        }
    }
}

fn escape_attribute(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_ids_are_trimmed_and_case_folded() {
        let id = ChannelId::parse("  GloboRJ.br ").expect("channel id");
        assert_eq!(id.as_str(), "globorj.br");
        assert_eq!(id, ChannelId::parse("globorj.BR").expect("channel id"));
    }

    #[test]
    fn channel_ids_that_escape_directories_are_rejected() {
        for bad in ["", "   ", "a/b", "a\\b", "..", "a..b", "a\u{0}b"] {
            assert!(ChannelId::parse(bad).is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn id_only_descriptor_escapes_markup() {
        let desc = ChannelDescriptor::id_only(ChannelId::parse("A&B").expect("id"));
        assert!(desc.synthesized);
        assert_eq!(desc.markup, "<channel id=\"a&amp;b\"/>");
    }
}
