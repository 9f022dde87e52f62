// SPDX-License-Identifier: Apache-2.0

use crate::error::IngestError;
use encoding_rs::{Encoding, UTF_8};
use epgcast_model::{parse_xmltv_time, ChannelDescriptor, ChannelId, ProgrammeRecord};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::borrow::Cow;
use std::collections::HashSet;
use tracing::warn;

const ROOT_ELEMENT: &[u8] = b"tv";
const CHANNEL_ELEMENT: &[u8] = b"channel";
const PROGRAMME_ELEMENT: &[u8] = b"programme";
const DISPLAY_NAME_ELEMENT: &[u8] = b"display-name";

/// Channels and programmes of one feed, in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedFeed {
    pub channels: Vec<ChannelDescriptor>,
    pub programmes: Vec<ProgrammeRecord>,
    /// Channel elements dropped because an earlier one had the same id.
    pub duplicate_channels: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecordKind {
    Channel,
    Programme,
}

struct OpenRecord {
    kind: RecordKind,
    start: usize,
    element: BytesStart<'static>,
    display_names: Vec<String>,
    current_name: Option<String>,
}

/// Parses an XMLTV document. Channel and programme elements are kept as
/// the exact source markup; only the attributes needed for partitioning
/// are decoded.
pub fn parse_feed(bytes: &[u8]) -> Result<ParsedFeed, IngestError> {
    let decoded = decode_document(bytes)?;
    let text = decoded.strip_prefix('\u{feff}').unwrap_or(&*decoded);
    let mut reader = Reader::from_str(text);

    let mut feed = ParsedFeed::default();
    let mut seen_channels = HashSet::new();
    let mut depth = 0usize;
    let mut root_seen = false;
    let mut open: Option<OpenRecord> = None;

    loop {
        let before = offset(&reader);
        let event = reader.read_event().map_err(|e| {
            IngestError::parse(format!("malformed XML: {e}"))
                .with_detail("position", reader.error_position())
        })?;
        match event {
            Event::Start(e) => {
                if depth == 0 {
                    enter_root(&e, root_seen, before)?;
                    root_seen = true;
                } else if depth == 1 {
                    open = record_kind(&e).map(|kind| OpenRecord {
                        kind,
                        start: tag_start(text, before),
                        element: e.into_owned(),
                        display_names: Vec::new(),
                        current_name: None,
                    });
                } else if let Some(record) = open.as_mut() {
                    if record.kind == RecordKind::Channel
                        && depth == 2
                        && e.name().as_ref() == DISPLAY_NAME_ELEMENT
                    {
                        record.current_name = Some(String::new());
                    }
                }
                depth += 1;
            }
            Event::Empty(e) => {
                if depth == 0 {
                    enter_root(&e, root_seen, before)?;
                    root_seen = true;
                } else if depth == 1 {
                    if let Some(kind) = record_kind(&e) {
                        let record = OpenRecord {
                            kind,
                            start: tag_start(text, before),
                            element: e.into_owned(),
                            display_names: Vec::new(),
                            current_name: None,
                        };
                        finish_record(text, record, offset(&reader), &mut feed, &mut seen_channels)?;
                    }
                }
            }
            Event::End(e) => {
                depth = depth.saturating_sub(1);
                if let Some(record) = open.as_mut() {
                    if depth == 2 && e.name().as_ref() == DISPLAY_NAME_ELEMENT {
                        if let Some(name) = record.current_name.take() {
                            let name = name.trim();
                            if !name.is_empty() {
                                record.display_names.push(name.to_string());
                            }
                        }
                    }
                }
                if depth == 1 {
                    if let Some(record) = open.take() {
                        finish_record(text, record, offset(&reader), &mut feed, &mut seen_channels)?;
                    }
                }
            }
            Event::Text(t) => {
                if depth == 0 {
                    if !t.iter().all(u8::is_ascii_whitespace) {
                        return Err(IngestError::parse("text outside the root element")
                            .with_detail("position", before));
                    }
                } else if let Some(name) = open.as_mut().and_then(|r| r.current_name.as_mut()) {
                    let value = t.unescape().map_err(|e| {
                        IngestError::parse(format!("malformed text: {e}"))
                            .with_detail("position", before)
                    })?;
                    name.push_str(&value);
                }
            }
            Event::CData(_) if depth == 0 => {
                return Err(IngestError::parse("character data outside the root element")
                    .with_detail("position", before));
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if depth > 0 {
        return Err(IngestError::parse("unexpected end of input: unclosed element")
            .with_detail("position", offset(&reader))
            .with_detail("open_elements", depth));
    }
    if !root_seen {
        return Err(IngestError::parse("document has no root element").with_detail("position", 0));
    }
    Ok(feed)
}

/// Decodes the feed to UTF-8. A byte order mark wins over the encoding
/// named in the XML declaration; without either the document is UTF-8.
fn decode_document(bytes: &[u8]) -> Result<Cow<'_, str>, IngestError> {
    let encoding = match Encoding::for_bom(bytes) {
        Some((encoding, _)) => encoding,
        None => declared_encoding(bytes)?.unwrap_or(UTF_8),
    };
    if encoding == UTF_8 {
        let body = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
        return std::str::from_utf8(body).map(Cow::Borrowed).map_err(|e| {
            IngestError::parse("feed is not valid UTF-8").with_detail("position", e.valid_up_to())
        });
    }
    let (text, had_errors) = encoding.decode_with_bom_removal(bytes);
    if had_errors {
        return Err(IngestError::parse(format!(
            "feed is not valid {}",
            encoding.name()
        ))
        .with_detail("encoding", encoding.name()));
    }
    Ok(text)
}

fn declared_encoding(bytes: &[u8]) -> Result<Option<&'static Encoding>, IngestError> {
    let mut reader = Reader::from_reader(bytes);
    let mut buf = Vec::new();
    let Ok(Event::Decl(decl)) = reader.read_event_into(&mut buf) else {
        return Ok(None);
    };
    let Some(label) = decl.encoding() else {
        return Ok(None);
    };
    let label = label.map_err(|e| {
        IngestError::parse(format!("malformed XML declaration: {e}")).with_detail("position", 0)
    })?;
    Encoding::for_label(&label).map(Some).ok_or_else(|| {
        IngestError::parse("unsupported document encoding")
            .with_detail("encoding", String::from_utf8_lossy(&label))
    })
}

fn enter_root(e: &BytesStart<'_>, root_seen: bool, position: usize) -> Result<(), IngestError> {
    if root_seen {
        return Err(IngestError::parse("document has more than one root element")
            .with_detail("position", position));
    }
    if e.name().as_ref() != ROOT_ELEMENT {
        return Err(IngestError::parse(format!(
            "root element must be <tv>, found <{}>",
            String::from_utf8_lossy(e.name().as_ref())
        ))
        .with_detail("position", position));
    }
    Ok(())
}

fn record_kind(e: &BytesStart<'_>) -> Option<RecordKind> {
    match e.name().as_ref() {
        CHANNEL_ELEMENT => Some(RecordKind::Channel),
        PROGRAMME_ELEMENT => Some(RecordKind::Programme),
        _ => None,
    }
}

fn finish_record(
    text: &str,
    record: OpenRecord,
    end: usize,
    feed: &mut ParsedFeed,
    seen_channels: &mut HashSet<ChannelId>,
) -> Result<(), IngestError> {
    let markup = text
        .get(record.start..end)
        .ok_or_else(|| {
            IngestError::parse("element span out of range").with_detail("position", record.start)
        })?
        .to_string();
    match record.kind {
        RecordKind::Channel => {
            let raw = attribute(&record.element, b"id", record.start)?.ok_or_else(|| {
                IngestError::parse("channel element without id")
                    .with_detail("position", record.start)
            })?;
            let id = ChannelId::parse(&raw).map_err(|e| {
                IngestError::parse(e.to_string())
                    .with_detail("position", record.start)
                    .with_detail("field", "id")
            })?;
            if seen_channels.insert(id.clone()) {
                feed.channels
                    .push(ChannelDescriptor::new(id, record.display_names, markup));
            } else {
                warn!(channel = %id, "duplicate channel element ignored");
                feed.duplicate_channels += 1;
            }
        }
        RecordKind::Programme => {
            let index = feed.programmes.len();
            let context = |err: IngestError| {
                err.with_detail("record", index)
                    .with_detail("position", record.start)
            };
            let raw_channel = attribute(&record.element, b"channel", record.start)?
                .ok_or_else(|| {
                    context(IngestError::parse("programme without channel"))
                        .with_detail("field", "channel")
                })?;
            let channel = ChannelId::parse(&raw_channel).map_err(|e| {
                context(IngestError::parse(e.to_string())).with_detail("field", "channel")
            })?;
            let timestamp = |field: &'static str, raw: &str| {
                parse_xmltv_time(raw).map_err(|e| {
                    context(IngestError::parse(e.to_string()))
                        .with_detail("channel", &channel)
                        .with_detail("field", field)
                })
            };
            let raw_start = attribute(&record.element, b"start", record.start)?.ok_or_else(|| {
                context(IngestError::parse("programme without start time"))
                    .with_detail("channel", &channel)
                    .with_detail("field", "start")
            })?;
            let start = timestamp("start", &raw_start)?;
            let stop = attribute(&record.element, b"stop", record.start)?
                .map(|raw| timestamp("stop", &raw))
                .transpose()?;
            feed.programmes.push(ProgrammeRecord {
                index,
                channel,
                start,
                stop,
                markup,
            });
        }
    }
    Ok(())
}

fn attribute(
    element: &BytesStart<'_>,
    key: &[u8],
    position: usize,
) -> Result<Option<String>, IngestError> {
    for attr in element.attributes() {
        let attr = attr.map_err(|e| {
            IngestError::parse(format!("malformed attribute: {e}")).with_detail("position", position)
        })?;
        if attr.key.as_ref() == key {
            let value = attr.unescape_value().map_err(|e| {
                IngestError::parse(format!("malformed attribute value: {e}"))
                    .with_detail("position", position)
            })?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

fn offset(reader: &Reader<&[u8]>) -> usize {
    usize::try_from(reader.buffer_position()).unwrap_or(usize::MAX)
}

// The reader may already have consumed the `<` of the tag when it reports
// the position, so look back for it.
fn tag_start(text: &str, before: usize) -> usize {
    let upto = before.saturating_add(1).min(text.len());
    text.as_bytes()[..upto]
        .iter()
        .rposition(|&b| b == b'<')
        .unwrap_or(before)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::IngestErrorCode;

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE tv SYSTEM "xmltv.dtd">
<tv generator-info-name="test">
  <channel id="Globo"><display-name>Globo &amp; Cia</display-name><icon src="x.png"/></channel>
  <channel id="sbt"/>
  <channel id="GLOBO"><display-name>Other</display-name></channel>
  <programme channel="globo" start="20240306233000 -0300" stop="20240307003000 -0300"><title lang="pt">Jornal &amp; Noite</title></programme>
  <programme channel="SBT" start="20240306120000 +0000"/>
</tv>
"#;

    #[test]
    fn channels_and_programmes_keep_source_markup() {
        let feed = parse_feed(FEED.as_bytes()).expect("parse");
        assert_eq!(feed.channels.len(), 2);
        assert_eq!(feed.duplicate_channels, 1);

        let globo = &feed.channels[0];
        assert_eq!(globo.id.as_str(), "globo");
        assert_eq!(globo.display_names, vec!["Globo & Cia".to_string()]);
        assert_eq!(
            globo.markup,
            r#"<channel id="Globo"><display-name>Globo &amp; Cia</display-name><icon src="x.png"/></channel>"#
        );
        assert_eq!(feed.channels[1].markup, r#"<channel id="sbt"/>"#);

        assert_eq!(feed.programmes.len(), 2);
        let first = &feed.programmes[0];
        assert_eq!(first.index, 0);
        assert!(first.markup.starts_with("<programme channel=\"globo\""));
        assert!(first.markup.ends_with("</programme>"));
        assert!(first.markup.contains("Jornal &amp; Noite"));
        assert!(first.stop.is_some());
        assert_eq!(feed.programmes[1].channel.as_str(), "sbt");
        assert_eq!(feed.programmes[1].stop, None);
    }

    #[test]
    fn declared_latin1_feed_is_decoded() {
        let mut xml = b"<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?>\n<tv><channel id=\"globo\"><display-name>Not".to_vec();
        xml.push(0xED);
        xml.extend_from_slice(b"cias</display-name></channel></tv>");
        let feed = parse_feed(&xml).expect("parse");
        assert_eq!(feed.channels[0].display_names, vec!["Not\u{ed}cias".to_string()]);
        assert!(feed.channels[0].markup.contains("Not\u{ed}cias"));
    }

    #[test]
    fn undeclared_non_utf8_bytes_are_rejected() {
        let xml = b"<tv><channel id=\"globo\"><display-name>Not\xEDcias</display-name></channel></tv>";
        let err = parse_feed(xml).expect_err("must fail");
        assert_eq!(err.code, IngestErrorCode::Parse);
        assert!(err.message.contains("UTF-8"), "{err}");
    }

    #[test]
    fn unknown_declared_encoding_is_rejected() {
        let xml = br#"<?xml version="1.0" encoding="x-no-such-charset"?><tv/>"#;
        let err = parse_feed(xml).expect_err("must fail");
        assert_eq!(
            err.details.get("encoding").map(String::as_str),
            Some("x-no-such-charset")
        );
    }

    #[test]
    fn bad_timestamp_names_record_channel_and_field() {
        let xml = r#"<tv><programme channel="globo" start="2024-03-06 23:30"/></tv>"#;
        let err = parse_feed(xml.as_bytes()).expect_err("must fail");
        assert_eq!(err.code, IngestErrorCode::Parse);
        assert_eq!(err.details.get("record").map(String::as_str), Some("0"));
        assert_eq!(err.details.get("channel").map(String::as_str), Some("globo"));
        assert_eq!(err.details.get("field").map(String::as_str), Some("start"));
    }

    #[test]
    fn empty_root_is_an_empty_feed() {
        let feed = parse_feed(b"<tv/>").expect("parse");
        assert!(feed.channels.is_empty());
        assert!(feed.programmes.is_empty());
    }

    #[test]
    fn tag_start_handles_both_reader_positions() {
        let text = "ab<c>";
        assert_eq!(tag_start(text, 2), 2);
        assert_eq!(tag_start(text, 3), 2);
    }
}
