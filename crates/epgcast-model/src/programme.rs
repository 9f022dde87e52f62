// SPDX-License-Identifier: Apache-2.0

use crate::channel::{ChannelId, ValidationError};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};

/// XMLTV timestamp layout, e.g. `20240306233000 -0300`.
pub const XMLTV_TIME_FORMAT: &str = "%Y%m%d%H%M%S %z";
const XMLTV_NAIVE_FORMAT: &str = "%Y%m%d%H%M%S";

/// Parses an XMLTV timestamp keeping its UTC offset. A value without an
/// offset is read as UTC.
pub fn parse_xmltv_time(raw: &str) -> Result<DateTime<FixedOffset>, ValidationError> {
    let s = raw.trim();
    if let Ok(ts) = DateTime::parse_from_str(s, XMLTV_TIME_FORMAT) {
        return Ok(ts);
    }
    if s.len() == 14 && s.bytes().all(|b| b.is_ascii_digit()) {
        let naive = NaiveDateTime::parse_from_str(s, XMLTV_NAIVE_FORMAT)
            .map_err(|e| ValidationError(format!("invalid timestamp {s:?}: {e}")))?;
        return Ok(Utc.from_utc_datetime(&naive).fixed_offset());
    }
    Err(ValidationError(format!(
        "invalid timestamp {s:?}: expected YYYYMMDDhhmmss +hhmm"
    )))
}

/// One `<programme>` element. `markup` is carried through to the
/// published artifact untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgrammeRecord {
    pub index: usize,
    pub channel: ChannelId,
    pub start: DateTime<FixedOffset>,
    pub stop: Option<DateTime<FixedOffset>>,
    pub markup: String,
}

impl ProgrammeRecord {
    /// Calendar date of the start time in the record's own offset.
    #[must_use]
    pub fn local_date(&self) -> NaiveDate {
        self.start.date_naive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(start: &str) -> ProgrammeRecord {
        ProgrammeRecord {
            index: 0,
            channel: ChannelId::parse("globo").expect("id"),
            start: parse_xmltv_time(start).expect("start"),
            stop: None,
            markup: String::new(),
        }
    }

    #[test]
    fn offset_is_preserved() {
        let ts = parse_xmltv_time("20240306233000 -0300").expect("ts");
        assert_eq!(ts.offset().local_minus_utc(), -3 * 3600);
        assert_eq!(ts.to_rfc3339(), "2024-03-06T23:30:00-03:00");
    }

    #[test]
    fn local_date_uses_record_offset_not_utc() {
        // 23:58 local is 02:58 UTC on the next day.
        let rec = record("20240306235800 -0300");
        assert_eq!(
            rec.local_date(),
            NaiveDate::from_ymd_opt(2024, 3, 6).expect("date")
        );
        assert_eq!(
            rec.start.with_timezone(&Utc).date_naive(),
            NaiveDate::from_ymd_opt(2024, 3, 7).expect("date")
        );
    }

    #[test]
    fn missing_offset_is_read_as_utc() {
        let ts = parse_xmltv_time("20240307080000").expect("ts");
        assert_eq!(ts.offset().local_minus_utc(), 0);
    }

    #[test]
    fn malformed_timestamps_are_rejected() {
        for bad in ["", "2024-03-07 08:00", "20240307", "20241307080000 +0000"] {
            assert!(parse_xmltv_time(bad).is_err(), "accepted {bad:?}");
        }
    }
}
