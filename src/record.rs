//! Log line format shared by the capture side and the analyzer
//!
//! Each partition file holds one JSON object per line. The capture side
//! writes [`CapturedRequest`]s; the analyzer reads them back as
//! [`LogRecord`]s, keeping only the fields it aggregates.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Canonical timestamp layout inside a log line
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Byte range of the hour inside a canonical timestamp ("YYYY-MM-DD HH")
const HOUR_RANGE: std::ops::Range<usize> = 11..13;

/// One captured request as written to disk
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CapturedRequest {
    pub timestamp: String,
    pub ip: String,
    pub method: String,
    pub uri: String,
    pub user_agent: String,
    pub referer: String,
    pub query_string: String,
    pub protocol: String,
    pub headers: BTreeMap<String, String>,
    pub post_data: BTreeMap<String, String>,
}

impl CapturedRequest {
    /// Calendar date of the partition this record belongs to
    pub fn partition_date(&self) -> Option<chrono::NaiveDate> {
        NaiveDateTime::parse_from_str(&self.timestamp, TIMESTAMP_FORMAT)
            .ok()
            .map(|ts| ts.date())
    }

    /// Encode as a single newline-terminated JSON line
    pub fn to_line(&self) -> serde_json::Result<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

/// Why a line was not counted
#[derive(Debug, Error)]
pub enum LineError {
    #[error("line is not a JSON object: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("record is missing required field `{0}`")]
    MissingField(&'static str),

    #[error("timestamp {0:?} has no valid hour")]
    BadHour(String),
}

/// Wire shape as read back; every field may be absent
#[derive(Debug, Deserialize)]
struct RawRecord {
    timestamp: Option<String>,
    ip: Option<String>,
    method: Option<String>,
    uri: Option<String>,
    user_agent: Option<String>,
    referer: Option<String>,
}

/// A validated record, ready to be folded into the counters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub timestamp: String,
    pub hour: u8,
    pub ip: String,
    pub method: String,
    pub uri: String,
    pub user_agent: String,
    /// `None` when the request carried no referer (or an empty one)
    pub referer: Option<String>,
}

/// Parse one raw line from a partition file.
///
/// Returns `Ok(None)` for blank lines, which are skipped without being
/// counted as malformed.
pub fn parse_line(line: &[u8]) -> Result<Option<LogRecord>, LineError> {
    if line.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }

    let raw: RawRecord = serde_json::from_slice(line)?;

    let timestamp = raw.timestamp.ok_or(LineError::MissingField("timestamp"))?;
    let method = raw.method.ok_or(LineError::MissingField("method"))?;
    let uri = raw.uri.ok_or(LineError::MissingField("uri"))?;
    let user_agent = raw.user_agent.ok_or(LineError::MissingField("user_agent"))?;
    let ip = raw.ip.ok_or(LineError::MissingField("ip"))?;

    let hour = hour_of(&timestamp).ok_or_else(|| LineError::BadHour(timestamp.clone()))?;

    Ok(Some(LogRecord {
        timestamp,
        hour,
        ip,
        method,
        uri,
        user_agent,
        referer: raw.referer.filter(|r| !r.is_empty()),
    }))
}

/// Hour of day from the fixed position of a canonical timestamp
pub fn hour_of(timestamp: &str) -> Option<u8> {
    let digits = timestamp.get(HOUR_RANGE)?;
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse::<u8>().ok().filter(|h| *h < 24)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(json: &str) -> Result<Option<LogRecord>, LineError> {
        parse_line(json.as_bytes())
    }

    #[test]
    fn parses_a_complete_line() {
        let record = line(
            r#"{"timestamp":"2024-01-01 13:45:00","ip":"10.0.0.1","method":"GET","uri":"/a/b?c=1","user_agent":"curl/8","referer":"https://example.com/","query_string":"c=1","protocol":"HTTP/1.1","headers":{"Host":"x"},"post_data":[]}"#,
        )
        .unwrap()
        .unwrap();

        assert_eq!(record.hour, 13);
        assert_eq!(record.method, "GET");
        assert_eq!(record.uri, "/a/b?c=1");
        assert_eq!(record.referer.as_deref(), Some("https://example.com/"));
    }

    #[test]
    fn extra_fields_are_optional() {
        let record = line(
            r#"{"timestamp":"2024-01-01 00:00:01","ip":"::1","method":"POST","uri":"/","user_agent":"ua"}"#,
        )
        .unwrap()
        .unwrap();
        assert_eq!(record.hour, 0);
        assert_eq!(record.referer, None);
    }

    #[test]
    fn empty_referer_is_treated_as_absent() {
        let record = line(
            r#"{"timestamp":"2024-01-01 23:00:00","ip":"1.1.1.1","method":"GET","uri":"/","user_agent":"ua","referer":""}"#,
        )
        .unwrap()
        .unwrap();
        assert_eq!(record.referer, None);
    }

    #[test]
    fn blank_lines_are_not_errors() {
        assert!(line("").unwrap().is_none());
        assert!(line("   \r\n").unwrap().is_none());
    }

    #[test]
    fn rejects_garbage_and_truncated_lines() {
        assert!(matches!(line("not json"), Err(LineError::Decode(_))));
        assert!(matches!(
            line(r#"{"timestamp":"2024-01-01 10:00:00","ip":"1.1"#),
            Err(LineError::Decode(_))
        ));
        assert!(matches!(parse_line(&[0xff, 0xfe, b'{']), Err(LineError::Decode(_))));
    }

    #[test]
    fn rejects_records_missing_required_fields() {
        let err = line(r#"{"timestamp":"2024-01-01 10:00:00","ip":"1.1.1.1","method":"GET","uri":"/"}"#)
            .unwrap_err();
        assert!(matches!(err, LineError::MissingField("user_agent")));

        let err = line(r#"{"ip":"1.1.1.1","method":"GET","uri":"/","user_agent":"ua"}"#).unwrap_err();
        assert!(matches!(err, LineError::MissingField("timestamp")));

        let err = line(r#"{"timestamp":"2024-01-01 10:00:00","ip":null,"method":"GET","uri":"/","user_agent":"ua"}"#)
            .unwrap_err();
        assert!(matches!(err, LineError::MissingField("ip")));
    }

    #[test]
    fn rejects_unusable_hours() {
        assert_eq!(hour_of("2024-01-01 24:00:00"), None);
        assert_eq!(hour_of("2024-01-01 +1:00:00"), None);
        assert_eq!(hour_of("2024-01-01"), None);
        assert_eq!(hour_of("2024-01-01T07:30:00"), Some(7));

        let err = line(r#"{"timestamp":"yesterday","ip":"1","method":"GET","uri":"/","user_agent":"ua"}"#)
            .unwrap_err();
        assert!(matches!(err, LineError::BadHour(_)));
    }

    #[test]
    fn captured_lines_do_not_escape_slashes() {
        let request = CapturedRequest {
            timestamp: "2024-03-05 08:09:10".to_string(),
            ip: "127.0.0.1".to_string(),
            method: "GET".to_string(),
            uri: "/path/to/page".to_string(),
            user_agent: "Mozilla/5.0".to_string(),
            referer: String::new(),
            query_string: String::new(),
            protocol: "HTTP/1.1".to_string(),
            headers: BTreeMap::new(),
            post_data: BTreeMap::new(),
        };

        let encoded = request.to_line().unwrap();
        assert!(encoded.ends_with('\n'));
        assert_eq!(encoded.matches('\n').count(), 1);
        assert!(encoded.contains(r#""uri":"/path/to/page""#));
        assert!(encoded.starts_with(r#"{"timestamp":"2024-03-05 08:09:10","ip":"127.0.0.1""#));
        assert_eq!(
            request.partition_date(),
            chrono::NaiveDate::from_ymd_opt(2024, 3, 5)
        );

        let back = parse_line(encoded.as_bytes()).unwrap().unwrap();
        assert_eq!(back.hour, 8);
        assert_eq!(back.uri, "/path/to/page");
    }
}
