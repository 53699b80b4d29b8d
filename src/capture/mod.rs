//! Request capture
//!
//! Turns one inbound request into one JSON line appended to the current
//! day's partition. The request is passed in as an explicit
//! [`RequestContext`], so capturing can be driven by the axum middleware in
//! [`middleware`] or directly from tests.

pub mod middleware;
pub mod write_buffer;

use chrono::{Local, NaiveDate, NaiveDateTime};
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::config::{CaptureConfig, StorageConfig};
use crate::error::CaptureError;
use crate::partition::{partition_dir, partition_path};
use crate::record::{CapturedRequest, TIMESTAMP_FORMAT};

/// Form fields that never reach the log
pub const DEFAULT_REDACTED_FIELDS: &[&str] = &["password", "token", "key", "secret"];

/// Placeholder for request attributes that were not available
const UNKNOWN: &str = "unknown";

/// Everything capture needs to know about one request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    pub remote_addr: Option<String>,
    pub method: Option<String>,
    /// Path plus query, as requested
    pub uri: Option<String>,
    pub query_string: Option<String>,
    pub protocol: Option<String>,
    pub headers: Vec<(String, String)>,
    /// Decoded form body fields, in request order
    pub form: Vec<(String, String)>,
}

impl RequestContext {
    /// First header value matching `name` case-insensitively
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Result of [`RequestLogger::append_all`]
#[derive(Debug, Default)]
pub struct BatchAppend {
    pub written: usize,
    pub failed: usize,
    /// One entry per failed day (or unencodable record)
    pub errors: Vec<CaptureError>,
}

/// Appends captured requests under a log root
#[derive(Debug, Clone)]
pub struct RequestLogger {
    log_root: PathBuf,
    /// Lowercased
    redacted_fields: Vec<String>,
}

impl RequestLogger {
    pub fn new(log_root: impl Into<PathBuf>) -> Self {
        Self {
            log_root: log_root.into(),
            redacted_fields: DEFAULT_REDACTED_FIELDS.iter().map(|f| f.to_string()).collect(),
        }
    }

    pub fn from_config(storage: &StorageConfig, capture: &CaptureConfig) -> Self {
        Self::new(&storage.log_root).with_redacted_fields(&capture.redacted_fields)
    }

    pub fn with_redacted_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.redacted_fields = fields
            .into_iter()
            .map(|f| f.as_ref().to_lowercase())
            .collect();
        self
    }

    pub fn log_root(&self) -> &Path {
        &self.log_root
    }

    /// Capture `ctx` with the current local time
    pub fn log_request(&self, ctx: &RequestContext) -> Result<(), CaptureError> {
        self.log_request_at(ctx, Local::now().naive_local())
    }

    /// Capture `ctx` as if received at `now`
    pub fn log_request_at(
        &self,
        ctx: &RequestContext,
        now: NaiveDateTime,
    ) -> Result<(), CaptureError> {
        let record = self.record(ctx, now);
        self.append_to(now.date(), &record.to_line()?)
    }

    /// Build the record that would be written for `ctx`
    pub fn record(&self, ctx: &RequestContext, now: NaiveDateTime) -> CapturedRequest {
        let or_unknown = |value: &Option<String>| value.clone().unwrap_or_else(|| UNKNOWN.to_string());

        CapturedRequest {
            timestamp: now.format(TIMESTAMP_FORMAT).to_string(),
            ip: or_unknown(&ctx.remote_addr),
            method: or_unknown(&ctx.method),
            uri: or_unknown(&ctx.uri),
            user_agent: ctx.header("user-agent").unwrap_or(UNKNOWN).to_string(),
            referer: ctx.header("referer").unwrap_or_default().to_string(),
            query_string: ctx.query_string.clone().unwrap_or_default(),
            protocol: or_unknown(&ctx.protocol),
            headers: collect_headers(&ctx.headers),
            post_data: self.sanitize(&ctx.form),
        }
    }

    /// Form fields minus the redacted ones
    pub fn sanitize(&self, form: &[(String, String)]) -> BTreeMap<String, String> {
        form.iter()
            .filter(|(key, _)| !self.is_redacted(key))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    fn is_redacted(&self, key: &str) -> bool {
        let key = key.to_lowercase();
        self.redacted_fields.iter().any(|field| *field == key)
    }

    /// Append a batch, one write per day partition. A day that fails does
    /// not stop the others from being written.
    pub fn append_all(&self, records: &[CapturedRequest]) -> BatchAppend {
        let mut outcome = BatchAppend::default();
        let mut by_day: BTreeMap<NaiveDate, (usize, String)> = BTreeMap::new();
        for record in records {
            let line = match record.to_line() {
                Ok(line) => line,
                Err(e) => {
                    outcome.failed += 1;
                    outcome.errors.push(e.into());
                    continue;
                }
            };
            let day = record
                .partition_date()
                .unwrap_or_else(|| Local::now().date_naive());
            let (count, lines) = by_day.entry(day).or_default();
            *count += 1;
            lines.push_str(&line);
        }

        for (day, (count, lines)) in &by_day {
            match self.append_to(*day, lines) {
                Ok(()) => outcome.written += count,
                Err(e) => {
                    outcome.failed += count;
                    outcome.errors.push(e);
                }
            }
        }

        outcome
    }

    fn append_to(&self, day: NaiveDate, lines: &str) -> Result<(), CaptureError> {
        let dir = partition_dir(&self.log_root, day);
        fs::create_dir_all(&dir).map_err(|source| CaptureError::CreateDir {
            path: dir.clone(),
            source,
        })?;

        let path = partition_path(&self.log_root, day);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| CaptureError::Append {
                path: path.clone(),
                source,
            })?;
        file.write_all(lines.as_bytes())
            .map_err(|source| CaptureError::Append {
                path: path.clone(),
                source,
            })?;

        debug!("Appended {} byte(s) to {}", lines.len(), path.display());
        Ok(())
    }
}

/// Header map for the log line; repeated headers are joined with ", "
fn collect_headers(headers: &[(String, String)]) -> BTreeMap<String, String> {
    let mut collected: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        collected
            .entry(name.clone())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(value);
            })
            .or_insert_with(|| value.clone());
    }
    collected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::parse_line;
    use tempfile::TempDir;

    fn at(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, 15, 30)
            .unwrap()
    }

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn login_request() -> RequestContext {
        RequestContext {
            remote_addr: Some("203.0.113.7".to_string()),
            method: Some("POST".to_string()),
            uri: Some("/login?next=/home".to_string()),
            query_string: Some("next=/home".to_string()),
            protocol: Some("HTTP/1.1".to_string()),
            headers: pairs(&[
                ("User-Agent", "Mozilla/5.0"),
                ("Referer", "https://example.com/"),
                ("Accept", "text/html"),
                ("Accept", "*/*"),
            ]),
            form: pairs(&[
                ("username", "alice"),
                ("Password", "hunter2"),
                ("TOKEN", "abc"),
                ("api_key", "kept"),
                ("secret", "s"),
            ]),
        }
    }

    #[test]
    fn redacts_exact_field_names_only() {
        let logger = RequestLogger::new("/unused");
        let kept = logger.sanitize(&login_request().form);

        assert_eq!(kept.get("username").map(String::as_str), Some("alice"));
        assert_eq!(kept.get("api_key").map(String::as_str), Some("kept"));
        assert!(!kept.contains_key("Password"));
        assert!(!kept.contains_key("TOKEN"));
        assert!(!kept.contains_key("secret"));
    }

    #[test]
    fn custom_redaction_list_replaces_defaults() {
        let logger = RequestLogger::new("/unused").with_redacted_fields(["PIN"]);
        let kept = logger.sanitize(&pairs(&[("pin", "1234"), ("password", "x")]));
        assert!(!kept.contains_key("pin"));
        assert!(kept.contains_key("password"));
    }

    #[test]
    fn fills_missing_fields() {
        let logger = RequestLogger::new("/unused");
        let record = logger.record(&RequestContext::default(), at(2024, 1, 1, 9));

        assert_eq!(record.timestamp, "2024-01-01 09:15:30");
        assert_eq!(record.ip, "unknown");
        assert_eq!(record.method, "unknown");
        assert_eq!(record.uri, "unknown");
        assert_eq!(record.user_agent, "unknown");
        assert_eq!(record.protocol, "unknown");
        assert_eq!(record.referer, "");
        assert_eq!(record.query_string, "");
    }

    #[test]
    fn appends_one_line_per_request() {
        let root = TempDir::new().unwrap();
        let logger = RequestLogger::new(root.path());

        logger.log_request_at(&login_request(), at(2024, 6, 1, 22)).unwrap();
        logger.log_request_at(&login_request(), at(2024, 6, 1, 23)).unwrap();
        logger.log_request_at(&login_request(), at(2024, 6, 2, 0)).unwrap();

        let first_day = partition_path(root.path(), at(2024, 6, 1, 0).date());
        let content = fs::read_to_string(&first_day).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(content.ends_with('\n'));
        assert!(lines[0].contains(r#""uri":"/login?next=/home""#));
        assert!(lines[0].contains(r#""Accept":"text/html, */*""#));
        assert!(!lines[0].contains("hunter2"));

        let record = parse_line(lines[1].as_bytes()).unwrap().unwrap();
        assert_eq!(record.hour, 23);
        assert_eq!(record.ip, "203.0.113.7");
        assert_eq!(record.referer.as_deref(), Some("https://example.com/"));

        let second_day = partition_path(root.path(), at(2024, 6, 2, 0).date());
        assert_eq!(fs::read_to_string(second_day).unwrap().lines().count(), 1);
    }

    #[test]
    fn log_request_writes_to_todays_partition() {
        let root = TempDir::new().unwrap();
        let logger = RequestLogger::new(root.path());
        let before = Local::now().date_naive();

        logger.log_request(&login_request()).unwrap();

        let after = Local::now().date_naive();
        let written = [before, after]
            .iter()
            .filter(|day| partition_path(root.path(), **day).exists())
            .count();
        assert!(written >= 1);
    }

    #[test]
    fn batch_append_splits_by_day() {
        let root = TempDir::new().unwrap();
        let logger = RequestLogger::new(root.path());
        let records = vec![
            logger.record(&login_request(), at(2024, 6, 1, 23)),
            logger.record(&login_request(), at(2024, 6, 2, 0)),
            logger.record(&login_request(), at(2024, 6, 2, 1)),
        ];

        let outcome = logger.append_all(&records);
        assert_eq!(outcome.written, 3);
        assert_eq!(outcome.failed, 0);
        assert!(outcome.errors.is_empty());

        let count = |day| {
            fs::read_to_string(partition_path(root.path(), day))
                .unwrap()
                .lines()
                .count()
        };
        assert_eq!(count(at(2024, 6, 1, 0).date()), 1);
        assert_eq!(count(at(2024, 6, 2, 0).date()), 2);
    }

    #[test]
    fn failed_day_does_not_discard_the_rest_of_the_batch() {
        let root = TempDir::new().unwrap();
        let logger = RequestLogger::new(root.path());
        // a plain file where the second day's directory should go
        fs::write(partition_dir(root.path(), at(2024, 6, 2, 0).date()), b"").unwrap();

        let records = vec![
            logger.record(&login_request(), at(2024, 6, 1, 23)),
            logger.record(&login_request(), at(2024, 6, 2, 0)),
            logger.record(&login_request(), at(2024, 6, 2, 1)),
            logger.record(&login_request(), at(2024, 6, 3, 8)),
        ];

        let outcome = logger.append_all(&records);
        assert_eq!(outcome.written, 2);
        assert_eq!(outcome.failed, 2);
        assert_eq!(outcome.errors.len(), 1);
        assert!(matches!(outcome.errors[0], CaptureError::CreateDir { .. }));

        for day in [at(2024, 6, 1, 0).date(), at(2024, 6, 3, 0).date()] {
            let content = fs::read_to_string(partition_path(root.path(), day)).unwrap();
            assert_eq!(content.lines().count(), 1);
        }
    }

    #[test]
    fn unwritable_root_is_reported() {
        let root = TempDir::new().unwrap();
        let blocker = root.path().join("file");
        fs::write(&blocker, b"").unwrap();

        let logger = RequestLogger::new(&blocker);
        let err = logger
            .log_request_at(&login_request(), at(2024, 1, 1, 0))
            .unwrap_err();
        assert!(matches!(err, CaptureError::CreateDir { .. }));
    }
}
