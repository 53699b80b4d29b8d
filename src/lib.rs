//! reqstats - day-partitioned HTTP request capture and traffic statistics
//!
//! The capture side appends one JSON line per request to
//! `<log_root>/<YYYY-MM-DD>/requests.jsonl`. The analyzer folds a date range
//! of those partitions into a [`StatsReport`]: per-dimension frequency
//! tables with top-10 rankings and an hour-of-day distribution.

pub mod analyzer;
pub mod capture;
pub mod config;
pub mod error;
pub mod partition;
pub mod record;
pub mod stats;
pub mod web;

pub use analyzer::LogAnalyzer;
pub use capture::{RequestContext, RequestLogger};
pub use config::Config;
pub use error::{AnalyzeError, CaptureError};
pub use partition::DateRange;
pub use record::{CapturedRequest, LogRecord};
pub use stats::{FrequencyTable, HourlyDistribution, StatsReport};
