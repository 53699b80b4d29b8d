//! Day partitions and date range iteration

use chrono::{Days, NaiveDate};
use std::path::{Path, PathBuf};

/// File name of a day's log inside its partition directory
pub const PARTITION_FILE: &str = "requests.jsonl";

/// Directory name layout for a partition
pub const PARTITION_DIR_FORMAT: &str = "%Y-%m-%d";

/// Inclusive range of calendar dates to aggregate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// Fill in omitted endpoints relative to `today`.
    ///
    /// `end` defaults to `today`, `start` to `window_days` before today. The
    /// caller evaluates `today` once so a long scan never drifts into a day
    /// that began after the call.
    pub fn resolve(
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        today: NaiveDate,
        window_days: u32,
    ) -> Self {
        let end = end.unwrap_or(today);
        let start = start.unwrap_or_else(|| {
            today
                .checked_sub_days(Days::new(u64::from(window_days)))
                .unwrap_or(NaiveDate::MIN)
        });
        Self { start, end }
    }

    /// Every date from start to end, both included; empty when start > end
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let end = self.end;
        let first = (self.start <= end).then_some(self.start);
        std::iter::successors(first, move |day| day.succ_opt().filter(|next| *next <= end))
    }

    pub fn is_empty(&self) -> bool {
        self.start > self.end
    }
}

/// `<root>/<YYYY-MM-DD>`
pub fn partition_dir(root: &Path, date: NaiveDate) -> PathBuf {
    root.join(date.format(PARTITION_DIR_FORMAT).to_string())
}

/// `<root>/<YYYY-MM-DD>/requests.jsonl`
pub fn partition_path(root: &Path, date: NaiveDate) -> PathBuf {
    partition_dir(root, date).join(PARTITION_FILE)
}
