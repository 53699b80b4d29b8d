//! Final aggregation output

use chrono::NaiveDate;
use serde::Serialize;
use std::path::PathBuf;

use super::frequency::{FrequencyTable, Ranking};
use super::hourly::{HourlyDistribution, HOURS_PER_DAY};

/// A partition that existed but could not be read (fully)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartitionWarning {
    pub date: NaiveDate,
    pub path: PathBuf,
    pub message: String,
}

/// Bookkeeping from the file scan that ends up in the report
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanStats {
    pub days_scanned: u64,
    pub partitions_read: u64,
    pub partition_warnings: Vec<PartitionWarning>,
}

/// Statistics for one date range
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsReport {
    pub total_requests: u64,

    pub methods: FrequencyTable,
    pub uris: FrequencyTable,
    pub user_agents: FrequencyTable,
    pub ips: FrequencyTable,
    pub referers: FrequencyTable,

    pub methods_top_10: Ranking,
    pub uris_top_10: Ranking,
    pub user_agents_top_10: Ranking,
    pub ips_top_10: Ranking,
    pub referers_top_10: Ranking,

    pub hourly_distribution: HourlyDistribution,
    pub hourly_distribution_percentage: [f64; HOURS_PER_DAY],

    /// Non-blank lines that failed to parse or validate
    pub skipped_lines: u64,
    pub days_scanned: u64,
    pub partitions_read: u64,
    pub partition_warnings: Vec<PartitionWarning>,
}

impl StatsReport {
    /// Report for a range that held no records at all
    pub fn empty(scan: ScanStats) -> Self {
        super::Accumulator::new().finish(scan)
    }

    /// Requests that carried a referer
    pub fn requests_with_referer(&self) -> u64 {
        self.referers.total()
    }
}
