//! Running counters for one aggregation

use super::frequency::FrequencyTable;
use super::hourly::HourlyDistribution;
use super::report::{ScanStats, StatsReport};
use crate::record::LogRecord;

/// Number of entries kept in each ranked view
pub const TOP_N: usize = 10;

/// Counters folded from a stream of records.
///
/// Partial accumulators (one per partition, say) can be merged in any
/// grouping; merging in date order reproduces a sequential scan exactly,
/// first-seen order included.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Accumulator {
    total_requests: u64,
    methods: FrequencyTable,
    uris: FrequencyTable,
    user_agents: FrequencyTable,
    ips: FrequencyTable,
    referers: FrequencyTable,
    hourly: HourlyDistribution,
    skipped_lines: u64,
}

impl Accumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one valid record
    pub fn fold(&mut self, record: &LogRecord) {
        // hour first: a record that cannot be bucketed is not counted anywhere
        if !self.hourly.record(record.hour) {
            self.skipped_lines += 1;
            return;
        }

        self.total_requests += 1;
        self.methods.increment(&record.method);
        self.uris.increment(&record.uri);
        self.user_agents.increment(&record.user_agent);
        self.ips.increment(&record.ip);
        if let Some(referer) = record.referer.as_deref().filter(|r| !r.is_empty()) {
            self.referers.increment(referer);
        }
    }

    /// Note a line that was dropped as malformed
    pub fn skip_line(&mut self) {
        self.skipped_lines += 1;
    }

    pub fn merge(&mut self, other: Accumulator) {
        self.total_requests += other.total_requests;
        self.methods.merge(other.methods);
        self.uris.merge(other.uris);
        self.user_agents.merge(other.user_agents);
        self.ips.merge(other.ips);
        self.referers.merge(other.referers);
        self.hourly.merge(&other.hourly);
        self.skipped_lines += other.skipped_lines;
    }

    pub fn total_requests(&self) -> u64 {
        self.total_requests
    }

    pub fn skipped_lines(&self) -> u64 {
        self.skipped_lines
    }

    /// Rank every dimension and derive hourly percentages
    pub fn finish(self, scan: ScanStats) -> StatsReport {
        let hourly_distribution_percentage = self.hourly.percentages(self.total_requests);

        StatsReport {
            total_requests: self.total_requests,
            methods_top_10: self.methods.top(TOP_N),
            uris_top_10: self.uris.top(TOP_N),
            user_agents_top_10: self.user_agents.top(TOP_N),
            ips_top_10: self.ips.top(TOP_N),
            referers_top_10: self.referers.top(TOP_N),
            methods: self.methods,
            uris: self.uris,
            user_agents: self.user_agents,
            ips: self.ips,
            referers: self.referers,
            hourly_distribution: self.hourly,
            hourly_distribution_percentage,
            skipped_lines: self.skipped_lines,
            days_scanned: scan.days_scanned,
            partitions_read: scan.partitions_read,
            partition_warnings: scan.partition_warnings,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(hour: u8, method: &str, uri: &str, ip: &str, referer: Option<&str>) -> LogRecord {
        LogRecord {
            timestamp: format!("2024-01-01 {hour:02}:00:00"),
            hour,
            ip: ip.to_string(),
            method: method.to_string(),
            uri: uri.to_string(),
            user_agent: "test-agent".to_string(),
            referer: referer.map(str::to_string),
        }
    }

    #[test]
    fn folds_every_dimension() {
        let mut acc = Accumulator::new();
        acc.fold(&record(0, "GET", "/", "10.0.0.1", Some("https://a.example/")));
        acc.fold(&record(0, "GET", "/about", "10.0.0.2", None));
        acc.fold(&record(23, "POST", "/", "10.0.0.1", Some("")));
        acc.skip_line();

        let report = acc.finish(ScanStats::default());
        assert_eq!(report.total_requests, 3);
        assert_eq!(report.skipped_lines, 1);
        assert_eq!(report.methods.get("GET"), Some(2));
        assert_eq!(report.methods.get("POST"), Some(1));
        assert_eq!(report.uris.get("/"), Some(2));
        assert_eq!(report.ips.get("10.0.0.1"), Some(2));
        assert_eq!(report.user_agents.get("test-agent"), Some(3));
        assert_eq!(report.referers.len(), 1);
        assert_eq!(report.hourly_distribution.buckets()[0], 2);
        assert_eq!(report.hourly_distribution_percentage[0], 66.67);
        assert_eq!(report.hourly_distribution_percentage[23], 33.33);
    }

    #[test]
    fn table_sums_match_total() {
        let mut acc = Accumulator::new();
        for i in 0..40u8 {
            let referer = (i % 3 == 0).then_some("https://ref.example/");
            acc.fold(&record(i % 24, ["GET", "POST", "HEAD"][usize::from(i % 3)], &format!("/p{}", i % 7), &format!("ip{}", i % 11), referer));
        }
        let report = acc.finish(ScanStats::default());
        let missing_referers = 40 - report.requests_with_referer();

        assert_eq!(report.methods.total(), report.total_requests);
        assert_eq!(report.uris.total(), report.total_requests);
        assert_eq!(report.ips.total(), report.total_requests);
        assert_eq!(report.user_agents.total(), report.total_requests);
        assert_eq!(report.referers.total() + missing_referers, report.total_requests);
        assert_eq!(report.hourly_distribution.total(), report.total_requests);
        assert_eq!(report.uris_top_10.len(), 7);
        assert_eq!(report.ips_top_10.len(), 10);
    }

    #[test]
    fn out_of_range_hour_is_skipped() {
        let mut acc = Accumulator::new();
        acc.fold(&record(24, "GET", "/", "1", None));
        assert_eq!(acc.total_requests(), 0);
        assert_eq!(acc.skipped_lines(), 1);
        assert!(acc.finish(ScanStats::default()).methods.is_empty());
    }

    #[test]
    fn merged_partials_equal_single_pass() {
        let records = [
            record(1, "GET", "/b", "x", None),
            record(2, "PUT", "/a", "y", None),
            record(1, "GET", "/a", "x", Some("r")),
            record(3, "DELETE", "/c", "z", None),
        ];

        let mut single = Accumulator::new();
        records.iter().for_each(|r| single.fold(r));

        let mut first = Accumulator::new();
        records[..2].iter().for_each(|r| first.fold(r));
        let mut second = Accumulator::new();
        records[2..].iter().for_each(|r| second.fold(r));
        first.merge(second);

        assert_eq!(first, single);
    }

    #[test]
    fn empty_report_is_all_zero() {
        let report = StatsReport::empty(ScanStats::default());
        assert_eq!(report.total_requests, 0);
        assert!(report.methods_top_10.is_empty());
        assert_eq!(report.hourly_distribution_percentage, [0.0; 24]);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["total_requests"], 0);
        assert_eq!(json["methods"], serde_json::json!({}));
        assert_eq!(json["hourly_distribution"].as_array().unwrap().len(), 24);
    }
}
