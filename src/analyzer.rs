//! Aggregation over a date range of day partitions
//!
//! Each day's `requests.jsonl` is folded into its own [`Accumulator`]; the
//! partials are merged in date order and ranked once at the end. Missing
//! days contribute nothing, unreadable days become warnings, and bad lines
//! are counted and skipped.

use chrono::{Local, NaiveDate};
use rayon::prelude::*;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::{debug, info, trace, warn};

use crate::config::Config;
use crate::error::AnalyzeError;
use crate::partition::{partition_path, DateRange};
use crate::record::parse_line;
use crate::stats::{Accumulator, PartitionWarning, ScanStats, StatsReport};

/// Default rolling window when no start date is given
pub const DEFAULT_WINDOW_DAYS: u32 = 7;

/// Reads day partitions under a log root and produces [`StatsReport`]s
#[derive(Debug, Clone)]
pub struct LogAnalyzer {
    log_root: PathBuf,
    window_days: u32,
    parallel: bool,
}

/// What scanning a single day produced
#[derive(Debug, Default)]
struct PartitionScan {
    counters: Accumulator,
    opened: bool,
    warning: Option<PartitionWarning>,
}

impl LogAnalyzer {
    pub fn new(log_root: impl Into<PathBuf>) -> Self {
        Self {
            log_root: log_root.into(),
            window_days: DEFAULT_WINDOW_DAYS,
            parallel: true,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.storage.log_root)
            .with_window_days(config.analyzer.default_window_days)
            .with_parallel(config.analyzer.parallel)
    }

    pub fn with_window_days(mut self, days: u32) -> Self {
        self.window_days = days;
        self
    }

    /// Read partitions concurrently (the merged result is the same either way)
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn log_root(&self) -> &Path {
        &self.log_root
    }

    /// Aggregate `start..=end`. Omitted dates default to the rolling window
    /// ending today (local time), evaluated once per call.
    pub fn analyze(
        &self,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<StatsReport, AnalyzeError> {
        self.analyze_on(start, end, Local::now().date_naive())
    }

    /// Same as [`analyze`](Self::analyze) with an explicit "today"
    pub fn analyze_on(
        &self,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        today: NaiveDate,
    ) -> Result<StatsReport, AnalyzeError> {
        let range = DateRange::resolve(start, end, today, self.window_days);
        self.analyze_range(range)
    }

    pub fn analyze_range(&self, range: DateRange) -> Result<StatsReport, AnalyzeError> {
        self.check_log_root()?;

        let days: Vec<NaiveDate> = range.days().collect();
        debug!(
            "Scanning {} day(s) from {} to {} under {}",
            days.len(),
            range.start,
            range.end,
            self.log_root.display()
        );

        let partitions: Vec<PartitionScan> = if self.parallel {
            days.par_iter().map(|day| self.scan_partition(*day)).collect()
        } else {
            days.iter().map(|day| self.scan_partition(*day)).collect()
        };

        // merge in date order so first-seen ordering matches a sequential pass
        let mut counters = Accumulator::new();
        let mut scan = ScanStats {
            days_scanned: days.len() as u64,
            ..ScanStats::default()
        };
        for partition in partitions {
            if partition.opened {
                scan.partitions_read += 1;
            }
            if let Some(warning) = partition.warning {
                scan.partition_warnings.push(warning);
            }
            counters.merge(partition.counters);
        }

        info!(
            "Analyzed {} day(s): {} request(s), {} skipped line(s), {} warning(s)",
            scan.days_scanned,
            counters.total_requests(),
            counters.skipped_lines(),
            scan.partition_warnings.len()
        );

        Ok(counters.finish(scan))
    }

    fn check_log_root(&self) -> Result<(), AnalyzeError> {
        let path = &self.log_root;
        let metadata = fs::metadata(path).map_err(|source| match source.kind() {
            io::ErrorKind::NotFound => AnalyzeError::LogRootMissing { path: path.clone() },
            _ => AnalyzeError::LogRootInaccessible {
                path: path.clone(),
                source,
            },
        })?;

        if !metadata.is_dir() {
            return Err(AnalyzeError::LogRootNotDirectory { path: path.clone() });
        }

        fs::read_dir(path).map_err(|source| AnalyzeError::LogRootInaccessible {
            path: path.clone(),
            source,
        })?;

        Ok(())
    }

    fn scan_partition(&self, date: NaiveDate) -> PartitionScan {
        let path = partition_path(&self.log_root, date);

        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                trace!("No partition for {}", date);
                return PartitionScan::default();
            }
            Err(e) => {
                warn!("Failed to open partition {}: {}", path.display(), e);
                return PartitionScan {
                    warning: Some(PartitionWarning {
                        date,
                        path,
                        message: e.to_string(),
                    }),
                    ..PartitionScan::default()
                };
            }
        };

        let mut counters = Accumulator::new();
        let warning = match fold_reader(BufReader::new(file), &mut counters) {
            Ok(()) => {
                debug!(
                    "Read partition {}: {} request(s)",
                    date,
                    counters.total_requests()
                );
                None
            }
            Err(e) => {
                // keep whatever was folded before the fault
                warn!("Failed to read partition {}: {}", path.display(), e);
                Some(PartitionWarning {
                    date,
                    path,
                    message: e.to_string(),
                })
            }
        };

        PartitionScan {
            counters,
            opened: true,
            warning,
        }
    }
}

/// Fold every line of `reader` into `counters`.
///
/// Lines that do not decode or validate are counted as skipped; blank lines
/// are ignored. Only I/O faults end the read early.
pub fn fold_reader<R: BufRead>(mut reader: R, counters: &mut Accumulator) -> io::Result<()> {
    let mut line = Vec::new();
    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line)? == 0 {
            return Ok(());
        }

        match parse_line(&line) {
            Ok(Some(record)) => counters.fold(&record),
            Ok(None) => {}
            Err(e) => {
                trace!("Skipping line: {}", e);
                counters.skip_line();
            }
        }
    }
}
