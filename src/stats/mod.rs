//! Counters and the report they produce

mod accumulator;
mod frequency;
mod hourly;
mod report;

pub use accumulator::{Accumulator, TOP_N};
pub use frequency::{FrequencyTable, Ranking};
pub use hourly::{HourlyDistribution, HOURS_PER_DAY};
pub use report::{PartitionWarning, ScanStats, StatsReport};
