//! Requests per hour of day

use serde::Serialize;

pub const HOURS_PER_DAY: usize = 24;

/// 24 buckets indexed by hour of day (0-23)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct HourlyDistribution([u64; HOURS_PER_DAY]);

impl HourlyDistribution {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one request in `hour`. Returns false (and counts nothing) for an
    /// hour outside 0-23.
    pub fn record(&mut self, hour: u8) -> bool {
        match self.0.get_mut(usize::from(hour)) {
            Some(bucket) => {
                *bucket += 1;
                true
            }
            None => false,
        }
    }

    pub fn merge(&mut self, other: &HourlyDistribution) {
        for (bucket, extra) in self.0.iter_mut().zip(other.0.iter()) {
            *bucket += extra;
        }
    }

    pub fn buckets(&self) -> &[u64; HOURS_PER_DAY] {
        &self.0
    }

    pub fn total(&self) -> u64 {
        self.0.iter().sum()
    }

    /// Share of `total` per bucket, in percent rounded to two decimals.
    /// Every bucket is 0.0 when `total` is zero.
    pub fn percentages(&self, total: u64) -> [f64; HOURS_PER_DAY] {
        let mut shares = [0.0; HOURS_PER_DAY];
        if total == 0 {
            return shares;
        }
        for (share, count) in shares.iter_mut().zip(self.0.iter()) {
            *share = round2(*count as f64 / total as f64 * 100.0);
        }
        shares
    }
}

/// Round half away from zero to two decimal places
fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
