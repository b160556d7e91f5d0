use serde::{Deserialize, Serialize};

use crate::model::bucket::Bucket;

/// Aggregate over the trailing window, built fresh for every query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    pub sum: f64,
    pub avg: f64,
    pub max: f64,
    pub min: f64,
    pub count: u64,
}

impl Statistics {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

/// Running totals while walking in-window buckets.
#[derive(Debug, Default)]
pub(crate) struct StatisticsFold {
    sum: f64,
    count: u64,
    extremes: Option<(f64, f64)>,
}

impl StatisticsFold {
    pub(crate) fn push(&mut self, bucket: &Bucket) {
        self.sum += bucket.sum;
        self.count += bucket.count;
        self.extremes = Some(match self.extremes {
            None => (bucket.max, bucket.min),
            Some((max, min)) => (max.max(bucket.max), min.min(bucket.min)),
        });
    }

    pub(crate) fn finish(self) -> Statistics {
        let Some((max, min)) = self.extremes else {
            return Statistics::empty();
        };
        let avg = if self.count > 0 {
            self.sum / self.count as f64
        } else {
            0.0
        };
        Statistics {
            sum: self.sum,
            avg,
            max,
            min,
            count: self.count,
        }
    }
}
