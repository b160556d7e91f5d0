use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};

use crate::config::WindowConfig;
use crate::error::Rejection;
use crate::model::statistics::StatisticsFold;
use crate::model::{Bucket, Statistics};

pub const DEFAULT_WINDOW_SECS: u64 = 60;
/// Largest window or retention whose length in milliseconds still fits i64.
pub const MAX_WINDOW_SECS: u64 = (i64::MAX / 1000) as u64;

/// Result of a window walk, with the number of buckets it had to fold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowScan {
    pub statistics: Statistics,
    pub buckets_folded: usize,
}

/// Per-second buckets behind a single read/write lock.
///
/// Writers (`record`, `reset`) hold the write lock for the whole bucket update,
/// so readers never observe a bucket with `sum` advanced and `count` stale.
/// Queries share the read lock and walk only the in-window seconds.
#[derive(Debug)]
pub struct WindowAggregator {
    window_secs: i64,
    retention_secs: Option<i64>,
    buckets: RwLock<BTreeMap<i64, Bucket>>,
}

impl Default for WindowAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl WindowAggregator {
    pub fn new() -> Self {
        Self::with_window(DEFAULT_WINDOW_SECS)
    }

    pub fn with_window(window_secs: u64) -> Self {
        Self {
            window_secs: clamp_secs(window_secs.max(1)),
            retention_secs: None,
            buckets: RwLock::new(BTreeMap::new()),
        }
    }

    /// Evict buckets older than `retention_secs` on every write. The horizon is
    /// never allowed to fall inside the query window.
    pub fn with_retention(mut self, retention_secs: u64) -> Self {
        self.retention_secs = Some(clamp_secs(retention_secs).max(self.window_secs));
        self
    }

    pub fn from_config(cfg: &WindowConfig) -> Self {
        let agg = Self::with_window(cfg.length_secs);
        match cfg.retention_secs {
            Some(secs) => agg.with_retention(secs),
            None => agg,
        }
    }

    pub fn window_secs(&self) -> i64 {
        self.window_secs
    }

    pub fn retention_secs(&self) -> Option<i64> {
        self.retention_secs
    }

    /// Store a transaction; `false` when it is rejected.
    pub fn record(&self, amount: f64, timestamp_ms: i64, now: DateTime<Utc>) -> bool {
        match self.try_record(amount, timestamp_ms, now) {
            Ok(_) => true,
            Err(reason) => {
                tracing::debug!(amount, timestamp_ms, %reason, "transaction rejected");
                false
            }
        }
    }

    /// Store a transaction and return the second of the bucket it landed in.
    pub fn try_record(
        &self,
        amount: f64,
        timestamp_ms: i64,
        now: DateTime<Utc>,
    ) -> Result<i64, Rejection> {
        validate(amount, timestamp_ms, now)?;
        let second = timestamp_ms / 1000;

        let mut buckets = self.write();
        buckets
            .entry(second)
            .and_modify(|bucket| bucket.absorb(amount))
            .or_insert_with(|| Bucket::open(second, amount));

        if let Some(retention) = self.retention_secs {
            let horizon = now.timestamp().saturating_sub(retention);
            if buckets
                .first_key_value()
                .is_some_and(|(&oldest, _)| oldest < horizon)
            {
                let kept = buckets.split_off(&horizon);
                let evicted = std::mem::replace(&mut *buckets, kept).len();
                tracing::debug!(evicted, horizon, "evicted stale buckets");
            }
        }

        tracing::trace!(second, amount, "transaction recorded");
        Ok(second)
    }

    pub fn query(&self, now: DateTime<Utc>) -> Statistics {
        self.query_scan(now).statistics
    }

    /// Walk buckets newest first and stop at the first one below the window
    /// floor. Keys strictly decrease, so everything after it is out of window.
    pub fn query_scan(&self, now: DateTime<Utc>) -> WindowScan {
        let floor = now.timestamp().saturating_sub(self.window_secs);
        let buckets = self.read();

        let mut fold = StatisticsFold::default();
        let mut buckets_folded = 0;
        for (&second, bucket) in buckets.iter().rev() {
            if second < floor {
                break;
            }
            fold.push(bucket);
            buckets_folded += 1;
        }

        WindowScan {
            statistics: fold.finish(),
            buckets_folded,
        }
    }

    pub fn reset(&self) {
        let mut buckets = self.write();
        if buckets.is_empty() {
            return;
        }
        let cleared = buckets.len();
        buckets.clear();
        tracing::info!(cleared, "window store reset");
    }

    /// Number of buckets currently held, in or out of window.
    pub fn bucket_count(&self) -> usize {
        self.read().len()
    }

    /// True when a transaction at `timestamp_ms` is already older than the
    /// window as of `now`.
    pub fn is_stale(&self, timestamp_ms: i64, now: DateTime<Utc>) -> bool {
        let window_ms = self.window_secs.saturating_mul(1000);
        timestamp_ms < now.timestamp_millis().saturating_sub(window_ms)
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<i64, Bucket>> {
        self.buckets.read().unwrap_or_else(|poisoned| {
            tracing::error!("window store lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<i64, Bucket>> {
        self.buckets.write().unwrap_or_else(|poisoned| {
            tracing::error!("window store lock poisoned, recovering");
            poisoned.into_inner()
        })
    }
}

fn validate(amount: f64, timestamp_ms: i64, now: DateTime<Utc>) -> Result<(), Rejection> {
    if !amount.is_finite() {
        return Err(Rejection::NonFiniteAmount);
    }
    if amount == 0.0 {
        return Err(Rejection::ZeroAmount);
    }
    if timestamp_ms <= 0 {
        return Err(Rejection::NonPositiveTimestamp(timestamp_ms));
    }
    let now_ms = now.timestamp_millis();
    if timestamp_ms > now_ms {
        return Err(Rejection::FutureTimestamp {
            timestamp_ms,
            now_ms,
        });
    }
    Ok(())
}

fn clamp_secs(secs: u64) -> i64 {
    // Lossless: MAX_WINDOW_SECS fits i64.
    secs.min(MAX_WINDOW_SECS) as i64
}
