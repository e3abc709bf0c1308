//! ## maskvakt-analytics::aggregator
//! **Period queries over the result history, cached per period**
//!
//! A cached snapshot older than the TTL is never returned, and expired
//! entries are evicted on every insert. Computation runs outside the cache
//! lock; the lock only covers the lookup and the insert.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, TimeDelta, Utc};
use maskvakt_core::clock::Clock;
use maskvakt_core::detection::DetectionResult;
use maskvakt_core::store::DetectionStore;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::AnalyticsError;
use crate::period::Period;
use crate::snapshot::{daily_trends, ActivitySummary, AnalyticsSnapshot, DailyTrend, ExportFormat};

const ACTIVITY_WINDOW_SECS: u64 = 3600;

struct CacheEntry {
    snapshot: Arc<AnalyticsSnapshot>,
    stored_at: Instant,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    /// Percentage of queries answered from the cache; 0 before any query
    pub hit_rate: f64,
    pub ttl_secs: u64,
}

/// Running totals of every result seen since startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct LiveCounters {
    pub results: u64,
    pub faces: u64,
    pub masks: u64,
    pub violations: u64,
}

pub struct AnalyticsAggregator {
    store: Arc<dyn DetectionStore>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    names: HashMap<String, String>,
    cache: Mutex<HashMap<Period, CacheEntry>>,
    hits: AtomicU64,
    misses: AtomicU64,
    live: Mutex<LiveCounters>,
}

impl AnalyticsAggregator {
    pub fn new(store: Arc<dyn DetectionStore>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            store,
            clock,
            ttl,
            names: HashMap::new(),
            cache: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            live: Mutex::new(LiveCounters::default()),
        }
    }

    /// Display names used in the per-source breakdown.
    pub fn with_source_names(mut self, names: HashMap<String, String>) -> Self {
        self.names = names;
        self
    }

    pub fn query(&self, period: Period) -> Result<Arc<AnalyticsSnapshot>, AnalyticsError> {
        let now = self.clock.now();
        {
            let cache = self.cache.lock();
            if let Some(entry) = cache.get(&period) {
                if now.saturating_duration_since(entry.stored_at) < self.ttl {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Ok(entry.snapshot.clone());
                }
            }
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        let snapshot = Arc::new(self.compute(period)?);
        debug!(period = %period, detections = snapshot.summary.total_detections, "Analytics recomputed");
        let stored_at = self.clock.now();
        let mut cache = self.cache.lock();
        cache.retain(|_, entry| stored_at.saturating_duration_since(entry.stored_at) < self.ttl);
        cache.insert(
            period,
            CacheEntry {
                snapshot: snapshot.clone(),
                stored_at,
            },
        );
        Ok(snapshot)
    }

    fn compute(&self, period: Period) -> Result<AnalyticsSnapshot, AnalyticsError> {
        let wall = self.clock.wall();
        let (start, end) = period.window(wall);
        if start > end {
            return Err(AnalyticsError::InvalidPeriod(period.label()));
        }
        let (results, alerts) = self.fetch_inclusive(start, end)?;
        Ok(AnalyticsSnapshot::compute(
            period.label(),
            (start, end),
            &results,
            &alerts,
            &self.names,
            wall,
        ))
    }

    /// The store is half-open; period windows include their end.
    fn fetch_inclusive(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<(Vec<DetectionResult>, Vec<maskvakt_core::alert::Alert>), AnalyticsError> {
        let end = end
            .checked_add_signed(TimeDelta::nanoseconds(1))
            .unwrap_or(end);
        let results = self.store.fetch(None, start, end)?;
        let alerts = self.store.fetch_alerts(start, end)?;
        Ok((results, alerts))
    }

    /// Drops every cached snapshot; the next query recomputes.
    pub fn invalidate(&self) {
        let mut cache = self.cache.lock();
        let dropped = cache.len();
        cache.clear();
        info!(dropped, "Analytics cache cleared");
    }

    pub fn cache_stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        CacheStats {
            entries: self.cache.lock().len(),
            hits,
            misses,
            hit_rate: crate::snapshot::rate(hits, hits + misses),
            ttl_secs: self.ttl.as_secs(),
        }
    }

    /// Per-day totals for the last `days` days, oldest first. Not cached.
    pub fn trends(&self, days: u32) -> Result<Vec<DailyTrend>, AnalyticsError> {
        let end = self.clock.wall();
        let start = TimeDelta::try_days(i64::from(days))
            .and_then(|span| end.checked_sub_signed(span))
            .ok_or_else(|| AnalyticsError::InvalidPeriod(format!("last {days} days")))?;
        let (results, _) = self.fetch_inclusive(start, end)?;
        Ok(daily_trends(&results))
    }

    /// Detections, mean confidence and alerts over the last hour.
    pub fn recent_activity(&self) -> Result<ActivitySummary, AnalyticsError> {
        let end = self.clock.wall();
        let start = end - TimeDelta::seconds(ACTIVITY_WINDOW_SECS as i64);
        let (results, alerts) = self.fetch_inclusive(start, end)?;
        Ok(ActivitySummary::compute(ACTIVITY_WINDOW_SECS, &results, alerts.len()))
    }

    pub fn export(&self, period: Period, format: ExportFormat) -> Result<String, AnalyticsError> {
        self.query(period)?.export(format)
    }

    /// Result hook: folds one result into the live counters.
    pub fn observe(&self, result: &DetectionResult) {
        let mut live = self.live.lock();
        live.results += 1;
        live.faces += u64::from(result.face_count());
        live.masks += u64::from(result.mask_count());
        live.violations += u64::from(result.no_mask_count());
    }

    pub fn live(&self) -> LiveCounters {
        *self.live.lock()
    }
}
