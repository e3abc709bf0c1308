//! Persistence contract for detection results and dispatched alerts.
//!
//! The store is append-only. Analytics reads it by time range; the control
//! surface reads it through newest-first pages.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

use crate::alert::Alert;
use crate::detection::DetectionResult;
use crate::error::StoreError;

/// One page of history, newest first.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: usize,
    pub per_page: usize,
    pub total: usize,
}

impl<T> Page<T> {
    pub fn pages(&self) -> usize {
        if self.per_page == 0 {
            0
        } else {
            self.total.div_ceil(self.per_page)
        }
    }
}

pub trait DetectionStore: Send + Sync {
    fn append_detection(&self, result: &DetectionResult) -> Result<(), StoreError>;

    fn append_alert(&self, alert: &Alert) -> Result<(), StoreError>;

    /// Results with `start <= timestamp < end`, optionally for one source.
    fn fetch(
        &self,
        source_id: Option<&str>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<DetectionResult>, StoreError>;

    /// Alerts with `start <= timestamp < end`.
    fn fetch_alerts(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Alert>, StoreError>;

    /// 1-based page of detections, newest first.
    fn recent_detections(
        &self,
        page: usize,
        per_page: usize,
    ) -> Result<Page<DetectionResult>, StoreError>;

    /// 1-based page of alerts, newest first.
    fn recent_alerts(&self, page: usize, per_page: usize) -> Result<Page<Alert>, StoreError>;
}

/// Volatile store used by the runtime when no external database is wired in.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    detections: RwLock<Vec<DetectionResult>>,
    alerts: RwLock<Vec<Alert>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn detection_count(&self) -> usize {
        self.detections.read().len()
    }

    pub fn alert_count(&self) -> usize {
        self.alerts.read().len()
    }
}

fn check_range(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<(), StoreError> {
    if start > end {
        return Err(StoreError::InvalidRange {
            start: start.to_rfc3339(),
            end: end.to_rfc3339(),
        });
    }
    Ok(())
}

fn paginate<T: Clone>(items: &[T], page: usize, per_page: usize) -> Page<T> {
    let total = items.len();
    let page = page.max(1);
    let skip = (page - 1).saturating_mul(per_page);
    let items = items
        .iter()
        .rev()
        .skip(skip)
        .take(per_page)
        .cloned()
        .collect();
    Page {
        items,
        page,
        per_page,
        total,
    }
}

impl DetectionStore for InMemoryStore {
    fn append_detection(&self, result: &DetectionResult) -> Result<(), StoreError> {
        self.detections.write().push(result.clone());
        Ok(())
    }

    fn append_alert(&self, alert: &Alert) -> Result<(), StoreError> {
        self.alerts.write().push(alert.clone());
        Ok(())
    }

    fn fetch(
        &self,
        source_id: Option<&str>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<DetectionResult>, StoreError> {
        check_range(start, end)?;
        let detections = self.detections.read();
        Ok(detections
            .iter()
            .filter(|r| r.timestamp() >= start && r.timestamp() < end)
            .filter(|r| source_id.map_or(true, |id| r.source_id() == id))
            .cloned()
            .collect())
    }

    fn fetch_alerts(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Alert>, StoreError> {
        check_range(start, end)?;
        let alerts = self.alerts.read();
        Ok(alerts
            .iter()
            .filter(|a| a.timestamp >= start && a.timestamp < end)
            .cloned()
            .collect())
    }

    fn recent_detections(
        &self,
        page: usize,
        per_page: usize,
    ) -> Result<Page<DetectionResult>, StoreError> {
        Ok(paginate(&self.detections.read(), page, per_page))
    }

    fn recent_alerts(&self, page: usize, per_page: usize) -> Result<Page<Alert>, StoreError> {
        Ok(paginate(&self.alerts.read(), page, per_page))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::{AlertKind, Severity};
    use chrono::{Duration, TimeZone};

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 10, hour, 0, 0).unwrap()
    }

    #[test]
    fn fetch_filters_by_range_and_source() {
        let store = InMemoryStore::new();
        store
            .append_detection(&DetectionResult::empty("cam1", at(8)))
            .unwrap();
        store
            .append_detection(&DetectionResult::empty("cam2", at(9)))
            .unwrap();
        store
            .append_detection(&DetectionResult::empty("cam1", at(12)))
            .unwrap();

        let all = store.fetch(None, at(8), at(12)).unwrap();
        assert_eq!(all.len(), 2);

        let cam1 = store.fetch(Some("cam1"), at(0), at(23)).unwrap();
        assert_eq!(cam1.len(), 2);
        assert!(cam1.iter().all(|r| r.source_id() == "cam1"));
    }

    #[test]
    fn rejects_inverted_range() {
        let store = InMemoryStore::new();
        assert!(matches!(
            store.fetch(None, at(10), at(9)),
            Err(StoreError::InvalidRange { .. })
        ));
    }

    #[test]
    fn alerts_are_range_filtered() {
        let store = InMemoryStore::new();
        let alert = Alert::new(AlertKind::Violation, "cam1", Severity::High, "x", at(10));
        store.append_alert(&alert).unwrap();
        assert_eq!(store.fetch_alerts(at(9), at(11)).unwrap().len(), 1);
        assert!(store.fetch_alerts(at(11), at(12)).unwrap().is_empty());
    }

    #[test]
    fn pages_are_newest_first() {
        let store = InMemoryStore::new();
        for minute in 0..5 {
            let ts = at(8) + Duration::minutes(minute);
            store
                .append_detection(&DetectionResult::empty(format!("cam{minute}"), ts))
                .unwrap();
        }

        let first = store.recent_detections(1, 2).unwrap();
        assert_eq!(first.total, 5);
        assert_eq!(first.pages(), 3);
        let ids: Vec<_> = first.items.iter().map(|r| r.source_id()).collect();
        assert_eq!(ids, vec!["cam4", "cam3"]);

        let last = store.recent_detections(3, 2).unwrap();
        assert_eq!(last.items.len(), 1);
        assert_eq!(last.items[0].source_id(), "cam0");

        assert!(store.recent_detections(9, 2).unwrap().items.is_empty());
    }
}
