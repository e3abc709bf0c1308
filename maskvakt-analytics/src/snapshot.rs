//! ## maskvakt-analytics::snapshot
//! **Aggregate records and their computation**
//!
//! Rates are percentages of total faces, rounded to two decimals, and are
//! defined as 0 when no face was seen.

use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Timelike, Utc};
use maskvakt_core::alert::Alert;
use maskvakt_core::detection::DetectionResult;
use serde::Serialize;

use crate::error::AnalyticsError;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Tally {
    detections: u64,
    faces: u64,
    masks: u64,
    violations: u64,
}

impl Tally {
    fn add(&mut self, result: &DetectionResult) {
        self.detections += 1;
        self.faces += u64::from(result.face_count());
        self.masks += u64::from(result.mask_count());
        self.violations += u64::from(result.no_mask_count());
    }

    fn summary(&self) -> Summary {
        Summary {
            total_detections: self.detections,
            total_faces: self.faces,
            total_masks: self.masks,
            total_violations: self.violations,
            mask_rate: rate(self.masks, self.faces),
            violation_rate: rate(self.violations, self.faces),
        }
    }
}

/// `part / total * 100`, rounded to 2 decimals; 0 for an empty total.
pub(crate) fn rate(part: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (part as f64 / total as f64 * 10_000.0).round() / 100.0
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub total_detections: u64,
    pub total_faces: u64,
    pub total_masks: u64,
    pub total_violations: u64,
    pub mask_rate: f64,
    pub violation_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceBreakdown {
    pub source_id: String,
    pub name: String,
    #[serde(flatten)]
    pub summary: Summary,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HourlyBreakdown {
    /// Hour of day, 0-23 UTC
    pub hour: u32,
    #[serde(flatten)]
    pub summary: Summary,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AlertBreakdown {
    pub total: u64,
    pub by_kind: BTreeMap<String, u64>,
    pub by_severity: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalyticsSnapshot {
    pub period: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub summary: Summary,
    /// Ordered by source id
    pub sources: Vec<SourceBreakdown>,
    /// Ordered by hour, only hours with data
    pub hourly: Vec<HourlyBreakdown>,
    pub alerts: AlertBreakdown,
    pub computed_at: DateTime<Utc>,
}

impl AnalyticsSnapshot {
    pub(crate) fn compute(
        period: String,
        (start, end): (DateTime<Utc>, DateTime<Utc>),
        results: &[DetectionResult],
        alerts: &[Alert],
        names: &HashMap<String, String>,
        computed_at: DateTime<Utc>,
    ) -> Self {
        let mut total = Tally::default();
        let mut per_source: BTreeMap<&str, Tally> = BTreeMap::new();
        let mut per_hour: BTreeMap<u32, Tally> = BTreeMap::new();

        for result in results {
            total.add(result);
            per_source.entry(result.source_id()).or_default().add(result);
            per_hour.entry(result.timestamp().hour()).or_default().add(result);
        }

        let sources = per_source
            .into_iter()
            .map(|(id, tally)| SourceBreakdown {
                source_id: id.to_string(),
                name: names.get(id).cloned().unwrap_or_else(|| "Unknown".into()),
                summary: tally.summary(),
            })
            .collect();

        let hourly = per_hour
            .into_iter()
            .map(|(hour, tally)| HourlyBreakdown {
                hour,
                summary: tally.summary(),
            })
            .collect();

        let mut breakdown = AlertBreakdown::default();
        for alert in alerts {
            breakdown.total += 1;
            *breakdown.by_kind.entry(alert.kind.to_string()).or_default() += 1;
            *breakdown
                .by_severity
                .entry(alert.severity.to_string())
                .or_default() += 1;
        }

        Self {
            period,
            start,
            end,
            summary: total.summary(),
            sources,
            hourly,
            alerts: breakdown,
            computed_at,
        }
    }

    pub fn export(&self, format: ExportFormat) -> Result<String, AnalyticsError> {
        match format {
            ExportFormat::Json => Ok(serde_json::to_string_pretty(self)?),
            ExportFormat::Csv => Ok(self.to_csv()),
        }
    }

    /// Summary metrics, then one row per source.
    fn to_csv(&self) -> String {
        let s = &self.summary;
        let mut out = String::from("metric,value\n");
        let _ = writeln!(out, "period,{}", csv_field(&self.period));
        let _ = writeln!(out, "total_detections,{}", s.total_detections);
        let _ = writeln!(out, "total_faces,{}", s.total_faces);
        let _ = writeln!(out, "total_masks,{}", s.total_masks);
        let _ = writeln!(out, "total_violations,{}", s.total_violations);
        let _ = writeln!(out, "mask_rate,{}", s.mask_rate);
        let _ = writeln!(out, "violation_rate,{}", s.violation_rate);
        let _ = writeln!(out, "alerts,{}", self.alerts.total);

        out.push_str("\nsource_id,name,detections,faces,masks,violations,mask_rate,violation_rate\n");
        for source in &self.sources {
            let s = &source.summary;
            let _ = writeln!(
                out,
                "{},{},{},{},{},{},{},{}",
                csv_field(&source.source_id),
                csv_field(&source.name),
                s.total_detections,
                s.total_faces,
                s.total_masks,
                s.total_violations,
                s.mask_rate,
                s.violation_rate
            );
        }
        out
    }
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Csv,
}

impl FromStr for ExportFormat {
    type Err = AnalyticsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            other => Err(AnalyticsError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// One calendar day (UTC) of a trend series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyTrend {
    pub date: NaiveDate,
    #[serde(flatten)]
    pub summary: Summary,
}

pub(crate) fn daily_trends(results: &[DetectionResult]) -> Vec<DailyTrend> {
    let mut per_day: BTreeMap<NaiveDate, Tally> = BTreeMap::new();
    for result in results {
        per_day
            .entry(result.timestamp().date_naive())
            .or_default()
            .add(result);
    }
    per_day
        .into_iter()
        .map(|(date, tally)| DailyTrend {
            date,
            summary: tally.summary(),
        })
        .collect()
}

/// Recent activity over a fixed trailing window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivitySummary {
    pub window_secs: u64,
    pub detections: u64,
    /// Mean aggregate confidence, 2 decimals
    pub average_confidence: f64,
    pub alerts: u64,
}

impl ActivitySummary {
    pub(crate) fn compute(window_secs: u64, results: &[DetectionResult], alerts: usize) -> Self {
        let average_confidence = if results.is_empty() {
            0.0
        } else {
            let sum: f64 = results.iter().map(|r| f64::from(r.confidence())).sum();
            (sum / results.len() as f64 * 100.0).round() / 100.0
        };
        Self {
            window_secs,
            detections: results.len() as u64,
            average_confidence,
            alerts: alerts as u64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use maskvakt_core::alert::{AlertKind, Severity};
    use maskvakt_core::detection::{BoundingBox, FaceDetection, MaskLabel};
    use proptest::prelude::*;

    fn result(source: &str, hour: u32, labels: &[MaskLabel]) -> DetectionResult {
        let faces = labels
            .iter()
            .map(|&label| FaceDetection::new(BoundingBox::new(0, 0, 4, 4), label, 0.9))
            .collect();
        DetectionResult::from_faces(
            source,
            Utc.with_ymd_and_hms(2024, 3, 10, hour, 5, 0).unwrap(),
            faces,
        )
    }

    fn compute(results: &[DetectionResult], alerts: &[Alert]) -> AnalyticsSnapshot {
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 23, 0, 0).unwrap();
        let names = HashMap::from([("cam1".to_string(), "Main Entrance".to_string())]);
        AnalyticsSnapshot::compute("today".into(), (now, now), results, alerts, &names, now)
    }

    #[test]
    fn zero_faces_give_zero_rates() {
        let snapshot = compute(&[result("cam1", 9, &[])], &[]);
        assert_eq!(snapshot.summary.total_detections, 1);
        assert_eq!(snapshot.summary.total_faces, 0);
        assert_eq!(snapshot.summary.mask_rate, 0.0);
        assert_eq!(snapshot.summary.violation_rate, 0.0);
    }

    #[test]
    fn breakdowns_are_sorted() {
        use MaskLabel::*;
        let snapshot = compute(
            &[
                result("cam2", 14, &[Mask, NoMask]),
                result("cam1", 9, &[Mask, Mask, NoMask]),
                result("cam1", 14, &[Unknown]),
            ],
            &[],
        );
        assert_eq!(snapshot.summary.total_faces, 6);
        assert_eq!(snapshot.summary.mask_rate, 50.0);
        assert_eq!(snapshot.summary.violation_rate, 33.33);

        let ids: Vec<&str> = snapshot.sources.iter().map(|s| s.source_id.as_str()).collect();
        assert_eq!(ids, vec!["cam1", "cam2"]);
        assert_eq!(snapshot.sources[0].name, "Main Entrance");
        assert_eq!(snapshot.sources[1].name, "Unknown");

        let hours: Vec<u32> = snapshot.hourly.iter().map(|h| h.hour).collect();
        assert_eq!(hours, vec![9, 14]);
        assert_eq!(snapshot.hourly[1].summary.total_detections, 2);
    }

    #[test]
    fn alerts_are_grouped_by_kind_and_severity() {
        let at = Utc.with_ymd_and_hms(2024, 3, 10, 9, 0, 0).unwrap();
        let alerts = [
            Alert::new(AlertKind::Violation, "cam1", Severity::High, "", at),
            Alert::new(AlertKind::Violation, "cam2", Severity::High, "", at),
            Alert::new(AlertKind::Camera, "cam3", Severity::Medium, "", at),
        ];
        let snapshot = compute(&[], &alerts);
        assert_eq!(snapshot.alerts.total, 3);
        assert_eq!(snapshot.alerts.by_kind["violation"], 2);
        assert_eq!(snapshot.alerts.by_kind["camera"], 1);
        assert_eq!(snapshot.alerts.by_severity["high"], 2);
    }

    #[test]
    fn csv_export_has_summary_and_sources() {
        use MaskLabel::*;
        let snapshot = compute(&[result("cam1", 9, &[Mask, NoMask])], &[]);
        let csv = snapshot.export(ExportFormat::Csv).unwrap();
        assert!(csv.starts_with("metric,value\nperiod,today\n"));
        assert!(csv.contains("mask_rate,50\n"));
        assert!(csv.contains("cam1,Main Entrance,1,2,1,1,50,50\n"));

        let json: serde_json::Value =
            serde_json::from_str(&snapshot.export(ExportFormat::Json).unwrap()).unwrap();
        assert_eq!(json["summary"]["total_faces"], 2);
        assert_eq!(json["sources"][0]["mask_rate"], 50.0);
    }

    #[test]
    fn export_format_parsing() {
        assert_eq!("CSV".parse::<ExportFormat>().unwrap(), ExportFormat::Csv);
        assert!(matches!(
            "xml".parse::<ExportFormat>(),
            Err(AnalyticsError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn trends_are_grouped_by_day() {
        let day = |d: u32| {
            DetectionResult::from_faces(
                "cam1",
                Utc.with_ymd_and_hms(2024, 3, d, 12, 0, 0).unwrap(),
                vec![FaceDetection::new(BoundingBox::new(0, 0, 1, 1), MaskLabel::NoMask, 0.8)],
            )
        };
        let trends = daily_trends(&[day(5), day(3), day(5)]);
        assert_eq!(trends.len(), 2);
        assert_eq!(trends[0].date, NaiveDate::from_ymd_opt(2024, 3, 3).unwrap());
        assert_eq!(trends[1].summary.total_violations, 2);
        assert_eq!(trends[1].summary.violation_rate, 100.0);
    }

    proptest! {
        #[test]
        fn rates_stay_within_bounds(part in 0u64..10_000, extra in 0u64..10_000) {
            let r = rate(part, part + extra);
            prop_assert!((0.0..=100.0).contains(&r));
        }
    }
}
