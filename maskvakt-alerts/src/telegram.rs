//! ## maskvakt-alerts::telegram
//! **Chat destination over the Telegram Bot API**
//!
//! Alerts are sent with `sendMessage` as HTML, prefixed with severity and
//! kind markers.

use chrono::NaiveDate;
use maskvakt_config::TelegramConfig;
use maskvakt_core::alert::{Alert, AlertKind, Severity};
use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::error::NotifyError;
use crate::notifier::Notifier;

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

pub struct TelegramNotifier {
    client: Client,
    endpoint: String,
    chat_id: String,
}

impl TelegramNotifier {
    /// Fails when the bot is disabled or its credentials are missing.
    pub fn new(config: &TelegramConfig) -> Result<Self, NotifyError> {
        let (Some(token), Some(chat_id)) = (&config.bot_token, &config.chat_id) else {
            return Err(NotifyError::Unavailable(
                "telegram bot token or chat id not configured".into(),
            ));
        };
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| NotifyError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: format!(
                "{}/bot{}/sendMessage",
                config.api_base.trim_end_matches('/'),
                token
            ),
            chat_id: chat_id.clone(),
        })
    }

    /// Sends an arbitrary HTML message to the configured chat.
    pub fn send_message(&self, text: &str) -> Result<(), NotifyError> {
        let body = json!({
            "chat_id": self.chat_id,
            "text": text,
            "parse_mode": "HTML",
        });
        let response = self.client.post(&self.endpoint).json(&body).send()?;
        let status = response.status();
        let reply: ApiResponse = response.json().map_err(|e| NotifyError::Rejected {
            status: status.as_u16(),
            detail: e.to_string(),
        })?;
        if !status.is_success() || !reply.ok {
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
                detail: reply.description.unwrap_or_default(),
            });
        }
        debug!(chat_id = %self.chat_id, "Telegram message sent");
        Ok(())
    }
}

impl Notifier for TelegramNotifier {
    fn name(&self) -> &str {
        "telegram"
    }

    fn notify(&self, alert: &Alert) -> Result<(), NotifyError> {
        self.send_message(&format_alert(alert))
    }
}

fn severity_marker(severity: Severity) -> &'static str {
    match severity {
        Severity::Low => "ℹ️",
        Severity::Medium => "⚠️",
        Severity::High => "🚨",
        Severity::Critical => "💥",
    }
}

fn kind_marker(kind: AlertKind) -> &'static str {
    match kind {
        AlertKind::Violation => "🚨",
        AlertKind::System => "🔧",
        AlertKind::Camera => "📹",
    }
}

/// Escapes the three characters Telegram's HTML mode treats as markup.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            c => out.push(c),
        }
    }
    out
}

pub fn format_alert(alert: &Alert) -> String {
    format!(
        "{} {} <b>{} ALERT</b>\n\n{}\n\n<i>{} | {}</i>",
        severity_marker(alert.severity),
        kind_marker(alert.kind),
        alert.kind.as_str().to_uppercase(),
        escape_html(&alert.summary),
        escape_html(&alert.source_id),
        alert.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
    )
}

/// Per-camera line of the daily report.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraLine {
    pub name: String,
    pub detections: u64,
    pub violations: u64,
}

/// Figures for the once-a-day summary message.
#[derive(Debug, Clone, PartialEq)]
pub struct DailyReport {
    pub date: NaiveDate,
    pub total_detections: u64,
    pub total_violations: u64,
    pub active_cameras: usize,
    pub cameras: Vec<CameraLine>,
}

pub fn format_daily_report(report: &DailyReport) -> String {
    let mut text = format!(
        "📊 <b>Daily Report</b>\n\n📅 Date: {}\n\n📈 Total Detections: {}\n🚨 Total Violations: {}\n📹 Active Cameras: {}\n",
        report.date.format("%Y-%m-%d"),
        report.total_detections,
        report.total_violations,
        report.active_cameras,
    );
    if report.total_detections > 0 {
        let rate = report.total_violations as f64 / report.total_detections as f64 * 100.0;
        text.push_str(&format!("📊 Violation Rate: {rate:.1}%\n"));
    }
    if !report.cameras.is_empty() {
        text.push_str("\n📹 <b>Camera Breakdown:</b>\n");
        for camera in &report.cameras {
            text.push_str(&format!(
                "• {}: {} detections, {} violations\n",
                escape_html(&camera.name),
                camera.detections,
                camera.violations
            ));
        }
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::sync::mpsc;
    use std::thread;

    fn alert() -> Alert {
        Alert::new(
            AlertKind::Violation,
            "gate<1>",
            Severity::High,
            "Camera: Gate\nViolations: 2",
            Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap(),
        )
    }

    /// Answers one request and hands the raw request text back to the test.
    fn serve_once(status: &'static str, body: &'static str) -> (String, mpsc::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let (mut socket, _) = listener.accept().unwrap();
            let mut request = Vec::new();
            let mut chunk = [0u8; 4096];
            loop {
                let n = socket.read(&mut chunk).unwrap();
                request.extend_from_slice(&chunk[..n]);
                if n == 0 || request.ends_with(b"}") {
                    break;
                }
            }
            let response = format!(
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).unwrap();
            let _ = tx.send(String::from_utf8_lossy(&request).into_owned());
        });
        (format!("http://{addr}"), rx)
    }

    fn config(api_base: String) -> TelegramConfig {
        TelegramConfig {
            enabled: true,
            bot_token: Some("123:abc".into()),
            chat_id: Some("-1001".into()),
            api_base,
            ..TelegramConfig::default()
        }
    }

    #[test]
    fn formats_html_with_markers() {
        let text = format_alert(&alert());
        assert!(text.starts_with("🚨 🚨 <b>VIOLATION ALERT</b>\n\n"));
        assert!(text.contains("gate&lt;1&gt;"));
        assert!(text.contains("2024-03-01 12:30:00 UTC"));
    }

    #[test]
    fn daily_report_lists_cameras() {
        let text = format_daily_report(&DailyReport {
            date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            total_detections: 40,
            total_violations: 10,
            active_cameras: 2,
            cameras: vec![CameraLine {
                name: "Main Entrance".into(),
                detections: 40,
                violations: 10,
            }],
        });
        assert!(text.starts_with("📊 <b>Daily Report</b>"));
        assert!(text.contains("📅 Date: 2024-03-01"));
        assert!(text.contains("📊 Violation Rate: 25.0%"));
        assert!(text.contains("• Main Entrance: 40 detections, 10 violations"));
    }

    #[test]
    fn empty_day_has_no_rate_line() {
        let text = format_daily_report(&DailyReport {
            date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            total_detections: 0,
            total_violations: 0,
            active_cameras: 0,
            cameras: Vec::new(),
        });
        assert!(!text.contains("Violation Rate"));
        assert!(!text.contains("Camera Breakdown"));
    }

    #[test]
    fn missing_credentials_are_rejected() {
        let err = TelegramNotifier::new(&TelegramConfig::default()).err().unwrap();
        assert!(matches!(err, NotifyError::Unavailable(_)));
    }

    #[test]
    fn posts_to_send_message() {
        let (base, requests) = serve_once("200 OK", r#"{"ok":true,"result":{}}"#);
        let notifier = TelegramNotifier::new(&config(base)).unwrap();
        notifier.notify(&alert()).unwrap();

        let request = requests.recv().unwrap();
        assert!(request.starts_with("POST /bot123:abc/sendMessage"));
        assert!(request.contains(r#""parse_mode":"HTML""#));
        assert!(request.contains(r#""chat_id":"-1001""#));
    }

    #[test]
    fn api_refusal_is_a_failure() {
        let (base, _requests) = serve_once(
            "400 Bad Request",
            r#"{"ok":false,"description":"chat not found"}"#,
        );
        let notifier = TelegramNotifier::new(&config(base)).unwrap();
        match notifier.notify(&alert()) {
            Err(NotifyError::Rejected { status, detail }) => {
                assert_eq!(status, 400);
                assert_eq!(detail, "chat not found");
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }
}
