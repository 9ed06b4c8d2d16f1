use std::collections::BTreeMap;
use std::fmt::Write;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::coordinator::RunReport;
use crate::session::FinishReason;
use surge_core::{LatencySummary, RunConfig};

/// End-of-run summary. Built once every session has settled.
#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub target: String,
    pub clients: usize,
    pub connected: u64,
    pub failed: u64,
    pub messages_received: u64,
    pub errors: u64,
    pub abandoned: usize,
    pub finish_reasons: BTreeMap<FinishReason, usize>,
    /// `None` when no payload carried a usable timestamp.
    pub latency: Option<LatencySummary>,
    pub started_at: DateTime<Utc>,
    pub duration_secs: f64,
    pub messages_per_sec: f64,
}

impl Summary {
    pub fn collect(config: &RunConfig, report: &RunReport) -> Self {
        let mut finish_reasons = BTreeMap::new();
        for outcome in &report.outcomes {
            *finish_reasons.entry(outcome.reason).or_insert(0) += 1;
        }

        let duration_secs = report.metrics.elapsed_secs;
        let messages_per_sec = if duration_secs > 0.0 {
            report.metrics.messages_received as f64 / duration_secs
        } else {
            0.0
        };

        Self {
            target: config.address.clone(),
            clients: config.clients,
            connected: report.metrics.connected_clients,
            failed: report.metrics.failed_clients,
            messages_received: report.metrics.messages_received,
            errors: report.metrics.errors,
            abandoned: report.abandoned,
            finish_reasons,
            latency: report.latency.clone(),
            started_at: report.metrics.started_at,
            duration_secs,
            messages_per_sec,
        }
    }
}

pub trait Reporter {
    fn render(&self, summary: &Summary) -> anyhow::Result<String>;
}

pub struct HumanReporter;

impl Reporter for HumanReporter {
    fn render(&self, summary: &Summary) -> anyhow::Result<String> {
        let mut out = String::new();
        writeln!(out, "Load test complete")?;
        writeln!(out, "====================")?;
        writeln!(out, "Target URL:      {}", summary.target)?;
        writeln!(
            out,
            "Started at:      {}",
            summary.started_at.format("%Y-%m-%d %H:%M:%S UTC")
        )?;
        writeln!(out, "Clients:         {}", summary.clients)?;
        writeln!(out, "Connected:       {}", summary.connected)?;
        writeln!(out, "Failed:          {}", summary.failed)?;
        writeln!(out, "Messages recv:   {}", summary.messages_received)?;
        writeln!(out, "Errors:          {}", summary.errors)?;
        writeln!(out, "Throughput:      {:.1} msg/s", summary.messages_per_sec)?;
        match &summary.latency {
            Some(latency) => {
                writeln!(out, "Latency avg:     {:.1} ms", latency.avg_ms)?;
                writeln!(
                    out,
                    "Latency p50/p90/p99: {:.1} / {:.1} / {:.1} ms",
                    latency.p50_ms, latency.p90_ms, latency.p99_ms
                )?;
                writeln!(
                    out,
                    "Latency min/max: {:.1} / {:.1} ms",
                    latency.min_ms, latency.max_ms
                )?;
                writeln!(
                    out,
                    "Latency samples: {} recorded, {} retained",
                    latency.count, latency.retained_samples
                )?;
            }
            None => writeln!(out, "Latency:         n/a (no timestamp field in payloads)")?,
        }
        if !summary.finish_reasons.is_empty() {
            let reasons: Vec<String> = summary
                .finish_reasons
                .iter()
                .map(|(reason, count)| format!("{}={}", reason_name(*reason), count))
                .collect();
            writeln!(out, "Finished by:     {}", reasons.join(", "))?;
        }
        if summary.abandoned > 0 {
            writeln!(out, "Abandoned:       {}", summary.abandoned)?;
        }
        write!(out, "Duration (wall): {:.1}s", summary.duration_secs)?;
        Ok(out)
    }
}

pub struct JsonReporter;

impl Reporter for JsonReporter {
    fn render(&self, summary: &Summary) -> anyhow::Result<String> {
        Ok(serde_json::to_string_pretty(summary)?)
    }
}

fn reason_name(reason: FinishReason) -> &'static str {
    match reason {
        FinishReason::MessageCap => "message_cap",
        FinishReason::ProtocolError => "protocol_error",
        FinishReason::TransportError => "transport_error",
        FinishReason::Disconnected => "disconnected",
        FinishReason::Timeout => "timeout",
        FinishReason::ConnectFailed => "connect_failed",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionOutcome;
    use chrono::TimeZone;
    use surge_core::MetricsSnapshot;

    fn report(latency: Option<LatencySummary>) -> RunReport {
        RunReport {
            metrics: MetricsSnapshot {
                connected_clients: 4,
                failed_clients: 1,
                messages_received: 200,
                errors: 1,
                started_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap(),
                elapsed_secs: 10.0,
            },
            latency,
            outcomes: vec![
                SessionOutcome {
                    client_id: "a".into(),
                    messages: 0,
                    reason: FinishReason::ConnectFailed,
                },
                SessionOutcome {
                    client_id: "b".into(),
                    messages: 100,
                    reason: FinishReason::Timeout,
                },
                SessionOutcome {
                    client_id: "c".into(),
                    messages: 100,
                    reason: FinishReason::Timeout,
                },
            ],
            abandoned: 0,
        }
    }

    #[test]
    fn test_human_report_without_latency() {
        let summary = Summary::collect(&RunConfig::default(), &report(None));
        assert_eq!(summary.messages_per_sec, 20.0);
        assert_eq!(summary.finish_reasons[&FinishReason::Timeout], 2);

        let text = HumanReporter.render(&summary).unwrap();
        assert!(text.contains("Connected:       4"));
        assert!(text.contains("Failed:          1"));
        assert!(text.contains("Started at:      2024-05-01 12:30:00 UTC"));
        assert!(text.contains("Latency:         n/a (no timestamp field in payloads)"));
        assert!(text.contains("Finished by:     timeout=2, connect_failed=1"));
        assert!(!text.contains("NaN"));
        assert!(!text.contains("Abandoned"));
    }

    #[test]
    fn test_human_report_with_latency() {
        let latency = LatencySummary {
            count: 5,
            retained_samples: 5,
            avg_ms: 30.0,
            min_ms: 10.0,
            max_ms: 50.0,
            p50_ms: 30.0,
            p90_ms: 50.0,
            p99_ms: 50.0,
        };
        let summary = Summary::collect(&RunConfig::default(), &report(Some(latency)));
        let text = HumanReporter.render(&summary).unwrap();
        assert!(text.contains("Latency avg:     30.0 ms"));
        assert!(text.contains("Latency p50/p90/p99: 30.0 / 50.0 / 50.0 ms"));
        assert!(text.contains("Latency min/max: 10.0 / 50.0 ms"));
    }

    #[test]
    fn test_json_report() {
        let summary = Summary::collect(&RunConfig::default(), &report(None));
        let rendered = JsonReporter.render(&summary).unwrap();
        let value: serde_json::Value = serde_json::from_str(&rendered).unwrap();
        assert_eq!(value["connected"], 4);
        assert_eq!(value["failed"], 1);
        assert!(value["latency"].is_null());
        assert_eq!(value["started_at"], "2024-05-01T12:30:00Z");
        assert_eq!(value["finish_reasons"]["timeout"], 2);
        assert_eq!(value["finish_reasons"]["connect_failed"], 1);
    }
}
