//! Wire records for the collector protocol
//!
//! Every record is transmitted once and never mutated afterwards. The
//! `analysis_data` and `metadata` fields are JSON-encoded strings rather
//! than nested objects because the collector stores them opaquely.

use crate::models::MetricsSnapshot;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Response from the customer check endpoint
#[derive(Debug, Deserialize)]
pub struct CustomerCheckResponse {
    #[serde(default)]
    pub exists: bool,
    #[serde(default)]
    pub customer_id: Option<String>,
}

/// Response from the service check endpoint
#[derive(Debug, Deserialize)]
pub struct ServiceCheckResponse {
    #[serde(default)]
    pub exists: bool,
    #[serde(default)]
    pub service_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateCustomerRequest {
    pub id: String,
    pub name: String,
    pub api_key: String,
}

#[derive(Debug, Serialize)]
pub struct CreateServiceRequest {
    pub id: String,
    pub customer_id: String,
    pub name: String,
    pub status: String,
}

/// Severity-scored alert derived from one log line
#[derive(Debug, Clone, Serialize)]
pub struct AlertRecord {
    pub id: String,
    pub customer_id: String,
    pub service_id: String,
    pub timestamp: DateTime<Utc>,
    pub alert_text: String,
    pub severity: f64,
    pub status: String,
    pub fingerprint: String,
}

/// Incident referencing the alert it was raised from
#[derive(Debug, Clone, Serialize)]
pub struct IncidentRecord {
    pub id: String,
    pub customer_id: String,
    pub alert_id: String,
    pub summary: String,
    pub score: f64,
    pub status: String,
    /// Always null at creation, filled in by collector-side tooling
    pub google_doc_url: Option<String>,
    pub is_alert_sent: bool,
}

#[derive(Debug, Serialize)]
pub struct IncidentAnalysisRecord {
    pub id: String,
    pub incident_id: String,
    /// JSON-encoded [`AnalysisPayload`]
    pub analysis_data: String,
}

/// Context stored alongside an incident for later inspection
#[derive(Debug, Serialize)]
pub struct AnalysisPayload<'a> {
    pub log_entry: &'a str,
    pub system_metrics: &'a MetricsSnapshot,
    pub processor: &'static str,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogRecord {
    pub id: String,
    pub customer_id: String,
    pub service_id: String,
    pub timestamp: DateTime<Utc>,
    pub level: String,
    pub message: String,
    /// JSON-encoded [`LogMetadata`]
    pub metadata: String,
}

#[derive(Debug, Serialize)]
pub struct LogBatch {
    pub logs: Vec<LogRecord>,
}

/// Metadata attached to each forwarded log entry
#[derive(Debug, Serialize)]
pub struct LogMetadata<'a> {
    pub system_metrics: &'a MetricsSnapshot,
    pub source: &'static str,
}

/// One named measurement for collector-side dashboard queries
#[derive(Debug, Clone, Serialize)]
pub struct MetricPoint {
    pub id: String,
    pub customer_id: String,
    pub service_id: String,
    pub timestamp: DateTime<Utc>,
    pub name: String,
    pub value: f64,
    pub unit: String,
    pub category: String,
}

#[derive(Debug, Serialize)]
pub struct MetricBatch {
    pub metrics: Vec<MetricPoint>,
}

/// Expand a snapshot into the fixed set of individually-named points
///
/// Byte-valued metrics are converted to MB/GB and durations to hours so
/// the dashboard can chart them without unit handling of its own.
pub fn metric_points(
    customer_id: &str,
    service_id: &str,
    timestamp: DateTime<Utc>,
    snapshot: &MetricsSnapshot,
) -> Vec<MetricPoint> {
    let point = |name: &str, value: f64, unit: &str| MetricPoint {
        id: Uuid::new_v4().to_string(),
        customer_id: customer_id.to_string(),
        service_id: service_id.to_string(),
        timestamp,
        name: name.to_string(),
        value,
        unit: unit.to_string(),
        category: "system".to_string(),
    };

    vec![
        point("cpu_percent", snapshot.cpu.percent, "%"),
        point("cpu_count", snapshot.cpu.core_count as f64, "cores"),
        point("load_average_1m", snapshot.cpu.load_average[0], "avg"),
        point("memory_percent", snapshot.memory.percent, "%"),
        point("memory_used_mb", to_mb(snapshot.memory.used_bytes), "MB"),
        point(
            "memory_available_mb",
            to_mb(snapshot.memory.available_bytes),
            "MB",
        ),
        point("disk_percent", snapshot.disk.percent, "%"),
        point("disk_used_gb", to_gb(snapshot.disk.used_bytes), "GB"),
        point("disk_free_gb", to_gb(snapshot.disk.free_bytes), "GB"),
        point(
            "network_bytes_sent",
            snapshot.network.bytes_sent as f64,
            "bytes",
        ),
        point(
            "network_bytes_recv",
            snapshot.network.bytes_recv as f64,
            "bytes",
        ),
        point(
            "network_connections",
            snapshot.network.connection_count as f64,
            "count",
        ),
        point("process_count", snapshot.system.process_count as f64, "count"),
        point(
            "uptime_hours",
            round2(snapshot.system.uptime_seconds as f64 / 3600.0),
            "hours",
        ),
    ]
}

fn to_mb(bytes: u64) -> f64 {
    round2(bytes as f64 / (1024.0 * 1024.0))
}

fn to_gb(bytes: u64) -> f64 {
    round2(bytes as f64 / (1024.0 * 1024.0 * 1024.0))
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_points_cover_every_subsystem() {
        let snapshot = MetricsSnapshot::fixture();
        let points = metric_points("cust-1", "svc-1", Utc::now(), &snapshot);

        let names: Vec<&str> = points.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "cpu_percent",
                "cpu_count",
                "load_average_1m",
                "memory_percent",
                "memory_used_mb",
                "memory_available_mb",
                "disk_percent",
                "disk_used_gb",
                "disk_free_gb",
                "network_bytes_sent",
                "network_bytes_recv",
                "network_connections",
                "process_count",
                "uptime_hours",
            ]
        );
        assert!(points.iter().all(|p| p.category == "system"));
        assert!(points.iter().all(|p| p.customer_id == "cust-1"));
        assert!(points.iter().all(|p| !p.id.is_empty()));
    }

    #[test]
    fn test_metric_point_unit_conversions() {
        let snapshot = MetricsSnapshot::fixture();
        let points = metric_points("c", "s", Utc::now(), &snapshot);
        let value = |name: &str| {
            points
                .iter()
                .find(|p| p.name == name)
                .map(|p| p.value)
                .unwrap()
        };

        // 3 GiB used memory reported in MB, 60 GiB used disk in GB
        assert_eq!(value("memory_used_mb"), 3072.0);
        assert_eq!(value("disk_used_gb"), 60.0);
        // 7200 seconds of uptime is two hours
        assert_eq!(value("uptime_hours"), 2.0);
        assert_eq!(value("cpu_count"), 4.0);
    }

    #[test]
    fn test_rounding_to_two_decimals() {
        assert_eq!(round2(1.005), 1.0);
        assert_eq!(round2(2.3456), 2.35);
        assert_eq!(to_mb(1_572_864), 1.5);
    }

    #[test]
    fn test_incident_record_serializes_null_doc_url() {
        let record = IncidentRecord {
            id: "i-1".to_string(),
            customer_id: "c-1".to_string(),
            alert_id: "a-1".to_string(),
            summary: "ERROR: boom".to_string(),
            score: 8.0,
            status: "open".to_string(),
            google_doc_url: None,
            is_alert_sent: false,
        };

        let value = serde_json::to_value(&record).unwrap();
        assert!(value["google_doc_url"].is_null());
        assert_eq!(value["is_alert_sent"], serde_json::json!(false));
        assert_eq!(value["score"], serde_json::json!(8.0));
    }

    #[test]
    fn test_log_batch_wraps_records() {
        let metadata = serde_json::to_string(&LogMetadata {
            system_metrics: &MetricsSnapshot::fixture(),
            source: "streaming_forwarder",
        })
        .unwrap();
        let batch = LogBatch {
            logs: vec![LogRecord {
                id: "l-1".to_string(),
                customer_id: "c-1".to_string(),
                service_id: "s-1".to_string(),
                timestamp: Utc::now(),
                level: "INFO".to_string(),
                message: "hello".to_string(),
                metadata,
            }],
        };

        let value = serde_json::to_value(&batch).unwrap();
        assert_eq!(value["logs"].as_array().unwrap().len(), 1);
        // Metadata round-trips as a JSON string, not a nested object
        let inner: serde_json::Value =
            serde_json::from_str(value["logs"][0]["metadata"].as_str().unwrap()).unwrap();
        assert_eq!(inner["source"], "streaming_forwarder");
        assert!(inner["system_metrics"]["cpu"]["percent"].is_number());
    }

    #[test]
    fn test_check_responses_tolerate_missing_fields() {
        let check: CustomerCheckResponse = serde_json::from_str("{}").unwrap();
        assert!(!check.exists);
        assert!(check.customer_id.is_none());

        let check: ServiceCheckResponse =
            serde_json::from_str(r#"{"exists": true, "service_id": "svc-9"}"#).unwrap();
        assert!(check.exists);
        assert_eq!(check.service_id.as_deref(), Some("svc-9"));
    }
}
