//! Collector wire protocol
//!
//! The client resolves its customer and service identities once at
//! construction with an ensure-or-create handshake, then turns each
//! (log line, snapshot) pair into four independent transmissions: an
//! alert, an incident with attached analysis, a log entry, and a batch
//! of named metric points. Identity resolution never fails outright;
//! when the collector is unreachable the client falls back to ids it
//! can derive locally and keeps operating.

mod records;
mod severity;

pub use records::{
    metric_points, AlertRecord, AnalysisPayload, CreateCustomerRequest, CreateServiceRequest,
    CustomerCheckResponse, IncidentAnalysisRecord, IncidentRecord, LogBatch, LogMetadata,
    LogRecord, MetricBatch, MetricPoint, ServiceCheckResponse,
};
pub use severity::{calculate_severity, extract_log_level, truncate_chars};

use crate::models::{CustomerIdentity, MetricsSnapshot, ServiceIdentity};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::time::Duration;
use tracing::{info, warn};
use url::Url;
use uuid::Uuid;

/// Fixed service name under which all forwarded logs are grouped
pub const STREAMING_SERVICE_NAME: &str = "StreamingLogService";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_ALERT_TEXT_CHARS: usize = 500;
const MAX_SUMMARY_CHARS: usize = 200;
const PROCESSOR_TAG: &str = "incident-forwarder";
const LOG_SOURCE_TAG: &str = "streaming_forwarder";

/// Destination for (log line, snapshot) pairs
#[async_trait]
pub trait IncidentSink: Send + Sync {
    async fn send_log_as_incident(&self, line: &str, snapshot: &MetricsSnapshot) -> bool;
}

pub struct RemoteIncidentClient {
    http: Client,
    base_url: Url,
    customer: CustomerIdentity,
    service: ServiceIdentity,
}

impl RemoteIncidentClient {
    /// Build the client and resolve both identities against the collector
    pub async fn connect(base_url: &str, customer_name: &str, api_key: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;
        // A trailing slash makes Url::join append instead of replace
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{base_url}/")
        };
        let base_url = Url::parse(&normalized).context("Invalid collector base URL")?;

        let mut client = Self {
            http,
            base_url,
            customer: CustomerIdentity {
                id: String::new(),
                name: customer_name.to_string(),
                api_key: api_key.to_string(),
            },
            service: ServiceIdentity {
                id: String::new(),
                name: STREAMING_SERVICE_NAME.to_string(),
            },
        };
        client.customer.id = client.resolve_customer_id().await;
        client.service.id = client.resolve_service_id().await;
        info!(
            customer_id = %client.customer.id,
            service_id = %client.service.id,
            "Collector identities resolved"
        );
        Ok(client)
    }

    pub fn customer(&self) -> &CustomerIdentity {
        &self.customer
    }

    pub fn service(&self) -> &ServiceIdentity {
        &self.service
    }

    /// Transmit one log line with its snapshot as four independent records
    ///
    /// Each transmission failure is logged and the remaining steps still
    /// run; the return value reports whether every attempted step was
    /// accepted and is used by callers for diagnostics only.
    pub async fn send_log_as_incident(&self, line: &str, snapshot: &MetricsSnapshot) -> bool {
        let mut delivered = true;

        let alert = self.alert_record(line);
        if let Err(e) = self.post_json("api/db/alert/create", &alert).await {
            warn!(error = %e, "Alert creation failed");
            delivered = false;
        }

        let incident = self.incident_record(&alert.id, line);
        match self.post_json("api/db/incident/create", &incident).await {
            Ok(()) => {
                // Analysis references the incident, so it only goes out
                // once the incident record has been accepted
                let analysis = self.analysis_record(&incident.id, line, snapshot);
                if let Err(e) = self
                    .post_json("api/db/incident/analysis/create", &analysis)
                    .await
                {
                    warn!(error = %e, "Incident analysis storage failed");
                    delivered = false;
                }
            }
            Err(e) => {
                warn!(error = %e, "Incident creation failed");
                delivered = false;
            }
        }

        let batch = self.log_batch(line, snapshot);
        if let Err(e) = self.post_json("api/db/logs/create", &batch).await {
            warn!(error = %e, "Log entry storage failed");
            delivered = false;
        }

        let metrics = MetricBatch {
            metrics: metric_points(&self.customer.id, &self.service.id, Utc::now(), snapshot),
        };
        if let Err(e) = self.post_json("api/db/metrics/create", &metrics).await {
            warn!(error = %e, "Metric batch storage failed");
            delivered = false;
        }

        delivered
    }

    async fn resolve_customer_id(&self) -> String {
        match self
            .get_json::<CustomerCheckResponse>(
                "api/db/customer/check",
                &[("api_key", self.customer.api_key.as_str())],
            )
            .await
        {
            Ok(check) if check.exists => {
                if let Some(id) = check.customer_id {
                    info!(customer_id = %id, "Found existing customer");
                    return id;
                }
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Customer check failed"),
        }

        let request = CreateCustomerRequest {
            id: Uuid::new_v4().to_string(),
            name: self.customer.name.clone(),
            api_key: self.customer.api_key.clone(),
        };
        match self.post_json("api/db/customer/create", &request).await {
            Ok(()) => {
                info!(customer_id = %request.id, "Customer created");
                request.id
            }
            Err(e) => {
                let fallback = fallback_customer_id(&self.customer.api_key);
                warn!(
                    error = %e,
                    customer_id = %fallback,
                    "Customer creation failed, using deterministic fallback id"
                );
                fallback
            }
        }
    }

    async fn resolve_service_id(&self) -> String {
        match self
            .get_json::<ServiceCheckResponse>(
                "api/db/service/check",
                &[
                    ("customer_id", self.customer.id.as_str()),
                    ("name", self.service.name.as_str()),
                ],
            )
            .await
        {
            Ok(check) if check.exists => {
                if let Some(id) = check.service_id {
                    info!(service_id = %id, "Found existing service");
                    return id;
                }
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Service check failed"),
        }

        let request = CreateServiceRequest {
            id: Uuid::new_v4().to_string(),
            customer_id: self.customer.id.clone(),
            name: self.service.name.clone(),
            status: "active".to_string(),
        };
        match self.post_json("api/db/service/create", &request).await {
            Ok(()) => {
                info!(service_id = %request.id, "Service created");
                request.id
            }
            Err(e) => {
                // Services have no stable natural key, so the best
                // fallback is a fresh id
                let fallback = Uuid::new_v4().to_string();
                warn!(error = %e, service_id = %fallback, "Service creation failed, using fresh id");
                fallback
            }
        }
    }

    fn alert_record(&self, line: &str) -> AlertRecord {
        AlertRecord {
            id: Uuid::new_v4().to_string(),
            customer_id: self.customer.id.clone(),
            service_id: self.service.id.clone(),
            timestamp: Utc::now(),
            alert_text: truncate_chars(line, MAX_ALERT_TEXT_CHARS).to_string(),
            severity: calculate_severity(line),
            status: "open".to_string(),
            fingerprint: fingerprint(&self.service.id, line),
        }
    }

    fn incident_record(&self, alert_id: &str, line: &str) -> IncidentRecord {
        IncidentRecord {
            id: Uuid::new_v4().to_string(),
            customer_id: self.customer.id.clone(),
            alert_id: alert_id.to_string(),
            summary: truncate_chars(line, MAX_SUMMARY_CHARS).to_string(),
            score: calculate_severity(line),
            status: "open".to_string(),
            google_doc_url: None,
            is_alert_sent: false,
        }
    }

    fn analysis_record(
        &self,
        incident_id: &str,
        line: &str,
        snapshot: &MetricsSnapshot,
    ) -> IncidentAnalysisRecord {
        let payload = AnalysisPayload {
            log_entry: line,
            system_metrics: snapshot,
            processor: PROCESSOR_TAG,
            timestamp: Utc::now(),
        };
        IncidentAnalysisRecord {
            id: Uuid::new_v4().to_string(),
            incident_id: incident_id.to_string(),
            analysis_data: serde_json::to_string(&payload).unwrap_or_default(),
        }
    }

    fn log_batch(&self, line: &str, snapshot: &MetricsSnapshot) -> LogBatch {
        let metadata = LogMetadata {
            system_metrics: snapshot,
            source: LOG_SOURCE_TAG,
        };
        LogBatch {
            logs: vec![LogRecord {
                id: Uuid::new_v4().to_string(),
                customer_id: self.customer.id.clone(),
                service_id: self.service.id.clone(),
                timestamp: Utc::now(),
                level: extract_log_level(line).to_string(),
                message: line.to_string(),
                metadata: serde_json::to_string(&metadata).unwrap_or_default(),
            }],
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid endpoint path")?;
        let response = self.http.get(url).query(query).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("API error ({}): {}", status, body);
        }
        response.json().await.context("Failed to parse response body")
    }

    async fn post_json<B: Serialize>(&self, path: &str, body: &B) -> Result<()> {
        let url = self.base_url.join(path).context("Invalid endpoint path")?;
        let response = self.http.post(url).json(body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("API error ({}): {}", status, body);
        }
        Ok(())
    }
}

#[async_trait]
impl IncidentSink for RemoteIncidentClient {
    async fn send_log_as_incident(&self, line: &str, snapshot: &MetricsSnapshot) -> bool {
        RemoteIncidentClient::send_log_as_incident(self, line, snapshot).await
    }
}

/// Deterministic customer id so the same api key maps to the same
/// customer across restarts even while the collector is unreachable
pub fn fallback_customer_id(api_key: &str) -> String {
    let digest = Sha256::digest(api_key.as_bytes());
    hex::encode(digest)[..16].to_string()
}

/// Short hash of (service id, log line) for collector-side dedup
pub fn fingerprint(service_id: &str, log_line: &str) -> String {
    let digest = Sha256::digest(format!("{service_id}:{log_line}").as_bytes());
    hex::encode(digest)[..16].to_string()
}
