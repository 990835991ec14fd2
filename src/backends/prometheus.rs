//! Prometheus adapter.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;

use super::table::{col, Column, Table};
use super::{AdapterResult, Backend, BackendError, ErrorKind, Target};
use crate::config::PrometheusConfig;
use crate::error::{Error, Result};

/// Expression selecting currently firing alerts.
pub const FIRING_ALERTS: &str = r#"ALERTS{alertstate="firing"}"#;

pub const DEFAULT_DURATION: &str = "1h";

/// Points requested for a range query.
const RANGE_POINTS: i64 = 60;

const SERIES_COLUMNS: [Column; 2] = [col("SERIES", 60), col("VALUE", 16)];

const TARGET_COLUMNS: [Column; 3] = [col("JOB", 24), col("INSTANCE", 32), col("STATE", 5)];

/// One instant-vector sample.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sample {
    pub labels: BTreeMap<String, String>,
    pub value: String,
}

impl Sample {
    /// `name{k="v", ...}`, the way Prometheus prints series.
    pub fn series_name(&self) -> String {
        let name = self.labels.get("__name__").cloned().unwrap_or_default();
        let labels = self
            .labels
            .iter()
            .filter(|(k, _)| k.as_str() != "__name__")
            .map(|(k, v)| format!("{}=\"{}\"", k, v))
            .collect::<Vec<_>>()
            .join(", ");
        if labels.is_empty() {
            if name.is_empty() { "{}".to_string() } else { name }
        } else {
            format!("{}{{{}}}", name, labels)
        }
    }
}

/// One range-vector series.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct Series {
    pub labels: BTreeMap<String, String>,
    /// (unix seconds, value)
    pub points: Vec<(f64, String)>,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    status: String,
    #[serde(default)]
    data: Option<ApiData>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default, rename = "errorType")]
    error_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiData {
    #[serde(default)]
    result: Vec<ApiSeries>,
}

#[derive(Debug, Deserialize)]
struct ApiSeries {
    #[serde(default)]
    metric: BTreeMap<String, String>,
    #[serde(default)]
    value: Option<(f64, String)>,
    #[serde(default)]
    values: Vec<(f64, String)>,
}

/// Operations chatops needs from a metrics store.
#[async_trait]
pub trait MetricsApi: Send + Sync {
    async fn query(&self, expr: &str) -> std::result::Result<Vec<Sample>, BackendError>;
    async fn query_range(
        &self,
        expr: &str,
        duration: &str,
    ) -> std::result::Result<Vec<Series>, BackendError>;
}

/// HTTP client for the Prometheus query API.
pub struct PrometheusClient {
    client: Client,
    base_url: String,
}

impl PrometheusClient {
    pub fn new(config: &PrometheusConfig, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::config(format!("Failed to build Prometheus HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
        })
    }

    async fn call(&self, path: &str, params: &[(&str, String)]) -> std::result::Result<Vec<ApiSeries>, BackendError> {
        let response = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .query(params)
            .send()
            .await?;
        let status = response.status();
        // Prometheus reports bad expressions as 400/422 with a JSON error body.
        let body: ApiResponse = response.json().await.map_err(|e| {
            if status.is_success() {
                BackendError::unexpected(format!("unreadable Prometheus response: {}", e))
            } else {
                BackendError::new(ErrorKind::from_status(status.as_u16()), status.to_string())
            }
        })?;

        if body.status != "success" {
            let detail = format!(
                "{}: {}",
                body.error_type.as_deref().unwrap_or("error"),
                body.error.as_deref().unwrap_or("unknown error")
            );
            return Err(BackendError::new(ErrorKind::Api { status: status.as_u16() }, detail));
        }
        Ok(body.data.map(|d| d.result).unwrap_or_default())
    }
}

/// Parse a Prometheus duration (`30s`, `5m`, `1h`, `7d`, `2w`, `1y`) into seconds.
pub fn parse_duration(s: &str) -> Option<i64> {
    let (idx, _) = s.char_indices().last()?;
    let (digits, unit) = s.split_at(idx);
    let n: i64 = digits.parse().ok().filter(|n| *n > 0)?;
    let factor = match unit {
        "s" => 1,
        "m" => 60,
        "h" => 3_600,
        "d" => 86_400,
        "w" => 604_800,
        "y" => 31_536_000,
        _ => return None,
    };
    n.checked_mul(factor)
}

#[async_trait]
impl MetricsApi for PrometheusClient {
    async fn query(&self, expr: &str) -> std::result::Result<Vec<Sample>, BackendError> {
        let result = self.call("/api/v1/query", &[("query", expr.to_string())]).await?;
        Ok(result
            .into_iter()
            .map(|s| Sample {
                labels: s.metric,
                value: s.value.map(|(_, v)| v).unwrap_or_default(),
            })
            .collect())
    }

    async fn query_range(&self, expr: &str, duration: &str) -> std::result::Result<Vec<Series>, BackendError> {
        let seconds = parse_duration(duration)
            .ok_or_else(|| BackendError::new(ErrorKind::Api { status: 400 }, format!("invalid duration {}", duration)))?;
        let end = Utc::now().timestamp();
        let start = end - seconds;
        let step = (seconds / RANGE_POINTS).max(1);
        let params = [
            ("query", expr.to_string()),
            ("start", start.to_string()),
            ("end", end.to_string()),
            ("step", step.to_string()),
        ];
        let result = self.call("/api/v1/query_range", &params).await?;
        Ok(result
            .into_iter()
            .map(|s| Series {
                labels: s.metric,
                points: s.values,
            })
            .collect())
    }
}

/// Names of currently firing alerts. Errors stay classified for the caller.
pub async fn firing_alerts(api: &dyn MetricsApi) -> std::result::Result<Vec<String>, BackendError> {
    let samples = api.query(FIRING_ALERTS).await?;
    Ok(samples
        .into_iter()
        .map(|s| s.labels.get("alertname").cloned().unwrap_or_else(|| "unnamed".to_string()))
        .collect())
}

/// Run an instant query, normalizing failures.
pub async fn fetch(api: &dyn MetricsApi, expr: &str) -> std::result::Result<Vec<Sample>, AdapterResult> {
    let target = Target::new(Backend::Prometheus, "evaluate", "query", expr);
    api.query(expr).await.map_err(|e| target.failure(e))
}

/// Run a range query, normalizing failures.
pub async fn fetch_range(
    api: &dyn MetricsApi,
    expr: &str,
    duration: &str,
) -> std::result::Result<Vec<Series>, AdapterResult> {
    let target = Target::new(Backend::Prometheus, "evaluate", "range query", expr);
    api.query_range(expr, duration).await.map_err(|e| target.failure(e))
}

/// Instant query as a table.
pub async fn query(api: &dyn MetricsApi, expr: &str) -> AdapterResult {
    let samples = match fetch(api, expr).await {
        Ok(s) => s,
        Err(failure) => return failure,
    };
    if samples.is_empty() {
        return AdapterResult::ok(format!("No series found for `{}`.", expr));
    }
    let mut table = Table::new(&SERIES_COLUMNS);
    for s in &samples {
        table.row([s.series_name(), s.value.clone()]);
    }
    AdapterResult::ok(format!("Result of `{}`:\n{}", expr, table.render()))
}

/// Scrape-target health (`up`).
pub async fn status(api: &dyn MetricsApi) -> AdapterResult {
    let samples = match fetch(api, "up").await {
        Ok(s) => s,
        Err(failure) => return failure,
    };
    if samples.is_empty() {
        return AdapterResult::ok("No scrape targets found.");
    }
    let down = samples.iter().filter(|s| s.value != "1").count();
    let mut table = Table::new(&TARGET_COLUMNS);
    for s in &samples {
        let state = if s.value == "1" { "UP" } else { "DOWN" };
        table.row([
            s.labels.get("job").cloned().unwrap_or_default(),
            s.labels.get("instance").cloned().unwrap_or_default(),
            state.to_string(),
        ]);
    }
    AdapterResult::ok(format!(
        "{} of {} scrape targets up:\n{}",
        samples.len() - down,
        samples.len(),
        table.render()
    ))
}

/// Currently firing alerts.
pub async fn alerts(api: &dyn MetricsApi) -> AdapterResult {
    let target = Target::new(Backend::Prometheus, "list", "alerts in state", "firing");
    match firing_alerts(api).await {
        Ok(names) if names.is_empty() => AdapterResult::ok("No alerts are firing."),
        Ok(names) => {
            let list = names.iter().map(|n| format!("• `{}`", n)).collect::<Vec<_>>().join("\n");
            AdapterResult::ok(format!("{} alert(s) firing:\n{}", names.len(), list))
        }
        Err(e) => target.failure(e),
    }
}
