//! Readiness probing and the health gate.
//!
//! A probe is an HTTP GET against a service's readiness URL. Success is a
//! 200 with an optional JSON body whose `status` field maps onto
//! [`HealthStatus`]; anything else is unhealthy. The gate polls the probe up
//! to a retry budget before a phase may proceed.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};
use url::Url;

/// Aggregated or per-service health reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Ready to serve.
    Healthy,
    /// Serving with reduced capability.
    Degraded,
    /// Not serving.
    Unhealthy,
    /// Probe answered but the status could not be interpreted.
    Unknown,
}

impl HealthStatus {
    /// snake_case name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Unhealthy => "unhealthy",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Map a 200 response body onto a health status.
///
/// The `status` field maps: ok/healthy/up → healthy; warning/degraded →
/// degraded; down/error/unhealthy → unhealthy. A missing or unparseable
/// body is healthy when empty (bare 200) and unknown otherwise.
#[must_use]
pub fn classify_body(body: &[u8]) -> HealthStatus {
    if body.is_empty() {
        return HealthStatus::Healthy;
    }
    let Ok(value) = serde_json::from_slice::<Value>(body) else {
        return HealthStatus::Unknown;
    };
    let Some(status) = value.get("status").and_then(Value::as_str) else {
        return HealthStatus::Unknown;
    };
    match status.to_lowercase().as_str() {
        "ok" | "healthy" | "up" => HealthStatus::Healthy,
        "warning" | "degraded" => HealthStatus::Degraded,
        "down" | "error" | "unhealthy" => HealthStatus::Unhealthy,
        _ => HealthStatus::Unknown,
    }
}

/// A readiness probe for named services.
#[async_trait]
pub trait ReadinessProbe: Send + Sync {
    /// Probe one service once.
    async fn check(&self, service: &str) -> HealthStatus;
}

/// HTTP readiness probe over per-service URLs.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: reqwest::Client,
    endpoints: BTreeMap<String, Url>,
    timeout: Duration,
}

impl HttpProbe {
    /// Probe the given readiness endpoints with a per-probe timeout.
    #[must_use]
    pub fn new(endpoints: BTreeMap<String, Url>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoints,
            timeout,
        }
    }
}

#[async_trait]
impl ReadinessProbe for HttpProbe {
    async fn check(&self, service: &str) -> HealthStatus {
        let Some(url) = self.endpoints.get(service) else {
            warn!(service, "No readiness endpoint configured");
            return HealthStatus::Unknown;
        };

        let response = self
            .client
            .get(url.clone())
            .timeout(self.timeout)
            .send()
            .await;

        match response {
            Ok(resp) if resp.status().is_success() => {
                let body = resp.bytes().await.unwrap_or_default();
                let status = classify_body(&body);
                debug!(service, %status, "Readiness probe answered");
                status
            }
            Ok(resp) => {
                debug!(service, code = resp.status().as_u16(), "Readiness probe rejected");
                HealthStatus::Unhealthy
            }
            Err(err) => {
                debug!(service, error = %err, "Readiness probe failed");
                HealthStatus::Unhealthy
            }
        }
    }
}

/// Poll a probe until the service is healthy or the retry budget runs out.
///
/// Total budget is `retries × interval`.
pub async fn wait_for_health(
    probe: &dyn ReadinessProbe,
    service: &str,
    retries: u32,
    interval: Duration,
) -> HealthStatus {
    let mut last = HealthStatus::Unknown;
    for attempt in 0..retries.max(1) {
        last = probe.check(service).await;
        if last == HealthStatus::Healthy {
            info!(service, attempt, "Service healthy");
            return last;
        }
        debug!(service, attempt, status = %last, "Service not healthy yet");
        if attempt + 1 < retries {
            tokio::time::sleep(interval).await;
        }
    }
    warn!(service, retries, status = %last, "Health gate exhausted");
    last
}

/// Aggregate per-service readings into a system status.
///
/// All healthy → healthy; some healthy → degraded; none healthy → unhealthy.
#[must_use]
pub fn aggregate(readings: &BTreeMap<String, HealthStatus>) -> HealthStatus {
    if readings.is_empty() {
        return HealthStatus::Unknown;
    }
    let healthy = readings
        .values()
        .filter(|s| **s == HealthStatus::Healthy)
        .count();
    if healthy == readings.len() {
        HealthStatus::Healthy
    } else if healthy > 0 {
        HealthStatus::Degraded
    } else {
        HealthStatus::Unhealthy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_status_mapping_follows_the_table() {
        assert_eq!(classify_body(br#"{"status": "ok"}"#), HealthStatus::Healthy);
        assert_eq!(classify_body(br#"{"status": "UP"}"#), HealthStatus::Healthy);
        assert_eq!(classify_body(br#"{"status": "warning"}"#), HealthStatus::Degraded);
        assert_eq!(classify_body(br#"{"status": "degraded"}"#), HealthStatus::Degraded);
        assert_eq!(classify_body(br#"{"status": "down"}"#), HealthStatus::Unhealthy);
        assert_eq!(classify_body(br#"{"status": "error"}"#), HealthStatus::Unhealthy);
        assert_eq!(classify_body(br#"{"status": "sideways"}"#), HealthStatus::Unknown);
    }

    #[test]
    fn empty_body_is_healthy_garbage_is_unknown() {
        assert_eq!(classify_body(b""), HealthStatus::Healthy);
        assert_eq!(classify_body(b"<html>"), HealthStatus::Unknown);
        assert_eq!(classify_body(br#"{"no_status": 1}"#), HealthStatus::Unknown);
    }

    #[test]
    fn aggregation_bands() {
        let readings = BTreeMap::from([
            ("a".to_owned(), HealthStatus::Healthy),
            ("b".to_owned(), HealthStatus::Healthy),
        ]);
        assert_eq!(aggregate(&readings), HealthStatus::Healthy);

        let readings = BTreeMap::from([
            ("a".to_owned(), HealthStatus::Healthy),
            ("b".to_owned(), HealthStatus::Unhealthy),
        ]);
        assert_eq!(aggregate(&readings), HealthStatus::Degraded);

        let readings = BTreeMap::from([("a".to_owned(), HealthStatus::Unhealthy)]);
        assert_eq!(aggregate(&readings), HealthStatus::Unhealthy);
    }

    struct FlakyProbe {
        healthy_after: u32,
        calls: std::sync::atomic::AtomicU32,
    }

    #[async_trait]
    impl ReadinessProbe for FlakyProbe {
        async fn check(&self, _service: &str) -> HealthStatus {
            let n = self
                .calls
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            if n >= self.healthy_after {
                HealthStatus::Healthy
            } else {
                HealthStatus::Unhealthy
            }
        }
    }

    #[tokio::test]
    async fn gate_retries_until_healthy() {
        let probe = FlakyProbe {
            healthy_after: 2,
            calls: std::sync::atomic::AtomicU32::new(0),
        };
        let status = wait_for_health(&probe, "backend", 5, Duration::from_millis(1)).await;
        assert_eq!(status, HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn gate_gives_up_after_budget() {
        let probe = FlakyProbe {
            healthy_after: 10,
            calls: std::sync::atomic::AtomicU32::new(0),
        };
        let status = wait_for_health(&probe, "backend", 3, Duration::from_millis(1)).await;
        assert_eq!(status, HealthStatus::Unhealthy);
    }
}
