use crate::config::MonitorConfig;
use crate::error::ProbeError;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

// ── Samples ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Stale,
    Unreachable,
}

impl HealthStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Stale => "stale",
            Self::Unreachable => "unreachable",
        }
    }
}

/// One classified probe result. Transient: produced each tick, never
/// persisted.
#[derive(Debug, Clone)]
pub struct HealthSample {
    pub timestamp: DateTime<Utc>,
    pub reachable: bool,
    pub liveness_age_seconds: Option<u64>,
    pub content_marker_present: bool,
    pub status: HealthStatus,
    /// True when the raw outcome was overridden by the startup grace period.
    pub grace_applied: bool,
}

impl HealthSample {
    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}

/// Wire shape of the monitored service's health endpoint. The page pushes a
/// periodic liveness heartbeat which the service relays as `last_heartbeat`;
/// `content_ok` reports whether the expected content marker was present.
#[derive(Debug, Deserialize)]
struct HealthPayload {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    last_heartbeat: Option<String>,
    #[serde(default = "default_content_ok")]
    content_ok: bool,
}

fn default_content_ok() -> bool {
    true
}

// ── Probe ────────────────────────────────────────────────────────

/// Samples the monitored service's loopback health endpoint. Always returns
/// a classified sample; a probe timeout classifies as unreachable rather
/// than failing the tick.
pub struct HealthProbe {
    client: Client,
    health_url: String,
    liveness_timeout_s: u64,
    probe_timeout_s: u64,
    grace_until: DateTime<Utc>,
}

impl HealthProbe {
    pub fn new(monitor: &MonitorConfig, started_at: DateTime<Utc>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(monitor.probe_timeout_s))
            .connect_timeout(Duration::from_secs(monitor.probe_timeout_s.min(5)))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            health_url: monitor.health_url.clone(),
            liveness_timeout_s: monitor.liveness_timeout_s,
            probe_timeout_s: monitor.probe_timeout_s,
            grace_until: started_at
                .checked_add_signed(
                    chrono::Duration::try_seconds(
                        i64::try_from(monitor.startup_grace_period_s).unwrap_or(i64::MAX),
                    )
                    .unwrap_or(chrono::Duration::MAX),
                )
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }

    pub async fn sample(&self, now: DateTime<Utc>) -> HealthSample {
        let raw = self.sample_raw(now).await;

        // During the startup grace period every outcome counts healthy so
        // dependent services get time to boot without triggering escalation.
        if now < self.grace_until && !raw.is_healthy() {
            tracing::debug!(
                raw_status = raw.status.as_str(),
                "suppressing probe failure inside startup grace period"
            );
            return HealthSample {
                status: HealthStatus::Healthy,
                grace_applied: true,
                ..raw
            };
        }

        raw
    }

    async fn sample_raw(&self, now: DateTime<Utc>) -> HealthSample {
        let response = match self.client.get(&self.health_url).send().await {
            Ok(response) => response,
            Err(e) => {
                let err = if e.is_timeout() {
                    ProbeError::Timeout {
                        timeout_secs: self.probe_timeout_s,
                    }
                } else {
                    ProbeError::Unreachable(e.to_string())
                };
                tracing::debug!("{err}");
                return unreachable_sample(now);
            }
        };

        if !response.status().is_success() {
            tracing::debug!(status = %response.status(), "health endpoint returned non-success");
            return stale_sample(now, None, false);
        }

        let payload = match response.json::<HealthPayload>().await {
            Ok(payload) => payload,
            Err(e) => {
                // Reachable but not demonstrably healthy.
                tracing::debug!("{}", ProbeError::Malformed(e.to_string()));
                return stale_sample(now, None, false);
            }
        };

        self.classify(now, &payload)
    }

    fn classify(&self, now: DateTime<Utc>, payload: &HealthPayload) -> HealthSample {
        let liveness_age_seconds = payload
            .last_heartbeat
            .as_deref()
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|ts| {
                let age = now
                    .signed_duration_since(ts.with_timezone(&Utc))
                    .num_seconds();
                u64::try_from(age).unwrap_or(0)
            });

        let status_ok = payload.status.as_deref().is_none_or(|s| s == "ok");
        let marker_present = payload.content_ok && status_ok;
        let fresh = liveness_age_seconds.is_some_and(|age| age <= self.liveness_timeout_s);

        let status = if fresh && marker_present {
            HealthStatus::Healthy
        } else {
            HealthStatus::Stale
        };

        HealthSample {
            timestamp: now,
            reachable: true,
            liveness_age_seconds,
            content_marker_present: marker_present,
            status,
            grace_applied: false,
        }
    }
}

fn unreachable_sample(now: DateTime<Utc>) -> HealthSample {
    HealthSample {
        timestamp: now,
        reachable: false,
        liveness_age_seconds: None,
        content_marker_present: false,
        status: HealthStatus::Unreachable,
        grace_applied: false,
    }
}

fn stale_sample(
    now: DateTime<Utc>,
    liveness_age_seconds: Option<u64>,
    marker_present: bool,
) -> HealthSample {
    HealthSample {
        timestamp: now,
        reachable: true,
        liveness_age_seconds,
        content_marker_present: marker_present,
        status: HealthStatus::Stale,
        grace_applied: false,
    }
}
