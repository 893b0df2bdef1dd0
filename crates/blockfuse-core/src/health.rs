//! Per-upstream health accounting and aggregation.
//!
//! Each client owns one [`DataSource`] and records every outcome on it.
//! `/api/health` projects all sources into one [`OverallHealth`]: `healthy`
//! when every source is healthy, `unhealthy` when none is, `degraded`
//! otherwise.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

#[derive(Debug, Default)]
struct SourceState {
    last_success: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

/// Tracks the last success / last error of one data source.
///
/// A source that has never been used counts as healthy; once used, it stays
/// healthy for five minutes past its last success, so a single transient
/// failure does not flip the aggregate immediately.
#[derive(Debug)]
pub struct DataSource {
    name: &'static str,
    state: RwLock<SourceState>,
}

impl DataSource {
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            state: RwLock::new(SourceState::default()),
        }
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Records a success and clears the last error.
    pub fn set_success(&self) {
        let mut state = self.state.write();
        state.last_success = Some(Utc::now());
        state.last_error = None;
    }

    /// Records an error and clears the last success.
    pub fn set_error(&self, err: impl Into<String>) {
        let mut state = self.state.write();
        state.last_error = Some(err.into());
        state.last_success = None;
    }

    /// A source is healthy if it has never been exercised, or if it
    /// succeeded within the last five minutes.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        let state = self.state.read();
        match (state.last_success, &state.last_error) {
            (None, None) => true,
            (Some(t), _) => Utc::now().signed_duration_since(t) < chrono::Duration::minutes(5),
            (None, Some(_)) => false,
        }
    }

    /// Projects the current state into a serializable status.
    #[must_use]
    pub fn status(&self) -> HealthStatus {
        let healthy = self.is_healthy();
        let state = self.state.read();
        HealthStatus {
            name: self.name.to_string(),
            healthy,
            last_success: state.last_success,
            last_error: state.last_error.clone(),
        }
    }
}

/// Health status of one data source.
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub name: String,
    pub healthy: bool,
    #[serde(rename = "lastSuccess", skip_serializing_if = "Option::is_none")]
    pub last_success: Option<DateTime<Utc>>,
    #[serde(rename = "lastError", skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthSummary {
    pub total: usize,
    pub healthy: usize,
    pub unhealthy: usize,
}

/// Aggregated health of all sources.
#[derive(Debug, Clone, Serialize)]
pub struct OverallHealth {
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "dataSources")]
    pub data_sources: Vec<HealthStatus>,
    pub summary: HealthSummary,
}

/// Combines individual statuses into the overall tri-state.
#[must_use]
pub fn build_overall(statuses: Vec<HealthStatus>) -> OverallHealth {
    let total = statuses.len();
    let healthy = statuses.iter().filter(|s| s.healthy).count();
    let status = if healthy == total {
        "healthy"
    } else if healthy > 0 {
        "degraded"
    } else {
        "unhealthy"
    };
    OverallHealth {
        status,
        timestamp: Utc::now(),
        data_sources: statuses,
        summary: HealthSummary {
            total,
            healthy,
            unhealthy: total - healthy,
        },
    }
}
