//! Liveness and readiness.
//!
//! - `/health` - cached status, refreshed when stale
//! - `/health/ready` - pings the database and checks worker heartbeats
//! - `/health/live` - process is up
//! - `/health/version` - build information

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use sea_orm::{DatabaseConnection, EntityTrait, QueryOrder};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::RwLock;
use tracing::error;

use crate::entities::worker_heartbeat;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Up,
    Down,
    Degraded,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct HealthDetail {
    pub status: HealthStatus,
    pub message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct HealthInfo {
    pub status: HealthStatus,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub uptime_seconds: u64,
    pub details: HashMap<String, HealthDetail>,
}

#[derive(Clone)]
pub struct HealthState {
    pub db: Arc<DatabaseConnection>,
    pub health_cache: Arc<RwLock<HealthInfo>>,
    pub start_time: SystemTime,
    /// A heartbeat older than this marks the workers degraded.
    pub heartbeat_stale_after: ChronoDuration,
}

impl HealthState {
    pub fn new(db: Arc<DatabaseConnection>, heartbeat_interval_secs: u64) -> Self {
        Self {
            db,
            health_cache: Arc::new(RwLock::new(HealthInfo {
                status: HealthStatus::Up,
                version: env!("CARGO_PKG_VERSION").to_string(),
                timestamp: Utc::now(),
                uptime_seconds: 0,
                details: HashMap::new(),
            })),
            start_time: SystemTime::now(),
            heartbeat_stale_after: ChronoDuration::seconds(
                (heartbeat_interval_secs.max(1) * 3) as i64,
            ),
        }
    }

    pub fn uptime(&self) -> u64 {
        SystemTime::now()
            .duration_since(self.start_time)
            .unwrap_or(Duration::from_secs(0))
            .as_secs()
    }

    pub async fn update_health(&self) {
        let now = Utc::now();
        let mut details = HashMap::new();

        let database = match self.db.ping().await {
            Ok(()) => HealthDetail {
                status: HealthStatus::Up,
                message: None,
                timestamp: now,
            },
            Err(e) => {
                error!(error = %e, "database health check failed");
                HealthDetail {
                    status: HealthStatus::Down,
                    message: Some(e.to_string()),
                    timestamp: now,
                }
            }
        };
        let db_up = database.status == HealthStatus::Up;
        details.insert("database".to_string(), database);

        if db_up {
            details.insert("workers".to_string(), self.worker_detail(now).await);
        }

        let status = overall(details.values().map(|d| d.status));
        let mut health = self.health_cache.write().await;
        health.timestamp = now;
        health.uptime_seconds = self.uptime();
        health.details = details;
        health.status = status;
    }

    async fn worker_detail(&self, now: DateTime<Utc>) -> HealthDetail {
        let latest = worker_heartbeat::Entity::find()
            .order_by_desc(worker_heartbeat::Column::LastSeenAt)
            .one(&*self.db)
            .await;
        let (status, message) = match latest {
            Ok(Some(beat)) if now - beat.last_seen_at <= self.heartbeat_stale_after => {
                (HealthStatus::Up, Some(format!("{} last seen {}", beat.worker_name, beat.last_seen_at)))
            }
            Ok(Some(beat)) => (
                HealthStatus::Degraded,
                Some(format!("no heartbeat since {}", beat.last_seen_at)),
            ),
            Ok(None) => (HealthStatus::Degraded, Some("no worker heartbeat recorded".into())),
            Err(e) => (HealthStatus::Degraded, Some(e.to_string())),
        };
        HealthDetail {
            status,
            message,
            timestamp: now,
        }
    }
}

fn overall(statuses: impl Iterator<Item = HealthStatus>) -> HealthStatus {
    statuses.fold(HealthStatus::Up, |acc, s| match (acc, s) {
        (HealthStatus::Down, _) | (_, HealthStatus::Down) => HealthStatus::Down,
        (HealthStatus::Degraded, _) | (_, HealthStatus::Degraded) => HealthStatus::Degraded,
        _ => HealthStatus::Up,
    })
}

fn status_code(status: HealthStatus) -> StatusCode {
    match status {
        HealthStatus::Up | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Down => StatusCode::SERVICE_UNAVAILABLE,
    }
}

pub async fn version_info() -> impl IntoResponse {
    Json(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "commit": option_env!("GIT_HASH").unwrap_or("unknown"),
    }))
}

/// Cached status older than this is refreshed on read.
const CACHE_TTL_SECS: i64 = 30;

pub async fn health_check(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    let stale = {
        let health = state.health_cache.read().await;
        Utc::now() - health.timestamp > ChronoDuration::seconds(CACHE_TTL_SECS)
            || health.details.is_empty()
    };
    if stale {
        state.update_health().await;
    }
    let health = state.health_cache.read().await;
    (
        status_code(health.status),
        Json(json!({
            "status": health.status,
            "version": health.version,
            "timestamp": health.timestamp,
        })),
    )
}

pub async fn readiness_check(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    state.update_health().await;
    let health = state.health_cache.read().await;
    (status_code(health.status), Json(health.clone()))
}

pub async fn liveness_check(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "alive": true,
            "uptime_seconds": state.uptime(),
        })),
    )
}

pub fn health_routes(state: Arc<HealthState>) -> Router {
    Router::new()
        .route("/", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/live", get(liveness_check))
        .route("/version", get(version_info))
        .with_state(state)
}
