use axum::{extract::State, http::StatusCode, Json};
use futures_util::future::join_all;
use models::DependencyKind;
use serde::Serialize;
use tokio::time;
use tracing::warn;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub mode: String,
    pub uptime_seconds: u64,
    pub timestamp: String,
}

#[derive(Serialize)]
pub struct DependencyCheck {
    pub dependency: DependencyKind,
    pub address: String,
    pub required: bool,
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Serialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    pub dependencies: Vec<DependencyCheck>,
    pub timestamp: String,
}

/// 存活检查
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        mode: state.mode.as_str().to_string(),
        uptime_seconds: state.uptime().as_secs(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

/// 就绪检查: 并发执行一次所有探测, 必需依赖失败时返回 503
pub async fn readiness_check(State(state): State<AppState>) -> (StatusCode, Json<ReadinessResponse>) {
    let timeout = state.check_timeout;
    let checks = state.checks.iter().map(|probe| async move {
        let result = match time::timeout(timeout, probe.probe()).await {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e.to_string()),
            Err(_) => Some(format!("check timed out after {:?}", timeout)),
        };
        DependencyCheck {
            dependency: probe.kind(),
            address: probe.target(),
            required: probe.required(),
            ready: result.is_none(),
            error: result,
        }
    });
    let dependencies = join_all(checks).await;

    let ready = dependencies.iter().all(|d| d.ready || !d.required);
    if !ready {
        for d in dependencies.iter().filter(|d| !d.ready) {
            warn!(
                "就绪检查失败: {} {} - {}",
                d.dependency,
                d.address,
                d.error.as_deref().unwrap_or("unknown")
            );
        }
    }

    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(ReadinessResponse {
            ready,
            dependencies,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }),
    )
}
