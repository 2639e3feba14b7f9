use anyhow::{Context, Result};
use axum::{routing::get, Router};
use services::ShutdownSignal;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::handlers;
use crate::state::AppState;

/// 创建 API 路由
pub fn create_server(state: AppState) -> Router {
    // CORS 配置
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // 存活检查
        .route("/health", get(handlers::health_check))
        // 就绪检查
        .route("/ready", get(handlers::readiness_check))
        .layer(cors)
        .with_state(state)
}

/// 启动服务器, 收到关闭信号后优雅退出
pub async fn start_server(app: Router, addr: &str, shutdown: ShutdownSignal) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind API server on {}", addr))?;
    serve(listener, app, shutdown).await
}

pub async fn serve(listener: TcpListener, app: Router, shutdown: ShutdownSignal) -> Result<()> {
    let addr = listener.local_addr().context("Failed to read API server address")?;
    info!("API 服务器启动: http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("API server error")?;

    info!("API 服务器已停止");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use config_crate::ModeKind;
    use http_body_util::BodyExt;
    use models::DependencyKind;
    use services::{ProbeError, ReadinessProbe};
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    struct StaticProbe {
        kind: DependencyKind,
        ready: bool,
        required: bool,
    }

    #[async_trait]
    impl ReadinessProbe for StaticProbe {
        fn kind(&self) -> DependencyKind {
            self.kind
        }

        fn target(&self) -> String {
            "db:5432".to_string()
        }

        fn config_key(&self) -> &'static str {
            "DATABASE_URL"
        }

        fn required(&self) -> bool {
            self.required
        }

        async fn probe(&self) -> Result<(), ProbeError> {
            if self.ready {
                Ok(())
            } else {
                Err(ProbeError::NotReady("connection refused".to_string()))
            }
        }
    }

    fn app(probes: Vec<StaticProbe>) -> Router {
        let checks = probes
            .into_iter()
            .map(|p| Arc::new(p) as Arc<dyn ReadinessProbe>)
            .collect();
        create_server(AppState::new(ModeKind::Production, checks, Duration::from_secs(1)))
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_health_reports_mode() {
        let (status, body) = get_json(app(vec![]), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["mode"], "production");
    }

    #[tokio::test]
    async fn test_ready_when_store_answers() {
        let probes = vec![StaticProbe {
            kind: DependencyKind::Store,
            ready: true,
            required: true,
        }];
        let (status, body) = get_json(app(probes), "/ready").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ready"], true);
        assert_eq!(body["dependencies"][0]["dependency"], "store");
    }

    #[tokio::test]
    async fn test_unavailable_when_store_is_down() {
        let probes = vec![StaticProbe {
            kind: DependencyKind::Store,
            ready: false,
            required: true,
        }];
        let (status, body) = get_json(app(probes), "/ready").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["ready"], false);
        assert_eq!(body["dependencies"][0]["error"], "connection refused");
    }

    #[tokio::test]
    async fn test_optional_failure_keeps_ready() {
        let probes = vec![
            StaticProbe {
                kind: DependencyKind::Store,
                ready: true,
                required: true,
            },
            StaticProbe {
                kind: DependencyKind::DebugSocket,
                ready: false,
                required: false,
            },
        ];
        let (status, body) = get_json(app(probes), "/ready").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["dependencies"][1]["ready"], false);
    }

    #[tokio::test]
    async fn test_server_stops_on_shutdown() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let shutdown = ShutdownSignal::new();
        let handle = tokio::spawn(serve(listener, app(vec![]), shutdown.clone()));

        shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("server should stop")
            .unwrap()
            .unwrap();
    }
}
