use config_crate::ModeKind;
use services::ReadinessProbe;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// API 应用状态
#[derive(Clone)]
pub struct AppState {
    pub mode: ModeKind,
    pub started_at: Instant,
    /// 运行期就绪检查, 与启动屏障使用同一套探测器
    pub checks: Arc<Vec<Arc<dyn ReadinessProbe>>>,
    pub check_timeout: Duration,
}

impl AppState {
    pub fn new(mode: ModeKind, checks: Vec<Arc<dyn ReadinessProbe>>, check_timeout: Duration) -> Self {
        Self {
            mode,
            started_at: Instant::now(),
            checks: Arc::new(checks),
            check_timeout,
        }
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }
}
