//! 启动顺序控制
//!
//! 并发等待当前模式下的全部依赖, 全部就绪 (或可选依赖被跳过) 后才进入入口。
//! 每次调用都从零开始, 不依赖上一次启动留下的任何状态。

use config_crate::BootstrapConfig;
use futures_util::future::try_join_all;
use models::{DependencyKind, DependencyReadiness, DependencyStatus, ReadinessReport};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{self, Instant};
use tracing::{error, info, warn};
use utils::{calculate_backoff, BOOTSTRAP_TARGET};

use crate::readiness::{ProbeError, ReadinessProbe};
use crate::shutdown::ShutdownSignal;

/// 重试预算
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// 单次尝试的超时
    pub probe_timeout: Duration,
    pub jitter: bool,
}

impl RetryPolicy {
    pub fn from_config(config: &BootstrapConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: config.base_delay,
            max_delay: config.max_delay,
            probe_timeout: config.probe_timeout,
            jitter: true,
        }
    }

    /// 第 `attempt` 次失败后的等待时间
    pub fn delay_after(&self, attempt: u32) -> Duration {
        calculate_backoff(attempt, self.base_delay, self.max_delay, self.jitter)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BootstrapError {
    #[error("{dependency} unreachable at {target} ({config_key}) after {attempts} attempts: {last_error}")]
    Unreachable {
        dependency: DependencyKind,
        target: String,
        config_key: &'static str,
        attempts: u32,
        last_error: String,
    },

    #[error("{dependency} at {target} ({config_key}) rejected the connection on attempt {attempt}: {error}")]
    Rejected {
        dependency: DependencyKind,
        target: String,
        config_key: &'static str,
        attempt: u32,
        error: String,
    },

    #[error("bootstrap cancelled while waiting for {dependency} at {target} (attempt {attempts})")]
    Cancelled {
        dependency: DependencyKind,
        target: String,
        attempts: u32,
    },
}

impl BootstrapError {
    pub fn dependency(&self) -> DependencyKind {
        match self {
            BootstrapError::Unreachable { dependency, .. }
            | BootstrapError::Rejected { dependency, .. }
            | BootstrapError::Cancelled { dependency, .. } => *dependency,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, BootstrapError::Cancelled { .. })
    }
}

/// 启动屏障
pub struct BootstrapSequencer {
    policy: RetryPolicy,
    probes: Vec<Arc<dyn ReadinessProbe>>,
}

impl BootstrapSequencer {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            probes: Vec::new(),
        }
    }

    pub fn with_probe<P: ReadinessProbe + 'static>(mut self, probe: P) -> Self {
        self.probes.push(Arc::new(probe));
        self
    }

    pub fn add_probe(&mut self, probe: Arc<dyn ReadinessProbe>) {
        self.probes.push(probe);
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn dependencies(&self) -> Vec<DependencyKind> {
        self.probes.iter().map(|p| p.kind()).collect()
    }

    /// 等待所有依赖; 任一依赖失败即取消其余等待并返回该错误
    pub async fn wait_ready(&self, shutdown: &ShutdownSignal) -> Result<ReadinessReport, BootstrapError> {
        info!(
            target: BOOTSTRAP_TARGET,
            dependencies = ?self.dependencies(),
            max_attempts = self.policy.max_attempts,
            "等待启动依赖就绪..."
        );

        let waits = self
            .probes
            .iter()
            .map(|probe| self.wait_for(probe.as_ref(), shutdown));
        let dependencies = try_join_all(waits).await?;

        info!(target: BOOTSTRAP_TARGET, "✅ 所有启动依赖已就绪");
        Ok(ReadinessReport { dependencies })
    }

    /// 屏障通过后调用入口, 且只调用一次
    pub async fn launch<F, Fut>(&self, shutdown: &ShutdownSignal, entry: F) -> Result<Fut::Output, BootstrapError>
    where
        F: FnOnce(ReadinessReport) -> Fut,
        Fut: Future,
    {
        let report = self.wait_ready(shutdown).await?;
        Ok(entry(report).await)
    }

    async fn wait_for(
        &self,
        probe: &dyn ReadinessProbe,
        shutdown: &ShutdownSignal,
    ) -> Result<DependencyReadiness, BootstrapError> {
        let kind = probe.kind();
        let target = probe.target();
        let max_attempts = self.policy.max_attempts.max(1);
        let started = Instant::now();
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            let outcome = tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    return Err(BootstrapError::Cancelled { dependency: kind, target, attempts: attempt });
                }
                result = time::timeout(self.policy.probe_timeout, probe.probe()) => result,
            };

            match outcome {
                Ok(Ok(())) => {
                    info!(
                        target: BOOTSTRAP_TARGET,
                        dependency = %kind,
                        address = %target,
                        attempt,
                        "依赖已就绪"
                    );
                    return Ok(DependencyReadiness {
                        kind,
                        target,
                        attempts: attempt,
                        elapsed: started.elapsed(),
                        status: DependencyStatus::Ready,
                    });
                }
                Ok(Err(ProbeError::Rejected(e))) => {
                    error!(
                        target: BOOTSTRAP_TARGET,
                        dependency = %kind,
                        address = %target,
                        config_key = probe.config_key(),
                        error = %e,
                        "依赖拒绝连接, 不再重试"
                    );
                    return Err(BootstrapError::Rejected {
                        dependency: kind,
                        target,
                        config_key: probe.config_key(),
                        attempt,
                        error: e,
                    });
                }
                Ok(Err(ProbeError::NotReady(e))) => last_error = e,
                Err(_) => last_error = format!("attempt timed out after {:?}", self.policy.probe_timeout),
            }

            // 最后一次尝试之后不再等待
            if attempt < max_attempts {
                let delay = self.policy.delay_after(attempt);
                warn!(
                    target: BOOTSTRAP_TARGET,
                    dependency = %kind,
                    address = %target,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %last_error,
                    "依赖未就绪, 稍后重试"
                );
                tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => {
                        return Err(BootstrapError::Cancelled { dependency: kind, target, attempts: attempt });
                    }
                    _ = time::sleep(delay) => {}
                }
            }
        }

        if probe.required() {
            error!(
                target: BOOTSTRAP_TARGET,
                dependency = %kind,
                address = %target,
                config_key = probe.config_key(),
                attempts = max_attempts,
                error = %last_error,
                "重试预算耗尽, 依赖不可达"
            );
            Err(BootstrapError::Unreachable {
                dependency: kind,
                target,
                config_key: probe.config_key(),
                attempts: max_attempts,
                last_error,
            })
        } else {
            warn!(
                target: BOOTSTRAP_TARGET,
                dependency = %kind,
                address = %target,
                attempts = max_attempts,
                error = %last_error,
                "⚠️ 可选依赖不可达, 跳过"
            );
            Ok(DependencyReadiness {
                kind,
                target,
                attempts: max_attempts,
                elapsed: started.elapsed(),
                status: DependencyStatus::Skipped { last_error },
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(1000),
            probe_timeout: Duration::from_secs(1),
            jitter: false,
        }
    }

    #[test]
    fn test_policy_from_config_keeps_budget() {
        let config = BootstrapConfig {
            max_attempts: 3,
            ..Default::default()
        };
        let policy = RetryPolicy::from_config(&config);
        assert_eq!(policy.max_attempts, 3);
        assert!(policy.jitter);
    }

    #[test]
    fn test_delay_after_doubles() {
        let p = policy(5);
        assert_eq!(p.delay_after(1), Duration::from_millis(100));
        assert_eq!(p.delay_after(3), Duration::from_millis(400));
        assert_eq!(p.delay_after(9), Duration::from_millis(1000));
    }

    #[test]
    fn test_error_message_names_dependency_and_key() {
        let err = BootstrapError::Unreachable {
            dependency: DependencyKind::Store,
            target: "db:5432".to_string(),
            config_key: "DATABASE_URL",
            attempts: 3,
            last_error: "connection refused".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "store unreachable at db:5432 (DATABASE_URL) after 3 attempts: connection refused"
        );
        assert_eq!(err.dependency(), DependencyKind::Store);
        assert!(!err.is_cancelled());
    }

    #[tokio::test]
    async fn test_empty_sequencer_is_ready() {
        let sequencer = BootstrapSequencer::new(policy(3));
        let report = sequencer.wait_ready(&ShutdownSignal::new()).await.unwrap();
        assert!(report.dependencies.is_empty());
    }
}
