use anyhow::{Context, Result};
use config_crate::{ConnectionDescriptor, TestModeConfig, TestRunnerConfig, DATABASE_URL_KEY};
use std::process::{ExitStatus, Stdio};
use tokio::process::Command;
use tracing::{info, warn};

use crate::shutdown::ShutdownSignal;

/// 被关闭信号中断时返回的退出码 (128 + SIGINT)
pub const INTERRUPTED_EXIT_CODE: i32 = 130;

/// 测试入口: 以子进程运行测试命令, 退出码即测试结果
pub struct TestRunner {
    config: TestRunnerConfig,
    envs: Vec<(String, String)>,
}

impl TestRunner {
    /// 子进程看到的 DATABASE_URL 指向测试库, 同时导出调试 socket 配置
    pub fn new(mode: &TestModeConfig, database: &ConnectionDescriptor) -> Self {
        let debug = &mode.debug_socket;
        let envs = vec![
            ("APP_MODE".to_string(), "test".to_string()),
            (DATABASE_URL_KEY.to_string(), database.connection_url()),
            ("DEBUG_SOCKET_HOST".to_string(), debug.host.clone()),
            ("DEBUG_SOCKET_PORT".to_string(), debug.port.to_string()),
            (
                "DEBUG_NO_BROWSER".to_string(),
                if debug.no_browser { "1" } else { "0" }.to_string(),
            ),
        ];

        Self {
            config: mode.runner.clone(),
            envs,
        }
    }

    pub fn envs(&self) -> &[(String, String)] {
        &self.envs
    }

    pub fn command_line(&self) -> String {
        self.config.to_string()
    }

    /// 运行测试命令直到结束; 收到关闭信号时终止子进程
    pub async fn run(&self, shutdown: &ShutdownSignal) -> Result<i32> {
        info!("启动测试命令: {}", self.command_line());

        let mut child = Command::new(&self.config.command)
            .args(self.config.argv())
            .envs(self.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to start test runner `{}`", self.command_line()))?;

        let status = tokio::select! {
            status = child.wait() => Some(status),
            _ = shutdown.cancelled() => None,
        };

        match status {
            Some(status) => {
                let status = status.context("Failed to wait for test runner")?;
                let code = exit_code(status);
                if code == 0 {
                    info!("✅ 测试全部通过");
                } else {
                    warn!("测试失败, 退出码 {}", code);
                }
                Ok(code)
            }
            None => {
                warn!("收到关闭信号, 终止测试进程");
                if let Err(e) = child.kill().await {
                    warn!("终止测试进程失败: {}", e);
                }
                Ok(INTERRUPTED_EXIT_CODE)
            }
        }
    }
}

/// 被信号杀死的子进程没有退出码, 按失败处理
fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(1)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use config_crate::DebugSocketConfig;
    use std::time::Duration;

    fn runner(script: &str) -> TestRunner {
        let mode = TestModeConfig {
            debug_socket: DebugSocketConfig {
                host: "debugger".to_string(),
                port: 4444,
                no_browser: true,
                attach_required: true,
            },
            runner: TestRunnerConfig {
                command: "sh".to_string(),
                args: vec!["-c".to_string(), script.to_string()],
                test_path: String::new(),
            },
        };
        let db = ConnectionDescriptor::parse("postgresql://bot:bot@db/bot_db_test", "TEST_DATABASE_URL").unwrap();
        TestRunner::new(&mode, &db)
    }

    #[test]
    fn test_envs_point_at_test_database() {
        let runner = runner("true");
        let envs: std::collections::HashMap<_, _> = runner.envs().iter().cloned().collect();
        assert_eq!(envs["DATABASE_URL"], "postgres://bot:bot@db/bot_db_test");
        assert_eq!(envs["DEBUG_SOCKET_HOST"], "debugger");
        assert_eq!(envs["DEBUG_SOCKET_PORT"], "4444");
        assert_eq!(envs["DEBUG_NO_BROWSER"], "1");
        assert_eq!(envs["APP_MODE"], "test");
    }

    #[tokio::test]
    async fn test_exit_code_is_propagated() {
        let shutdown = ShutdownSignal::new();
        assert_eq!(runner("exit 0").run(&shutdown).await.unwrap(), 0);
        assert_eq!(runner("exit 3").run(&shutdown).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_child_sees_exported_environment() {
        let shutdown = ShutdownSignal::new();
        let code = runner(r#"test "$DATABASE_URL" = "postgres://bot:bot@db/bot_db_test""#)
            .run(&shutdown)
            .await
            .unwrap();
        assert_eq!(code, 0);
    }

    #[tokio::test]
    async fn test_shutdown_kills_child() {
        let shutdown = ShutdownSignal::new();
        let trigger = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.trigger();
        });

        let code = tokio::time::timeout(Duration::from_secs(5), runner("sleep 30").run(&shutdown))
            .await
            .expect("runner should stop on shutdown")
            .unwrap();
        assert_eq!(code, INTERRUPTED_EXIT_CODE);
    }

    #[tokio::test]
    async fn test_missing_command_is_an_error() {
        let mut runner = runner("true");
        runner.config.command = "definitely-not-a-test-runner".to_string();
        let err = runner.run(&ShutdownSignal::new()).await.unwrap_err();
        assert!(err.to_string().contains("definitely-not-a-test-runner"));
    }
}
