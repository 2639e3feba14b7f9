use std::fmt;
use std::str::FromStr;

/// 远程调试 socket 服务默认端口
pub const DEFAULT_DEBUG_SOCKET_PORT: u16 = 4444;

/// 运行模式选择 (来自 APP_MODE 或命令行 --mode)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModeKind {
    #[default]
    Production,
    Test,
}

impl ModeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModeKind::Production => "production",
            ModeKind::Test => "test",
        }
    }
}

impl FromStr for ModeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "production" | "prod" => Ok(ModeKind::Production),
            "test" => Ok(ModeKind::Test),
            other => Err(format!("unknown mode '{}', expected production or test", other)),
        }
    }
}

impl fmt::Display for ModeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 进程模式
///
/// 每个进程实例只有一套依赖和一个入口: 生产模式运行机器人,
/// 测试模式额外依赖调试 socket 并运行测试命令。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessMode {
    Production,
    Test(TestModeConfig),
}

impl ProcessMode {
    pub fn kind(&self) -> ModeKind {
        match self {
            ProcessMode::Production => ModeKind::Production,
            ProcessMode::Test(_) => ModeKind::Test,
        }
    }

    pub fn is_test(&self) -> bool {
        matches!(self, ProcessMode::Test(_))
    }

    pub fn test_config(&self) -> Option<&TestModeConfig> {
        match self {
            ProcessMode::Test(cfg) => Some(cfg),
            ProcessMode::Production => None,
        }
    }
}

/// 测试模式专属配置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestModeConfig {
    pub debug_socket: DebugSocketConfig,
    pub runner: TestRunnerConfig,
}

/// 远程调试 socket 服务
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugSocketConfig {
    pub host: String,
    pub port: u16,
    /// 禁止调试器自动打开浏览器
    pub no_browser: bool,
    /// 调试器不可达时是否终止 (false = 警告后继续)
    pub attach_required: bool,
}

impl DebugSocketConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// 测试命令
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestRunnerConfig {
    pub command: String,
    pub args: Vec<String>,
    pub test_path: String,
}

impl TestRunnerConfig {
    /// 完整参数列表 (测试路径放在最后)
    pub fn argv(&self) -> Vec<String> {
        let mut argv = self.args.clone();
        if !self.test_path.is_empty() {
            argv.push(self.test_path.clone());
        }
        argv
    }
}

impl fmt::Display for TestRunnerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.command)?;
        for arg in self.argv() {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_kind_parse() {
        assert_eq!("production".parse::<ModeKind>(), Ok(ModeKind::Production));
        assert_eq!(" TEST ".parse::<ModeKind>(), Ok(ModeKind::Test));
        assert!("staging".parse::<ModeKind>().is_err());
    }

    #[test]
    fn test_runner_argv_appends_path() {
        let runner = TestRunnerConfig {
            command: "cargo".to_string(),
            args: vec!["test".to_string(), "--".to_string()],
            test_path: "tests".to_string(),
        };
        assert_eq!(runner.argv(), vec!["test", "--", "tests"]);
        assert_eq!(runner.to_string(), "cargo test -- tests");
    }
}
