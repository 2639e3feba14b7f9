use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// 启动依赖类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DependencyKind {
    /// 持久化存储 (Postgres)
    Store,
    /// 远程调试 socket 服务 (仅测试模式)
    DebugSocket,
}

impl DependencyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DependencyKind::Store => "store",
            DependencyKind::DebugSocket => "debug-socket",
        }
    }
}

impl fmt::Display for DependencyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 依赖就绪结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum DependencyStatus {
    Ready,
    /// 可选依赖在预算内未就绪, 跳过
    Skipped { last_error: String },
}

/// 单个依赖的就绪记录
#[derive(Debug, Clone, Serialize)]
pub struct DependencyReadiness {
    pub kind: DependencyKind,
    pub target: String,
    pub attempts: u32,
    #[serde(with = "duration_millis")]
    pub elapsed: Duration,
    #[serde(flatten)]
    pub status: DependencyStatus,
}

impl DependencyReadiness {
    pub fn is_ready(&self) -> bool {
        self.status == DependencyStatus::Ready
    }
}

/// 启动屏障通过时的汇总报告
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReadinessReport {
    pub dependencies: Vec<DependencyReadiness>,
}

impl ReadinessReport {
    pub fn get(&self, kind: DependencyKind) -> Option<&DependencyReadiness> {
        self.dependencies.iter().find(|d| d.kind == kind)
    }

    /// 所有依赖使用的尝试次数总和
    pub fn total_attempts(&self) -> u32 {
        self.dependencies.iter().map(|d| d.attempts).sum()
    }

    pub fn skipped(&self) -> impl Iterator<Item = &DependencyReadiness> {
        self.dependencies.iter().filter(|d| !d.is_ready())
    }
}

mod duration_millis {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }
}
