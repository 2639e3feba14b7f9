use thiserror::Error;

/// 配置错误 (全部为致命错误, 进程不会进入启动流程)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{key} not set")]
    Missing { key: &'static str },

    #[error("Invalid {key}: {reason}")]
    Invalid { key: &'static str, reason: String },

    #[error("Failed to load env file {path}: {reason}")]
    EnvFile { path: String, reason: String },

    #[error(
        "{key} resolves to database {database} on {host}, which is the production database; \
         test runs need a distinct database"
    )]
    IsolationViolation {
        key: &'static str,
        host: String,
        database: String,
    },
}

impl ConfigError {
    pub(crate) fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            key,
            reason: reason.into(),
        }
    }

    /// 出错的配置项 (env file 错误没有对应的键)
    pub fn key(&self) -> Option<&'static str> {
        match self {
            ConfigError::Missing { key }
            | ConfigError::Invalid { key, .. }
            | ConfigError::IsolationViolation { key, .. } => Some(key),
            ConfigError::EnvFile { .. } => None,
        }
    }
}
