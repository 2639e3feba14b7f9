mod descriptor;
mod error;
mod mode;

use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub use descriptor::{ConnectionDescriptor, DEFAULT_STORE_PORT};
pub use error::ConfigError;
pub use mode::{
    DebugSocketConfig, ModeKind, ProcessMode, TestModeConfig, TestRunnerConfig,
    DEFAULT_DEBUG_SOCKET_PORT,
};

pub const DATABASE_URL_KEY: &str = "DATABASE_URL";
pub const TEST_DATABASE_URL_KEY: &str = "TEST_DATABASE_URL";
pub const DEBUG_SOCKET_HOST_KEY: &str = "DEBUG_SOCKET_HOST";

/// 测试库默认后缀 (未设置 TEST_DATABASE_URL 时使用)
pub const TEST_DATABASE_SUFFIX: &str = "_test";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub mode: ProcessMode,
    pub database: DatabaseConfig,
    pub bootstrap: BootstrapConfig,
    pub bot: BotConfig,
    pub api: ApiConfig,
    pub log: LogConfig,
}

/// 当前模式使用的数据库
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub descriptor: ConnectionDescriptor,
    /// 描述来源的配置项, 用于诊断信息
    pub source_key: &'static str,
    pub max_connections: u32,
}

/// 启动依赖等待的重试预算
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapConfig {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub probe_timeout: Duration,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_millis(10_000),
            probe_timeout: Duration::from_secs(5),
        }
    }
}

/// 机器人凭据 (来自未提交到仓库的 env 文件)
#[derive(Debug, Clone)]
pub struct BotConfig {
    pub main_bot_token: Option<Secret>,
    pub admin_bot_token: Option<Secret>,
    pub admin_user_id: Option<i64>,
    /// 机器人自身在 users 表中的 telegram_id
    pub superuser_id: i64,
    pub openai_api_key: Option<Secret>,
    pub gpt_model: String,
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
}

impl ApiConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: String,
    pub dir: String,
}

/// 敏感值, Debug 输出时隐藏
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// 加载选项 (命令行参数覆盖环境变量)
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub env_file: Option<PathBuf>,
    pub mode: Option<ModeKind>,
}

impl AppConfig {
    /// 从 env 文件和进程环境加载配置
    ///
    /// 未指定 env 文件时尝试读取当前目录的 `.env` (不存在则忽略);
    /// 显式指定的 env 文件必须可读。已存在的环境变量优先于文件中的值。
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let env_file = options
            .env_file
            .clone()
            .or_else(|| non_empty(env::var("ENV_FILE").ok()).map(PathBuf::from));

        match env_file {
            Some(path) => {
                dotenv::from_path(&path).map_err(|e| ConfigError::EnvFile {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                })?;
            }
            None => {
                dotenv::dotenv().ok();
            }
        }

        Self::from_lookup(options.mode, |key| env::var(key).ok())
    }

    /// 从任意键值来源解析配置, 任何必填项缺失或格式错误都会直接返回错误
    pub fn from_lookup<F>(mode_override: Option<ModeKind>, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Lookup { get: &lookup };

        // 运行模式
        let mode_kind = match mode_override {
            Some(kind) => kind,
            None => match env.optional("APP_MODE") {
                Some(raw) => raw
                    .parse::<ModeKind>()
                    .map_err(|reason| ConfigError::invalid("APP_MODE", reason))?,
                None => ModeKind::Production,
            },
        };

        // 数据库配置
        let production_db = ConnectionDescriptor::parse(&env.required(DATABASE_URL_KEY)?, DATABASE_URL_KEY)?;
        let max_connections: u32 = env.parse_or("DB_MAX_CONNECTIONS", 10)?;
        if max_connections == 0 {
            return Err(ConfigError::invalid("DB_MAX_CONNECTIONS", "must be at least 1"));
        }

        // 启动重试预算
        let bootstrap = BootstrapConfig {
            max_attempts: env.parse_or("BOOTSTRAP_MAX_ATTEMPTS", 10)?,
            base_delay: Duration::from_millis(env.parse_or("BOOTSTRAP_BASE_DELAY_MS", 500)?),
            max_delay: Duration::from_millis(env.parse_or("BOOTSTRAP_MAX_DELAY_MS", 10_000)?),
            probe_timeout: Duration::from_secs(env.parse_or("BOOTSTRAP_PROBE_TIMEOUT_SECS", 5)?),
        };
        if bootstrap.max_attempts == 0 {
            return Err(ConfigError::invalid("BOOTSTRAP_MAX_ATTEMPTS", "must be at least 1"));
        }
        if bootstrap.max_delay < bootstrap.base_delay {
            return Err(ConfigError::invalid(
                "BOOTSTRAP_MAX_DELAY_MS",
                "must not be smaller than BOOTSTRAP_BASE_DELAY_MS",
            ));
        }
        if bootstrap.probe_timeout.is_zero() {
            return Err(ConfigError::invalid("BOOTSTRAP_PROBE_TIMEOUT_SECS", "must be at least 1"));
        }

        // 按模式解析依赖集合; 测试模式必须使用与生产不同的数据库
        let (mode, database) = match mode_kind {
            ModeKind::Production => (
                ProcessMode::Production,
                DatabaseConfig {
                    descriptor: production_db,
                    source_key: DATABASE_URL_KEY,
                    max_connections,
                },
            ),
            ModeKind::Test => {
                // 未设置 TEST_DATABASE_URL 时由 DATABASE_URL 派生, 诊断信息指向 DATABASE_URL
                let (test_db, source_key) = match env.optional(TEST_DATABASE_URL_KEY) {
                    Some(raw) => (
                        ConnectionDescriptor::parse(&raw, TEST_DATABASE_URL_KEY)?,
                        TEST_DATABASE_URL_KEY,
                    ),
                    None => (
                        production_db.with_database(format!(
                            "{}{}",
                            production_db.database, TEST_DATABASE_SUFFIX
                        )),
                        DATABASE_URL_KEY,
                    ),
                };
                if test_db.same_database(&production_db) {
                    return Err(ConfigError::IsolationViolation {
                        key: TEST_DATABASE_URL_KEY,
                        host: test_db.host_port(),
                        database: test_db.database,
                    });
                }

                let debug_socket = DebugSocketConfig {
                    host: env.required(DEBUG_SOCKET_HOST_KEY)?,
                    port: env.parse_or("DEBUG_SOCKET_PORT", DEFAULT_DEBUG_SOCKET_PORT)?,
                    no_browser: env.bool_or("DEBUG_NO_BROWSER", true)?,
                    attach_required: env.bool_or("DEBUG_ATTACH_REQUIRED", true)?,
                };

                // TEST_PATH 原样追加在参数末尾; cargo 按名称过滤测试, 默认不追加
                let runner = TestRunnerConfig {
                    command: env.optional("TEST_COMMAND").unwrap_or_else(|| "cargo".to_string()),
                    args: env
                        .optional("TEST_ARGS")
                        .unwrap_or_else(|| "test --workspace".to_string())
                        .split_whitespace()
                        .map(str::to_string)
                        .collect(),
                    test_path: env.optional("TEST_PATH").unwrap_or_default(),
                };

                (
                    ProcessMode::Test(TestModeConfig {
                        debug_socket,
                        runner,
                    }),
                    DatabaseConfig {
                        descriptor: test_db,
                        source_key,
                        max_connections,
                    },
                )
            }
        };

        // 机器人凭据
        let bot = BotConfig {
            main_bot_token: env.optional("TELEGRAM_MAIN_BOT_TOKEN").map(Secret::new),
            admin_bot_token: env.optional("TELEGRAM_ADMIN_BOT_TOKEN").map(Secret::new),
            admin_user_id: env.parse_opt("TELEGRAM_ADMIN_USER_ID")?,
            superuser_id: env.parse_or("SUPERUSER_ID", 1)?,
            openai_api_key: env.optional("OPENAI_API_KEY").map(Secret::new),
            gpt_model: env
                .optional("GPT_MODEL")
                .unwrap_or_else(|| "gpt-3.5-turbo".to_string()),
        };

        // 健康检查服务
        let api = ApiConfig {
            host: env.optional("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: env.parse_or("SERVER_PORT", 8080)?,
        };

        // 日志配置
        let log = LogConfig {
            level: env.optional("RUST_LOG").unwrap_or_else(|| "info".to_string()),
            dir: env.optional("LOG_DIR").unwrap_or_else(|| "./logs".to_string()),
        };

        Ok(Self {
            mode,
            database,
            bootstrap,
            bot,
            api,
            log,
        })
    }
}

struct Lookup<'a> {
    get: &'a dyn Fn(&str) -> Option<String>,
}

impl Lookup<'_> {
    /// 空字符串视为未设置
    fn optional(&self, key: &str) -> Option<String> {
        non_empty((self.get)(key))
    }

    fn required(&self, key: &'static str) -> Result<String, ConfigError> {
        self.optional(key).ok_or(ConfigError::Missing { key })
    }

    fn parse_opt<T>(&self, key: &'static str) -> Result<Option<T>, ConfigError>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        self.optional(key)
            .map(|raw| {
                raw.trim()
                    .parse::<T>()
                    .map_err(|e| ConfigError::invalid(key, format!("'{}': {}", raw, e)))
            })
            .transpose()
    }

    fn parse_or<T>(&self, key: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        Ok(self.parse_opt(key)?.unwrap_or(default))
    }

    fn bool_or(&self, key: &'static str, default: bool) -> Result<bool, ConfigError> {
        match self.optional(key) {
            None => Ok(default),
            Some(raw) => match raw.trim().to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "0" | "false" | "no" | "off" => Ok(false),
                _ => Err(ConfigError::invalid(key, format!("'{}' is not a boolean", raw))),
            },
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}
