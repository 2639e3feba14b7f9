use std::fs;
use time::format_description::well_known::Rfc3339;
use time::UtcOffset;
use tracing_subscriber::filter::{EnvFilter, FilterFn};
use tracing_subscriber::fmt::time::OffsetTime;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, Layer};
use tracing_appender::{non_blocking, rolling};

/// 启动流程日志使用的 target, 单独写入 bootstrap.log
pub const BOOTSTRAP_TARGET: &str = "bootstrap";

/// 日志管理器 - 控制台 + 按天滚动的文件日志
pub struct LoggerManager {
    _guards: Vec<non_blocking::WorkerGuard>,
}

impl LoggerManager {
    /// 初始化日志系统
    ///
    /// 日志分类：
    /// - app.log: 通用应用日志
    /// - bootstrap.log: 依赖等待、重试与启动顺序日志
    ///
    /// `level` 采用 RUST_LOG 语法, 无法解析时退回 info。
    pub fn init(level: &str, dir: &str) -> Self {
        let mut guards = Vec::new();

        // 创建日志目录 (失败时仅输出到控制台)
        let file_logging = fs::create_dir_all(dir).is_ok();

        let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));

        // 容器内统一使用 UTC 时间
        let timer = OffsetTime::new(UtcOffset::UTC, Rfc3339);

        // 1. 控制台输出
        let console_layer = fmt::layer()
            .compact()
            .with_target(true)
            .with_timer(timer.clone());

        let (app_layer, bootstrap_layer) = if file_logging {
            // 2. 通用应用日志 (app.log)
            let (app_writer, app_guard) = non_blocking(rolling::daily(dir, "app.log"));
            guards.push(app_guard);

            let app_layer = fmt::layer()
                .compact()
                .with_writer(app_writer)
                .with_ansi(false)
                .with_target(true)
                .with_timer(timer.clone());

            // 3. 启动流程日志 (bootstrap.log)
            let (bootstrap_writer, bootstrap_guard) =
                non_blocking(rolling::daily(dir, "bootstrap.log"));
            guards.push(bootstrap_guard);

            let bootstrap_layer = fmt::layer()
                .compact()
                .with_writer(bootstrap_writer)
                .with_ansi(false)
                .with_target(true)
                .with_timer(timer)
                .with_filter(FilterFn::new(|metadata| metadata.target() == BOOTSTRAP_TARGET));

            (Some(app_layer), Some(bootstrap_layer))
        } else {
            (None, None)
        };

        // 初始化tracing订阅器
        tracing_subscriber::registry()
            .with(filter)
            .with(console_layer)
            .with(app_layer)
            .with(bootstrap_layer)
            .init();

        if !file_logging {
            tracing::warn!("日志目录 {} 无法创建, 仅输出到控制台", dir);
        }

        Self { _guards: guards }
    }
}
