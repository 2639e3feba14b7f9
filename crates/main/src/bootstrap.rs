//! 应用启动引导模块
//!
//! 封装依赖等待、数据库初始化、入口运行和关闭逻辑

use anyhow::Result;
use api::AppState;
use config_crate::{AppConfig, ProcessMode};
use models::ReadinessReport;
use services::{
    BootstrapSequencer, Database, DebugSocketProbe, PoolProbe, ReadinessProbe, RetryPolicy, ShutdownSignal,
    StoreProbe, TestRunner,
};
use std::sync::Arc;
use tracing::{error, info, warn};

/// 应用程序
pub struct Application {
    config: AppConfig,
    database: Database,
    report: ReadinessReport,
}

impl Application {
    /// 等待当前模式的全部依赖就绪后初始化应用
    pub async fn start(config: AppConfig, shutdown: &ShutdownSignal) -> Result<Self> {
        Self::log_config(&config);

        let sequencer = Self::build_sequencer(&config);
        let app = sequencer
            .launch(shutdown, |report| Self::init(config, report))
            .await??;

        Ok(app)
    }

    async fn init(config: AppConfig, report: ReadinessReport) -> Result<Self> {
        for skipped in report.skipped() {
            warn!("⚠️  {} ({}) 未就绪, 已跳过", skipped.kind, skipped.target);
        }

        let database = Self::init_database(&config).await?;

        if let ProcessMode::Production = config.mode {
            database.ensure_superuser(config.bot.superuser_id).await?;
            Self::check_config(&config);
        }

        Ok(Self {
            config,
            database,
            report,
        })
    }

    /// 运行当前模式的入口, 返回进程退出码
    pub async fn run(&self, shutdown: &ShutdownSignal) -> Result<i32> {
        info!(
            "启动完成, 依赖探测共 {} 次尝试",
            self.report.total_attempts()
        );

        match &self.config.mode {
            ProcessMode::Production => {
                self.run_server(shutdown).await?;
                Ok(0)
            }
            ProcessMode::Test(test) => {
                let runner = TestRunner::new(test, &self.config.database.descriptor);
                runner.run(shutdown).await
            }
        }
    }

    /// 运行健康检查服务器直到收到关闭信号
    async fn run_server(&self, shutdown: &ShutdownSignal) -> Result<()> {
        let database = &self.config.database;
        let checks: Vec<Arc<dyn ReadinessProbe>> = vec![Arc::new(PoolProbe::new(
            self.database.clone(),
            &database.descriptor,
            database.source_key,
        ))];

        let state = AppState::new(self.config.mode.kind(), checks, self.config.bootstrap.probe_timeout);
        let app = api::create_server(state);

        api::start_server(app, &self.config.api.bind_address(), shutdown.clone()).await
    }

    /// 关闭应用
    pub async fn shutdown(self) {
        info!("正在停止服务...");
        self.database.close().await;
        info!("系统已停止");
    }

    fn build_sequencer(config: &AppConfig) -> BootstrapSequencer {
        let mut sequencer = BootstrapSequencer::new(RetryPolicy::from_config(&config.bootstrap));
        sequencer.add_probe(Arc::new(Self::store_probe(config)));

        if let ProcessMode::Test(test) = &config.mode {
            sequencer.add_probe(Arc::new(DebugSocketProbe::new(&test.debug_socket)));
        }

        sequencer
    }

    /// 测试库不存在时自动创建
    fn store_probe(config: &AppConfig) -> StoreProbe {
        let database = &config.database;
        StoreProbe::new(database.descriptor.clone(), database.source_key)
            .provision_missing(config.mode.is_test())
    }

    fn log_config(config: &AppConfig) {
        let bootstrap = &config.bootstrap;
        info!("配置加载成功");
        info!("========================================");
        info!("运行模式: {}", config.mode.kind());
        info!("数据库: {} ({})", config.database.descriptor, config.database.source_key);
        if let ProcessMode::Test(test) = &config.mode {
            info!(
                "调试 socket: {} (必需: {})",
                test.debug_socket.address(),
                test.debug_socket.attach_required
            );
            info!("测试命令: {}", test.runner);
        } else {
            info!("API 监听: {}", config.api.bind_address());
        }
        info!("========================================");
        info!(
            "启动重试: 最多 {} 次, 退避 {:?} ~ {:?}, 单次超时 {:?}",
            bootstrap.max_attempts, bootstrap.base_delay, bootstrap.max_delay, bootstrap.probe_timeout
        );
    }

    async fn init_database(config: &AppConfig) -> Result<Database> {
        info!("初始化数据库连接...");

        let db_config = &config.database;
        let database = Database::connect(
            &db_config.descriptor,
            db_config.max_connections,
            config.bootstrap.probe_timeout,
        )
        .await?;
        database.initialize_tables().await?;

        info!("数据库初始化完成");
        Ok(database)
    }

    /// 检查机器人凭据
    fn check_config(config: &AppConfig) {
        let bot = &config.bot;

        if bot.main_bot_token.is_some() {
            info!("✅ 主机器人 Token 已配置");
        } else {
            warn!("⚠️  TELEGRAM_MAIN_BOT_TOKEN 未配置 - 主机器人不会运行");
        }

        if bot.admin_bot_token.is_none() {
            warn!("⚠️  TELEGRAM_ADMIN_BOT_TOKEN 未配置 - 管理机器人不会运行");
        } else if bot.admin_user_id.is_none() {
            warn!("⚠️  TELEGRAM_ADMIN_USER_ID 未配置 - 管理机器人无法识别管理员");
        }

        if bot.openai_api_key.is_some() {
            info!("✅ OpenAI 已配置, 模型: {}", bot.gpt_model);
        } else {
            warn!("⚠️  OPENAI_API_KEY 未配置 - GPT 回复不可用");
        }
    }
}

/// 设置 panic hook，记录 panic 信息
pub fn setup_panic_hook() {
    std::panic::set_hook(Box::new(|panic_info| {
        error!("========================================");
        error!("!!! 系统发生 PANIC !!!");
        error!("========================================");
        if let Some(location) = panic_info.location() {
            error!(
                "发生位置: {}:{}:{}",
                location.file(),
                location.line(),
                location.column()
            );
        }
        if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            error!("Panic 消息: {}", s);
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            error!("Panic 消息: {}", s);
        }
        error!("========================================");
    }));
}
