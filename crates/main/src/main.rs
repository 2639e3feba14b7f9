mod bootstrap;

use anyhow::Result;
use clap::Parser;
use config_crate::{AppConfig, ConfigError, LoadOptions, ModeKind};
use services::{BootstrapError, ShutdownSignal};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use utils::LoggerManager;

use crate::bootstrap::{setup_panic_hook, Application};

const EXIT_FAILURE: u8 = 1;
const EXIT_CONFIG: u8 = 2;
const EXIT_DEPENDENCY: u8 = 3;
const EXIT_INTERRUPTED: u8 = 130;

#[derive(Parser, Debug)]
#[command(name = "tg_gpt_bot", version, about = "Telegram GPT bot")]
struct Cli {
    /// 运行模式 (production | test), 覆盖 APP_MODE
    #[arg(long)]
    mode: Option<ModeKind>,

    /// env 文件路径, 覆盖 ENV_FILE
    #[arg(long, value_name = "PATH")]
    env_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = AppConfig::load(LoadOptions {
        env_file: cli.env_file,
        mode: cli.mode,
    });

    // 配置无效时日志仍然写到默认位置
    let (level, dir) = match &config {
        Ok(config) => (config.log.level.clone(), config.log.dir.clone()),
        Err(_) => ("info".to_string(), "./logs".to_string()),
    };
    let _logger = LoggerManager::init(&level, &dir);

    // 设置 panic hook
    setup_panic_hook();

    info!("========================================");
    info!("  Telegram GPT 机器人启动");
    info!("========================================");

    let config = match config {
        Ok(config) => config,
        Err(e) => {
            error!("❌ 配置错误: {}", e);
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    let shutdown = ShutdownSignal::new();
    let _signals = shutdown.listen_for_os_signals();

    match run(config, &shutdown).await {
        Ok(code) => {
            info!("进程退出, 退出码 {}", code);
            ExitCode::from(u8::try_from(code).unwrap_or(EXIT_FAILURE))
        }
        Err(e) => {
            error!("❌ {:#}", e);
            ExitCode::from(exit_code_for(&e))
        }
    }
}

async fn run(config: AppConfig, shutdown: &ShutdownSignal) -> Result<i32> {
    // 启动应用 (等待依赖就绪)
    let app = Application::start(config, shutdown).await?;

    // 运行入口 (阻塞直到关闭或测试结束)
    let result = app.run(shutdown).await;

    // 关闭应用
    app.shutdown().await;

    result
}

fn exit_code_for(err: &anyhow::Error) -> u8 {
    if let Some(e) = err.downcast_ref::<BootstrapError>() {
        if e.is_cancelled() {
            EXIT_INTERRUPTED
        } else {
            EXIT_DEPENDENCY
        }
    } else if err.downcast_ref::<ConfigError>().is_some() {
        EXIT_CONFIG
    } else {
        EXIT_FAILURE
    }
}
