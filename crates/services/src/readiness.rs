//! 启动依赖探测
//!
//! 每个探测器只负责一次尝试; 超时、重试与退避由 `BootstrapSequencer` 统一处理。

use async_trait::async_trait;
use config_crate::{ConnectionDescriptor, DebugSocketConfig, DEBUG_SOCKET_HOST_KEY};
use models::DependencyKind;
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::{ConnectOptions, Connection};
use std::str::FromStr;
use thiserror::Error;
use tokio::net::TcpStream;
use tracing::{info, warn};
use utils::BOOTSTRAP_TARGET;

use crate::database::Database;

/// Postgres 中表示"暂时不可用"的 SQLSTATE
const TRANSIENT_SQLSTATES: &[&str] = &[
    "57P03", // cannot_connect_now: 数据库启动中
    "57P01", // admin_shutdown: 数据库重启中
    "3D000", // invalid_catalog_name: 数据库尚未创建
    "53300", // too_many_connections
    "08000", // connection_exception
    "08001", // sqlclient_unable_to_establish_sqlconnection
    "08006", // connection_failure
];

const DUPLICATE_DATABASE: &str = "42P04";
const MAINTENANCE_DATABASE: &str = "postgres";

/// 单次探测失败
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProbeError {
    /// 依赖尚未就绪, 可重试
    #[error("{0}")]
    NotReady(String),
    /// 依赖明确拒绝 (认证失败等), 重试无意义
    #[error("{0}")]
    Rejected(String),
}

/// 启动依赖
#[async_trait]
pub trait ReadinessProbe: Send + Sync {
    fn kind(&self) -> DependencyKind;

    /// `host:port`
    fn target(&self) -> String;

    /// 该依赖对应的配置项
    fn config_key(&self) -> &'static str;

    /// 可选依赖在预算耗尽后被跳过而不是终止启动
    fn required(&self) -> bool {
        true
    }

    async fn probe(&self) -> Result<(), ProbeError>;
}

/// 存储探测: 建立一条独立连接并执行 `SELECT 1`
pub struct StoreProbe {
    descriptor: ConnectionDescriptor,
    config_key: &'static str,
    provision_missing: bool,
}

impl StoreProbe {
    pub fn new(descriptor: ConnectionDescriptor, config_key: &'static str) -> Self {
        Self {
            descriptor,
            config_key,
            provision_missing: false,
        }
    }

    /// 数据库不存在 (3D000) 时通过维护库 `postgres` 创建它
    pub fn provision_missing(mut self, enabled: bool) -> Self {
        self.provision_missing = enabled;
        self
    }

    pub fn provisions_missing(&self) -> bool {
        self.provision_missing
    }

    async fn check(descriptor: &ConnectionDescriptor) -> Result<(), sqlx::Error> {
        let mut conn = connect(descriptor).await?;
        sqlx::query("SELECT 1").execute(&mut conn).await?;
        conn.close().await?;
        Ok(())
    }

    async fn create_database(&self) -> Result<(), ProbeError> {
        let admin = self.descriptor.with_database(MAINTENANCE_DATABASE);
        let mut conn = connect(&admin).await.map_err(|e| classify_sqlx_error(&e))?;

        let statement = format!("CREATE DATABASE {}", quote_identifier(&self.descriptor.database));
        match sqlx::query(&statement).execute(&mut conn).await {
            Ok(_) => {
                info!(
                    target: BOOTSTRAP_TARGET,
                    database = %self.descriptor.database,
                    "已创建缺失的数据库"
                );
            }
            // 并发启动的实例已经创建
            Err(e) if sqlstate(&e).as_deref() == Some(DUPLICATE_DATABASE) => {}
            Err(e) => {
                let _ = conn.close().await;
                return Err(classify_sqlx_error(&e));
            }
        }

        let _ = conn.close().await;
        Ok(())
    }
}

#[async_trait]
impl ReadinessProbe for StoreProbe {
    fn kind(&self) -> DependencyKind {
        DependencyKind::Store
    }

    fn target(&self) -> String {
        self.descriptor.host_port()
    }

    fn config_key(&self) -> &'static str {
        self.config_key
    }

    async fn probe(&self) -> Result<(), ProbeError> {
        match Self::check(&self.descriptor).await {
            Ok(()) => Ok(()),
            Err(e) if self.provision_missing && sqlstate(&e).as_deref() == Some("3D000") => {
                warn!(
                    target: BOOTSTRAP_TARGET,
                    database = %self.descriptor.database,
                    "数据库不存在, 尝试创建"
                );
                self.create_database().await?;
                Self::check(&self.descriptor)
                    .await
                    .map_err(|e| classify_sqlx_error(&e))
            }
            Err(e) => Err(classify_sqlx_error(&e)),
        }
    }
}

/// 通过连接池探测存储 (供运行期 /ready 使用)
pub struct PoolProbe {
    database: Database,
    target: String,
    config_key: &'static str,
}

impl PoolProbe {
    pub fn new(database: Database, descriptor: &ConnectionDescriptor, config_key: &'static str) -> Self {
        Self {
            database,
            target: descriptor.host_port(),
            config_key,
        }
    }
}

#[async_trait]
impl ReadinessProbe for PoolProbe {
    fn kind(&self) -> DependencyKind {
        DependencyKind::Store
    }

    fn target(&self) -> String {
        self.target.clone()
    }

    fn config_key(&self) -> &'static str {
        self.config_key
    }

    async fn probe(&self) -> Result<(), ProbeError> {
        self.database.ping().await.map_err(|e| classify_sqlx_error(&e))
    }
}

/// 远程调试 socket 探测: TCP 连接成功即视为就绪
pub struct DebugSocketProbe {
    host: String,
    port: u16,
    required: bool,
}

impl DebugSocketProbe {
    pub fn new(config: &DebugSocketConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            required: config.attach_required,
        }
    }
}

#[async_trait]
impl ReadinessProbe for DebugSocketProbe {
    fn kind(&self) -> DependencyKind {
        DependencyKind::DebugSocket
    }

    fn target(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    fn config_key(&self) -> &'static str {
        DEBUG_SOCKET_HOST_KEY
    }

    fn required(&self) -> bool {
        self.required
    }

    async fn probe(&self) -> Result<(), ProbeError> {
        // 拒绝连接、DNS 尚未解析等都属于未就绪
        TcpStream::connect((self.host.as_str(), self.port))
            .await
            .map(drop)
            .map_err(|e| ProbeError::NotReady(e.to_string()))
    }
}

async fn connect(descriptor: &ConnectionDescriptor) -> Result<PgConnection, sqlx::Error> {
    let options = PgConnectOptions::from_str(&descriptor.connection_url())?.disable_statement_logging();
    PgConnection::connect_with(&options).await
}

fn sqlstate(err: &sqlx::Error) -> Option<String> {
    match err {
        sqlx::Error::Database(db) => db.code().map(|c| c.into_owned()),
        _ => None,
    }
}

/// 将驱动错误划分为可重试 / 不可重试
pub fn classify_sqlx_error(err: &sqlx::Error) -> ProbeError {
    let message = err.to_string();
    match err {
        sqlx::Error::Io(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed
        | sqlx::Error::Protocol(_) => ProbeError::NotReady(message),
        sqlx::Error::Database(_) => match sqlstate(err) {
            Some(code) if TRANSIENT_SQLSTATES.contains(&code.as_str()) => ProbeError::NotReady(message),
            _ => ProbeError::Rejected(message),
        },
        sqlx::Error::Configuration(_) | sqlx::Error::Tls(_) => ProbeError::Rejected(message),
        _ => ProbeError::NotReady(message),
    }
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use tokio::net::TcpListener;

    #[test]
    fn test_io_errors_are_transient() {
        let err = sqlx::Error::Io(io::Error::new(io::ErrorKind::ConnectionRefused, "connection refused"));
        assert!(matches!(classify_sqlx_error(&err), ProbeError::NotReady(_)));
        assert!(matches!(classify_sqlx_error(&sqlx::Error::PoolTimedOut), ProbeError::NotReady(_)));
    }

    #[test]
    fn test_configuration_errors_are_rejected() {
        let err = sqlx::Error::Configuration("bad sslmode".into());
        assert!(matches!(classify_sqlx_error(&err), ProbeError::Rejected(_)));
    }

    #[test]
    fn test_quote_identifier() {
        assert_eq!(quote_identifier("bot_db_test"), "\"bot_db_test\"");
        assert_eq!(quote_identifier("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_store_probe_reports_descriptor() {
        let descriptor = ConnectionDescriptor::parse("postgresql://bot:bot@db/bot_db", "DATABASE_URL").unwrap();
        let probe = StoreProbe::new(descriptor, "DATABASE_URL");
        assert_eq!(probe.kind(), DependencyKind::Store);
        assert_eq!(probe.target(), "db:5432");
        assert_eq!(probe.config_key(), "DATABASE_URL");
        assert!(probe.required());
        assert!(!probe.provisions_missing());
        assert!(probe.provision_missing(true).provisions_missing());
    }

    #[tokio::test]
    async fn test_debug_socket_probe_follows_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let probe = DebugSocketProbe::new(&DebugSocketConfig {
            host: "127.0.0.1".to_string(),
            port,
            no_browser: true,
            attach_required: false,
        });

        assert_eq!(probe.probe().await, Ok(()));
        assert!(!probe.required());
        assert_eq!(probe.config_key(), "DEBUG_SOCKET_HOST");

        drop(listener);
        assert!(matches!(probe.probe().await, Err(ProbeError::NotReady(_))));
    }
}
