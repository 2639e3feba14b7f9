use anyhow::{Context, Result};
use config_crate::ConnectionDescriptor;
use models::{User, UserRole, UserState};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{ConnectOptions, PgPool};
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// 机器人自身用户记录的用户名
pub const SUPERUSER_USERNAME: &str = "Bot";

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// 建立连接池; 调用前存储应已通过就绪探测
    pub async fn connect(
        descriptor: &ConnectionDescriptor,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<Self> {
        let options = PgConnectOptions::from_str(&descriptor.connection_url())
            .with_context(|| format!("Invalid connection options for {}", descriptor))?
            .disable_statement_logging();

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open connection pool to {}", descriptor))?;

        Ok(Self { pool })
    }

    /// 从已有连接池创建 Database 实例
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn ping(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await.map(|_| ())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// 初始化数据库表 (可重复执行)
    pub async fn initialize_tables(&self) -> Result<()> {
        info!("开始初始化数据库表...");

        // 用户表
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id BIGSERIAL PRIMARY KEY,
                telegram_id BIGINT NOT NULL UNIQUE,
                telegram_username VARCHAR(255),
                state VARCHAR(20) NOT NULL DEFAULT 'inactive',
                role VARCHAR(20) NOT NULL DEFAULT 'user',
                create_datetime TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                write_datetime TIMESTAMPTZ
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_users_telegram_username ON users (telegram_username)")
            .execute(&self.pool)
            .await?;
        info!("✓ 用户表已创建/验证");

        // 群组表
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS groups (
                id BIGSERIAL PRIMARY KEY,
                telegram_id VARCHAR(255),
                type VARCHAR(20) NOT NULL DEFAULT 'private',
                title VARCHAR(255),
                telegram_username VARCHAR(255),
                create_datetime TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                write_datetime TIMESTAMPTZ
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        info!("✓ 群组表已创建/验证");

        // 用户-群组关系表
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS user_group_rels (
                user_id BIGINT NOT NULL REFERENCES users (id) ON DELETE CASCADE,
                group_id BIGINT NOT NULL REFERENCES groups (id) ON DELETE CASCADE,
                PRIMARY KEY (user_id, group_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        info!("✓ 用户-群组关系表已创建/验证");

        // 消息表
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                id BIGSERIAL PRIMARY KEY,
                text TEXT,
                datetime TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                user_id BIGINT REFERENCES users (id) ON DELETE SET NULL,
                group_id BIGINT REFERENCES groups (id) ON DELETE CASCADE,
                context_group_id BIGINT REFERENCES groups (id) ON DELETE SET NULL,
                create_datetime TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                write_datetime TIMESTAMPTZ
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_messages_group_id ON messages (group_id)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_messages_context_group_id ON messages (context_group_id)")
            .execute(&self.pool)
            .await?;
        info!("✓ 消息表已创建/验证");

        info!("数据库表初始化完成");
        Ok(())
    }

    /// 确保机器人自身的用户记录存在, 已存在时不做修改
    pub async fn ensure_superuser(&self, telegram_id: i64) -> Result<User> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO users (telegram_id, telegram_username, state, role)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (telegram_id) DO NOTHING
            "#,
        )
        .bind(telegram_id)
        .bind(SUPERUSER_USERNAME)
        .bind(UserState::Active.as_str())
        .bind(UserRole::Superuser.as_str())
        .execute(&self.pool)
        .await?
        .rows_affected();

        let user = self
            .get_user_by_telegram_id(telegram_id)
            .await?
            .context("Superuser record missing after insert")?;

        if inserted > 0 {
            info!("✓ 已创建机器人用户记录 telegram_id={}", telegram_id);
        } else {
            info!("机器人用户记录已存在 telegram_id={}", telegram_id);
        }
        Ok(user)
    }

    pub async fn get_user_by_telegram_id(&self, telegram_id: i64) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, telegram_id, telegram_username, state, role, create_datetime, write_datetime
            FROM users
            WHERE telegram_id = $1
            "#,
        )
        .bind(telegram_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }
}
