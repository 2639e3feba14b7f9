use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::str::FromStr;

/// 用户状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserState {
    Active,
    Inactive,
    Banned,
}

impl UserState {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserState::Active => "active",
            UserState::Inactive => "inactive",
            UserState::Banned => "banned",
        }
    }
}

impl FromStr for UserState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "active" => Ok(UserState::Active),
            "inactive" => Ok(UserState::Inactive),
            "banned" => Ok(UserState::Banned),
            other => Err(format!("unknown user state '{}'", other)),
        }
    }
}

/// 用户角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    User,
    Admin,
    Superuser,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::User => "user",
            UserRole::Admin => "admin",
            UserRole::Superuser => "superuser",
        }
    }
}

impl FromStr for UserRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "user" => Ok(UserRole::User),
            "admin" => Ok(UserRole::Admin),
            "superuser" => Ok(UserRole::Superuser),
            other => Err(format!("unknown user role '{}'", other)),
        }
    }
}

/// 用户记录 (users 表)
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i64,
    pub telegram_id: i64,
    pub telegram_username: Option<String>,
    pub state: String,
    pub role: String,
    pub create_datetime: chrono::DateTime<chrono::Utc>,
    pub write_datetime: Option<chrono::DateTime<chrono::Utc>>,
}

impl User {
    pub fn state(&self) -> Option<UserState> {
        self.state.parse().ok()
    }

    pub fn role(&self) -> Option<UserRole> {
        self.role.parse().ok()
    }

    pub fn is_active(&self) -> bool {
        self.state() == Some(UserState::Active)
    }
}
