use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "audit_action", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Login,
    Logout,
    Create,
    Update,
    Delete,
    Approve,
    Reject,
    Enable,
    Disable,
    Withdraw,
}

impl AuditAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::Logout => "logout",
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Approve => "approve",
            Self::Reject => "reject",
            Self::Enable => "enable",
            Self::Disable => "disable",
            Self::Withdraw => "withdraw",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "login" => Self::Login,
            "logout" => Self::Logout,
            "create" => Self::Create,
            "update" => Self::Update,
            "delete" => Self::Delete,
            "approve" => Self::Approve,
            "reject" => Self::Reject,
            "enable" => Self::Enable,
            "disable" => Self::Disable,
            "withdraw" => Self::Withdraw,
            other => return Err(format!("unknown action '{}'", other)),
        })
    }
}

/// Kinds of records an audit row can point at.
pub mod object_type {
    pub const USER: &str = "User";
    pub const TEACHER: &str = "Teacher";
    pub const ADMIN: &str = "Admin";
    pub const ORDER: &str = "Order";
    pub const SALARY_APPLICATION: &str = "SalaryApplication";
    pub const BACKUP: &str = "Backup";
    pub const DATABASE: &str = "Database";
}

/// One row of the append-only operation log.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct OperationLog {
    pub id: i64,
    pub user_id: Option<Uuid>,
    pub username: Option<String>,
    pub action: AuditAction,
    pub object_type: String,
    pub object_id: String,
    pub object_name: String,
    pub ip_address: String,
    pub description: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}
