use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Account role. Fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_role", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Role {
    SuperAdmin,
    Admin,
    Teacher,
}

impl Role {
    pub fn is_admin(self) -> bool {
        matches!(self, Role::SuperAdmin | Role::Admin)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::SuperAdmin => "super_admin",
            Role::Admin => "admin",
            Role::Teacher => "teacher",
        }
    }
}

/// User record in the database.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String, // Argon2 hash, not exposed in JSON
    pub role: Role,
    pub is_active: bool,
    pub is_staff: bool,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TeacherInfo {
    pub user_id: Uuid,
    pub name: String,
    pub education: String,
    pub major: String,
    pub teaching_scope: String,
    pub bank_account: String,
    pub phone: String,
    pub is_approved: bool,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl TeacherInfo {
    /// Bank account with the middle hidden, e.g. `6222****1234`.
    pub fn masked_bank_account(&self) -> String {
        mask_account(&self.bank_account)
    }
}

pub fn mask_account(account: &str) -> String {
    let chars: Vec<char> = account.chars().collect();
    if chars.len() > 8 {
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}****{}", head, tail)
    } else {
        account.to_string()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AdminInfo {
    pub user_id: Uuid,
    pub name: String,
    pub phone: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Teacher account joined with its (possibly missing) profile.
#[derive(Debug, Clone, FromRow)]
pub struct TeacherRow {
    #[sqlx(flatten)]
    pub user: User,
    pub name: Option<String>,
    pub education: Option<String>,
    pub major: Option<String>,
    pub teaching_scope: Option<String>,
    pub bank_account: Option<String>,
    pub phone: Option<String>,
    pub is_approved: Option<bool>,
}

/// Admin account joined with its (possibly missing) profile.
#[derive(Debug, Clone, FromRow)]
pub struct AdminRow {
    #[sqlx(flatten)]
    pub user: User,
    pub name: Option<String>,
    pub phone: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_long_accounts() {
        assert_eq!(mask_account("6222020200112233"), "6222****2233");
    }

    #[test]
    fn keeps_short_accounts() {
        assert_eq!(mask_account("12345678"), "12345678");
        assert_eq!(mask_account(""), "");
    }

    #[test]
    fn admin_roles() {
        assert!(Role::SuperAdmin.is_admin());
        assert!(Role::Admin.is_admin());
        assert!(!Role::Teacher.is_admin());
    }

    #[test]
    fn role_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&Role::SuperAdmin).unwrap(), "\"super_admin\"");
        let r: Role = serde_json::from_str("\"teacher\"").unwrap();
        assert_eq!(r, Role::Teacher);
    }
}
