use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::repo_types::{mask_account, AdminInfo, AdminRow, TeacherInfo, TeacherRow};
use crate::applications::repo_types::SalaryApplication;
use crate::db::empty_string_as_none;
use crate::orders::repo_types::Order;

/// Editable teacher profile fields.
#[derive(Debug, Clone, Deserialize)]
pub struct TeacherProfileInput {
    pub name: String,
    pub education: String,
    pub major: String,
    pub teaching_scope: String,
    pub bank_account: String,
    pub phone: String,
}

/// Editable admin profile fields.
#[derive(Debug, Clone, Deserialize)]
pub struct AdminProfileInput {
    pub name: String,
    pub phone: String,
}

/// Super admin creating an admin account.
#[derive(Debug, Deserialize)]
pub struct CreateAdminRequest {
    pub username: String,
    pub password1: String,
    pub password2: String,
    #[serde(flatten)]
    pub profile: AdminProfileInput,
}

/// Super admin editing a teacher: profile plus the active flag.
#[derive(Debug, Deserialize)]
pub struct UpdateTeacherRequest {
    #[serde(flatten)]
    pub profile: TeacherProfileInput,
    pub is_active: bool,
}

/// Super admin editing an admin: profile plus the active flag.
#[derive(Debug, Deserialize)]
pub struct UpdateAdminRequest {
    #[serde(flatten)]
    pub profile: AdminProfileInput,
    pub is_active: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct TeacherFilter {
    pub search: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub is_active: Option<bool>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub is_approved: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AdminFilter {
    pub search: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub is_active: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct TeacherProfileView {
    pub name: String,
    pub education: String,
    pub major: String,
    pub teaching_scope: String,
    pub bank_account: String,
    pub phone: String,
    pub is_approved: bool,
}

impl TeacherProfileView {
    pub fn new(info: &TeacherInfo, reveal_bank_account: bool) -> Self {
        Self {
            name: info.name.clone(),
            education: info.education.clone(),
            major: info.major.clone(),
            teaching_scope: info.teaching_scope.clone(),
            bank_account: if reveal_bank_account {
                info.bank_account.clone()
            } else {
                info.masked_bank_account()
            },
            phone: info.phone.clone(),
            is_approved: info.is_approved,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AdminProfileView {
    pub name: String,
    pub phone: String,
}

impl From<&AdminInfo> for AdminProfileView {
    fn from(info: &AdminInfo) -> Self {
        Self {
            name: info.name.clone(),
            phone: info.phone.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TeacherView {
    pub id: Uuid,
    pub username: String,
    pub is_active: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub profile: Option<TeacherProfileView>,
}

impl TeacherView {
    pub fn from_row(row: TeacherRow, reveal_bank_account: bool) -> Self {
        let profile = match (
            row.name,
            row.education,
            row.major,
            row.teaching_scope,
            row.bank_account,
            row.phone,
        ) {
            (Some(name), Some(education), Some(major), Some(teaching_scope), Some(bank), Some(phone)) => {
                Some(TeacherProfileView {
                    name,
                    education,
                    major,
                    teaching_scope,
                    bank_account: if reveal_bank_account { bank } else { mask_account(&bank) },
                    phone,
                    is_approved: row.is_approved.unwrap_or(false),
                })
            }
            _ => None,
        };
        Self {
            id: row.user.id,
            username: row.user.username,
            is_active: row.user.is_active,
            created_at: row.user.created_at,
            profile,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AdminView {
    pub id: Uuid,
    pub username: String,
    pub is_active: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub profile: Option<AdminProfileView>,
}

impl From<AdminRow> for AdminView {
    fn from(row: AdminRow) -> Self {
        let profile = match (row.name, row.phone) {
            (Some(name), Some(phone)) => Some(AdminProfileView { name, phone }),
            _ => None,
        };
        Self {
            id: row.user.id,
            username: row.user.username,
            is_active: row.user.is_active,
            created_at: row.user.created_at,
            profile,
        }
    }
}

/// Admin view of one teacher with recent activity.
#[derive(Debug, Serialize)]
pub struct TeacherDetail {
    pub teacher: TeacherView,
    pub orders: Vec<Order>,
    pub applications: Vec<SalaryApplication>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProfileView {
    Teacher(TeacherProfileView),
    Admin(AdminProfileView),
    /// Profile not filled in yet.
    Empty,
}

#[derive(Debug, Serialize)]
#[serde(tag = "view", rename_all = "snake_case")]
pub enum Dashboard {
    Admin {
        total_teachers: i64,
        total_orders: i64,
        pending_applications: i64,
        approved_amount: Decimal,
        latest_orders: Vec<Order>,
        pending_applications_list: Vec<SalaryApplication>,
    },
    Teacher {
        is_approved: bool,
        my_orders: Vec<Order>,
        my_applications: Vec<SalaryApplication>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::repo_types::{Role, User};

    fn user(role: Role) -> User {
        let now = OffsetDateTime::now_utc();
        User {
            id: Uuid::new_v4(),
            username: "t1".into(),
            password_hash: "x".into(),
            role,
            is_active: true,
            is_staff: false,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn teacher_view_masks_bank_account_unless_revealed() {
        let row = || TeacherRow {
            user: user(Role::Teacher),
            name: Some("Li".into()),
            education: Some("MSc".into()),
            major: Some("Math".into()),
            teaching_scope: Some("algebra".into()),
            bank_account: Some("6222020200112233".into()),
            phone: Some("13800000000".into()),
            is_approved: Some(true),
        };
        let masked = TeacherView::from_row(row(), false);
        assert_eq!(masked.profile.as_ref().unwrap().bank_account, "6222****2233");
        let clear = TeacherView::from_row(row(), true);
        assert_eq!(clear.profile.unwrap().bank_account, "6222020200112233");
    }

    #[test]
    fn teacher_without_profile_has_none() {
        let row = TeacherRow {
            user: user(Role::Teacher),
            name: None,
            education: None,
            major: None,
            teaching_scope: None,
            bank_account: None,
            phone: None,
            is_approved: None,
        };
        assert!(TeacherView::from_row(row, false).profile.is_none());
    }

    #[test]
    fn dashboard_is_tagged_by_view() {
        let d = Dashboard::Teacher {
            is_approved: true,
            my_orders: vec![],
            my_applications: vec![],
        };
        let v = serde_json::to_value(&d).unwrap();
        assert_eq!(v["view"], "teacher");
        assert_eq!(v["is_approved"], true);
    }

    #[test]
    fn register_style_flatten_reads_profile() {
        let body = r#"{"name":"A","phone":"1","is_active":false}"#;
        let req: UpdateAdminRequest = serde_json::from_str(body).unwrap();
        assert_eq!(req.profile.name, "A");
        assert!(!req.is_active);
    }
}
