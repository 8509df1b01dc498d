use lazy_static::lazy_static;
use regex::Regex;
use sqlx::PgPool;
use tracing::{info, warn};

use super::dto::{AdminProfileInput, TeacherProfileInput};
use super::repo;
use super::repo_types::{Role, User};
use crate::{
    auth::password::hash_password,
    config::BootstrapAdmin,
    error::{is_unique_violation, AppError, AppResult},
};

pub fn validate_username(username: &str) -> AppResult<()> {
    lazy_static! {
        static ref USERNAME_RE: Regex = Regex::new(r"^[\w.@+-]{1,150}$").unwrap();
    }
    if USERNAME_RE.is_match(username) {
        Ok(())
    } else {
        Err(AppError::validation(
            "username must be 1-150 letters, digits or @.+-_ characters",
        ))
    }
}

fn required(field: &str, value: &str, max: usize) -> AppResult<String> {
    let v = value.trim();
    if v.is_empty() {
        return Err(AppError::validation(format!("{} is required", field)));
    }
    if v.chars().count() > max {
        return Err(AppError::validation(format!(
            "{} must be at most {} characters",
            field, max
        )));
    }
    Ok(v.to_string())
}

/// Trimmed copy of the profile, or the first field error.
pub fn clean_teacher_profile(p: &TeacherProfileInput) -> AppResult<TeacherProfileInput> {
    Ok(TeacherProfileInput {
        name: required("name", &p.name, 100)?,
        education: required("education", &p.education, 100)?,
        major: required("major", &p.major, 100)?,
        teaching_scope: required("teaching_scope", &p.teaching_scope, 2000)?,
        bank_account: required("bank_account", &p.bank_account, 100)?,
        phone: required("phone", &p.phone, 20)?,
    })
}

pub fn clean_admin_profile(p: &AdminProfileInput) -> AppResult<AdminProfileInput> {
    Ok(AdminProfileInput {
        name: required("name", &p.name, 100)?,
        phone: required("phone", &p.phone, 20)?,
    })
}

fn taken(username: &str) -> AppError {
    AppError::Conflict(format!("username '{}' is already taken", username))
}

/// Self-registration: teacher account plus an unapproved profile, in one transaction.
pub async fn create_teacher_account(
    db: &PgPool,
    username: &str,
    password: &str,
    profile: &TeacherProfileInput,
) -> AppResult<User> {
    if repo::find_by_username(db, username).await?.is_some() {
        return Err(taken(username));
    }
    let hash = hash_password(password)?;

    let mut tx = db.begin().await?;
    let user = match repo::create_user(&mut *tx, username, &hash, Role::Teacher, false).await {
        Ok(u) => u,
        Err(e) if is_unique_violation(&e) => return Err(taken(username)),
        Err(e) => return Err(e.into()),
    };
    repo::upsert_teacher_info(&mut *tx, user.id, profile, false).await?;
    tx.commit().await?;

    info!(user_id = %user.id, username = %user.username, "teacher registered");
    Ok(user)
}

pub async fn create_admin_account(
    db: &PgPool,
    username: &str,
    password: &str,
    profile: &AdminProfileInput,
) -> AppResult<User> {
    if repo::find_by_username(db, username).await?.is_some() {
        return Err(taken(username));
    }
    let hash = hash_password(password)?;

    let mut tx = db.begin().await?;
    let user = match repo::create_user(&mut *tx, username, &hash, Role::Admin, true).await {
        Ok(u) => u,
        Err(e) if is_unique_violation(&e) => return Err(taken(username)),
        Err(e) => return Err(e.into()),
    };
    repo::upsert_admin_info(&mut *tx, user.id, profile).await?;
    tx.commit().await?;

    info!(user_id = %user.id, username = %user.username, "admin account created");
    Ok(user)
}

/// Create the configured super admin unless one already exists.
pub async fn ensure_super_admin(db: &PgPool, boot: &BootstrapAdmin) -> anyhow::Result<()> {
    if repo::count_by_role(db, Role::SuperAdmin).await? > 0 {
        return Ok(());
    }
    if repo::find_by_username(db, &boot.username).await?.is_some() {
        warn!(username = %boot.username, "bootstrap username taken by a non-super-admin account");
        return Ok(());
    }
    let hash = hash_password(&boot.password)?;
    let user = repo::create_user(db, &boot.username, &hash, Role::SuperAdmin, true).await?;
    info!(user_id = %user.id, username = %user.username, "bootstrap super admin created");
    Ok(())
}
