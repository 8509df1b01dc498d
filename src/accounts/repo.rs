use anyhow::Context;
use sqlx::PgExecutor;
use uuid::Uuid;

use super::dto::{AdminFilter, AdminProfileInput, TeacherFilter, TeacherProfileInput};
use super::repo_types::{AdminInfo, AdminRow, Role, TeacherInfo, TeacherRow, User};
use crate::db::{like_pattern, Pagination};

const USER_COLUMNS: &str =
    "u.id, u.username, u.password_hash, u.role, u.is_active, u.is_staff, u.created_at, u.updated_at";

pub async fn find_by_username<'e, E: PgExecutor<'e>>(
    db: E,
    username: &str,
) -> anyhow::Result<Option<User>> {
    let sql = format!("SELECT {} FROM users u WHERE u.username = $1", USER_COLUMNS);
    let user = sqlx::query_as::<_, User>(&sql)
        .bind(username)
        .fetch_optional(db)
        .await
        .context("find user by username")?;
    Ok(user)
}

pub async fn find_by_id<'e, E: PgExecutor<'e>>(db: E, id: Uuid) -> anyhow::Result<Option<User>> {
    let sql = format!("SELECT {} FROM users u WHERE u.id = $1", USER_COLUMNS);
    let user = sqlx::query_as::<_, User>(&sql)
        .bind(id)
        .fetch_optional(db)
        .await
        .context("find user by id")?;
    Ok(user)
}

pub async fn create_user<'e, E: PgExecutor<'e>>(
    db: E,
    username: &str,
    password_hash: &str,
    role: Role,
    is_staff: bool,
) -> anyhow::Result<User> {
    let user = sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (username, password_hash, role, is_staff)
        VALUES ($1, $2, $3, $4)
        RETURNING id, username, password_hash, role, is_active, is_staff, created_at, updated_at
        "#,
    )
    .bind(username)
    .bind(password_hash)
    .bind(role)
    .bind(is_staff)
    .fetch_one(db)
    .await
    .context("insert user")?;
    Ok(user)
}

pub async fn set_active<'e, E: PgExecutor<'e>>(db: E, id: Uuid, active: bool) -> anyhow::Result<()> {
    sqlx::query("UPDATE users SET is_active = $2, updated_at = now() WHERE id = $1")
        .bind(id)
        .bind(active)
        .execute(db)
        .await
        .context("update user active flag")?;
    Ok(())
}

/// Profile rows cascade with the user.
pub async fn delete_user<'e, E: PgExecutor<'e>>(db: E, id: Uuid) -> anyhow::Result<bool> {
    let res = sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(id)
        .execute(db)
        .await
        .context("delete user")?;
    Ok(res.rows_affected() > 0)
}

pub async fn count_by_role<'e, E: PgExecutor<'e>>(db: E, role: Role) -> anyhow::Result<i64> {
    let (n,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users WHERE role = $1")
        .bind(role)
        .fetch_one(db)
        .await
        .context("count users by role")?;
    Ok(n)
}

// --- teacher profile ---

pub async fn get_teacher_info<'e, E: PgExecutor<'e>>(
    db: E,
    user_id: Uuid,
) -> anyhow::Result<Option<TeacherInfo>> {
    let info = sqlx::query_as::<_, TeacherInfo>(
        r#"
        SELECT user_id, name, education, major, teaching_scope, bank_account, phone,
               is_approved, created_at, updated_at
          FROM teacher_info
         WHERE user_id = $1
        "#,
    )
    .bind(user_id)
    .fetch_optional(db)
    .await
    .context("get teacher info")?;
    Ok(info)
}

/// Insert or replace the profile. `is_approved` is written as given, so an
/// edit by the teacher passes `false` to send the profile back for review.
pub async fn upsert_teacher_info<'e, E: PgExecutor<'e>>(
    db: E,
    user_id: Uuid,
    p: &TeacherProfileInput,
    is_approved: bool,
) -> anyhow::Result<TeacherInfo> {
    let info = sqlx::query_as::<_, TeacherInfo>(
        r#"
        INSERT INTO teacher_info
            (user_id, name, education, major, teaching_scope, bank_account, phone, is_approved)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ON CONFLICT (user_id) DO UPDATE SET
            name = EXCLUDED.name,
            education = EXCLUDED.education,
            major = EXCLUDED.major,
            teaching_scope = EXCLUDED.teaching_scope,
            bank_account = EXCLUDED.bank_account,
            phone = EXCLUDED.phone,
            is_approved = EXCLUDED.is_approved,
            updated_at = now()
        RETURNING user_id, name, education, major, teaching_scope, bank_account, phone,
                  is_approved, created_at, updated_at
        "#,
    )
    .bind(user_id)
    .bind(&p.name)
    .bind(&p.education)
    .bind(&p.major)
    .bind(&p.teaching_scope)
    .bind(&p.bank_account)
    .bind(&p.phone)
    .bind(is_approved)
    .fetch_one(db)
    .await
    .context("upsert teacher info")?;
    Ok(info)
}

/// Returns false when the teacher has no profile yet.
pub async fn set_teacher_approved<'e, E: PgExecutor<'e>>(
    db: E,
    user_id: Uuid,
    approved: bool,
) -> anyhow::Result<bool> {
    let res = sqlx::query(
        "UPDATE teacher_info SET is_approved = $2, updated_at = now() WHERE user_id = $1",
    )
    .bind(user_id)
    .bind(approved)
    .execute(db)
    .await
    .context("approve teacher")?;
    Ok(res.rows_affected() > 0)
}

// --- admin profile ---

pub async fn get_admin_info<'e, E: PgExecutor<'e>>(
    db: E,
    user_id: Uuid,
) -> anyhow::Result<Option<AdminInfo>> {
    let info = sqlx::query_as::<_, AdminInfo>(
        "SELECT user_id, name, phone, created_at, updated_at FROM admin_info WHERE user_id = $1",
    )
    .bind(user_id)
    .fetch_optional(db)
    .await
    .context("get admin info")?;
    Ok(info)
}

pub async fn upsert_admin_info<'e, E: PgExecutor<'e>>(
    db: E,
    user_id: Uuid,
    p: &AdminProfileInput,
) -> anyhow::Result<AdminInfo> {
    let info = sqlx::query_as::<_, AdminInfo>(
        r#"
        INSERT INTO admin_info (user_id, name, phone)
        VALUES ($1, $2, $3)
        ON CONFLICT (user_id) DO UPDATE SET
            name = EXCLUDED.name,
            phone = EXCLUDED.phone,
            updated_at = now()
        RETURNING user_id, name, phone, created_at, updated_at
        "#,
    )
    .bind(user_id)
    .bind(&p.name)
    .bind(&p.phone)
    .fetch_one(db)
    .await
    .context("upsert admin info")?;
    Ok(info)
}

// --- listings ---

pub async fn list_teachers<'e, E: PgExecutor<'e>>(
    db: E,
    f: &TeacherFilter,
    page: Pagination,
) -> anyhow::Result<Vec<TeacherRow>> {
    let (limit, offset) = page.clamped();
    let sql = format!(
        r#"
        SELECT {}, ti.name, ti.education, ti.major, ti.teaching_scope,
               ti.bank_account, ti.phone, ti.is_approved
          FROM users u
          LEFT JOIN teacher_info ti ON ti.user_id = u.id
         WHERE u.role = 'teacher'
           AND ($1::text IS NULL
                OR u.username ILIKE $1
                OR ti.name ILIKE $1
                OR ti.phone ILIKE $1)
           AND ($2::bool IS NULL OR u.is_active = $2)
           AND ($3::bool IS NULL OR COALESCE(ti.is_approved, false) = $3)
         ORDER BY u.created_at DESC
         LIMIT $4 OFFSET $5
        "#,
        USER_COLUMNS
    );
    let rows = sqlx::query_as::<_, TeacherRow>(&sql)
        .bind(like_pattern(f.search.as_deref()))
        .bind(f.is_active)
        .bind(f.is_approved)
        .bind(limit)
        .bind(offset)
        .fetch_all(db)
        .await
        .context("list teachers")?;
    Ok(rows)
}

pub async fn find_teacher<'e, E: PgExecutor<'e>>(db: E, id: Uuid) -> anyhow::Result<Option<TeacherRow>> {
    let sql = format!(
        r#"
        SELECT {}, ti.name, ti.education, ti.major, ti.teaching_scope,
               ti.bank_account, ti.phone, ti.is_approved
          FROM users u
          LEFT JOIN teacher_info ti ON ti.user_id = u.id
         WHERE u.id = $1 AND u.role = 'teacher'
        "#,
        USER_COLUMNS
    );
    let row = sqlx::query_as::<_, TeacherRow>(&sql)
        .bind(id)
        .fetch_optional(db)
        .await
        .context("find teacher")?;
    Ok(row)
}

pub async fn list_admins<'e, E: PgExecutor<'e>>(
    db: E,
    f: &AdminFilter,
    page: Pagination,
) -> anyhow::Result<Vec<AdminRow>> {
    let (limit, offset) = page.clamped();
    let sql = format!(
        r#"
        SELECT {}, ai.name, ai.phone
          FROM users u
          LEFT JOIN admin_info ai ON ai.user_id = u.id
         WHERE u.role = 'admin'
           AND ($1::text IS NULL
                OR u.username ILIKE $1
                OR ai.name ILIKE $1
                OR ai.phone ILIKE $1)
           AND ($2::bool IS NULL OR u.is_active = $2)
         ORDER BY u.created_at DESC
         LIMIT $3 OFFSET $4
        "#,
        USER_COLUMNS
    );
    let rows = sqlx::query_as::<_, AdminRow>(&sql)
        .bind(like_pattern(f.search.as_deref()))
        .bind(f.is_active)
        .bind(limit)
        .bind(offset)
        .fetch_all(db)
        .await
        .context("list admins")?;
    Ok(rows)
}

pub async fn find_admin<'e, E: PgExecutor<'e>>(db: E, id: Uuid) -> anyhow::Result<Option<AdminRow>> {
    let sql = format!(
        r#"
        SELECT {}, ai.name, ai.phone
          FROM users u
          LEFT JOIN admin_info ai ON ai.user_id = u.id
         WHERE u.id = $1 AND u.role = 'admin'
        "#,
        USER_COLUMNS
    );
    let row = sqlx::query_as::<_, AdminRow>(&sql)
        .bind(id)
        .fetch_optional(db)
        .await
        .context("find admin")?;
    Ok(row)
}
