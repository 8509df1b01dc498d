use anyhow::Context;
use sqlx::PgExecutor;
use time::{Date, Duration, OffsetDateTime, Time};
use uuid::Uuid;

use super::repo_types::{AuditAction, OperationLog};
use super::services::AuditEntry;
use crate::db::{like_pattern, Pagination};

/// Filters for the log listing; every field is optional.
#[derive(Debug, Default, Clone)]
pub struct LogQuery {
    pub search: Option<String>,
    pub action: Option<AuditAction>,
    pub user_id: Option<Uuid>,
    pub start_date: Option<Date>,
    pub end_date: Option<Date>,
}

impl LogQuery {
    /// Half-open `[from, until)` bounds covering whole UTC days.
    pub fn bounds(&self) -> (Option<OffsetDateTime>, Option<OffsetDateTime>) {
        let from = self
            .start_date
            .map(|d| d.with_time(Time::MIDNIGHT).assume_utc());
        let until = self
            .end_date
            .map(|d| d.with_time(Time::MIDNIGHT).assume_utc() + Duration::days(1));
        (from, until)
    }
}

pub async fn insert<'e, E: PgExecutor<'e>>(db: E, entry: &AuditEntry) -> anyhow::Result<i64> {
    let (id,): (i64,) = sqlx::query_as(
        r#"
        INSERT INTO operation_logs
            (user_id, action, object_type, object_id, object_name, ip_address, description)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING id
        "#,
    )
    .bind(entry.actor)
    .bind(entry.action)
    .bind(entry.object_type)
    .bind(&entry.object_id)
    .bind(&entry.object_name)
    .bind(&entry.ip_address)
    .bind(&entry.description)
    .fetch_one(db)
    .await
    .context("insert operation log")?;
    Ok(id)
}

pub async fn list<'e, E: PgExecutor<'e>>(
    db: E,
    q: &LogQuery,
    page: Pagination,
) -> anyhow::Result<Vec<OperationLog>> {
    let (limit, offset) = page.clamped();
    let (from, until) = q.bounds();
    let rows = sqlx::query_as::<_, OperationLog>(
        r#"
        SELECT l.id, l.user_id, u.username, l.action, l.object_type, l.object_id,
               l.object_name, l.ip_address, l.description, l.created_at
          FROM operation_logs l
          LEFT JOIN users u ON u.id = l.user_id
         WHERE ($1::text IS NULL
                OR l.description ILIKE $1
                OR l.object_name ILIKE $1
                OR l.ip_address ILIKE $1)
           AND ($2::audit_action IS NULL OR l.action = $2)
           AND ($3::uuid IS NULL OR l.user_id = $3)
           AND ($4::timestamptz IS NULL OR l.created_at >= $4)
           AND ($5::timestamptz IS NULL OR l.created_at < $5)
         ORDER BY l.created_at DESC, l.id DESC
         LIMIT $6 OFFSET $7
        "#,
    )
    .bind(like_pattern(q.search.as_deref()))
    .bind(q.action)
    .bind(q.user_id)
    .bind(from)
    .bind(until)
    .bind(limit)
    .bind(offset)
    .fetch_all(db)
    .await
    .context("list operation logs")?;
    Ok(rows)
}
