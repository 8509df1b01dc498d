use anyhow::Context;
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgExecutor};
use uuid::Uuid;

use super::repo_types::{ApplicationStatus, SalaryApplication, APPLICATION_COLUMNS, APPLICATION_FROM};
use crate::db::Pagination;

#[derive(Debug, Default, Clone)]
pub struct ApplicationQuery {
    pub status: Option<ApplicationStatus>,
    pub teacher_id: Option<Uuid>,
    pub order_id: Option<Uuid>,
}

#[derive(Debug, Clone)]
pub struct NewApplication {
    pub order_id: Uuid,
    pub teacher_id: Uuid,
    pub apply_amount: Decimal,
    pub proof_key: String,
    pub proof_name: String,
    pub proof_content_type: String,
    pub remarks: Option<String>,
}

pub async fn list<'e, E: PgExecutor<'e>>(
    db: E,
    q: &ApplicationQuery,
    page: Pagination,
) -> anyhow::Result<Vec<SalaryApplication>> {
    let (limit, offset) = page.clamped();
    let sql = format!(
        r#"
        SELECT {} FROM {}
         WHERE ($1::application_status IS NULL OR a.status = $1)
           AND ($2::uuid IS NULL OR a.teacher_id = $2)
           AND ($3::uuid IS NULL OR a.order_id = $3)
         ORDER BY a.created_at DESC, a.application_number DESC
         LIMIT $4 OFFSET $5
        "#,
        APPLICATION_COLUMNS, APPLICATION_FROM
    );
    let rows = sqlx::query_as::<_, SalaryApplication>(&sql)
        .bind(q.status)
        .bind(q.teacher_id)
        .bind(q.order_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(db)
        .await
        .context("list salary applications")?;
    Ok(rows)
}

pub async fn find_by_id<'e, E: PgExecutor<'e>>(
    db: E,
    id: Uuid,
) -> anyhow::Result<Option<SalaryApplication>> {
    let sql = format!("SELECT {} FROM {} WHERE a.id = $1", APPLICATION_COLUMNS, APPLICATION_FROM);
    let row = sqlx::query_as::<_, SalaryApplication>(&sql)
        .bind(id)
        .fetch_optional(db)
        .await
        .context("find salary application")?;
    Ok(row)
}

pub async fn lock(conn: &mut PgConnection, id: Uuid) -> anyhow::Result<Option<SalaryApplication>> {
    let sql = format!(
        "SELECT {} FROM {} WHERE a.id = $1 FOR UPDATE OF a",
        APPLICATION_COLUMNS, APPLICATION_FROM
    );
    let row = sqlx::query_as::<_, SalaryApplication>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .context("lock salary application")?;
    Ok(row)
}

pub async fn latest_for_order<'e, E: PgExecutor<'e>>(
    db: E,
    order_id: Uuid,
) -> anyhow::Result<Option<SalaryApplication>> {
    let sql = format!(
        "SELECT {} FROM {} WHERE a.order_id = $1 ORDER BY a.created_at DESC LIMIT 1",
        APPLICATION_COLUMNS, APPLICATION_FROM
    );
    let row = sqlx::query_as::<_, SalaryApplication>(&sql)
        .bind(order_id)
        .fetch_optional(db)
        .await
        .context("latest application for order")?;
    Ok(row)
}

pub async fn has_active<'e, E: PgExecutor<'e>>(db: E, order_id: Uuid) -> anyhow::Result<bool> {
    let (exists,): (bool,) = sqlx::query_as(
        r#"
        SELECT EXISTS (
            SELECT 1 FROM salary_applications
             WHERE order_id = $1 AND status IN ('pending', 'approved')
        )
        "#,
    )
    .bind(order_id)
    .fetch_one(db)
    .await
    .context("check active application")?;
    Ok(exists)
}

/// Amount of the pending or approved application on the order, if any.
pub async fn active_amount<'e, E: PgExecutor<'e>>(db: E, order_id: Uuid) -> anyhow::Result<Option<Decimal>> {
    let (amount,): (Option<Decimal>,) = sqlx::query_as(
        r#"
        SELECT MAX(apply_amount) FROM salary_applications
         WHERE order_id = $1 AND status IN ('pending', 'approved')
        "#,
    )
    .bind(order_id)
    .fetch_one(db)
    .await
    .context("active application amount")?;
    Ok(amount)
}

pub async fn insert(
    conn: &mut PgConnection,
    application_number: &str,
    new: &NewApplication,
) -> anyhow::Result<Uuid> {
    let (id,): (Uuid,) = sqlx::query_as(
        r#"
        INSERT INTO salary_applications
            (application_number, order_id, teacher_id, apply_amount,
             proof_key, proof_name, proof_content_type, remarks)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING id
        "#,
    )
    .bind(application_number)
    .bind(new.order_id)
    .bind(new.teacher_id)
    .bind(new.apply_amount)
    .bind(&new.proof_key)
    .bind(&new.proof_name)
    .bind(&new.proof_content_type)
    .bind(&new.remarks)
    .fetch_one(&mut *conn)
    .await
    .context("insert salary application")?;
    Ok(id)
}

pub async fn mark_approved<'e, E: PgExecutor<'e>>(
    db: E,
    id: Uuid,
    reviewer: Uuid,
    remarks: Option<&str>,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        UPDATE salary_applications
           SET status = 'approved', approved_by = $2, approved_at = now(),
               remarks = COALESCE($3, remarks)
         WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(reviewer)
    .bind(remarks)
    .execute(db)
    .await
    .context("approve salary application")?;
    Ok(())
}

pub async fn mark_rejected<'e, E: PgExecutor<'e>>(
    db: E,
    id: Uuid,
    reviewer: Uuid,
    reason: Option<&str>,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        UPDATE salary_applications
           SET status = 'rejected', approved_by = $2, rejected_at = now(),
               rejection_reason = $3
         WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(reviewer)
    .bind(reason)
    .execute(db)
    .await
    .context("reject salary application")?;
    Ok(())
}

pub async fn mark_withdrawn<'e, E: PgExecutor<'e>>(db: E, id: Uuid) -> anyhow::Result<()> {
    sqlx::query(
        "UPDATE salary_applications SET status = 'withdrawn', withdrawn_at = now() WHERE id = $1",
    )
    .bind(id)
    .execute(db)
    .await
    .context("withdraw salary application")?;
    Ok(())
}

pub async fn count_by_status<'e, E: PgExecutor<'e>>(
    db: E,
    status: ApplicationStatus,
) -> anyhow::Result<i64> {
    let (n,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM salary_applications WHERE status = $1")
        .bind(status)
        .fetch_one(db)
        .await
        .context("count applications by status")?;
    Ok(n)
}

pub async fn approved_total<'e, E: PgExecutor<'e>>(db: E) -> anyhow::Result<Decimal> {
    let (sum,): (Decimal,) = sqlx::query_as(
        "SELECT COALESCE(SUM(apply_amount), 0) FROM salary_applications WHERE status = 'approved'",
    )
    .fetch_one(db)
    .await
    .context("sum approved applications")?;
    Ok(sum)
}
