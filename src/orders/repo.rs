use anyhow::Context;
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgExecutor};
use uuid::Uuid;

use super::repo_types::{Order, OrderStatus, ServiceType, ORDER_COLUMNS};
use crate::db::{like_pattern, Pagination};

#[derive(Debug, Default, Clone)]
pub struct OrderQuery {
    pub search: Option<String>,
    pub status: Option<OrderStatus>,
    /// Restrict to one teacher's orders.
    pub teacher_id: Option<Uuid>,
}

/// Column values for insert and update.
#[derive(Debug, Clone)]
pub struct OrderFields {
    pub name: String,
    pub student_count: i32,
    pub service_type: ServiceType,
    pub unit_price: Decimal,
    pub total_hours: Decimal,
    pub total_amount: Decimal,
    pub status: OrderStatus,
    pub teacher_id: Uuid,
}

pub async fn list<'e, E: PgExecutor<'e>>(
    db: E,
    q: &OrderQuery,
    page: Pagination,
) -> anyhow::Result<Vec<Order>> {
    let (limit, offset) = page.clamped();
    let sql = format!(
        r#"
        SELECT {}
          FROM orders o
          JOIN users t ON t.id = o.teacher_id
         WHERE ($1::text IS NULL
                OR o.order_number ILIKE $1
                OR o.name ILIKE $1
                OR t.username ILIKE $1)
           AND ($2::order_status IS NULL OR o.status = $2)
           AND ($3::uuid IS NULL OR o.teacher_id = $3)
         ORDER BY o.created_at DESC, o.order_number DESC
         LIMIT $4 OFFSET $5
        "#,
        ORDER_COLUMNS
    );
    let rows = sqlx::query_as::<_, Order>(&sql)
        .bind(like_pattern(q.search.as_deref()))
        .bind(q.status)
        .bind(q.teacher_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(db)
        .await
        .context("list orders")?;
    Ok(rows)
}

pub async fn find_by_id<'e, E: PgExecutor<'e>>(db: E, id: Uuid) -> anyhow::Result<Option<Order>> {
    let sql = format!(
        "SELECT {} FROM orders o JOIN users t ON t.id = o.teacher_id WHERE o.id = $1",
        ORDER_COLUMNS
    );
    let order = sqlx::query_as::<_, Order>(&sql)
        .bind(id)
        .fetch_optional(db)
        .await
        .context("find order")?;
    Ok(order)
}

/// Row-locks the order for the rest of the transaction.
pub async fn lock(conn: &mut PgConnection, id: Uuid) -> anyhow::Result<Option<Order>> {
    let sql = format!(
        "SELECT {} FROM orders o JOIN users t ON t.id = o.teacher_id WHERE o.id = $1 FOR UPDATE OF o",
        ORDER_COLUMNS
    );
    let order = sqlx::query_as::<_, Order>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .context("lock order")?;
    Ok(order)
}

pub async fn insert(
    conn: &mut PgConnection,
    order_number: &str,
    f: &OrderFields,
    created_by: Uuid,
) -> anyhow::Result<Uuid> {
    let (id,): (Uuid,) = sqlx::query_as(
        r#"
        INSERT INTO orders
            (order_number, name, student_count, service_type, unit_price, total_hours,
             total_amount, status, teacher_id, created_by)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING id
        "#,
    )
    .bind(order_number)
    .bind(&f.name)
    .bind(f.student_count)
    .bind(f.service_type)
    .bind(f.unit_price)
    .bind(f.total_hours)
    .bind(f.total_amount)
    .bind(f.status)
    .bind(f.teacher_id)
    .bind(created_by)
    .fetch_one(&mut *conn)
    .await
    .context("insert order")?;
    Ok(id)
}

pub async fn update<'e, E: PgExecutor<'e>>(db: E, id: Uuid, f: &OrderFields) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        UPDATE orders SET
            name = $2, student_count = $3, service_type = $4, unit_price = $5,
            total_hours = $6, total_amount = $7, status = $8, teacher_id = $9,
            updated_at = now()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(&f.name)
    .bind(f.student_count)
    .bind(f.service_type)
    .bind(f.unit_price)
    .bind(f.total_hours)
    .bind(f.total_amount)
    .bind(f.status)
    .bind(f.teacher_id)
    .execute(db)
    .await
    .context("update order")?;
    Ok(())
}

pub async fn set_status<'e, E: PgExecutor<'e>>(db: E, id: Uuid, status: OrderStatus) -> anyhow::Result<()> {
    sqlx::query("UPDATE orders SET status = $2, updated_at = now() WHERE id = $1")
        .bind(id)
        .bind(status)
        .execute(db)
        .await
        .context("update order status")?;
    Ok(())
}

pub async fn count<'e, E: PgExecutor<'e>>(db: E) -> anyhow::Result<i64> {
    let (n,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM orders")
        .fetch_one(db)
        .await
        .context("count orders")?;
    Ok(n)
}
