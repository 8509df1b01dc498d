use rust_decimal::{Decimal, RoundingStrategy};
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

use super::dto::OrderInput;
use super::repo::{self, OrderFields};
use super::repo_types::{Order, OrderStatus};
use crate::{
    accounts::{repo as accounts, repo_types::Role},
    applications::repo as applications,
    error::{AppError, AppResult},
    numbering::{self, DocumentKind},
};

/// NUMERIC(10, 2) upper bound.
fn max_money() -> Decimal {
    Decimal::new(99_999_999_99, 2)
}

/// `unit_price × total_hours`, rounded half away from zero to cents.
pub fn compute_total(unit_price: Decimal, total_hours: Decimal) -> Decimal {
    (unit_price * total_hours).round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

fn check_money(field: &str, v: Decimal) -> AppResult<()> {
    if v.is_sign_negative() && !v.is_zero() {
        return Err(AppError::validation(format!("{} must not be negative", field)));
    }
    if v.scale() > 2 && v.normalize().scale() > 2 {
        return Err(AppError::validation(format!(
            "{} must have at most 2 decimal places",
            field
        )));
    }
    if v > max_money() {
        return Err(AppError::validation(format!("{} is too large", field)));
    }
    Ok(())
}

/// Field checks; returns the insert/update values with the total filled in.
pub fn validate_order_input(input: &OrderInput, status: OrderStatus) -> AppResult<OrderFields> {
    let name = input.name.trim();
    if name.is_empty() {
        return Err(AppError::validation("name is required"));
    }
    if name.chars().count() > 200 {
        return Err(AppError::validation("name must be at most 200 characters"));
    }
    if input.student_count < 1 {
        return Err(AppError::validation("student_count must be at least 1"));
    }
    check_money("unit_price", input.unit_price)?;
    check_money("total_hours", input.total_hours)?;
    let total_amount = compute_total(input.unit_price, input.total_hours);
    // total_amount is NUMERIC(12, 2)
    if total_amount >= Decimal::new(10_000_000_000, 0) {
        return Err(AppError::validation("total amount is too large"));
    }

    Ok(OrderFields {
        name: name.to_string(),
        student_count: input.student_count,
        service_type: input.service_type,
        unit_price: input.unit_price,
        total_hours: input.total_hours,
        total_amount,
        status,
        teacher_id: input.teacher_id,
    })
}

pub fn check_transition(from: OrderStatus, to: OrderStatus) -> AppResult<()> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(AppError::validation(format!(
            "cannot change order status from {} to {}",
            from, to
        )))
    }
}

/// An edited total may not drop below a pending or approved salary claim.
pub fn check_covers_claim(total: Decimal, claimed: Decimal) -> AppResult<()> {
    if total < claimed {
        return Err(AppError::validation(format!(
            "total amount {} is below the {} claimed by an active salary application",
            total, claimed
        )));
    }
    Ok(())
}

async fn ensure_teacher(db: &PgPool, teacher_id: Uuid) -> AppResult<()> {
    match accounts::find_by_id(db, teacher_id).await? {
        Some(u) if u.role == Role::Teacher => Ok(()),
        _ => Err(AppError::validation("teacher_id must reference a teacher account")),
    }
}

/// New order with a freshly allocated number; number and row share one transaction.
pub async fn create_order(db: &PgPool, input: &OrderInput, created_by: Uuid) -> AppResult<Order> {
    let fields = validate_order_input(input, input.status.unwrap_or(OrderStatus::Pending))?;
    ensure_teacher(db, fields.teacher_id).await?;

    let mut tx = db.begin().await?;
    let number = numbering::next_number(&mut *tx, DocumentKind::Order).await?;
    let id = repo::insert(&mut *tx, &number, &fields, created_by).await?;
    let order = repo::find_by_id(&mut *tx, id)
        .await?
        .ok_or(AppError::NotFound("Order"))?;
    tx.commit().await?;

    info!(order_id = %order.id, order_number = %order.order_number, total = %order.total_amount, "order created");
    Ok(order)
}

/// Admin edit. A status change must be a single forward step.
pub async fn update_order(db: &PgPool, id: Uuid, input: &OrderInput) -> AppResult<(Order, Order)> {
    let mut tx = db.begin().await?;
    let before = repo::lock(&mut *tx, id).await?.ok_or(AppError::NotFound("Order"))?;

    let status = input.status.unwrap_or(before.status);
    if status != before.status {
        check_transition(before.status, status)?;
    }
    let fields = validate_order_input(input, status)?;
    if fields.teacher_id != before.teacher_id {
        ensure_teacher(db, fields.teacher_id).await?;
    }
    if let Some(claimed) = applications::active_amount(&mut *tx, id).await? {
        check_covers_claim(fields.total_amount, claimed)?;
    }

    repo::update(&mut *tx, id, &fields).await?;
    let after = repo::find_by_id(&mut *tx, id)
        .await?
        .ok_or(AppError::NotFound("Order"))?;
    tx.commit().await?;

    info!(order_id = %id, from = %before.status, to = %after.status, "order updated");
    Ok((before, after))
}

/// Teacher-initiated status step on one of their own orders.
pub async fn transition_order(
    db: &PgPool,
    id: Uuid,
    teacher_id: Uuid,
    raw_status: &str,
) -> AppResult<(Order, OrderStatus)> {
    let to: OrderStatus = raw_status.parse().map_err(AppError::Validation)?;

    let mut tx = db.begin().await?;
    let order = repo::lock(&mut *tx, id).await?.ok_or(AppError::NotFound("Order"))?;
    if order.teacher_id != teacher_id {
        // someone else's order looks like a missing one
        return Err(AppError::NotFound("Order"));
    }
    let from = order.status;
    if let Err(e) = check_transition(from, to) {
        warn!(order_id = %id, %from, %to, "rejected status transition");
        return Err(e);
    }
    repo::set_status(&mut *tx, id, to).await?;
    tx.commit().await?;

    info!(order_id = %id, %from, %to, "order status changed");
    Ok((order, from))
}
