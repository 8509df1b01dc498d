use std::str::FromStr;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;
use uuid::Uuid;

use super::dto::{OrderDetail, OrderFilter, OrderInput, StatusChangeRequest, TeacherOrderDetail};
use super::repo::{self, OrderQuery};
use super::repo_types::{Order, OrderStatus};
use super::services;
use crate::{
    applications::repo::{self as applications, ApplicationQuery},
    audit::{self, object_type, AuditAction, AuditEntry},
    auth::extractors::{ClientIp, CurrentUser},
    db::Pagination,
    error::{AppError, AppResult},
    state::AppState,
};

/// Mounted under `/admin`.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/orders", get(admin_list_orders).post(create_order))
        .route("/orders/:id", get(admin_get_order).put(update_order))
}

/// Mounted under `/teacher`.
pub fn teacher_routes() -> Router<AppState> {
    Router::new()
        .route("/orders", get(teacher_list_orders))
        .route("/orders/:id", get(teacher_get_order))
        .route("/orders/:id/status", post(change_status))
}

fn to_query(filter: OrderFilter, teacher_id: Option<Uuid>) -> AppResult<OrderQuery> {
    let status = filter
        .status
        .as_deref()
        .map(OrderStatus::from_str)
        .transpose()
        .map_err(AppError::Validation)?;
    Ok(OrderQuery {
        search: filter.search,
        status,
        teacher_id,
    })
}

// --- admin ---

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn admin_list_orders(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(filter): Query<OrderFilter>,
    Query(page): Query<Pagination>,
) -> AppResult<Json<Vec<Order>>> {
    let q = to_query(filter, None)?;
    Ok(Json(repo::list(&state.db, &q, page).await?))
}

#[instrument(skip(state, user, ip, input), fields(user_id = %user.id))]
pub async fn create_order(
    State(state): State<AppState>,
    user: CurrentUser,
    ip: ClientIp,
    Json(input): Json<OrderInput>,
) -> AppResult<(StatusCode, Json<Order>)> {
    let order = services::create_order(&state.db, &input, user.id).await?;

    audit::record(
        &state.db,
        AuditEntry::by(&user, &ip, AuditAction::Create)
            .target(object_type::ORDER, order.id, &order.order_number)
            .describe(format!(
                "admin {} created order {} ({}) for teacher {}, total {}",
                user.username, order.order_number, order.name, order.teacher_username, order.total_amount
            )),
    )
    .await;
    Ok((StatusCode::CREATED, Json(order)))
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn admin_get_order(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<OrderDetail>> {
    let order = repo::find_by_id(&state.db, id)
        .await?
        .ok_or(AppError::NotFound("Order"))?;
    let q = ApplicationQuery {
        order_id: Some(order.id),
        ..Default::default()
    };
    let applications = applications::list(&state.db, &q, Pagination::first(100)).await?;
    Ok(Json(OrderDetail { order, applications }))
}

#[instrument(skip(state, user, ip, input), fields(user_id = %user.id))]
pub async fn update_order(
    State(state): State<AppState>,
    user: CurrentUser,
    ip: ClientIp,
    Path(id): Path<Uuid>,
    Json(input): Json<OrderInput>,
) -> AppResult<Json<Order>> {
    let (before, after) = services::update_order(&state.db, id, &input).await?;

    let mut description = format!("admin {} edited order {}", user.username, after.order_number);
    if before.status != after.status {
        description.push_str(&format!(", status {} -> {}", before.status, after.status));
    }
    audit::record(
        &state.db,
        AuditEntry::by(&user, &ip, AuditAction::Update)
            .target(object_type::ORDER, after.id, &after.order_number)
            .describe(description),
    )
    .await;
    Ok(Json(after))
}

// --- teacher ---

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn teacher_list_orders(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(filter): Query<OrderFilter>,
    Query(page): Query<Pagination>,
) -> AppResult<Json<Vec<Order>>> {
    let q = to_query(filter, Some(user.id))?;
    Ok(Json(repo::list(&state.db, &q, page).await?))
}

async fn own_order(state: &AppState, id: Uuid, teacher_id: Uuid) -> AppResult<Order> {
    repo::find_by_id(&state.db, id)
        .await?
        .filter(|o| o.teacher_id == teacher_id)
        .ok_or(AppError::NotFound("Order"))
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn teacher_get_order(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<TeacherOrderDetail>> {
    let order = own_order(&state, id, user.id).await?;
    let latest_application = applications::latest_for_order(&state.db, order.id).await?;
    Ok(Json(TeacherOrderDetail {
        next_status: order.status.next(),
        order,
        latest_application,
    }))
}

#[instrument(skip(state, user, ip, body), fields(user_id = %user.id))]
pub async fn change_status(
    State(state): State<AppState>,
    user: CurrentUser,
    ip: ClientIp,
    Path(id): Path<Uuid>,
    Json(body): Json<StatusChangeRequest>,
) -> AppResult<Json<Order>> {
    let (order, from) = services::transition_order(&state.db, id, user.id, body.new_status.trim()).await?;

    audit::record(
        &state.db,
        AuditEntry::by(&user, &ip, AuditAction::Update)
            .target(object_type::ORDER, order.id, &order.order_number)
            .describe(format!(
                "teacher {} changed order {} status from {} to {}",
                user.username,
                order.order_number,
                from,
                body.new_status.trim()
            )),
    )
    .await;

    let updated = repo::find_by_id(&state.db, id)
        .await?
        .ok_or(AppError::NotFound("Order"))?;
    Ok(Json(updated))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_status_is_parsed() {
        let f = OrderFilter {
            search: Some("ORD".into()),
            status: Some("completed".into()),
        };
        let q = to_query(f, None).unwrap();
        assert_eq!(q.status, Some(OrderStatus::Completed));
        assert_eq!(q.search.as_deref(), Some("ORD"));
    }

    #[test]
    fn teacher_scope_is_applied() {
        let me = Uuid::new_v4();
        let q = to_query(OrderFilter::default(), Some(me)).unwrap();
        assert_eq!(q.teacher_id, Some(me));
        assert_eq!(q.status, None);
    }

    #[test]
    fn unknown_status_filter_is_a_validation_error() {
        let f = OrderFilter {
            search: None,
            status: Some("cancelled".into()),
        };
        assert!(matches!(to_query(f, None), Err(AppError::Validation(_))));
    }
}
