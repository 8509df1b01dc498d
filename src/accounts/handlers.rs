use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::Value;
use tracing::{info, instrument};
use uuid::Uuid;

use super::dto::{
    AdminFilter, AdminProfileInput, AdminProfileView, AdminView, CreateAdminRequest, Dashboard,
    ProfileView, TeacherDetail, TeacherFilter, TeacherProfileInput, TeacherProfileView, TeacherView,
    UpdateAdminRequest, UpdateTeacherRequest,
};
use super::repo;
use super::repo_types::Role;
use super::services;
use crate::{
    applications::{
        repo::{self as applications, ApplicationQuery},
        repo_types::ApplicationStatus,
    },
    audit::{self, object_type, AuditAction, AuditEntry},
    auth::{
        extractors::{ClientIp, CurrentUser},
        guard::SUPER_ADMIN_ONLY,
        password::check_new_password,
    },
    db::Pagination,
    error::{AppError, AppResult},
    orders::repo::{self as orders, OrderQuery},
    state::AppState,
};

const DASHBOARD_ROWS: i64 = 5;
const DETAIL_ROWS: i64 = 10;

/// Any authenticated caller.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/dashboard", get(dashboard))
        .route("/profile", get(get_profile).put(update_profile))
}

/// Mounted under `/admin`.
pub fn teacher_admin_routes() -> Router<AppState> {
    Router::new()
        .route("/teachers", get(list_teachers))
        .route(
            "/teachers/:id",
            get(get_teacher).put(update_teacher).delete(delete_teacher),
        )
        .route("/teachers/:id/approve", post(approve_teacher))
        .route("/teachers/:id/toggle", post(toggle_teacher))
}

/// Mounted under `/admin`, behind the super-admin gate.
pub fn admin_account_routes() -> Router<AppState> {
    Router::new()
        .route("/admins", get(list_admins).post(create_admin))
        .route("/admins/:id", get(get_admin).put(update_admin).delete(delete_admin))
        .route("/admins/:id/toggle", post(toggle_admin))
}

// --- dashboard & own profile ---

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn dashboard(State(state): State<AppState>, user: CurrentUser) -> AppResult<Json<Dashboard>> {
    let recent = Pagination::first(DASHBOARD_ROWS);

    if user.role.is_admin() {
        let pending_q = ApplicationQuery {
            status: Some(ApplicationStatus::Pending),
            ..Default::default()
        };
        return Ok(Json(Dashboard::Admin {
            total_teachers: repo::count_by_role(&state.db, Role::Teacher).await?,
            total_orders: orders::count(&state.db).await?,
            pending_applications: applications::count_by_status(&state.db, ApplicationStatus::Pending)
                .await?,
            approved_amount: applications::approved_total(&state.db).await?,
            latest_orders: orders::list(&state.db, &OrderQuery::default(), recent).await?,
            pending_applications_list: applications::list(&state.db, &pending_q, recent).await?,
        }));
    }

    let is_approved = repo::get_teacher_info(&state.db, user.id)
        .await?
        .map(|i| i.is_approved)
        .unwrap_or(false);
    let order_q = OrderQuery {
        teacher_id: Some(user.id),
        ..Default::default()
    };
    let app_q = ApplicationQuery {
        teacher_id: Some(user.id),
        ..Default::default()
    };
    Ok(Json(Dashboard::Teacher {
        is_approved,
        my_orders: orders::list(&state.db, &order_q, recent).await?,
        my_applications: applications::list(&state.db, &app_q, recent).await?,
    }))
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn get_profile(State(state): State<AppState>, user: CurrentUser) -> AppResult<Json<ProfileView>> {
    let view = match user.role {
        Role::Teacher => repo::get_teacher_info(&state.db, user.id)
            .await?
            .map(|i| ProfileView::Teacher(TeacherProfileView::new(&i, true))),
        Role::Admin | Role::SuperAdmin => repo::get_admin_info(&state.db, user.id)
            .await?
            .map(|i| ProfileView::Admin(AdminProfileView::from(&i))),
    };
    Ok(Json(view.unwrap_or(ProfileView::Empty)))
}

/// Own profile edit; the body shape depends on the caller's role. A teacher
/// edit sends the profile back for approval.
#[instrument(skip(state, user, ip, body), fields(user_id = %user.id))]
pub async fn update_profile(
    State(state): State<AppState>,
    user: CurrentUser,
    ip: ClientIp,
    Json(body): Json<Value>,
) -> AppResult<Json<ProfileView>> {
    let (view, object) = match user.role {
        Role::Teacher => {
            let input: TeacherProfileInput = serde_json::from_value(body)
                .map_err(|e| AppError::validation(format!("invalid profile: {}", e)))?;
            let clean = services::clean_teacher_profile(&input)?;
            let info = repo::upsert_teacher_info(&state.db, user.id, &clean, false).await?;
            (ProfileView::Teacher(TeacherProfileView::new(&info, true)), object_type::TEACHER)
        }
        Role::Admin | Role::SuperAdmin => {
            let input: AdminProfileInput = serde_json::from_value(body)
                .map_err(|e| AppError::validation(format!("invalid profile: {}", e)))?;
            let clean = services::clean_admin_profile(&input)?;
            let info = repo::upsert_admin_info(&state.db, user.id, &clean).await?;
            (ProfileView::Admin(AdminProfileView::from(&info)), object_type::ADMIN)
        }
    };

    audit::record(
        &state.db,
        AuditEntry::by(&user, &ip, AuditAction::Update)
            .target(object, user.id, &user.username)
            .describe(format!("{} updated their profile", user.username)),
    )
    .await;
    Ok(Json(view))
}

// --- teacher management ---

fn reveal_bank_account(user: &CurrentUser) -> bool {
    user.role == Role::SuperAdmin
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn list_teachers(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(filter): Query<TeacherFilter>,
    Query(page): Query<Pagination>,
) -> AppResult<Json<Vec<TeacherView>>> {
    let reveal = reveal_bank_account(&user);
    let rows = repo::list_teachers(&state.db, &filter, page).await?;
    Ok(Json(rows.into_iter().map(|r| TeacherView::from_row(r, reveal)).collect()))
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn get_teacher(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<TeacherDetail>> {
    let row = repo::find_teacher(&state.db, id)
        .await?
        .ok_or(AppError::NotFound("Teacher"))?;
    let recent = Pagination::first(DETAIL_ROWS);
    let order_q = OrderQuery {
        teacher_id: Some(id),
        ..Default::default()
    };
    let app_q = ApplicationQuery {
        teacher_id: Some(id),
        ..Default::default()
    };
    Ok(Json(TeacherDetail {
        teacher: TeacherView::from_row(row, reveal_bank_account(&user)),
        orders: orders::list(&state.db, &order_q, recent).await?,
        applications: applications::list(&state.db, &app_q, recent).await?,
    }))
}

#[instrument(skip(state, user, ip, req), fields(user_id = %user.id))]
pub async fn update_teacher(
    State(state): State<AppState>,
    user: CurrentUser,
    ip: ClientIp,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateTeacherRequest>,
) -> AppResult<Json<TeacherView>> {
    user.require(SUPER_ADMIN_ONLY)?;
    let clean = services::clean_teacher_profile(&req.profile)?;

    let mut tx = state.db.begin().await?;
    let current = repo::find_teacher(&mut *tx, id)
        .await?
        .ok_or(AppError::NotFound("Teacher"))?;
    let approved = current.is_approved.unwrap_or(false);
    repo::upsert_teacher_info(&mut *tx, id, &clean, approved).await?;
    repo::set_active(&mut *tx, id, req.is_active).await?;
    let row = repo::find_teacher(&mut *tx, id)
        .await?
        .ok_or(AppError::NotFound("Teacher"))?;
    tx.commit().await?;

    audit::record(
        &state.db,
        AuditEntry::by(&user, &ip, AuditAction::Update)
            .target(object_type::TEACHER, id, &row.user.username)
            .describe(format!("super admin {} edited teacher {}", user.username, row.user.username)),
    )
    .await;
    Ok(Json(TeacherView::from_row(row, true)))
}

#[instrument(skip(state, user, ip), fields(user_id = %user.id))]
pub async fn delete_teacher(
    State(state): State<AppState>,
    user: CurrentUser,
    ip: ClientIp,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    user.require(SUPER_ADMIN_ONLY)?;
    let row = repo::find_teacher(&state.db, id)
        .await?
        .ok_or(AppError::NotFound("Teacher"))?;
    repo::delete_user(&state.db, id).await?;
    info!(teacher_id = %id, "teacher deleted");

    audit::record(
        &state.db,
        AuditEntry::by(&user, &ip, AuditAction::Delete)
            .target(object_type::TEACHER, id, &row.user.username)
            .describe(format!("super admin {} deleted teacher {}", user.username, row.user.username)),
    )
    .await;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state, user, ip), fields(user_id = %user.id))]
pub async fn approve_teacher(
    State(state): State<AppState>,
    user: CurrentUser,
    ip: ClientIp,
    Path(id): Path<Uuid>,
) -> AppResult<Json<TeacherView>> {
    let row = repo::find_teacher(&state.db, id)
        .await?
        .ok_or(AppError::NotFound("Teacher"))?;
    if !repo::set_teacher_approved(&state.db, id, true).await? {
        return Err(AppError::NotFound("Teacher profile"));
    }

    audit::record(
        &state.db,
        AuditEntry::by(&user, &ip, AuditAction::Approve)
            .target(object_type::TEACHER, id, &row.user.username)
            .describe(format!("admin {} approved teacher {}", user.username, row.user.username)),
    )
    .await;

    let row = repo::find_teacher(&state.db, id)
        .await?
        .ok_or(AppError::NotFound("Teacher"))?;
    Ok(Json(TeacherView::from_row(row, reveal_bank_account(&user))))
}

#[instrument(skip(state, user, ip), fields(user_id = %user.id))]
pub async fn toggle_teacher(
    State(state): State<AppState>,
    user: CurrentUser,
    ip: ClientIp,
    Path(id): Path<Uuid>,
) -> AppResult<Json<TeacherView>> {
    let mut row = repo::find_teacher(&state.db, id)
        .await?
        .ok_or(AppError::NotFound("Teacher"))?;
    let active = !row.user.is_active;
    repo::set_active(&state.db, id, active).await?;
    row.user.is_active = active;

    let (action, verb) = toggle_action(active);
    audit::record(
        &state.db,
        AuditEntry::by(&user, &ip, action)
            .target(object_type::TEACHER, id, &row.user.username)
            .describe(format!("admin {} {} teacher {}", user.username, verb, row.user.username)),
    )
    .await;
    Ok(Json(TeacherView::from_row(row, reveal_bank_account(&user))))
}

fn toggle_action(now_active: bool) -> (AuditAction, &'static str) {
    if now_active {
        (AuditAction::Enable, "enabled")
    } else {
        (AuditAction::Disable, "disabled")
    }
}

// --- admin accounts (super admin) ---

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn list_admins(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(filter): Query<AdminFilter>,
    Query(page): Query<Pagination>,
) -> AppResult<Json<Vec<AdminView>>> {
    let rows = repo::list_admins(&state.db, &filter, page).await?;
    Ok(Json(rows.into_iter().map(AdminView::from).collect()))
}

#[instrument(skip(state, user, ip, req), fields(user_id = %user.id))]
pub async fn create_admin(
    State(state): State<AppState>,
    user: CurrentUser,
    ip: ClientIp,
    Json(req): Json<CreateAdminRequest>,
) -> AppResult<(StatusCode, Json<AdminView>)> {
    let username = req.username.trim();
    services::validate_username(username)?;
    check_new_password(&req.password1, &req.password2)?;
    let profile = services::clean_admin_profile(&req.profile)?;

    let created = services::create_admin_account(&state.db, username, &req.password1, &profile).await?;
    let row = repo::find_admin(&state.db, created.id)
        .await?
        .ok_or(AppError::NotFound("Admin"))?;

    audit::record(
        &state.db,
        AuditEntry::by(&user, &ip, AuditAction::Create)
            .target(object_type::ADMIN, created.id, &created.username)
            .describe(format!("super admin {} created admin {}", user.username, created.username)),
    )
    .await;
    Ok((StatusCode::CREATED, Json(AdminView::from(row))))
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn get_admin(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<AdminView>> {
    let row = repo::find_admin(&state.db, id)
        .await?
        .ok_or(AppError::NotFound("Admin"))?;
    Ok(Json(AdminView::from(row)))
}

#[instrument(skip(state, user, ip, req), fields(user_id = %user.id))]
pub async fn update_admin(
    State(state): State<AppState>,
    user: CurrentUser,
    ip: ClientIp,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateAdminRequest>,
) -> AppResult<Json<AdminView>> {
    let clean = services::clean_admin_profile(&req.profile)?;

    let mut tx = state.db.begin().await?;
    repo::find_admin(&mut *tx, id)
        .await?
        .ok_or(AppError::NotFound("Admin"))?;
    repo::upsert_admin_info(&mut *tx, id, &clean).await?;
    repo::set_active(&mut *tx, id, req.is_active).await?;
    let row = repo::find_admin(&mut *tx, id)
        .await?
        .ok_or(AppError::NotFound("Admin"))?;
    tx.commit().await?;

    audit::record(
        &state.db,
        AuditEntry::by(&user, &ip, AuditAction::Update)
            .target(object_type::ADMIN, id, &row.user.username)
            .describe(format!("super admin {} edited admin {}", user.username, row.user.username)),
    )
    .await;
    Ok(Json(AdminView::from(row)))
}

#[instrument(skip(state, user, ip), fields(user_id = %user.id))]
pub async fn toggle_admin(
    State(state): State<AppState>,
    user: CurrentUser,
    ip: ClientIp,
    Path(id): Path<Uuid>,
) -> AppResult<Json<AdminView>> {
    let mut row = repo::find_admin(&state.db, id)
        .await?
        .ok_or(AppError::NotFound("Admin"))?;
    let active = !row.user.is_active;
    repo::set_active(&state.db, id, active).await?;
    row.user.is_active = active;

    let (action, verb) = toggle_action(active);
    audit::record(
        &state.db,
        AuditEntry::by(&user, &ip, action)
            .target(object_type::ADMIN, id, &row.user.username)
            .describe(format!("super admin {} {} admin {}", user.username, verb, row.user.username)),
    )
    .await;
    Ok(Json(AdminView::from(row)))
}

#[instrument(skip(state, user, ip), fields(user_id = %user.id))]
pub async fn delete_admin(
    State(state): State<AppState>,
    user: CurrentUser,
    ip: ClientIp,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let row = repo::find_admin(&state.db, id)
        .await?
        .ok_or(AppError::NotFound("Admin"))?;
    repo::delete_user(&state.db, id).await?;
    info!(admin_id = %id, "admin deleted");

    audit::record(
        &state.db,
        AuditEntry::by(&user, &ip, AuditAction::Delete)
            .target(object_type::ADMIN, id, &row.user.username)
            .describe(format!("super admin {} deleted admin {}", user.username, row.user.username)),
    )
    .await;
    Ok(StatusCode::NO_CONTENT)
}
