use std::str::FromStr;

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::Redirect,
    routing::{get, post},
    Json, Router,
};
use rust_decimal::Decimal;
use tracing::{instrument, warn};
use uuid::Uuid;

use super::dto::{ApplicationFilter, DecisionRequest};
use super::repo::{self, ApplicationQuery};
use super::repo_types::{ApplicationStatus, SalaryApplication};
use super::services::{self, CreateApplication, Decision, ProofFile};
use crate::{
    audit::{self, object_type, AuditAction, AuditEntry},
    auth::extractors::{ClientIp, CurrentUser},
    db::Pagination,
    error::{AppError, AppResult},
    state::AppState,
    storage::MAX_PROOF_BYTES,
};

/// Any authenticated caller; teachers are scoped to their own rows.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/applications", get(list_applications))
        .route("/applications/:id", get(get_application))
        .route("/applications/:id/proof", get(get_proof))
}

/// Mounted under `/teacher`.
pub fn teacher_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/applications",
            post(create_application).layer(DefaultBodyLimit::max(MAX_PROOF_BYTES + 512 * 1024)),
        )
        .route("/applications/:id/withdraw", post(withdraw_application))
}

/// Mounted under `/admin`.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/applications/:id/approve", post(approve_application))
        .route("/applications/:id/reject", post(reject_application))
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn list_applications(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(filter): Query<ApplicationFilter>,
    Query(page): Query<Pagination>,
) -> AppResult<Json<Vec<SalaryApplication>>> {
    let status = filter
        .status
        .as_deref()
        .map(ApplicationStatus::from_str)
        .transpose()
        .map_err(AppError::Validation)?;
    let q = ApplicationQuery {
        status,
        teacher_id: (!user.role.is_admin()).then_some(user.id),
        order_id: None,
    };
    let rows = repo::list(&state.db, &q, page).await?;
    Ok(Json(rows))
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn get_application(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<SalaryApplication>> {
    let app = repo::find_by_id(&state.db, id)
        .await?
        .ok_or(AppError::NotFound("Salary application"))?;
    services::ensure_visible(&user, &app)?;
    Ok(Json(app))
}

/// Temporary redirect to a short-lived presigned URL for the proof document.
#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn get_proof(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Redirect> {
    let app = repo::find_by_id(&state.db, id)
        .await?
        .ok_or(AppError::NotFound("Salary application"))?;
    services::ensure_visible(&user, &app)?;
    let url = state.proofs.download_url(&app.proof_key).await?;
    Ok(Redirect::temporary(&url))
}

fn bad_multipart(e: impl std::fmt::Display) -> AppError {
    AppError::validation(format!("invalid multipart body: {}", e))
}

/// Multipart fields: `order_id`, `apply_amount`, `proof_file`, optional `remarks`.
async fn read_create_form(mut mp: Multipart) -> AppResult<CreateApplication> {
    let mut order_id = None;
    let mut apply_amount = None;
    let mut remarks = None;
    let mut proof = None;

    while let Some(field) = mp.next_field().await.map_err(bad_multipart)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "order_id" => {
                let raw = field.text().await.map_err(bad_multipart)?;
                let id = Uuid::parse_str(raw.trim())
                    .map_err(|_| AppError::validation("order_id must be a UUID"))?;
                order_id = Some(id);
            }
            "apply_amount" => {
                let raw = field.text().await.map_err(bad_multipart)?;
                let amount = Decimal::from_str(raw.trim())
                    .map_err(|_| AppError::validation("apply_amount must be a number"))?;
                apply_amount = Some(amount);
            }
            "remarks" => {
                let raw = field.text().await.map_err(bad_multipart)?;
                let trimmed = raw.trim();
                if !trimmed.is_empty() {
                    remarks = Some(trimmed.to_string());
                }
            }
            "proof_file" => {
                let file_name = field.file_name().unwrap_or("proof").to_string();
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let body = field.bytes().await.map_err(bad_multipart)?;
                proof = Some(ProofFile {
                    file_name,
                    content_type,
                    body,
                });
            }
            _ => {}
        }
    }

    Ok(CreateApplication {
        order_id: order_id.ok_or_else(|| AppError::validation("order_id is required"))?,
        apply_amount: apply_amount.ok_or_else(|| AppError::validation("apply_amount is required"))?,
        remarks,
        proof: proof.ok_or_else(|| AppError::validation("proof_file is required"))?,
    })
}

#[instrument(skip(state, user, ip, mp), fields(user_id = %user.id))]
pub async fn create_application(
    State(state): State<AppState>,
    user: CurrentUser,
    ip: ClientIp,
    mp: Multipart,
) -> AppResult<(StatusCode, HeaderMap, Json<SalaryApplication>)> {
    let form = read_create_form(mp).await?;
    let app = services::create_application(&state, user.id, form).await?;

    audit::record(
        &state.db,
        AuditEntry::by(&user, &ip, AuditAction::Create)
            .target(object_type::SALARY_APPLICATION, app.id, &app.application_number)
            .describe(format!(
                "teacher {} submitted salary application {} for order {}, amount {}",
                user.username, app.application_number, app.order_number, app.apply_amount
            )),
    )
    .await;

    let mut headers = HeaderMap::new();
    if let Ok(location) = HeaderValue::from_str(&format!("/api/v1/applications/{}", app.id)) {
        headers.insert(header::LOCATION, location);
    }
    Ok((StatusCode::CREATED, headers, Json(app)))
}

#[instrument(skip(state, user, ip), fields(user_id = %user.id))]
pub async fn withdraw_application(
    State(state): State<AppState>,
    user: CurrentUser,
    ip: ClientIp,
    Path(id): Path<Uuid>,
) -> AppResult<Json<SalaryApplication>> {
    let app = services::withdraw(&state.db, id, user.id).await?;

    audit::record(
        &state.db,
        AuditEntry::by(&user, &ip, AuditAction::Withdraw)
            .target(object_type::SALARY_APPLICATION, app.id, &app.application_number)
            .describe(format!(
                "teacher {} withdrew salary application {}",
                user.username, app.application_number
            )),
    )
    .await;
    Ok(Json(app))
}

async fn decide(
    state: &AppState,
    user: &CurrentUser,
    ip: &ClientIp,
    id: Uuid,
    decision: Decision,
    body: &DecisionRequest,
) -> AppResult<Json<SalaryApplication>> {
    let app = services::decide(&state.db, id, user.id, decision, body.remarks()).await?;

    let (action, verb) = match decision {
        Decision::Approve => (AuditAction::Approve, "approved"),
        Decision::Reject => (AuditAction::Reject, "rejected"),
    };
    audit::record(
        &state.db,
        AuditEntry::by(user, ip, action)
            .target(object_type::SALARY_APPLICATION, app.id, &app.application_number)
            .describe(format!(
                "admin {} {} salary application {} of teacher {}",
                user.username, verb, app.application_number, app.teacher_username
            )),
    )
    .await;
    Ok(Json(app))
}

/// Optional JSON body: empty means no remarks, anything else must parse.
fn decision_body(raw: &[u8]) -> AppResult<DecisionRequest> {
    if raw.iter().all(u8::is_ascii_whitespace) {
        return Ok(DecisionRequest::default());
    }
    serde_json::from_slice(raw)
        .map_err(|e| AppError::validation(format!("invalid request body: {}", e)))
}

#[instrument(skip(state, user, ip, raw), fields(user_id = %user.id))]
pub async fn approve_application(
    State(state): State<AppState>,
    user: CurrentUser,
    ip: ClientIp,
    Path(id): Path<Uuid>,
    raw: Bytes,
) -> AppResult<Json<SalaryApplication>> {
    let body = decision_body(&raw)?;
    decide(&state, &user, &ip, id, Decision::Approve, &body).await
}

#[instrument(skip(state, user, ip, raw), fields(user_id = %user.id))]
pub async fn reject_application(
    State(state): State<AppState>,
    user: CurrentUser,
    ip: ClientIp,
    Path(id): Path<Uuid>,
    raw: Bytes,
) -> AppResult<Json<SalaryApplication>> {
    let body = decision_body(&raw)?;
    if body.remarks().is_none() {
        warn!(application_id = %id, "rejected without a reason");
    }
    decide(&state, &user, &ip, id, Decision::Reject, &body).await
}
