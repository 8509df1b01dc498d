use axum::{
    body::Body,
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tokio_util::io::ReaderStream;
use tracing::instrument;

use super::services::{self, SnapshotInfo};
use crate::{
    audit::{self, object_type, AuditAction, AuditEntry},
    auth::extractors::{ClientIp, CurrentUser},
    error::{AppError, AppResult},
    state::AppState,
};

const MAX_RESTORE_BYTES: usize = 512 * 1024 * 1024;

/// Mounted under `/admin`.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/backups", get(list_backups).post(create_backup))
        .route(
            "/backups/restore",
            post(restore_backup).layer(DefaultBodyLimit::max(MAX_RESTORE_BYTES)),
        )
        .route("/backups/:name", get(download_backup).delete(delete_backup))
}

#[derive(Debug, Serialize)]
pub struct RestoreResponse {
    pub restored_from: String,
    pub saved_as: String,
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn list_backups(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<Json<Vec<SnapshotInfo>>> {
    let list = services::list_snapshots(&state.config.backup.dir).await?;
    Ok(Json(list))
}

#[instrument(skip(state, user, ip), fields(user_id = %user.id))]
pub async fn create_backup(
    State(state): State<AppState>,
    user: CurrentUser,
    ip: ClientIp,
) -> AppResult<(StatusCode, Json<SnapshotInfo>)> {
    let info = services::create_snapshot(&state).await?;

    audit::record(
        &state.db,
        AuditEntry::by(&user, &ip, AuditAction::Create)
            .target(object_type::BACKUP, "0", &info.name)
            .describe(format!("admin {} created backup {}", user.username, info.name)),
    )
    .await;
    Ok((StatusCode::CREATED, Json(info)))
}

/// Streams the file; it is never buffered whole.
#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn download_backup(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(name): Path<String>,
) -> AppResult<(HeaderMap, Body)> {
    let (file, len) = services::open_snapshot(&state.config.backup.dir, &name).await?;

    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/sql"));
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
    // name is validated to [A-Za-z0-9._-]
    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{}\"", name))
        .map_err(anyhow::Error::from)?;
    headers.insert(header::CONTENT_DISPOSITION, disposition);
    Ok((headers, Body::from_stream(ReaderStream::new(file))))
}

#[instrument(skip(state, user, ip), fields(user_id = %user.id))]
pub async fn delete_backup(
    State(state): State<AppState>,
    user: CurrentUser,
    ip: ClientIp,
    Path(name): Path<String>,
) -> AppResult<StatusCode> {
    services::delete_snapshot(&state.config.backup.dir, &name).await?;

    audit::record(
        &state.db,
        AuditEntry::by(&user, &ip, AuditAction::Delete)
            .target(object_type::BACKUP, "0", &name)
            .describe(format!("admin {} deleted backup {}", user.username, name)),
    )
    .await;
    Ok(StatusCode::NO_CONTENT)
}

/// Multipart field `backup_file`.
#[instrument(skip(state, user, ip, mp), fields(user_id = %user.id))]
pub async fn restore_backup(
    State(state): State<AppState>,
    user: CurrentUser,
    ip: ClientIp,
    mut mp: Multipart,
) -> AppResult<Json<RestoreResponse>> {
    let mut upload = None;
    while let Some(field) = mp
        .next_field()
        .await
        .map_err(|e| AppError::validation(format!("invalid multipart body: {}", e)))?
    {
        if field.name() == Some("backup_file") {
            let file_name = field.file_name().unwrap_or("upload.sql").to_string();
            let body = field
                .bytes()
                .await
                .map_err(|e| AppError::validation(format!("invalid multipart body: {}", e)))?;
            upload = Some((file_name, body));
        }
    }
    let (file_name, body) = upload.ok_or_else(|| AppError::validation("backup_file is required"))?;

    let saved_as = services::restore_from_upload(&state, &body).await?;

    audit::record(
        &state.db,
        AuditEntry::by(&user, &ip, AuditAction::Update)
            .target(object_type::DATABASE, "0", "Database")
            .describe(format!(
                "admin {} restored the database from {}",
                user.username, file_name
            )),
    )
    .await;
    Ok(Json(RestoreResponse {
        restored_from: file_name,
        saved_as,
    }))
}
