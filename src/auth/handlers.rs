use axum::{
    extract::{FromRef, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    routing::{get, post},
    Json, Router,
};
use tracing::{error, info, instrument, warn};

use super::{
    dto::{AuthResponse, LoginRequest, PublicUser, RefreshRequest, RegisterRequest, RegisterResponse},
    extractors::{clear_session_cookie, session_cookie, ClientIp, CurrentUser},
    jwt::JwtKeys,
    password::{check_new_password, verify_login},
};
use crate::{
    accounts::{repo, repo_types::User, services},
    audit::{self, object_type, AuditAction, AuditEntry},
    error::{AppError, AppResult},
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/auth/refresh", post(refresh))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/me", get(get_me))
}

fn invalid_credentials() -> AppError {
    AppError::Unauthorized("Invalid username or password".into())
}

/// Token pair for `user` plus the `Set-Cookie` header carrying the access token.
fn issue_session(state: &AppState, user: &User) -> AppResult<(HeaderMap, AuthResponse)> {
    let keys = JwtKeys::from_ref(state);
    let access_token = keys.sign_access(user.id)?;
    let refresh_token = keys.sign_refresh(user.id)?;

    let cookie = session_cookie(&access_token, keys.access_ttl, state.config.cookie_secure);
    let mut headers = HeaderMap::new();
    headers.insert(
        header::SET_COOKIE,
        HeaderValue::from_str(&cookie).map_err(anyhow::Error::from)?,
    );
    Ok((
        headers,
        AuthResponse {
            access_token,
            refresh_token,
            user: PublicUser::from(user),
        },
    ))
}

#[instrument(skip(state, payload, ip))]
pub async fn register(
    State(state): State<AppState>,
    ip: ClientIp,
    Json(payload): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<RegisterResponse>)> {
    let username = payload.username.trim();
    services::validate_username(username)?;
    check_new_password(&payload.password1, &payload.password2)?;
    let profile = services::clean_teacher_profile(&payload.profile)?;

    let user = services::create_teacher_account(&state.db, username, &payload.password1, &profile)
        .await
        .map_err(|e| {
            if matches!(e, AppError::Conflict(_)) {
                warn!(username = %username, "username already registered");
            }
            e
        })?;

    audit::record(
        &state.db,
        AuditEntry::by_id(user.id, &ip, AuditAction::Create)
            .target(object_type::USER, user.id, &user.username)
            .describe(format!("teacher {} registered and awaits approval", user.username)),
    )
    .await;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            user: PublicUser::from(&user),
            message: "Registration received. An administrator will review your profile.",
        }),
    ))
}

#[instrument(skip(state, payload, ip), fields(username = %payload.username))]
pub async fn login(
    State(state): State<AppState>,
    ip: ClientIp,
    Json(payload): Json<LoginRequest>,
) -> AppResult<(HeaderMap, Json<AuthResponse>)> {
    let username = payload.username.trim();
    if username.is_empty() || payload.password.is_empty() {
        return Err(AppError::validation("username and password are required"));
    }

    let found = repo::find_by_username(&state.db, username).await?;
    let ok = verify_login(&payload.password, found.as_ref().map(|u| u.password_hash.as_str()))
        .map_err(|e| {
            error!(error = %e, "password check failed");
            AppError::Internal(e)
        })?;
    let user = match found {
        Some(u) if ok => u,
        Some(u) => {
            warn!(user_id = %u.id, "login invalid password");
            return Err(invalid_credentials());
        }
        None => {
            warn!("login unknown username");
            return Err(invalid_credentials());
        }
    };
    if !user.is_active {
        warn!(user_id = %user.id, "login to disabled account");
        return Err(AppError::Forbidden);
    }

    let (headers, body) = issue_session(&state, &user)?;

    audit::record(
        &state.db,
        AuditEntry::by_id(user.id, &ip, AuditAction::Login)
            .target(object_type::USER, user.id, &user.username)
            .describe(format!("{} {} logged in", user.role.as_str(), user.username)),
    )
    .await;

    info!(user_id = %user.id, role = user.role.as_str(), "user logged in");
    Ok((headers, Json(body)))
}

#[instrument(skip(state, user, ip), fields(user_id = %user.id))]
pub async fn logout(
    State(state): State<AppState>,
    user: CurrentUser,
    ip: ClientIp,
) -> AppResult<(StatusCode, HeaderMap)> {
    audit::record(
        &state.db,
        AuditEntry::by(&user, &ip, AuditAction::Logout)
            .target(object_type::USER, user.id, &user.username)
            .describe(format!("{} {} logged out", user.role.as_str(), user.username)),
    )
    .await;

    let mut headers = HeaderMap::new();
    headers.insert(
        header::SET_COOKIE,
        HeaderValue::from_str(&clear_session_cookie(state.config.cookie_secure))
            .map_err(anyhow::Error::from)?,
    );
    info!(user_id = %user.id, "user logged out");
    Ok((StatusCode::NO_CONTENT, headers))
}

#[instrument(skip(state, payload))]
pub async fn refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> AppResult<(HeaderMap, Json<AuthResponse>)> {
    let keys = JwtKeys::from_ref(&state);
    let claims = keys.verify_refresh(&payload.refresh_token).map_err(|e| {
        warn!(error = %e, "refresh rejected");
        AppError::Unauthorized("invalid or expired refresh token".into())
    })?;

    let user = repo::find_by_id(&state.db, claims.sub)
        .await?
        .ok_or_else(|| AppError::Unauthorized("user not found".into()))?;
    if !user.is_active {
        return Err(AppError::Unauthorized("account is disabled".into()));
    }

    let (headers, body) = issue_session(&state, &user)?;
    Ok((headers, Json(body)))
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn get_me(State(state): State<AppState>, user: CurrentUser) -> AppResult<Json<PublicUser>> {
    let row = repo::find_by_id(&state.db, user.id)
        .await?
        .ok_or_else(|| AppError::Unauthorized("user not found".into()))?;
    Ok(Json(PublicUser::from(&row)))
}

#[cfg(test)]
mod me_tests {
    use super::*;
    use crate::accounts::repo_types::Role;
    use time::OffsetDateTime;

    #[test]
    fn public_user_hides_password_hash() {
        let now = OffsetDateTime::now_utc();
        let user = User {
            id: uuid::Uuid::new_v4(),
            username: "teacher1".to_string(),
            password_hash: "$argon2id$secret".to_string(),
            role: Role::Teacher,
            is_active: true,
            is_staff: false,
            created_at: now,
            updated_at: now,
        };

        let json = serde_json::to_string(&PublicUser::from(&user)).unwrap();
        assert!(json.contains("teacher1"));
        assert!(json.contains("\"role\":\"teacher\""));
        assert!(!json.contains("argon2"));
    }

    #[tokio::test]
    async fn issued_session_sets_http_only_cookie() {
        let state = AppState::fake();
        let now = OffsetDateTime::now_utc();
        let user = User {
            id: uuid::Uuid::new_v4(),
            username: "admin1".to_string(),
            password_hash: String::new(),
            role: Role::Admin,
            is_active: true,
            is_staff: true,
            created_at: now,
            updated_at: now,
        };
        let (headers, body) = issue_session(&state, &user).unwrap();
        let cookie = headers.get(header::SET_COOKIE).unwrap().to_str().unwrap();
        assert!(cookie.starts_with(&format!("session={};", body.access_token)));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("Max-Age=300"));

        let keys = JwtKeys::from_ref(&state);
        assert_eq!(keys.verify_access(&body.access_token).unwrap().sub, user.id);
        assert_eq!(keys.verify_refresh(&body.refresh_token).unwrap().sub, user.id);
    }
}
