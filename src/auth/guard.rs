//! Role gate.
//!
//! `authorize` is the single decision point; the middlewares below resolve the
//! caller once per request, run the check, and leave the `CurrentUser` in the
//! request extensions for the handler.

use axum::{
    extract::{FromRequestParts, Request, State},
    middleware::Next,
    response::Response,
};
use tracing::warn;

use super::extractors::CurrentUser;
use crate::{
    accounts::repo_types::Role,
    error::{AppError, AppResult},
    state::AppState,
};

pub const ADMIN_ROLES: &[Role] = &[Role::SuperAdmin, Role::Admin];
pub const SUPER_ADMIN_ONLY: &[Role] = &[Role::SuperAdmin];
pub const TEACHER_ONLY: &[Role] = &[Role::Teacher];

pub fn authorize(role: Role, allowed: &[Role]) -> AppResult<()> {
    if allowed.contains(&role) {
        Ok(())
    } else {
        Err(AppError::Forbidden)
    }
}

impl CurrentUser {
    pub fn require(&self, allowed: &[Role]) -> AppResult<()> {
        authorize(self.role, allowed).map_err(|e| {
            warn!(user_id = %self.id, role = self.role.as_str(), "role check failed");
            e
        })
    }
}

async fn gate(state: &AppState, req: Request, next: Next, allowed: &[Role]) -> AppResult<Response> {
    let (mut parts, body) = req.into_parts();
    let user = CurrentUser::from_request_parts(&mut parts, state).await?;
    user.require(allowed)?;
    Ok(next.run(Request::from_parts(parts, body)).await)
}

pub async fn require_admin(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> AppResult<Response> {
    gate(&state, req, next, ADMIN_ROLES).await
}

pub async fn require_super_admin(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> AppResult<Response> {
    gate(&state, req, next, SUPER_ADMIN_ONLY).await
}

pub async fn require_teacher(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> AppResult<Response> {
    gate(&state, req, next, TEACHER_ONLY).await
}
