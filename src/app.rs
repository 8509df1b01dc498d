use std::net::SocketAddr;

use axum::{middleware::from_fn_with_state, routing::get, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    accounts, applications, audit,
    auth::{
        self,
        guard::{require_admin, require_super_admin, require_teacher},
    },
    backup, orders,
    state::AppState,
};

fn admin_router(state: &AppState) -> Router<AppState> {
    let super_admin_only = accounts::handlers::admin_account_routes()
        .route_layer(from_fn_with_state(state.clone(), require_super_admin));

    Router::new()
        .merge(accounts::handlers::teacher_admin_routes())
        .merge(orders::handlers::admin_routes())
        .merge(applications::handlers::admin_routes())
        .merge(audit::handlers::admin_routes())
        .merge(backup::handlers::admin_routes())
        .merge(super_admin_only)
        .route_layer(from_fn_with_state(state.clone(), require_admin))
}

fn teacher_router(state: &AppState) -> Router<AppState> {
    Router::new()
        .merge(orders::handlers::teacher_routes())
        .merge(applications::handlers::teacher_routes())
        .route_layer(from_fn_with_state(state.clone(), require_teacher))
}

pub fn build_app(state: AppState) -> Router {
    let api = Router::new()
        .merge(auth::router())
        .merge(accounts::handlers::routes())
        .merge(applications::handlers::routes())
        .nest("/admin", admin_router(&state))
        .nest("/teacher", teacher_router(&state))
        .route("/health", get(|| async { "ok" }));

    Router::new()
        .nest("/api/v1", api)
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    tracing::info_span!(
                        "http_request",
                        %method,
                        uri = %uri,
                        status = tracing::field::Empty
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     _latency: std::time::Duration,
                     span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        if status.is_server_error() {
                            tracing::error!(%status, "response");
                        } else {
                            tracing::info!(%status, "response");
                        }
                    },
                ),
        )
}

pub async fn serve(app: Router) -> anyhow::Result<()> {
    let addr: SocketAddr = format!(
        "{}:{}",
        std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
        std::env::var("APP_PORT").unwrap_or_else(|_| "8080".into())
    )
    .parse()?;

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    // peer address feeds the operation log when no proxy header is present
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
    };
    use tower::ServiceExt;

    async fn send(req: Request<Body>) -> (StatusCode, serde_json::Value) {
        let app = build_app(AppState::fake());
        let resp = app.oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), 64 * 1024).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn health_is_public() {
        let (status, _) = send(Request::get("/api/v1/health").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn admin_routes_need_a_session() {
        for uri in ["/api/v1/admin/orders", "/api/v1/admin/logs", "/api/v1/admin/admins"] {
            let (status, body) = send(Request::get(uri).body(Body::empty()).unwrap()).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED, "{}", uri);
            assert_eq!(body["error"], "authentication required");
        }
    }

    #[tokio::test]
    async fn teacher_routes_need_a_session() {
        let (status, _) = send(Request::get("/api/v1/teacher/orders").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn garbage_token_is_rejected() {
        let req = Request::get("/api/v1/dashboard")
            .header(header::AUTHORIZATION, "Bearer not.a.jwt")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(req).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "invalid or expired session");
    }

    #[tokio::test]
    async fn register_rejects_mismatched_passwords() {
        let body = r#"{
            "username": "newteacher", "password1": "password-one", "password2": "password-two",
            "name": "Zhang", "education": "MSc", "major": "Chemistry",
            "teaching_scope": "chemistry", "bank_account": "6222000011112222", "phone": "13900000000"
        }"#;
        let (status, json) = send(post_json("/api/v1/auth/register", body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "passwords do not match");
    }

    #[tokio::test]
    async fn login_requires_both_fields() {
        let (status, json) = send(post_json("/api/v1/auth/login", r#"{"username":"","password":""}"#)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "username and password are required");
    }

    #[tokio::test]
    async fn refresh_rejects_access_token() {
        let state = AppState::fake();
        let keys = crate::auth::jwt::JwtKeys::from(&state.config.jwt);
        let access = keys.sign_access(uuid::Uuid::new_v4()).unwrap();
        let body = format!(r#"{{"refresh_token":"{}"}}"#, access);
        let (status, _) = send(post_json("/api/v1/auth/refresh", &body)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
