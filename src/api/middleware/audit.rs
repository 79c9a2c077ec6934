//! Audit logging middleware.
//!
//! Logs every authenticated request with user id, method, path and
//! response status. Runs innermost (after auth has injected `AuthUser`).

use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;

use crate::api::types::AuthUser;

pub async fn log_access(req: Request<axum::body::Body>, next: Next) -> Response {
    let method = req.method().to_string();
    let path = req.uri().path().to_string();
    let user_id = req.extensions().get::<AuthUser>().map(|a| a.user.id);

    let response = next.run(req).await;

    tracing::info!(
        user_id,
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        "Staff API access"
    );
    response
}
