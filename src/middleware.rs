//! Middlewares for routes.

use axum::extract::{Request, State};
use axum::http::{HeaderName, header};
use axum::middleware::Next;
use axum::response::Response;

use crate::error::Result;
use crate::user::User;
use crate::{AppState, ServerError};

const BEARER: &str = "Bearer ";
pub const ADMIN_KEY: HeaderName = HeaderName::from_static("x-admin-key");

/// Resolve `Authorization: Bearer <token>` into a [`User`] extension.
pub async fn auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
        .and_then(|header| header.strip_prefix(BEARER))
        .map(str::trim)
        .ok_or(ServerError::Unauthorized)?;

    let user = state.identity().resolve_session(token).await?;

    req.extensions_mut().insert::<User>(user);
    Ok(next.run(req).await)
}

/// Reject non-administrators. Must run after [`auth`].
pub async fn admin(req: Request, next: Next) -> Result<Response> {
    match req.extensions().get::<User>() {
        Some(user) if user.is_admin => Ok(next.run(req).await),
        Some(_) => Err(ServerError::Forbidden),
        None => Err(ServerError::Unauthorized),
    }
}

/// Gate administrator signup behind the configured key.
///
/// Closed when no key is configured.
pub async fn admin_key(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response> {
    let Some(expected) = state
        .config
        .admin
        .as_ref()
        .and_then(|admin| admin.signup_key.as_deref())
        .filter(|key| !key.is_empty())
    else {
        return Err(ServerError::Forbidden);
    };

    let provided = req
        .headers()
        .get(&ADMIN_KEY)
        .and_then(|header| header.to_str().ok());

    if provided == Some(expected) {
        Ok(next.run(req).await)
    } else {
        tracing::warn!("administrator signup attempt with invalid key");
        Err(ServerError::Forbidden)
    }
}
