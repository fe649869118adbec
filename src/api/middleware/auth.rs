use axum::{
    extract::Request,
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use tower_sessions::Session;

use super::session::{SESSION_KEY_IS_ADMIN, SESSION_KEY_USER_ID};

/// Authentication error responses
#[derive(Debug)]
pub enum AuthError {
    Unauthorized,
    Forbidden,
    SessionError,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        match self {
            AuthError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "Authentication required. Please log in.",
            )
                .into_response(),
            AuthError::Forbidden => {
                (StatusCode::FORBIDDEN, "Administrator access required.").into_response()
            }
            AuthError::SessionError => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Session error occurred.").into_response()
            }
        }
    }
}

/// Logged-in user as seen through the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewer {
    pub user_id: i64,
    pub is_admin: bool,
}

/// Reads the session identity. `None` for anonymous visitors and for
/// non-positive user ids.
pub async fn current_viewer(session: &Session) -> Result<Option<Viewer>, AuthError> {
    let user_id: Option<i64> = session
        .get(SESSION_KEY_USER_ID)
        .await
        .map_err(|_| AuthError::SessionError)?;

    let Some(user_id) = user_id.filter(|id| *id > 0) else {
        return Ok(None);
    };

    let is_admin: bool = session
        .get(SESSION_KEY_IS_ADMIN)
        .await
        .map_err(|_| AuthError::SessionError)?
        .unwrap_or(false);

    Ok(Some(Viewer { user_id, is_admin }))
}

/// Extracts the viewer or fails with `Unauthorized`.
pub async fn get_authenticated_viewer(session: &Session) -> Result<Viewer, AuthError> {
    current_viewer(session).await?.ok_or(AuthError::Unauthorized)
}

/// Middleware that requires an administrator session
pub async fn require_admin(
    session: Session,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let viewer = get_authenticated_viewer(&session).await?;

    if !viewer.is_admin {
        tracing::warn!(user_id = viewer.user_id, "Non-admin attempted admin access");
        return Err(AuthError::Forbidden);
    }

    Ok(next.run(request).await)
}
