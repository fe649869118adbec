use axum::{
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use thiserror::Error;

use crate::db::StoreError;
use crate::services::catalog::CatalogError;
use crate::services::delivery::DeliveryError;
use crate::services::guard::StreamError;
use crate::services::token::TokenError;

#[derive(Error, Debug)]
pub enum AppError {
    /// Anonymous request without a token; carries the login URL to send the viewer to.
    #[error("Login required")]
    NotAuthenticated(String),

    #[error("Forbidden")]
    Forbidden,

    #[error("Token error: {0}")]
    Token(#[from] TokenError),

    #[error("Product not found")]
    ProductNotFound,

    #[error("No media locator configured")]
    NoLocatorConfigured { checked_keys: Option<Vec<String>> },

    #[error("Delivery error: {0}")]
    Delivery(#[from] DeliveryError),

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Session error: {0}")]
    Session(String),
}

impl From<StreamError> for AppError {
    fn from(err: StreamError) -> Self {
        match err {
            StreamError::ProductNotFound => AppError::ProductNotFound,
            StreamError::Forbidden => AppError::Forbidden,
            StreamError::NoLocatorConfigured { checked_keys } => {
                AppError::NoLocatorConfigured { checked_keys }
            }
            StreamError::Catalog(e) => AppError::Catalog(e),
            StreamError::Delivery(e) => AppError::Delivery(e),
        }
    }
}

impl From<tower_sessions::session::Error> for AppError {
    fn from(err: tower_sessions::session::Error) -> Self {
        AppError::Session(err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::NotAuthenticated(login_url) => {
                return Redirect::to(login_url).into_response();
            }
            AppError::Forbidden => (
                StatusCode::FORBIDDEN,
                "You do not have access to this video.".to_string(),
            ),
            AppError::Token(_) => (
                StatusCode::FORBIDDEN,
                "This link is invalid or has expired.".to_string(),
            ),
            AppError::ProductNotFound => {
                (StatusCode::NOT_FOUND, "Video not found.".to_string())
            }
            AppError::NoLocatorConfigured { checked_keys } => {
                let mut message = "This video is not available yet.".to_string();
                if let Some(keys) = checked_keys {
                    message.push_str(&format!(" Checked keys: {}", keys.join(", ")));
                }
                (StatusCode::NOT_FOUND, message)
            }
            AppError::Delivery(e) => match e {
                DeliveryError::PathTraversalRejected | DeliveryError::NotFound => {
                    (StatusCode::NOT_FOUND, "Video not found.".to_string())
                }
                DeliveryError::FileUnreadable(_) => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Video could not be read.".to_string(),
                ),
                DeliveryError::UpstreamFailure(_) => (
                    StatusCode::BAD_GATEWAY,
                    "Video source is unavailable.".to_string(),
                ),
            },
            AppError::Storage(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Database error".to_string(),
            ),
            AppError::Catalog(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "Product catalog unavailable".to_string(),
            ),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()),
            AppError::Session(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Session error occurred.".to_string(),
            ),
        };

        if status.is_server_error() {
            tracing::error!(error = ?self, "Request failed");
        } else {
            tracing::debug!(error = ?self, "Request rejected");
        }

        (status, message).into_response()
    }
}
