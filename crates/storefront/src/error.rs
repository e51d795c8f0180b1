//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures errors to Sentry before
//! responding to the client. All route handlers should return `Result<T, AppError>`.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use spoke_core::SpinRejected;
use thiserror::Error;

use crate::backend::BackendError;
use crate::services::{CheckoutError, SpinError};

/// Application-level error type for the storefront.
#[derive(Debug, Error)]
pub enum AppError {
    /// REST backend call failed.
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// Checkout operation failed.
    #[error("Checkout error: {0}")]
    Checkout(#[from] CheckoutError),

    /// Lucky wheel operation failed.
    #[error("Spin error: {0}")]
    Spin(#[from] SpinError),

    /// Session store failed.
    #[error("Session error: {0}")]
    Session(#[from] tower_sessions::session::Error),

    /// No route matches the path.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Too many requests from one client.
    #[error("Too many requests, please slow down")]
    RateLimited,
}

impl AppError {
    const fn status(&self) -> StatusCode {
        match self {
            Self::Backend(_)
            | Self::Checkout(CheckoutError::Backend(_))
            | Self::Spin(SpinError::Backend(_)) => StatusCode::BAD_GATEWAY,
            Self::Checkout(CheckoutError::Validation(_)) | Self::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::Checkout(CheckoutError::Busy) | Self::Spin(SpinError::Rejected(_)) => {
                StatusCode::CONFLICT
            }
            Self::Spin(SpinError::Store(_)) | Self::Session(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        }
    }

    /// Stable machine-readable code for the page scripts.
    const fn code(&self) -> &'static str {
        match self {
            Self::Backend(_)
            | Self::Checkout(CheckoutError::Backend(_))
            | Self::Spin(SpinError::Backend(_)) => "backend_unavailable",
            Self::Checkout(CheckoutError::Validation(_)) | Self::BadRequest(_) => "invalid_input",
            Self::Checkout(CheckoutError::Busy) => "shipping_calculating",
            Self::Spin(SpinError::Rejected(SpinRejected::AlreadyPlayed)) => "already_played",
            Self::Spin(SpinError::Rejected(SpinRejected::AlreadySpinning)) => "already_spinning",
            Self::Spin(SpinError::Store(_)) | Self::Session(_) => "internal",
            Self::NotFound(_) => "not_found",
            Self::RateLimited => "rate_limited",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Capture server errors to Sentry
        if status.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        // Don't expose internal error details to clients
        let message = match &self {
            Self::Spin(SpinError::Store(_)) | Self::Session(_) => {
                "Internal server error".to_string()
            }
            Self::Backend(_)
            | Self::Checkout(CheckoutError::Backend(_))
            | Self::Spin(SpinError::Backend(_)) => {
                "The shop is having trouble right now, please try again".to_string()
            }
            Self::Checkout(CheckoutError::Validation(msg)) => msg.clone(),
            Self::Checkout(err) => err.to_string(),
            Self::Spin(err) => err.to_string(),
            _ => self.to_string(),
        };

        (
            status,
            Json(json!({ "error": self.code(), "message": message })),
        )
            .into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Add a breadcrumb for visitor actions.
///
/// Breadcrumbs appear in Sentry error reports to show the trail of actions
/// leading up to an error.
///
/// # Example
///
/// ```rust,ignore
/// add_breadcrumb("checkout", "Order submitted", Some(&[("shipping", "zone_1")]));
/// ```
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}
