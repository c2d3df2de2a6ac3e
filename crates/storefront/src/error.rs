//! Request-level errors for the storefront.
//!
//! Handlers return [`Result`]; anything that reaches the client as a 5xx is
//! reported to Sentry first and its details are replaced with a generic
//! message.
//!
//! Cart persistence failures never reach this type: they are logged by the
//! sync worker and the shopper keeps the in-memory cart.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

const SERVER_ERROR_MESSAGE: &str = "Internal server error";

/// Why a storefront request failed.
#[derive(Debug, Error)]
pub enum AppError {
    /// A page or fragment template failed to render.
    #[error("Render error: {0}")]
    Render(#[from] askama::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    /// The browser sent a form the storefront can't act on.
    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl AppError {
    /// HTTP status sent to the browser.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Render(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    #[must_use]
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }

    /// Body text sent to the browser. Server-side failures stay opaque.
    #[must_use]
    pub fn public_message(&self) -> String {
        if self.is_server_error() {
            SERVER_ERROR_MESSAGE.to_owned()
        } else {
            self.to_string()
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(error = %self, sentry_event_id = %event_id, "Request failed");
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "Request rejected");
        }
        (status, self.public_message()).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

/// Record a shopper action as a Sentry breadcrumb.
///
/// The trail shows up on any later error event from the same request scope.
pub fn add_breadcrumb(category: &str, message: &str, data: &[(&str, &str)]) {
    sentry::add_breadcrumb(sentry::Breadcrumb {
        category: Some(category.to_owned()),
        message: Some(message.to_owned()),
        level: sentry::Level::Info,
        data: data
            .iter()
            .map(|&(k, v)| (k.to_owned(), serde_json::Value::from(v)))
            .collect(),
        ..Default::default()
    });
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            AppError::BadRequest("unknown cart action".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::NotFound("/nope".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert!(AppError::Render(askama::Error::Fmt).is_server_error());
    }

    #[test]
    fn test_client_errors_explain_themselves() {
        let err = AppError::BadRequest("unknown cart action".into());
        assert_eq!(err.public_message(), "Bad request: unknown cart action");
    }

    #[tokio::test]
    async fn test_render_details_hidden() {
        let cause = std::io::Error::other("firestore token leaked");
        let response = AppError::Render(askama::Error::custom(cause)).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], SERVER_ERROR_MESSAGE.as_bytes());
    }
}
