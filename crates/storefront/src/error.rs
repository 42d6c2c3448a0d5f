//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures server errors to Sentry
//! before responding to the client. All route handlers return
//! `Result<T, AppError>`.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::db::RepositoryError;
use crate::services::{CartError, CheckoutError, OrderReadError, ProductError};

/// Application-level error type for the storefront.
#[derive(Debug, Error)]
pub enum AppError {
    /// Order commit failed.
    #[error("Checkout error: {0}")]
    Checkout(#[from] CheckoutError),

    /// Order read failed.
    #[error("Order error: {0}")]
    Order(#[from] OrderReadError),

    /// Cart operation failed.
    #[error("Cart error: {0}")]
    Cart(#[from] CartError),

    /// Product operation failed.
    #[error("Product error: {0}")]
    Product(#[from] ProductError),

    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] RepositoryError),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl AppError {
    /// HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Checkout(err) => match err {
                CheckoutError::EmptyCart => StatusCode::BAD_REQUEST,
                CheckoutError::InsufficientStock { .. } => StatusCode::CONFLICT,
                CheckoutError::ProductNotFound(_) => StatusCode::NOT_FOUND,
                CheckoutError::PartialCommit { .. } | CheckoutError::Store(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            Self::Order(err) => match err {
                OrderReadError::NotFound(_) => StatusCode::NOT_FOUND,
                OrderReadError::Forbidden(_) => StatusCode::FORBIDDEN,
                OrderReadError::Cancelled(_) => StatusCode::CONFLICT,
                OrderReadError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Cart(err) => match err {
                CartError::ProductNotFound(_) | CartError::ItemNotFound(_) => {
                    StatusCode::NOT_FOUND
                }
                CartError::InvalidQuantity(_) => StatusCode::BAD_REQUEST,
                CartError::InsufficientStock { .. } => StatusCode::CONFLICT,
                CartError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Product(err) => match err {
                ProductError::NotFound(_) => StatusCode::NOT_FOUND,
                ProductError::Invalid(_) => StatusCode::BAD_REQUEST,
                ProductError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// Message safe to show a client.
    fn client_message(&self) -> String {
        match self {
            // Don't expose internal error details to clients
            _ if self.status().is_server_error() => "Internal server error".to_string(),
            Self::Checkout(err) => err.to_string(),
            Self::Order(err) => err.to_string(),
            Self::Cart(err) => err.to_string(),
            Self::Product(err) => err.to_string(),
            _ => self.to_string(),
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

        (status, Json(json!({ "error": self.client_message() }))).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context from a user ID.
///
/// Call this after successful authentication to associate errors with users.
pub fn set_sentry_user(user_id: &impl ToString) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            ..Default::default()
        }));
    });
}
