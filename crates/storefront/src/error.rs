//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures infrastructure errors to
//! Sentry before responding to the client. All route handlers return
//! `Result<T, AppError>`.
//!
//! Every error body is JSON: `{"message": ..., "error": ...}`. The `error`
//! field carries the underlying cause for client-side errors and is omitted
//! for infrastructure errors, whose details stay in the logs.

use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::services::{ErrorKind, ServiceError};

/// Application-level error type for the storefront.
#[derive(Debug, Error)]
pub enum AppError {
    /// A service rejected or failed the operation.
    #[error(transparent)]
    Service(#[from] ServiceError),

    /// Malformed body, path or query.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// User is not authenticated.
    #[error("Unauthorized")]
    Unauthorized,

    /// User lacks the admin role.
    #[error("Forbidden")]
    Forbidden,

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Service(ServiceError::Timeout(_)) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Service(err) => match err.kind() {
                ErrorKind::Validation | ErrorKind::Conflict => StatusCode::BAD_REQUEST,
                ErrorKind::NotFound => StatusCode::NOT_FOUND,
                ErrorKind::Infrastructure => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn is_infrastructure(&self) -> bool {
        match self {
            Self::Service(err) => err.kind() == ErrorKind::Infrastructure,
            Self::Internal(_) => true,
            Self::BadRequest(_) | Self::Unauthorized | Self::Forbidden => false,
        }
    }

    fn body(&self) -> ErrorBody {
        if self.is_infrastructure() {
            let message = match self {
                Self::Service(ServiceError::Timeout(_)) => "Checkout timed out, please retry",
                _ => "Internal server error",
            };
            return ErrorBody {
                message: message.to_string(),
                error: None,
            };
        }

        match self {
            Self::Service(err) => ErrorBody {
                message: user_message(err).to_string(),
                error: Some(err.to_string()),
            },
            Self::BadRequest(cause) => ErrorBody {
                message: "Malformed request".to_string(),
                error: Some(cause.clone()),
            },
            Self::Unauthorized => ErrorBody {
                message: "Login required".to_string(),
                error: None,
            },
            Self::Forbidden => ErrorBody {
                message: "Admin role required".to_string(),
                error: None,
            },
            Self::Internal(_) => ErrorBody {
                message: "Internal server error".to_string(),
                error: None,
            },
        }
    }
}

const fn user_message(err: &ServiceError) -> &'static str {
    match err {
        ServiceError::Validation(_) => "Invalid request",
        ServiceError::CartNotFound => "Cart not found",
        ServiceError::ItemNotInCart(_) => "Item not in cart",
        ServiceError::NoAnonymousCart => "No cart yet",
        ServiceError::NothingToMerge => "Nothing to merge",
        ServiceError::InsufficientStock { .. } => "Insufficient stock",
        ServiceError::OutOfStock(_) => "Product is out of stock",
        ServiceError::ProductNotFound(_) => "Product not found",
        ServiceError::OrderNotFound(_) => "Order not found",
        ServiceError::CategoryNotFound(_) => "Category not found",
        ServiceError::Repository(_) | ServiceError::Cache(_) | ServiceError::Sync(_) => {
            "Request failed"
        }
        ServiceError::Timeout(_) => "Checkout timed out, please retry",
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Capture server errors to Sentry
        if self.is_infrastructure() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        (self.status(), Json(self.body())).into_response()
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<corner_shop_core::PageError> for AppError {
    fn from(err: corner_shop_core::PageError) -> Self {
        Self::Service(ServiceError::Validation(err.to_string()))
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Add a breadcrumb for user actions.
///
/// Breadcrumbs appear in Sentry error reports to show the trail of user actions
/// leading up to an error.
///
/// # Example
///
/// ```rust,ignore
/// add_breadcrumb("checkout", "Order placed", Some(&[("order_id", "123")]));
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

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use corner_shop_core::ProductId;

    use super::*;
    use crate::store::RepositoryError;

    fn get_status(err: AppError) -> StatusCode {
        err.into_response().status()
    }

    async fn body_json(err: AppError) -> serde_json::Value {
        let response = err.into_response();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_app_error_status_codes() {
        assert_eq!(
            get_status(ServiceError::OutOfStock(ProductId::new(1)).into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            get_status(ServiceError::NoAnonymousCart.into()),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            get_status(ServiceError::Timeout(Duration::from_secs(5)).into()),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            get_status(ServiceError::Repository(RepositoryError::DataCorruption("x".into())).into()),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(get_status(AppError::Unauthorized), StatusCode::UNAUTHORIZED);
        assert_eq!(get_status(AppError::Forbidden), StatusCode::FORBIDDEN);
        assert_eq!(
            get_status(AppError::BadRequest("test".to_string())),
            StatusCode::BAD_REQUEST
        );
    }

    #[tokio::test]
    async fn test_client_errors_carry_cause() {
        let json = body_json(
            ServiceError::InsufficientStock {
                product_id: ProductId::new(4),
                requested: 3,
                available: 2,
            }
            .into(),
        )
        .await;
        assert_eq!(json["message"], "Insufficient stock");
        assert!(json["error"].as_str().unwrap().contains("product 4"));
    }

    #[tokio::test]
    async fn test_infrastructure_errors_hide_cause() {
        let json = body_json(
            ServiceError::Repository(RepositoryError::Unavailable("db password wrong".into()))
                .into(),
        )
        .await;
        assert_eq!(json["message"], "Internal server error");
        assert!(json.get("error").is_none());
    }
}
