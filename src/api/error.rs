//! HTTP mapping of [`EcommerceError`].

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::de::DeserializeOwned;
use serde::Serialize;
use validator::{Validate, ValidationErrors};

use crate::{EcommerceError, Result};

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
}

impl EcommerceError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::OutOfStock | Self::Conflict(_) => StatusCode::CONFLICT,
            Self::InvalidCombination | Self::InvalidQuantity | Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Database(_) | Self::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::OutOfStock => "out_of_stock",
            Self::InvalidCombination => "invalid_combination",
            Self::Unauthorized(_) => "unauthorized",
            Self::Forbidden(_) => "forbidden",
            Self::Conflict(_) => "conflict",
            Self::InvalidQuantity => "invalid_quantity",
            Self::Validation(_) => "validation_error",
            Self::Database(_) | Self::Storage(_) => "internal_error",
        }
    }
}

impl IntoResponse for EcommerceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
            "Internal server error".to_string()
        } else {
            self.to_string()
        };
        (status, Json(ErrorBody { error: self.code(), message })).into_response()
    }
}

impl From<ValidationErrors> for EcommerceError {
    fn from(err: ValidationErrors) -> Self { Self::Validation(err.to_string()) }
}

/// Parses a JSON body that may be left out. Only an empty body falls back
/// to the default; anything else must parse.
pub fn optional_json<T: DeserializeOwned + Default>(body: &[u8]) -> Result<T> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    Json::<T>::from_bytes(body).map(|Json(value)| value).map_err(|e| EcommerceError::Validation(e.body_text()))
}

/// Runs the request's `validator` rules.
pub fn validated<T: Validate>(req: T) -> Result<T> {
    req.validate()?;
    Ok(req)
}
