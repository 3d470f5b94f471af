//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("not found: {0}")]
  NotFound(String),

  #[error("bad request: {0}")]
  BadRequest(String),

  #[error("conflict: {0}")]
  Conflict(String),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, message) = match &self {
      ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
      ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
      ApiError::Conflict(m) => (StatusCode::CONFLICT, m.clone()),
      ApiError::Store(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    };
    (status, Json(json!({ "error": message }))).into_response()
  }
}

impl From<vigil_engine::Error> for ApiError {
  fn from(e: vigil_engine::Error) -> Self {
    use vigil_engine::Error as E;

    match e {
      E::SubjectNotFound(id) => ApiError::NotFound(format!("subject {id} not found")),
      E::DeliveryNotFound(id) => ApiError::NotFound(format!("delivery {id} not found")),
      E::AlreadySent(id) => ApiError::Conflict(format!("delivery {id} was already sent")),
      E::Core(core) => {
        let message = core.to_string();
        match core {
          vigil_core::Error::PeriodOutOfBounds { .. } => ApiError::BadRequest(message),
          other => ApiError::Store(Box::new(other)),
        }
      }
      E::Store(inner) => ApiError::Store(inner),
    }
  }
}
