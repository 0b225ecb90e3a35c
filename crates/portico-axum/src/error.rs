/* crates/portico-axum/src/error.rs */

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use portico_server::ViewError;

/// Marks a response as framework-generated so the error-page layer knows it
/// may re-render it through the host's error table.
#[derive(Debug, Clone)]
pub(crate) struct ErrorMarker {
  pub code: String,
  pub message: String,
}

/// Newtype wrapper to implement `IntoResponse` for `ViewError`.
/// Required because Rust's orphan rule prevents `impl IntoResponse for
/// ViewError` when both types are foreign to this crate.
pub(crate) struct AxumError(pub ViewError);

impl IntoResponse for AxumError {
  fn into_response(self) -> Response {
    let err = self.0;
    let status = StatusCode::from_u16(err.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = serde_json::json!({
      "error_code": err.code(),
      "error_message": err.message(),
    });
    let mut res = (status, axum::Json(body)).into_response();
    res.extensions_mut().insert(ErrorMarker {
      code: err.code().to_string(),
      message: err.message().to_string(),
    });
    res
  }
}

impl From<ViewError> for AxumError {
  fn from(err: ViewError) -> Self {
    Self(err)
  }
}
