/* crates/portico-axum/src/handler/errors.rs */

// The error-page layer. Framework-generated error responses (marked with an
// `ErrorMarker` extension, plus bare 404/405 from axum itself) are re-rendered
// through the host's error table: template views become HTML with the
// original status, handler views become JSON, and hosts without a matching
// entry keep the structured default body.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{Html, IntoResponse, Response};
use portico_server::{BoundError, Verb, ViewError, ViewRequest, render, standard_context};

use super::AppState;
use super::route::{resolve_user, session_payload};
use crate::error::{AxumError, ErrorMarker};

#[derive(Clone)]
pub(crate) struct HostCtx {
  pub state: Arc<AppState>,
  pub host: String,
}

/// Fallback for paths no view claimed.
pub(crate) async fn unknown_route() -> Response {
  AxumError::from(ViewError::unknown_route()).into_response()
}

pub(crate) async fn error_pages(
  State(ctx): State<HostCtx>,
  req: Request,
  next: Next,
) -> Response {
  let headers = req.headers().clone();
  let res = next.run(req).await;
  let status = res.status().as_u16();
  let marker = res.extensions().get::<ErrorMarker>().cloned();

  // Only framework-origin errors are hooked; handler-produced bodies and
  // static-file responses pass through untouched. Bare 404/405 come from
  // axum itself (method routers, ServeDir) and count as framework-origin.
  let framework_origin = marker.is_some() || status == 404 || status == 405;
  if status < 400 || !framework_origin {
    return res;
  }

  let bare = marker.is_none();
  let (code, message) = match marker {
    Some(marker) => (marker.code, marker.message),
    None if status == 404 => describe(ViewError::unknown_route()),
    None => describe(ViewError::method_not_allowed()),
  };

  let bound = ctx.state.table.error_table(&ctx.host).and_then(|errors| {
    if code == "CSRF_FAILURE" {
      errors.for_csrf().or_else(|| errors.for_status(status))
    } else {
      errors.for_status(status)
    }
  });
  match bound {
    Some(bound) => render_error(&ctx.state, bound, &headers, status, &code, &message).await,
    // Bare axum 404/405 get the structured default body; marked responses
    // already carry it.
    None if bare && status == 404 => {
      AxumError::from(ViewError::unknown_route()).into_response()
    }
    None if bare => AxumError::from(ViewError::method_not_allowed()).into_response(),
    None => res,
  }
}

fn describe(err: ViewError) -> (String, String) {
  (err.code().to_string(), err.message().to_string())
}

async fn render_error(
  state: &AppState,
  bound: &Arc<BoundError>,
  headers: &HeaderMap,
  status: u16,
  code: &str,
  message: &str,
) -> Response {
  let status_code = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
  let detail = serde_json::json!({
    "status": status,
    "error_code": code,
    "error_message": message,
  });

  if let Some(template) = &bound.template {
    // Error pages keep the viewer's session context. A resolver failure
    // while already rendering an error falls back to anonymous.
    let session = session_payload(state, headers);
    let user = resolve_user(state, session.as_deref()).await.unwrap_or_default();
    let context = standard_context(
      &bound.name,
      &bound.group,
      user.as_ref(),
      state.debug,
      &state.statics,
      detail,
    );
    return (status_code, Html(render(template, &context))).into_response();
  }

  if let Some(handler) = &bound.handler {
    let mut request = ViewRequest::bare(Verb::Get);
    request.input = detail;
    return match (handler)(request).await {
      Ok(value) => (status_code, axum::Json(value)).into_response(),
      Err(err) => {
        tracing::error!(view = %bound.name, error = %err, "error view handler failed");
        AxumError::from(err).into_response()
      }
    };
  }

  (status_code, axum::Json(detail)).into_response()
}

/// Normalizes panics escaping a handler into the framework's own 500 so the
/// error-page layer can still dress them up.
pub(crate) fn panic_response(panic: Box<dyn std::any::Any + Send + 'static>) -> Response {
  let detail = panic
    .downcast_ref::<&str>()
    .map(|s| (*s).to_string())
    .or_else(|| panic.downcast_ref::<String>().cloned())
    .unwrap_or_else(|| "unknown panic".to_string());
  tracing::error!(%detail, "handler panicked");
  AxumError::from(ViewError::internal("internal server error")).into_response()
}
