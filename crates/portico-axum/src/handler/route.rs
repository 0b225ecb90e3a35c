/* crates/portico-axum/src/handler/route.rs */

// Route view dispatch: verb lookup, auth, CSRF, body parsing, parameter
// validation, handler invocation with one retry on transient failures, and
// JSON-or-HTML response shaping.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, Query, Request};
use axum::http::{HeaderMap, Method, header};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{MethodRouter, any};
use portico_server::{
  AuthPolicy, BoundRoute, UserIdentity, Verb, ViewError, ViewRequest, render, session,
  standard_context, validate_params,
};

use super::AppState;
use crate::error::AxumError;

/// Request bodies above this size are rejected before JSON parsing.
const BODY_LIMIT: usize = 1024 * 1024;

pub(crate) fn method_router(state: Arc<AppState>, route: Arc<BoundRoute>) -> MethodRouter {
  // Registered with `any` so an unsupported verb produces the framework's
  // own METHOD_NOT_ALLOWED error instead of a bare 405.
  any(
    move |Path(params): Path<HashMap<String, String>>,
          Query(query): Query<HashMap<String, String>>,
          req: Request| {
      let state = state.clone();
      let route = route.clone();
      async move {
        match dispatch(state, route, params, query, req).await {
          Ok(res) => res,
          Err(err) => AxumError::from(err).into_response(),
        }
      }
    },
  )
}

async fn dispatch(
  state: Arc<AppState>,
  route: Arc<BoundRoute>,
  path_params: HashMap<String, String>,
  query: HashMap<String, String>,
  req: Request,
) -> Result<Response, ViewError> {
  let verb = verb_of(req.method()).ok_or_else(ViewError::method_not_allowed)?;
  let handler =
    route.handlers.get(&verb).cloned().ok_or_else(ViewError::method_not_allowed)?;
  let headers = req.headers().clone();

  if route.auth == Some(AuthPolicy::ApiKey) {
    check_api_key(&state, &headers)?;
  }

  let session = session_payload(&state, &headers);
  let user = resolve_user(&state, session.as_deref()).await?;
  if route.auth == Some(AuthPolicy::Session) && user.is_none() {
    return Err(ViewError::unauthorized());
  }

  if route.csrf && verb.is_state_changing() {
    check_csrf(&state, &headers, session.as_deref())?;
  }

  let body = read_json_body(req).await?;
  let input = validate_params(&route.params, &path_params, &query, body.as_ref())?;

  let request = ViewRequest {
    verb,
    path_params,
    input,
    user: user.clone(),
    capabilities: route.capabilities.clone(),
  };
  let result = invoke(&route, &handler, request).await?;

  if let Some(template) = &route.template {
    let context = standard_context(
      &route.name,
      &route.group,
      user.as_ref(),
      state.debug,
      &state.statics,
      result,
    );
    Ok(Html(render(template, &context)).into_response())
  } else {
    Ok(axum::Json(result).into_response())
  }
}

/// Invoke the handler, retrying exactly once when the first failure is
/// flagged transient. A transient failure on the retry is returned as-is.
async fn invoke(
  route: &BoundRoute,
  handler: &portico_server::HandlerFn,
  request: ViewRequest,
) -> Result<serde_json::Value, ViewError> {
  match (handler)(request.clone()).await {
    Err(err) if err.is_transient() => {
      tracing::warn!(view = %route.name, error = %err, "transient failure, retrying once");
      (handler)(request).await
    }
    other => other,
  }
}

fn verb_of(method: &Method) -> Option<Verb> {
  match *method {
    // HEAD is served by the GET handler; axum strips the body.
    Method::GET | Method::HEAD => Some(Verb::Get),
    Method::POST => Some(Verb::Post),
    Method::PUT => Some(Verb::Put),
    Method::PATCH => Some(Verb::Patch),
    Method::DELETE => Some(Verb::Delete),
    _ => None,
  }
}

fn check_api_key(state: &AppState, headers: &HeaderMap) -> Result<(), ViewError> {
  let Some(configured) = state.api_key.as_deref() else {
    // initialize() rejects this wiring, so reaching here is a logic bug.
    return Err(ViewError::internal("api key auth requested but no key configured"));
  };
  match headers.get("x-api-key").and_then(|v| v.to_str().ok()) {
    None => Err(ViewError::unauthorized()),
    Some(provided) if provided != configured => Err(ViewError::invalid_api_key()),
    Some(_) => Ok(()),
  }
}

fn check_csrf(
  state: &AppState,
  headers: &HeaderMap,
  session: Option<&str>,
) -> Result<(), ViewError> {
  let Some(payload) = session else {
    return Err(ViewError::csrf_failure());
  };
  let expected = session::csrf_token(&state.secret, payload);
  let provided =
    headers.get(session::CSRF_HEADER).and_then(|v| v.to_str().ok()).unwrap_or_default();
  if provided == expected { Ok(()) } else { Err(ViewError::csrf_failure()) }
}

/// Extract and verify the session cookie, returning the signed payload.
/// Invalid or absent cookies are treated as anonymous, never as errors.
pub(crate) fn session_payload(state: &AppState, headers: &HeaderMap) -> Option<String> {
  let cookies = headers.get(header::COOKIE)?.to_str().ok()?;
  for pair in cookies.split(';') {
    let Some((name, value)) = pair.trim().split_once('=') else {
      continue;
    };
    if name == session::SESSION_COOKIE {
      return session::verify(&state.secret, value).map(str::to_string);
    }
  }
  None
}

pub(crate) async fn resolve_user(
  state: &AppState,
  session: Option<&str>,
) -> Result<Option<UserIdentity>, ViewError> {
  match (&state.collaborators.identity, session) {
    (Some(resolver), Some(payload)) => resolver.resolve(payload).await,
    _ => Ok(None),
  }
}

async fn read_json_body(req: Request) -> Result<Option<serde_json::Value>, ViewError> {
  let bytes = axum::body::to_bytes(req.into_body(), BODY_LIMIT)
    .await
    .map_err(|err| ViewError::bad_data_format(format!("unreadable request body: {err}")))?;
  if bytes.is_empty() {
    return Ok(None);
  }
  serde_json::from_slice(&bytes)
    .map(Some)
    .map_err(|err| ViewError::bad_data_format(format!("request body is not valid JSON: {err}")))
}
