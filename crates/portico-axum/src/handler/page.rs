/* crates/portico-axum/src/handler/page.rs */

// Template pages and redirects. Pages are GET-only and render their eagerly
// loaded template with the standard context; redirects reply with the status
// and location resolved at registration time.

use std::sync::Arc;

use axum::extract::Request;
use axum::http::{StatusCode, header};
use axum::response::{Html, IntoResponse};
use axum::routing::{MethodRouter, get};
use portico_server::{BoundPage, BoundRedirect, standard_context};

use super::AppState;
use super::route::{resolve_user, session_payload};
use crate::error::AxumError;

pub(crate) fn page_method_router(state: Arc<AppState>, page: Arc<BoundPage>) -> MethodRouter {
  get(move |req: Request| {
    let state = state.clone();
    let page = page.clone();
    async move {
      let session = session_payload(&state, req.headers());
      let user = match resolve_user(&state, session.as_deref()).await {
        Ok(user) => user,
        Err(err) => return AxumError::from(err).into_response(),
      };
      let context = standard_context(
        &page.name,
        &page.group,
        user.as_ref(),
        state.debug,
        &state.statics,
        serde_json::json!({}),
      );
      Html(portico_server::render(&page.template, &context)).into_response()
    }
  })
}

pub(crate) fn redirect_method_router(redirect: Arc<BoundRedirect>) -> MethodRouter {
  get(move || {
    let redirect = redirect.clone();
    async move {
      let status =
        StatusCode::from_u16(redirect.status).unwrap_or(StatusCode::SEE_OTHER);
      (status, [(header::LOCATION, redirect.location.clone())]).into_response()
    }
  })
}
