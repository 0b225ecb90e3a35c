/* crates/portico-axum/src/handler/mod.rs */

// Router assembly. Each host label gets its own axum router built from the
// routing table; a dispatcher at the top picks the router from the request's
// `Host` header and falls back to the apex router for unknown labels.

pub(crate) mod errors;
pub(crate) mod page;
pub(crate) mod route;
pub(crate) mod socket;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::Request;
use axum::http::header;
use axum::middleware::{self, Next};
use axum::response::Response;
use portico_server::{Collaborators, RoutingTable, StaticMap};
use tower::util::ServiceExt;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::services::ServeDir;

use self::errors::HostCtx;

/// Everything the request path needs, built once by the manager.
pub(crate) struct AppState {
  pub table: RoutingTable,
  pub collaborators: Collaborators,
  pub secret: String,
  pub api_key: Option<String>,
  pub debug: bool,
  pub statics: StaticMap,
  pub static_root: Option<PathBuf>,
  /// Host label served to requests whose label matches no router. `None`
  /// means the unnamed (apex) host.
  pub default_host: Option<String>,
}

pub(crate) fn build_router(state: Arc<AppState>) -> Router {
  let mut routers: HashMap<String, Router> = HashMap::new();
  for host in state.table.hosts() {
    routers.insert(host.to_string(), host_router(&state, host));
  }
  // Unknown labels fall through to the configured default host, or to the
  // unnamed (apex) router.
  let apex = match &state.default_host {
    Some(label) => routers.get(label.as_str()).cloned().unwrap_or_default(),
    None => routers.remove("").unwrap_or_default(),
  };
  let routers = Arc::new(routers);

  let dispatch = move |req: Request| {
    let routers = routers.clone();
    let apex = apex.clone();
    async move {
      let label = host_label(
        req.headers().get(header::HOST).and_then(|v| v.to_str().ok()).unwrap_or_default(),
      );
      let router = routers.get(label).cloned().unwrap_or(apex);
      match router.oneshot(req).await {
        Ok(res) => res,
        Err(err) => match err {},
      }
    }
  };

  Router::new().fallback(dispatch).layer(middleware::from_fn(log_requests))
}

fn host_router(state: &Arc<AppState>, host: &str) -> Router {
  let mut router = Router::new();
  for bound in state.table.routes.iter().filter(|r| r.host == host) {
    router = router.route(&bound.path, route::method_router(state.clone(), bound.clone()));
  }
  for bound in state.table.pages.iter().filter(|p| p.host == host) {
    router = router.route(&bound.path, page::page_method_router(state.clone(), bound.clone()));
  }
  for bound in state.table.redirects.iter().filter(|r| r.host == host) {
    router = router.route(&bound.path, page::redirect_method_router(bound.clone()));
  }
  for bound in state.table.sockets.iter().filter(|s| s.host == host) {
    router = router.route(&bound.path, socket::socket_method_router(bound.clone()));
  }
  if let Some(static_root) = &state.static_root {
    router = router.nest_service(state.statics.base(), ServeDir::new(static_root));
  }
  router = router.fallback(errors::unknown_route);

  let ctx = HostCtx { state: state.clone(), host: host.to_string() };
  router
    .layer(CatchPanicLayer::custom(errors::panic_response))
    .layer(middleware::from_fn_with_state(ctx, errors::error_pages))
}

/// First DNS label of the `Host` header, port stripped. `api.example.com`
/// and `api.localhost:8080` both map to `api`.
fn host_label(host: &str) -> &str {
  let host = host.split(':').next().unwrap_or(host);
  host.split('.').next().unwrap_or(host)
}

async fn log_requests(req: Request, next: Next) -> Response {
  let method = req.method().clone();
  let path = req.uri().path().to_string();
  let started = Instant::now();
  let res = next.run(req).await;
  let elapsed = started.elapsed();
  tracing::info!(%method, path, status = res.status().as_u16(), ?elapsed, "request");
  res
}
