/* crates/portico-axum/src/manager.rs */

// The manager owns startup: load configuration, discover and register the
// view tree, wire collaborators, and hand the resulting router to axum.
// Every configuration problem is fatal before the listener binds.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::Router;
use portico_server::{
  AuthPolicy, Collaborators, ConfigError, DatabaseHandle, HandlerRegistry, IdentityResolver,
  QueuePublisher, RoutingTable, StaticMap, discover, scan_static_root,
};
use serde::Deserialize;

use crate::handler::{self, AppState};

fn default_bind_addr() -> String {
  "127.0.0.1:8080".to_string()
}

fn default_static_base() -> String {
  "/static".to_string()
}

/// Deployment configuration, usually loaded from a TOML file.
#[derive(Debug, Clone, Deserialize)]
pub struct ManagerConfig {
  #[serde(default = "default_bind_addr")]
  pub bind_addr: String,
  /// Root of the view module tree; each subdirectory is a group.
  pub view_root: PathBuf,
  pub template_root: PathBuf,
  #[serde(default)]
  pub static_root: Option<PathBuf>,
  #[serde(default = "default_static_base")]
  pub static_base: String,
  /// HMAC key for session cookies and CSRF tokens. Must be non-empty.
  pub secret_key: String,
  #[serde(default)]
  pub api_key: Option<String>,
  #[serde(default)]
  pub debug: bool,
  /// Subdomain label to serve when the request's host matches no group.
  /// Unset means the unnamed (apex) host.
  #[serde(default)]
  pub default_host: Option<String>,
}

impl ManagerConfig {
  pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
    let raw = fs::read_to_string(path)
      .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
    toml::from_str(&raw)
      .map_err(|err| ConfigError::Parse { path: path.to_path_buf(), message: err.to_string() })
  }
}

/// Builder wiring configuration, handlers and collaborators together.
pub struct Manager {
  config: ManagerConfig,
  registry: HandlerRegistry,
  collaborators: Collaborators,
}

impl Manager {
  pub fn new(config: ManagerConfig) -> Self {
    Self { config, registry: HandlerRegistry::new(), collaborators: Collaborators::default() }
  }

  pub fn handlers(mut self, registry: HandlerRegistry) -> Self {
    self.registry = registry;
    self
  }

  pub fn database(mut self, database: Arc<dyn DatabaseHandle>) -> Self {
    self.collaborators.database = Some(database);
    self
  }

  pub fn queue(mut self, queue: Arc<dyn QueuePublisher>) -> Self {
    self.collaborators.queue = Some(queue);
    self
  }

  pub fn identity(mut self, identity: Arc<dyn IdentityResolver>) -> Self {
    self.collaborators.identity = Some(identity);
    self
  }

  /// Discover, validate and register the whole view tree. Returns the ready
  /// application or the first configuration error encountered.
  pub fn initialize(self) -> Result<App, ConfigError> {
    if self.config.secret_key.is_empty() {
      return Err(ConfigError::MissingSecret);
    }

    let groups = discover(&self.config.view_root)?;
    let statics = match &self.config.static_root {
      Some(root) => scan_static_root(root, &self.config.static_base)?,
      None => StaticMap::empty(self.config.static_base.clone()),
    };
    let table = RoutingTable::build(
      &groups,
      &self.registry,
      &self.collaborators,
      &self.config.template_root,
    )?;

    if let Some(label) = &self.config.default_host
      && !table.hosts().any(|host| host == label.as_str())
    {
      return Err(ConfigError::UnknownDefaultHost(label.clone()));
    }

    // api_key auth on a deployment with no key would reject every request;
    // treat the wiring itself as the error.
    for route in &table.routes {
      if route.auth == Some(AuthPolicy::ApiKey) && self.config.api_key.is_none() {
        return Err(ConfigError::InvalidView {
          module: route.name.clone(),
          message: "route requires api_key auth but no api_key is configured".to_string(),
        });
      }
    }

    tracing::info!(
      groups = groups.len(),
      views = table.view_count(),
      routes = table.routes.len(),
      pages = table.pages.len(),
      redirects = table.redirects.len(),
      sockets = table.sockets.len(),
      statics = statics.len(),
      "view registration complete"
    );

    let state = Arc::new(AppState {
      table,
      collaborators: self.collaborators,
      secret: self.config.secret_key,
      api_key: self.config.api_key,
      debug: self.config.debug,
      statics,
      static_root: self.config.static_root,
      default_host: self.config.default_host,
    });
    Ok(App { router: handler::build_router(state), bind_addr: self.config.bind_addr })
  }
}

/// A fully registered application, ready to serve or to drive in tests.
pub struct App {
  router: Router,
  bind_addr: String,
}

impl fmt::Debug for App {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("App").field("bind_addr", &self.bind_addr).finish_non_exhaustive()
  }
}

impl App {
  pub fn router(&self) -> Router {
    self.router.clone()
  }

  /// Consume the app, handing out the assembled router for in-process use.
  pub fn into_router(self) -> Router {
    self.router
  }

  pub async fn run(self) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(&self.bind_addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "portico serving");
    axum::serve(listener, self.router).await
  }
}
