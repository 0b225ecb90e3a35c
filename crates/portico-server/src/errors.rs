/* crates/portico-server/src/errors.rs */

use std::fmt;
use std::path::PathBuf;

/// Request-time error carried from view handlers to the HTTP layer.
/// Each code has a fixed default status and message; both can be overridden
/// per call site. `transient` marks infrastructure failures worth one retry.
#[derive(Debug, Clone)]
pub struct ViewError {
  code: String,
  message: String,
  status: u16,
  transient: bool,
}

fn default_status(code: &str) -> u16 {
  match code {
    "BAD_DATA_FORMAT" => 400,
    "INCORRECT_PARAMETERS" => 400,
    "UNAUTHORIZED" => 401,
    "INVALID_API_KEY" => 403,
    "CSRF_FAILURE" => 403,
    "UNKNOWN_ROUTE" => 404,
    "METHOD_NOT_ALLOWED" => 405,
    "INTERNAL_ERROR" => 500,
    "SERVICE_UNAVAILABLE" => 503,
    _ => 500,
  }
}

fn default_message(code: &str) -> &'static str {
  match code {
    "BAD_DATA_FORMAT" => "The request body could not be parsed",
    "INCORRECT_PARAMETERS" => "One or more request parameters are missing or invalid",
    "UNAUTHORIZED" => "Authentication is required for this resource",
    "INVALID_API_KEY" => "The provided API key is not valid",
    "CSRF_FAILURE" => "The request failed the cross-site request forgery check",
    "UNKNOWN_ROUTE" => "There is nothing registered at this location",
    "METHOD_NOT_ALLOWED" => "This method is not allowed for the requested route",
    "SERVICE_UNAVAILABLE" => "A backing service is currently unavailable",
    _ => "The server encountered an internal error",
  }
}

impl ViewError {
  pub fn new(code: impl Into<String>, message: impl Into<String>, status: u16) -> Self {
    Self { code: code.into(), message: message.into(), status, transient: false }
  }

  /// Build from a code alone, using its default status and message.
  pub fn with_code(code: impl Into<String>) -> Self {
    let code = code.into();
    let status = default_status(&code);
    let message = default_message(&code).to_string();
    Self { code, message, status, transient: false }
  }

  /// Build from a code with an overriding message.
  pub fn with_message(code: impl Into<String>, message: impl Into<String>) -> Self {
    let code = code.into();
    let status = default_status(&code);
    Self { code, message: message.into(), status, transient: false }
  }

  pub fn unknown_route() -> Self {
    Self::with_code("UNKNOWN_ROUTE")
  }

  pub fn method_not_allowed() -> Self {
    Self::with_code("METHOD_NOT_ALLOWED")
  }

  pub fn unauthorized() -> Self {
    Self::with_code("UNAUTHORIZED")
  }

  pub fn invalid_api_key() -> Self {
    Self::with_code("INVALID_API_KEY")
  }

  pub fn csrf_failure() -> Self {
    Self::with_code("CSRF_FAILURE")
  }

  pub fn bad_data_format(msg: impl Into<String>) -> Self {
    Self::with_message("BAD_DATA_FORMAT", msg)
  }

  pub fn incorrect_parameters(msg: impl Into<String>) -> Self {
    Self::with_message("INCORRECT_PARAMETERS", msg)
  }

  pub fn service_unavailable(msg: impl Into<String>) -> Self {
    Self::with_message("SERVICE_UNAVAILABLE", msg)
  }

  pub fn internal(msg: impl Into<String>) -> Self {
    Self::with_message("INTERNAL_ERROR", msg)
  }

  /// Mark this error as transient. The dispatch layer retries the handler
  /// exactly once when the first attempt fails with a transient error.
  pub fn transient(mut self) -> Self {
    self.transient = true;
    self
  }

  pub fn code(&self) -> &str {
    &self.code
  }

  pub fn message(&self) -> &str {
    &self.message
  }

  pub fn status(&self) -> u16 {
    self.status
  }

  pub fn is_transient(&self) -> bool {
    self.transient
  }
}

impl fmt::Display for ViewError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}: {}", self.code, self.message)
  }
}

impl std::error::Error for ViewError {}

/// Startup configuration error. Every variant is fatal: the process must not
/// begin serving with a partially registered routing table.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
  #[error("{kind} view `{name}` in `{module}` is missing required attribute `{attribute}`")]
  MissingAttribute { kind: &'static str, name: String, module: String, attribute: &'static str },

  #[error("invalid view declaration in `{module}`: {message}")]
  InvalidView { module: String, message: String },

  #[error("view module `{0}` sits outside any group directory")]
  ModuleOutsideGroup(PathBuf),

  #[error("failed to read `{path}`")]
  Io { path: PathBuf, source: std::io::Error },

  #[error("failed to parse `{path}`: {message}")]
  Parse { path: PathBuf, message: String },

  #[error("duplicate registration for path `{path}` on host `{host}`")]
  DuplicateRoute { host: String, path: String },

  #[error("duplicate view name `{0}`")]
  DuplicateName(String),

  #[error("handler `{handler}` required by `{view}` is not registered")]
  UnknownHandler { view: String, handler: String },

  #[error("redirect `{view}` points at unknown route name `{target}`")]
  UnknownRedirectTarget { view: String, target: String },

  #[error("capability `{capability}` required by `{view}` is not configured on the manager")]
  MissingCapability { view: String, capability: &'static str },

  #[error("secret_key must not be empty")]
  MissingSecret,

  #[error("default_host `{0}` does not match any registered host")]
  UnknownDefaultHost(String),
}
