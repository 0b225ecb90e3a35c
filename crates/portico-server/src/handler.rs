/* crates/portico-server/src/handler.rs */

// Handlers and capabilities. Views reference handlers by id; the registry is
// the explicit substitute for discovering callables by reflection. Capability
// handles are injected at registration time in the order the view declares
// them, so a missing collaborator fails startup instead of surfacing as a
// null reference at first use.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures_core::Stream;
use serde::{Deserialize, Serialize};

use crate::errors::{ConfigError, ViewError};
use crate::view::{Capability, Verb};

pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

pub type BoxStream<T> = Pin<Box<dyn Stream<Item = T> + Send>>;

pub type HandlerFn =
  Arc<dyn Fn(ViewRequest) -> BoxFuture<Result<serde_json::Value, ViewError>> + Send + Sync>;

pub type SocketHandlerFn = Arc<
  dyn Fn(
      ViewRequest,
    ) -> BoxFuture<Result<BoxStream<Result<serde_json::Value, ViewError>>, ViewError>>
    + Send
    + Sync,
>;

/// The authenticated user a session resolves to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserIdentity {
  pub id: String,
  pub username: String,
  #[serde(default)]
  pub roles: Vec<String>,
}

/// Document-store access, owned by the manager and injected into views that
/// declare the `database` capability.
pub trait DatabaseHandle: Send + Sync {
  fn execute(
    &self,
    query: &str,
    params: serde_json::Value,
  ) -> BoxFuture<Result<serde_json::Value, ViewError>>;
}

/// Outbound event publishing (bot notifications and similar).
pub trait QueuePublisher: Send + Sync {
  fn publish(
    &self,
    routing_key: &str,
    payload: serde_json::Value,
  ) -> BoxFuture<Result<(), ViewError>>;
}

/// Session token -> user lookup.
pub trait IdentityResolver: Send + Sync {
  fn resolve(&self, token: &str) -> BoxFuture<Result<Option<UserIdentity>, ViewError>>;
}

/// The manager-owned singletons capabilities resolve against.
#[derive(Clone, Default)]
pub struct Collaborators {
  pub database: Option<Arc<dyn DatabaseHandle>>,
  pub queue: Option<Arc<dyn QueuePublisher>>,
  pub identity: Option<Arc<dyn IdentityResolver>>,
}

/// The subset of collaborators a single view declared. Handles are cloned in
/// at registration; accessing an undeclared capability is a programmer error
/// reported as a structured internal error rather than a crash.
#[derive(Clone, Default)]
pub struct CapabilitySet {
  database: Option<Arc<dyn DatabaseHandle>>,
  queue: Option<Arc<dyn QueuePublisher>>,
  identity: Option<Arc<dyn IdentityResolver>>,
}

impl CapabilitySet {
  /// Resolve a view's ordered capability list against the configured
  /// collaborators. A declared capability with no collaborator is fatal.
  pub fn resolve(
    view: &str,
    declared: &[Capability],
    collaborators: &Collaborators,
  ) -> Result<Self, ConfigError> {
    let mut set = Self::default();
    for capability in declared {
      let missing = || ConfigError::MissingCapability {
        view: view.to_string(),
        capability: capability.as_str(),
      };
      match capability {
        Capability::Database => {
          set.database = Some(collaborators.database.clone().ok_or_else(missing)?);
        }
        Capability::Queue => {
          set.queue = Some(collaborators.queue.clone().ok_or_else(missing)?);
        }
        Capability::Identity => {
          set.identity = Some(collaborators.identity.clone().ok_or_else(missing)?);
        }
      }
    }
    Ok(set)
  }

  pub fn database(&self) -> Result<&Arc<dyn DatabaseHandle>, ViewError> {
    self.database.as_ref().ok_or_else(|| undeclared(Capability::Database))
  }

  pub fn queue(&self) -> Result<&Arc<dyn QueuePublisher>, ViewError> {
    self.queue.as_ref().ok_or_else(|| undeclared(Capability::Queue))
  }

  pub fn identity(&self) -> Result<&Arc<dyn IdentityResolver>, ViewError> {
    self.identity.as_ref().ok_or_else(|| undeclared(Capability::Identity))
  }
}

// The handles are opaque trait objects; Debug reports which are present.
impl fmt::Debug for CapabilitySet {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CapabilitySet")
      .field("database", &self.database.is_some())
      .field("queue", &self.queue.is_some())
      .field("identity", &self.identity.is_some())
      .finish()
  }
}

fn undeclared(capability: Capability) -> ViewError {
  ViewError::internal(format!("view did not declare the `{}` capability", capability.as_str()))
}

/// Everything a handler gets for one request.
#[derive(Clone)]
pub struct ViewRequest {
  pub verb: Verb,
  pub path_params: HashMap<String, String>,
  /// Validated, coerced parameters merged from path, query and body.
  pub input: serde_json::Value,
  pub user: Option<UserIdentity>,
  pub capabilities: CapabilitySet,
}

impl ViewRequest {
  pub fn bare(verb: Verb) -> Self {
    Self {
      verb,
      path_params: HashMap::new(),
      input: serde_json::Value::Object(serde_json::Map::new()),
      user: None,
      capabilities: CapabilitySet::default(),
    }
  }
}

/// Handler ids -> callables. Populated in code before startup; view modules
/// reference entries by id, and an unknown id aborts registration.
#[derive(Default)]
pub struct HandlerRegistry {
  handlers: BTreeMap<String, HandlerFn>,
  sockets: BTreeMap<String, SocketHandlerFn>,
}

impl HandlerRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn handler<F, Fut>(mut self, id: impl Into<String>, f: F) -> Self
  where
    F: Fn(ViewRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<serde_json::Value, ViewError>> + Send + 'static,
  {
    self.handlers.insert(id.into(), Arc::new(move |req| Box::pin(f(req))));
    self
  }

  pub fn socket<F, Fut>(mut self, id: impl Into<String>, f: F) -> Self
  where
    F: Fn(ViewRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<BoxStream<Result<serde_json::Value, ViewError>>, ViewError>>
      + Send
      + 'static,
  {
    self.sockets.insert(id.into(), Arc::new(move |req| Box::pin(f(req))));
    self
  }

  pub fn get(&self, id: &str) -> Option<&HandlerFn> {
    self.handlers.get(id)
  }

  pub fn get_socket(&self, id: &str) -> Option<&SocketHandlerFn> {
    self.sockets.get(id)
  }

  pub fn len(&self) -> usize {
    self.handlers.len() + self.sockets.len()
  }

  pub fn is_empty(&self) -> bool {
    self.handlers.is_empty() && self.sockets.is_empty()
  }
}
