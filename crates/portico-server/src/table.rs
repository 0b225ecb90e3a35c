/* crates/portico-server/src/table.rs */

// Registration: consume discovered groups and build the process-wide routing
// table. Handler ids are bound against the registry, templates are loaded
// eagerly, named redirect targets are resolved, and error views are indexed
// per host. The table is built once at startup and immutable afterwards;
// descriptors are consumed here and discarded.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use crate::discovery::Group;
use crate::errors::ConfigError;
use crate::handler::{CapabilitySet, Collaborators, HandlerFn, HandlerRegistry, SocketHandlerFn};
use crate::view::{AuthPolicy, Condition, ParamSpec, Verb, ViewDef, hookable};

pub struct BoundRoute {
  pub host: String,
  pub path: String,
  /// Namespaced logical name, `group.name`.
  pub name: String,
  pub group: String,
  pub handlers: BTreeMap<Verb, HandlerFn>,
  pub params: BTreeMap<String, ParamSpec>,
  pub capabilities: CapabilitySet,
  pub auth: Option<AuthPolicy>,
  pub csrf: bool,
  /// Loaded template text when the route renders HTML instead of JSON.
  pub template: Option<String>,
}

pub struct BoundPage {
  pub host: String,
  pub path: String,
  pub name: String,
  pub group: String,
  pub template: String,
}

pub struct BoundRedirect {
  pub host: String,
  pub path: String,
  pub name: String,
  pub group: String,
  /// Final location: either the literal absolute target or the resolved
  /// path of the named route.
  pub location: String,
  pub status: u16,
}

pub struct BoundSocket {
  pub host: String,
  pub path: String,
  pub name: String,
  pub group: String,
  pub handler: SocketHandlerFn,
}

pub struct BoundError {
  pub name: String,
  pub group: String,
  pub template: Option<String>,
  pub handler: Option<HandlerFn>,
}

/// Per-host error dispatch table. The first registration for a status code
/// wins; later claims for the same code are ignored, which is deterministic
/// because discovery order is sorted.
#[derive(Default)]
pub struct ErrorTable {
  by_status: HashMap<u16, Arc<BoundError>>,
  csrf: Option<Arc<BoundError>>,
}

impl ErrorTable {
  pub fn for_status(&self, status: u16) -> Option<&Arc<BoundError>> {
    self.by_status.get(&status)
  }

  pub fn for_csrf(&self) -> Option<&Arc<BoundError>> {
    self.csrf.as_ref()
  }

  pub fn is_empty(&self) -> bool {
    self.by_status.is_empty() && self.csrf.is_none()
  }
}

pub struct RoutingTable {
  pub routes: Vec<Arc<BoundRoute>>,
  pub pages: Vec<Arc<BoundPage>>,
  pub redirects: Vec<Arc<BoundRedirect>>,
  pub sockets: Vec<Arc<BoundSocket>>,
  errors: HashMap<String, ErrorTable>,
  names: BTreeMap<String, (String, String)>,
  hosts: BTreeSet<String>,
}

// Bound handlers are opaque closures, so Debug summarizes the table shape.
impl fmt::Debug for RoutingTable {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("RoutingTable")
      .field("routes", &self.routes.len())
      .field("pages", &self.pages.len())
      .field("redirects", &self.redirects.len())
      .field("sockets", &self.sockets.len())
      .field("hosts", &self.hosts)
      .finish_non_exhaustive()
  }
}

struct PendingRedirect {
  host: String,
  path: String,
  name: String,
  group: String,
  target: String,
  status: u16,
}

impl RoutingTable {
  /// Build the table from discovered groups. Every failure here is fatal:
  /// the process must not serve with a partially registered table.
  pub fn build(
    groups: &[Group],
    registry: &HandlerRegistry,
    collaborators: &Collaborators,
    template_root: &Path,
  ) -> Result<Self, ConfigError> {
    let mut table = RoutingTable {
      routes: Vec::new(),
      pages: Vec::new(),
      redirects: Vec::new(),
      sockets: Vec::new(),
      errors: HashMap::new(),
      names: BTreeMap::new(),
      hosts: BTreeSet::new(),
    };
    table.hosts.insert(String::new());

    let mut claimed: HashSet<(String, String)> = HashSet::new();
    let mut all_names: HashSet<String> = HashSet::new();
    let mut pending_redirects: Vec<PendingRedirect> = Vec::new();

    for group in groups {
      for module in &group.modules {
        for view in &module.views {
          let name = format!("{}.{}", group.name, view.name());
          if !all_names.insert(name.clone()) {
            return Err(ConfigError::DuplicateName(name));
          }

          match view {
            ViewDef::Route(def) => {
              table.claim(&mut claimed, &group.host, &def.path)?;
              let mut handlers = BTreeMap::new();
              for (verb, id) in &def.handlers {
                let handler = registry.get(id).cloned().ok_or_else(|| {
                  ConfigError::UnknownHandler { view: name.clone(), handler: id.clone() }
                })?;
                handlers.insert(*verb, handler);
              }
              let template = match &def.template {
                Some(rel) => Some(load_template(template_root, rel)?),
                None => None,
              };
              let capabilities =
                CapabilitySet::resolve(&name, &def.capabilities, collaborators)?;
              table.bind_name(&name, &group.host, &def.path);
              table.routes.push(Arc::new(BoundRoute {
                host: group.host.clone(),
                path: def.path.clone(),
                name,
                group: group.name.clone(),
                handlers,
                params: def.params.clone(),
                capabilities,
                auth: def.auth,
                csrf: def.csrf,
                template,
              }));
            }

            ViewDef::Template(def) => {
              table.claim(&mut claimed, &group.host, &def.path)?;
              let template = load_template(template_root, &def.template)?;
              table.bind_name(&name, &group.host, &def.path);
              table.pages.push(Arc::new(BoundPage {
                host: group.host.clone(),
                path: def.path.clone(),
                name,
                group: group.name.clone(),
                template,
              }));
            }

            ViewDef::Redirect(def) => {
              table.claim(&mut claimed, &group.host, &def.path)?;
              table.bind_name(&name, &group.host, &def.path);
              pending_redirects.push(PendingRedirect {
                host: group.host.clone(),
                path: def.path.clone(),
                name,
                group: group.name.clone(),
                target: def.target.clone(),
                status: def.status,
              });
            }

            ViewDef::Websocket(def) => {
              table.claim(&mut claimed, &group.host, &def.path)?;
              let handler = registry.get_socket(&def.handler).cloned().ok_or_else(|| {
                ConfigError::UnknownHandler { view: name.clone(), handler: def.handler.clone() }
              })?;
              table.bind_name(&name, &group.host, &def.path);
              table.sockets.push(Arc::new(BoundSocket {
                host: group.host.clone(),
                path: def.path.clone(),
                name,
                group: group.name.clone(),
                handler,
              }));
            }

            ViewDef::Error(def) => {
              let handler = match &def.handler {
                Some(id) => Some(registry.get(id).cloned().ok_or_else(|| {
                  ConfigError::UnknownHandler { view: name.clone(), handler: id.clone() }
                })?),
                None => None,
              };
              let template = match &def.template {
                Some(rel) => Some(load_template(template_root, rel)?),
                None => None,
              };
              let bound = Arc::new(BoundError {
                name: name.clone(),
                group: group.name.clone(),
                template,
                handler,
              });
              table.hosts.insert(group.host.clone());
              let entry = table.errors.entry(group.host.clone()).or_default();
              if let Some(codes) = &def.status {
                for code in codes.iter() {
                  if !hookable(code) {
                    tracing::debug!(view = %name, code, "status code is not hookable, skipping");
                    continue;
                  }
                  entry.by_status.entry(code).or_insert_with(|| bound.clone());
                }
              }
              if def.condition == Some(Condition::CsrfFailure) && entry.csrf.is_none() {
                entry.csrf = Some(bound.clone());
              }
            }
          }
        }
      }
    }

    for pending in pending_redirects {
      let location = if pending.target.contains("://") {
        pending.target
      } else {
        match table.names.get(&pending.target) {
          Some((_host, path)) => path.clone(),
          None => {
            return Err(ConfigError::UnknownRedirectTarget {
              view: pending.name,
              target: pending.target,
            });
          }
        }
      };
      table.redirects.push(Arc::new(BoundRedirect {
        host: pending.host,
        path: pending.path,
        name: pending.name,
        group: pending.group,
        location,
        status: pending.status,
      }));
    }

    Ok(table)
  }

  fn claim(
    &mut self,
    claimed: &mut HashSet<(String, String)>,
    host: &str,
    path: &str,
  ) -> Result<(), ConfigError> {
    if !claimed.insert((host.to_string(), path.to_string())) {
      return Err(ConfigError::DuplicateRoute { host: host.to_string(), path: path.to_string() });
    }
    self.hosts.insert(host.to_string());
    Ok(())
  }

  fn bind_name(&mut self, name: &str, host: &str, path: &str) {
    self.names.insert(name.to_string(), (host.to_string(), path.to_string()));
  }

  /// Look up a namespaced logical name, returning `(host, path)`.
  pub fn lookup_name(&self, name: &str) -> Option<(&str, &str)> {
    self.names.get(name).map(|(host, path)| (host.as_str(), path.as_str()))
  }

  pub fn error_table(&self, host: &str) -> Option<&ErrorTable> {
    self.errors.get(host)
  }

  pub fn hosts(&self) -> impl Iterator<Item = &str> {
    self.hosts.iter().map(String::as_str)
  }

  pub fn view_count(&self) -> usize {
    self.routes.len() + self.pages.len() + self.redirects.len() + self.sockets.len()
  }
}

fn load_template(root: &Path, rel: &str) -> Result<String, ConfigError> {
  let path = root.join(rel);
  fs::read_to_string(&path).map_err(|source| ConfigError::Io { path, source })
}
