/* crates/portico-server/src/lib.rs */

//! Framework-agnostic core for Portico, a descriptor-driven web framework
//! for multi-subdomain community sites. A directory tree of declarative view
//! modules is discovered at startup, validated, and registered into an
//! immutable routing table; an adapter crate turns that table into a live
//! HTTP router.

pub mod discovery;
pub mod errors;
pub mod handler;
pub mod params;
pub mod render;
pub mod session;
pub mod statics;
pub mod table;
pub mod view;

// Re-exports for ergonomic use
pub use discovery::{DiscoveredModule, Group, discover};
pub use errors::{ConfigError, ViewError};
pub use handler::{
  BoxFuture, BoxStream, CapabilitySet, Collaborators, DatabaseHandle, HandlerFn, HandlerRegistry,
  IdentityResolver, QueuePublisher, SocketHandlerFn, UserIdentity, ViewRequest,
};
pub use params::validate_params;
pub use render::{render, standard_context};
pub use statics::{StaticMap, scan_static_root};
pub use table::{
  BoundError, BoundPage, BoundRedirect, BoundRoute, BoundSocket, ErrorTable, RoutingTable,
};
pub use view::{
  AuthPolicy, Capability, Condition, ErrorDef, ParamKind, ParamSource, ParamSpec, RedirectDef,
  RouteDef, StatusCodes, TemplateDef, Verb, ViewDef, ViewModule, WebsocketDef, hookable,
};
