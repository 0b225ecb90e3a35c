/* crates/portico-server/src/view.rs */

// Static view descriptors. A view module is a TOML file exporting a list of
// tagged descriptors; discovery collects them and registration turns them
// into routing table entries. There is no runtime reflection anywhere.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::errors::ConfigError;

/// HTTP verbs a route view may implement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verb {
  Get,
  Post,
  Put,
  Patch,
  Delete,
}

impl Verb {
  pub fn as_str(self) -> &'static str {
    match self {
      Verb::Get => "GET",
      Verb::Post => "POST",
      Verb::Put => "PUT",
      Verb::Patch => "PATCH",
      Verb::Delete => "DELETE",
    }
  }

  /// Verbs that may change server state and therefore require a CSRF token
  /// on views that opt into the check.
  pub fn is_state_changing(self) -> bool {
    !matches!(self, Verb::Get)
  }
}

/// Shared resources a view may declare a dependence on, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
  Database,
  Queue,
  Identity,
}

impl Capability {
  pub fn as_str(self) -> &'static str {
    match self {
      Capability::Database => "database",
      Capability::Queue => "queue",
      Capability::Identity => "identity",
    }
  }
}

/// Authentication policy for a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthPolicy {
  /// The `x-api-key` header must match the manager's configured key.
  ApiKey,
  /// A valid signed session resolving to a known user is required.
  Session,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
  #[default]
  String,
  Int,
  Bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamSource {
  Path,
  #[default]
  Query,
  Body,
}

/// Declared shape of one request parameter.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct ParamSpec {
  #[serde(default)]
  pub kind: ParamKind,
  #[serde(default)]
  pub required: bool,
  #[serde(default)]
  pub source: ParamSource,
}

/// Status codes an error view claims: an explicit list or a half-open range.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum StatusCodes {
  List(Vec<u16>),
  Range { start: u16, end: u16 },
}

impl StatusCodes {
  pub fn iter(&self) -> Box<dyn Iterator<Item = u16> + '_> {
    match self {
      StatusCodes::List(codes) => Box::new(codes.iter().copied()),
      StatusCodes::Range { start, end } => Box::new(*start..*end),
    }
  }

  pub fn is_empty(&self) -> bool {
    match self {
      StatusCodes::List(codes) => codes.is_empty(),
      StatusCodes::Range { start, end } => start >= end,
    }
  }
}

/// Window of status codes the HTTP layer accepts error hooks for. Codes
/// outside it are skipped at registration rather than aborting startup.
pub fn hookable(code: u16) -> bool {
  (400..=599).contains(&code)
}

/// Check a view path against the router's syntax: a leading `/` and
/// balanced, non-empty `{capture}` segments. Returns the problem, if any,
/// so misconfiguration fails validation instead of panicking at router
/// registration.
fn path_problem(path: &str) -> Option<&'static str> {
  if !path.starts_with('/') {
    return Some("must start with `/`");
  }
  let mut in_capture = false;
  let mut capture_len = 0;
  for ch in path.chars() {
    match ch {
      '{' if in_capture => return Some("captures cannot nest"),
      '{' => {
        in_capture = true;
        capture_len = 0;
      }
      '}' if !in_capture => return Some("has a `}` without a matching `{`"),
      '}' if capture_len == 0 => return Some("has an empty `{}` capture"),
      '}' => in_capture = false,
      _ if in_capture => capture_len += 1,
      _ => {}
    }
  }
  if in_capture { Some("has an unclosed `{` capture") } else { None }
}

/// Symbolic failure conditions an error view may claim instead of a status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
  CsrfFailure,
}

fn default_redirect_status() -> u16 {
  303
}

/// A URL-bound view with one handler per verb.
#[derive(Debug, Clone, Deserialize)]
pub struct RouteDef {
  #[serde(default)]
  pub name: String,
  #[serde(default)]
  pub path: String,
  /// Verb -> registered handler id.
  #[serde(default)]
  pub handlers: BTreeMap<Verb, String>,
  /// Render the handler's output through this template instead of as JSON.
  #[serde(default)]
  pub template: Option<String>,
  #[serde(default)]
  pub params: BTreeMap<String, ParamSpec>,
  /// Ordered capability list, resolved against the manager at registration.
  #[serde(default)]
  pub capabilities: Vec<Capability>,
  #[serde(default)]
  pub auth: Option<AuthPolicy>,
  #[serde(default)]
  pub csrf: bool,
}

/// A GET-only page that renders a template with the standard context.
#[derive(Debug, Clone, Deserialize)]
pub struct TemplateDef {
  #[serde(default)]
  pub name: String,
  #[serde(default)]
  pub path: String,
  #[serde(default)]
  pub template: String,
}

/// A GET-only view that short-circuits to another location. A target with a
/// scheme separator is absolute; anything else is a namespaced route name.
#[derive(Debug, Clone, Deserialize)]
pub struct RedirectDef {
  #[serde(default)]
  pub name: String,
  #[serde(default)]
  pub path: String,
  #[serde(default)]
  pub target: String,
  #[serde(default = "default_redirect_status")]
  pub status: u16,
}

/// A handler for one or more error status codes, or a symbolic condition.
/// Presentation: `template` renders an HTML page, `handler` produces JSON,
/// neither falls back to the plain structured error body.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorDef {
  #[serde(default)]
  pub name: String,
  #[serde(default)]
  pub status: Option<StatusCodes>,
  #[serde(default)]
  pub condition: Option<Condition>,
  #[serde(default)]
  pub template: Option<String>,
  #[serde(default)]
  pub handler: Option<String>,
}

/// A GET-upgrade websocket bound to a stream-producing handler.
#[derive(Debug, Clone, Deserialize)]
pub struct WebsocketDef {
  #[serde(default)]
  pub name: String,
  #[serde(default)]
  pub path: String,
  #[serde(default)]
  pub handler: String,
}

/// One descriptor as it appears in a view module file.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ViewDef {
  Route(RouteDef),
  Template(TemplateDef),
  Redirect(RedirectDef),
  Error(ErrorDef),
  Websocket(WebsocketDef),
}

/// The parsed shape of a view module file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ViewModule {
  #[serde(default)]
  pub views: Vec<ViewDef>,
}

impl ViewDef {
  pub fn kind(&self) -> &'static str {
    match self {
      ViewDef::Route(_) => "route",
      ViewDef::Template(_) => "template",
      ViewDef::Redirect(_) => "redirect",
      ViewDef::Error(_) => "error",
      ViewDef::Websocket(_) => "websocket",
    }
  }

  pub fn name(&self) -> &str {
    match self {
      ViewDef::Route(v) => &v.name,
      ViewDef::Template(v) => &v.name,
      ViewDef::Redirect(v) => &v.name,
      ViewDef::Error(v) => &v.name,
      ViewDef::Websocket(v) => &v.name,
    }
  }

  /// Check the required attributes for this descriptor kind. Any violation
  /// is a hard startup failure; the process must not serve misconfigured.
  pub fn validate(&self, module: &str) -> Result<(), ConfigError> {
    let missing = |attribute: &'static str| ConfigError::MissingAttribute {
      kind: self.kind(),
      name: self.name().to_string(),
      module: module.to_string(),
      attribute,
    };

    if self.name().is_empty() {
      return Err(missing("name"));
    }

    let bad_path = |name: &str, problem: &'static str| ConfigError::InvalidView {
      module: module.to_string(),
      message: format!("path of view `{name}` {problem}"),
    };

    match self {
      ViewDef::Route(v) => {
        if v.path.is_empty() {
          return Err(missing("path"));
        }
        if let Some(problem) = path_problem(&v.path) {
          return Err(bad_path(&v.name, problem));
        }
        if v.handlers.is_empty() {
          return Err(missing("handlers"));
        }
      }
      ViewDef::Template(v) => {
        if v.path.is_empty() {
          return Err(missing("path"));
        }
        if let Some(problem) = path_problem(&v.path) {
          return Err(bad_path(&v.name, problem));
        }
        if v.template.is_empty() {
          return Err(missing("template"));
        }
      }
      ViewDef::Redirect(v) => {
        if v.path.is_empty() {
          return Err(missing("path"));
        }
        if let Some(problem) = path_problem(&v.path) {
          return Err(bad_path(&v.name, problem));
        }
        if v.target.is_empty() {
          return Err(missing("target"));
        }
        if !(300..=399).contains(&v.status) {
          return Err(ConfigError::InvalidView {
            module: module.to_string(),
            message: format!("redirect `{}` declares non-redirect status {}", v.name, v.status),
          });
        }
      }
      ViewDef::Error(v) => match (&v.status, v.condition) {
        (None, None) => return Err(missing("status")),
        (Some(codes), None) if codes.is_empty() => return Err(missing("status")),
        (Some(_), Some(_)) => {
          return Err(ConfigError::InvalidView {
            module: module.to_string(),
            message: format!("error view `{}` declares both status codes and a condition", v.name),
          });
        }
        _ => {}
      },
      ViewDef::Websocket(v) => {
        if v.path.is_empty() {
          return Err(missing("path"));
        }
        if let Some(problem) = path_problem(&v.path) {
          return Err(bad_path(&v.name, problem));
        }
        if v.handler.is_empty() {
          return Err(missing("handler"));
        }
      }
    }

    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn parse(src: &str) -> ViewModule {
    toml::from_str(src).expect("module parses")
  }

  #[test]
  fn parse_route_module() {
    let module = parse(
      r#"
      [[views]]
      kind = "route"
      name = "tag"
      path = "/bot/tags/{name}"
      capabilities = ["database"]
      auth = "api_key"

      [views.handlers]
      get = "bot.tags.get"
      post = "bot.tags.post"

      [views.params.name]
      kind = "string"
      required = true
      source = "path"
      "#,
    );
    assert_eq!(module.views.len(), 1);
    let ViewDef::Route(route) = &module.views[0] else { panic!("expected route") };
    assert_eq!(route.name, "tag");
    assert_eq!(route.handlers.len(), 2);
    assert_eq!(route.handlers[&Verb::Get], "bot.tags.get");
    assert_eq!(route.capabilities, vec![Capability::Database]);
    assert_eq!(route.auth, Some(AuthPolicy::ApiKey));
    assert!(route.params["name"].required);
    assert_eq!(route.params["name"].source, ParamSource::Path);
  }

  #[test]
  fn parse_template_and_redirect() {
    let module = parse(
      r#"
      [[views]]
      kind = "template"
      name = "about"
      path = "/about"
      template = "main/about.html"

      [[views]]
      kind = "redirect"
      name = "docs"
      path = "/docs"
      target = "https://docs.example.com/"
      "#,
    );
    assert_eq!(module.views.len(), 2);
    let ViewDef::Redirect(redirect) = &module.views[1] else { panic!("expected redirect") };
    assert_eq!(redirect.status, 303);
  }

  #[test]
  fn parse_error_views() {
    let module = parse(
      r#"
      [[views]]
      kind = "error"
      name = "not_found"
      status = [404]
      template = "errors/404.html"

      [[views]]
      kind = "error"
      name = "server_error"
      status = { start = 500, end = 600 }

      [[views]]
      kind = "error"
      name = "csrf"
      condition = "csrf_failure"
      "#,
    );
    let ViewDef::Error(range) = &module.views[1] else { panic!("expected error") };
    let codes: Vec<u16> = range.status.as_ref().expect("status").iter().collect();
    assert_eq!(codes.first(), Some(&500));
    assert_eq!(codes.last(), Some(&599));
    let ViewDef::Error(csrf) = &module.views[2] else { panic!("expected error") };
    assert_eq!(csrf.condition, Some(Condition::CsrfFailure));
  }

  #[test]
  fn validate_missing_name() {
    let module = parse(
      r#"
      [[views]]
      kind = "template"
      path = "/"
      template = "index.html"
      "#,
    );
    let err = module.views[0].validate("main/index.toml").expect_err("must fail");
    assert!(err.to_string().contains("`name`"));
  }

  #[test]
  fn validate_route_missing_path_and_handlers() {
    let module = parse(
      r#"
      [[views]]
      kind = "route"
      name = "tags"
      "#,
    );
    let err = module.views[0].validate("bot/tags.toml").expect_err("must fail");
    assert!(err.to_string().contains("`path`"));

    let module = parse(
      r#"
      [[views]]
      kind = "route"
      name = "tags"
      path = "/tags"
      "#,
    );
    let err = module.views[0].validate("bot/tags.toml").expect_err("must fail");
    assert!(err.to_string().contains("`handlers`"));
  }

  #[test]
  fn validate_path_requires_leading_slash() {
    let module = parse(
      r#"
      [[views]]
      kind = "route"
      name = "tags"
      path = "tags"
      handlers = { get = "bot.tags.get" }
      "#,
    );
    let err = module.views[0].validate("bot/tags.toml").expect_err("must fail");
    assert!(err.to_string().contains("must start with `/`"));
  }

  #[test]
  fn validate_path_capture_syntax() {
    for (path, problem) in [
      ("/tags/{name", "unclosed"),
      ("/tags/{}", "empty"),
      ("/tags/name}", "without a matching"),
      ("/tags/{a{b}}", "nest"),
    ] {
      let module = parse(&format!(
        r#"
        [[views]]
        kind = "template"
        name = "tags"
        path = "{path}"
        template = "tags.html"
        "#
      ));
      let err = module.views[0].validate("bot/tags.toml").expect_err("must fail");
      assert!(err.to_string().contains(problem), "{path} should report {problem}");
    }

    let module = parse(
      r#"
      [[views]]
      kind = "template"
      name = "tag"
      path = "/tags/{name}"
      template = "tags.html"
      "#,
    );
    assert!(module.views[0].validate("bot/tags.toml").is_ok());
  }

  #[test]
  fn validate_error_requires_status_or_condition() {
    let module = parse(
      r#"
      [[views]]
      kind = "error"
      name = "empty"
      "#,
    );
    assert!(module.views[0].validate("main/errors.toml").is_err());

    let module = parse(
      r#"
      [[views]]
      kind = "error"
      name = "both"
      status = [404]
      condition = "csrf_failure"
      "#,
    );
    assert!(module.views[0].validate("main/errors.toml").is_err());
  }

  #[test]
  fn validate_redirect_status_window() {
    let module = parse(
      r#"
      [[views]]
      kind = "redirect"
      name = "off"
      path = "/off"
      target = "main.index"
      status = 200
      "#,
    );
    assert!(module.views[0].validate("main/off.toml").is_err());
  }

  #[test]
  fn hookable_window() {
    assert!(hookable(400));
    assert!(hookable(404));
    assert!(hookable(599));
    assert!(!hookable(302));
    assert!(!hookable(600));
  }

  #[test]
  fn empty_status_sets() {
    assert!(StatusCodes::List(vec![]).is_empty());
    assert!(StatusCodes::Range { start: 500, end: 500 }.is_empty());
    assert!(!StatusCodes::Range { start: 500, end: 600 }.is_empty());
  }
}
