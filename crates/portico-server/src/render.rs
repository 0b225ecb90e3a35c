/* crates/portico-server/src/render.rs */

// Comment-slot template rendering. `<!--portico:path-->` inserts the
// HTML-escaped value at the dotted path of the context object;
// `<!--portico:html:path-->` inserts it raw. Unresolved slots render empty.
// Rendering is pure computation over the template and context.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::handler::UserIdentity;
use crate::statics::StaticMap;

static SLOT: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"<!--portico:(html:)?([A-Za-z0-9_$][A-Za-z0-9_$./-]*)-->").expect("slot pattern")
});

pub fn render(template: &str, data: &Value) -> String {
  SLOT
    .replace_all(template, |caps: &regex::Captures<'_>| {
      let raw = caps.get(1).is_some();
      let Some(value) = resolve(&caps[2], data) else {
        return String::new();
      };
      if raw { stringify(value) } else { escape_html(&stringify(value)) }
    })
    .into_owned()
}

fn resolve<'a>(path: &str, data: &'a Value) -> Option<&'a Value> {
  let mut current = data;
  for key in path.split('.') {
    current = current.get(key)?;
  }
  Some(current)
}

fn stringify(value: &Value) -> String {
  match value {
    Value::Null => String::new(),
    Value::Bool(b) => b.to_string(),
    Value::Number(n) => n.to_string(),
    Value::String(s) => s.clone(),
    other => other.to_string(),
  }
}

fn escape_html(s: &str) -> String {
  let mut out = String::with_capacity(s.len());
  for ch in s.chars() {
    match ch {
      '&' => out.push_str("&amp;"),
      '<' => out.push_str("&lt;"),
      '>' => out.push_str("&gt;"),
      '"' => out.push_str("&quot;"),
      '\'' => out.push_str("&#x27;"),
      c => out.push(c),
    }
  }
  out
}

/// Build the fixed context every rendered page receives, then merge the
/// caller's context on top (caller keys win). The static resolver is exposed
/// as a name -> URL map, so templates reference assets as
/// `<!--portico:statics.css/main-->`.
pub fn standard_context(
  current_page: &str,
  group: &str,
  user: Option<&UserIdentity>,
  debug: bool,
  statics: &StaticMap,
  extra: Value,
) -> Value {
  let mut context = serde_json::Map::new();
  context.insert("current_page".to_string(), Value::String(current_page.to_string()));
  context.insert("group".to_string(), Value::String(group.to_string()));
  context.insert("logged_in".to_string(), Value::Bool(user.is_some()));
  context.insert(
    "user".to_string(),
    match user {
      Some(user) => serde_json::to_value(user).unwrap_or(Value::Null),
      None => Value::Null,
    },
  );
  context.insert("debug".to_string(), Value::Bool(debug));
  context.insert("static_base".to_string(), Value::String(statics.base().to_string()));
  context.insert("statics".to_string(), statics.to_json());
  context.insert(
    "generated_at".to_string(),
    Value::String(chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string()),
  );

  if let Value::Object(extra) = extra {
    for (key, value) in extra {
      context.insert(key, value);
    }
  }

  Value::Object(context)
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn slot_is_escaped_by_default() {
    let html = render("<h1><!--portico:title--></h1>", &json!({"title": "<b>Tags</b>"}));
    assert_eq!(html, "<h1>&lt;b&gt;Tags&lt;/b&gt;</h1>");
  }

  #[test]
  fn html_slot_is_raw() {
    let html = render("<div><!--portico:html:body--></div>", &json!({"body": "<p>hi</p>"}));
    assert_eq!(html, "<div><p>hi</p></div>");
  }

  #[test]
  fn nested_path_resolves() {
    let html = render("<!--portico:user.username-->", &json!({"user": {"username": "lemon"}}));
    assert_eq!(html, "lemon");
  }

  #[test]
  fn missing_slot_renders_empty() {
    let html = render("[<!--portico:absent-->]", &json!({}));
    assert_eq!(html, "[]");
  }

  #[test]
  fn static_slot_uses_slash_names() {
    let data = json!({"statics": {"css/main": "/static/css/main.css"}});
    let html = render("<link href=\"<!--portico:statics.css/main-->\">", &data);
    assert_eq!(html, "<link href=\"/static/css/main.css\">");
  }

  #[test]
  fn unknown_markup_is_left_alone() {
    let template = "<!-- plain comment --><!--portico:-->";
    assert_eq!(render(template, &json!({})), template);
  }

  #[test]
  fn standard_context_without_user() {
    let statics = StaticMap::empty("/static");
    let context = standard_context("main.index", "main", None, true, &statics, json!({}));
    assert_eq!(context["current_page"], "main.index");
    assert_eq!(context["group"], "main");
    assert_eq!(context["logged_in"], false);
    assert_eq!(context["user"], Value::Null);
    assert_eq!(context["debug"], true);
    assert_eq!(context["static_base"], "/static");
    assert!(context["generated_at"].as_str().unwrap().ends_with("UTC"));
  }

  #[test]
  fn standard_context_merges_extra_on_top() {
    let statics = StaticMap::empty("/static");
    let user = UserIdentity {
      id: "1".to_string(),
      username: "lemon".to_string(),
      roles: vec!["admin".to_string()],
    };
    let extra = json!({"title": "Wiki", "group": "overridden"});
    let context = standard_context("wiki.page", "wiki", Some(&user), false, &statics, extra);
    assert_eq!(context["logged_in"], true);
    assert_eq!(context["user"]["username"], "lemon");
    assert_eq!(context["title"], "Wiki");
    // Caller-supplied context wins on conflicts.
    assert_eq!(context["group"], "overridden");
  }
}
