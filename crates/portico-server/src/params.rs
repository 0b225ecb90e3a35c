/* crates/portico-server/src/params.rs */

// Request parameter validation against a route's declared schema. Produces
// the merged input object handlers receive: undeclared body keys pass
// through, declared parameters are coerced and override them.

use std::collections::{BTreeMap, HashMap};

use serde_json::Value;

use crate::errors::ViewError;
use crate::view::{ParamKind, ParamSource, ParamSpec};

pub fn validate_params(
  specs: &BTreeMap<String, ParamSpec>,
  path_params: &HashMap<String, String>,
  query: &HashMap<String, String>,
  body: Option<&Value>,
) -> Result<Value, ViewError> {
  if let Some(body) = body
    && !body.is_object()
  {
    return Err(ViewError::bad_data_format("The request body must be a JSON object"));
  }

  let mut input = match body {
    Some(Value::Object(map)) => map.clone(),
    _ => serde_json::Map::new(),
  };

  for (name, spec) in specs {
    let raw = match spec.source {
      ParamSource::Path => path_params.get(name).cloned().map(Value::String),
      ParamSource::Query => query.get(name).cloned().map(Value::String),
      ParamSource::Body => body.and_then(|b| b.get(name)).cloned(),
    };

    match raw {
      Some(value) => {
        let coerced = coerce(name, spec.kind, value)?;
        input.insert(name.clone(), coerced);
      }
      None if spec.required => {
        return Err(ViewError::incorrect_parameters(format!(
          "missing required parameter `{name}`"
        )));
      }
      None => {}
    }
  }

  Ok(Value::Object(input))
}

fn coerce(name: &str, kind: ParamKind, value: Value) -> Result<Value, ViewError> {
  let fail = || {
    ViewError::incorrect_parameters(format!("parameter `{name}` has the wrong type"))
  };

  match kind {
    ParamKind::String => match value {
      Value::String(_) => Ok(value),
      _ => Err(fail()),
    },
    ParamKind::Int => match value {
      Value::Number(ref n) if n.is_i64() || n.is_u64() => Ok(value),
      Value::String(s) => s.parse::<i64>().map(|n| Value::Number(n.into())).map_err(|_| fail()),
      _ => Err(fail()),
    },
    ParamKind::Bool => match value {
      Value::Bool(_) => Ok(value),
      Value::String(s) => match s.as_str() {
        "true" | "1" => Ok(Value::Bool(true)),
        "false" | "0" => Ok(Value::Bool(false)),
        _ => Err(fail()),
      },
      _ => Err(fail()),
    },
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn spec(kind: ParamKind, required: bool, source: ParamSource) -> ParamSpec {
    ParamSpec { kind, required, source }
  }

  #[test]
  fn missing_required_parameter() {
    let mut specs = BTreeMap::new();
    specs.insert("name".to_string(), spec(ParamKind::String, true, ParamSource::Query));

    let err = validate_params(&specs, &HashMap::new(), &HashMap::new(), None)
      .expect_err("must fail");
    assert_eq!(err.code(), "INCORRECT_PARAMETERS");
    assert!(err.message().contains("`name`"));
  }

  #[test]
  fn optional_parameter_may_be_absent() {
    let mut specs = BTreeMap::new();
    specs.insert("page".to_string(), spec(ParamKind::Int, false, ParamSource::Query));

    let input = validate_params(&specs, &HashMap::new(), &HashMap::new(), None).unwrap();
    assert_eq!(input, json!({}));
  }

  #[test]
  fn path_and_query_strings_are_coerced() {
    let mut specs = BTreeMap::new();
    specs.insert("id".to_string(), spec(ParamKind::Int, true, ParamSource::Path));
    specs.insert("active".to_string(), spec(ParamKind::Bool, true, ParamSource::Query));

    let mut path = HashMap::new();
    path.insert("id".to_string(), "42".to_string());
    let mut query = HashMap::new();
    query.insert("active".to_string(), "true".to_string());

    let input = validate_params(&specs, &path, &query, None).unwrap();
    assert_eq!(input, json!({"id": 42, "active": true}));
  }

  #[test]
  fn bad_int_is_rejected() {
    let mut specs = BTreeMap::new();
    specs.insert("id".to_string(), spec(ParamKind::Int, true, ParamSource::Path));

    let mut path = HashMap::new();
    path.insert("id".to_string(), "forty-two".to_string());

    let err = validate_params(&specs, &path, &HashMap::new(), None).expect_err("must fail");
    assert_eq!(err.code(), "INCORRECT_PARAMETERS");
  }

  #[test]
  fn body_parameters_and_passthrough() {
    let mut specs = BTreeMap::new();
    specs.insert("count".to_string(), spec(ParamKind::Int, true, ParamSource::Body));

    let body = json!({"count": 3, "note": "kept as-is"});
    let input = validate_params(&specs, &HashMap::new(), &HashMap::new(), Some(&body)).unwrap();
    assert_eq!(input, json!({"count": 3, "note": "kept as-is"}));
  }

  #[test]
  fn body_type_mismatch() {
    let mut specs = BTreeMap::new();
    specs.insert("count".to_string(), spec(ParamKind::Int, true, ParamSource::Body));

    let body = json!({"count": "many"});
    let err = validate_params(&specs, &HashMap::new(), &HashMap::new(), Some(&body))
      .expect_err("must fail");
    assert_eq!(err.code(), "INCORRECT_PARAMETERS");
  }

  #[test]
  fn non_object_body_is_bad_data() {
    let body = json!([1, 2, 3]);
    let err = validate_params(&BTreeMap::new(), &HashMap::new(), &HashMap::new(), Some(&body))
      .expect_err("must fail");
    assert_eq!(err.code(), "BAD_DATA_FORMAT");
  }
}
