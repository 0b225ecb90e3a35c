/* crates/portico-server/src/statics.rs */

// Static asset walk: maps every file under the static root to a logical name
// (path minus extension) and a URL under the static base. The map feeds the
// template context's asset resolver; serving the bytes is the adapter's job.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::ConfigError;

#[derive(Debug, Clone)]
pub struct StaticMap {
  base: String,
  entries: BTreeMap<String, String>,
}

impl StaticMap {
  pub fn empty(base: impl Into<String>) -> Self {
    Self { base: base.into(), entries: BTreeMap::new() }
  }

  pub fn base(&self) -> &str {
    &self.base
  }

  pub fn url_for(&self, name: &str) -> Option<&str> {
    self.entries.get(name).map(String::as_str)
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  /// Logical name -> URL, for embedding in the template context.
  pub fn to_json(&self) -> serde_json::Value {
    let map: serde_json::Map<String, serde_json::Value> = self
      .entries
      .iter()
      .map(|(name, url)| (name.clone(), serde_json::Value::String(url.clone())))
      .collect();
    serde_json::Value::Object(map)
  }
}

/// Walk the static root and build the asset map. The walk is sorted so the
/// result never depends on directory listing order. When stripping the
/// extension would collide with an earlier entry, the full relative path is
/// used as the name instead.
pub fn scan_static_root(root: &Path, base_url: &str) -> Result<StaticMap, ConfigError> {
  let mut map = StaticMap::empty(base_url);
  let mut files = Vec::new();
  collect_files(root, &mut files)?;
  files.sort();

  for file in files {
    let rel = file.strip_prefix(root).unwrap_or(&file);
    let rel_str = rel.to_string_lossy().replace('\\', "/");
    let url = format!("{}/{rel_str}", base_url.trim_end_matches('/'));
    let name = match rel_str.rsplit_once('.') {
      Some((stem, _ext)) if !stem.is_empty() => stem.to_string(),
      _ => rel_str.clone(),
    };
    if map.entries.contains_key(&name) {
      map.entries.insert(rel_str, url);
    } else {
      map.entries.insert(name, url);
    }
  }

  Ok(map)
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), ConfigError> {
  let read =
    fs::read_dir(dir).map_err(|source| ConfigError::Io { path: dir.to_path_buf(), source })?;
  for entry in read {
    let entry = entry.map_err(|source| ConfigError::Io { path: dir.to_path_buf(), source })?;
    let path = entry.path();
    if path.is_dir() {
      collect_files(&path, out)?;
    } else {
      out.push(path);
    }
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn scan_builds_names_and_urls() {
    let root = std::env::temp_dir().join("portico-test-statics-scan");
    let _ = fs::remove_dir_all(&root);
    fs::create_dir_all(root.join("css")).unwrap();
    fs::create_dir_all(root.join("js")).unwrap();
    fs::write(root.join("css/main.css"), "body {}").unwrap();
    fs::write(root.join("js/main.js"), "void 0;").unwrap();
    fs::write(root.join("logo.svg"), "<svg/>").unwrap();

    let map = scan_static_root(&root, "/static").unwrap();
    assert_eq!(map.len(), 3);
    assert_eq!(map.url_for("css/main"), Some("/static/css/main.css"));
    assert_eq!(map.url_for("js/main"), Some("/static/js/main.js"));
    assert_eq!(map.url_for("logo"), Some("/static/logo.svg"));

    let _ = fs::remove_dir_all(&root);
  }

  #[test]
  fn colliding_names_fall_back_to_full_path() {
    let root = std::env::temp_dir().join("portico-test-statics-collide");
    let _ = fs::remove_dir_all(&root);
    fs::create_dir_all(&root).unwrap();
    fs::write(root.join("main.css"), "body {}").unwrap();
    fs::write(root.join("main.js"), "void 0;").unwrap();

    let map = scan_static_root(&root, "/static").unwrap();
    // Sorted walk: main.css claims "main", main.js keeps its full path.
    assert_eq!(map.url_for("main"), Some("/static/main.css"));
    assert_eq!(map.url_for("main.js"), Some("/static/main.js"));

    let _ = fs::remove_dir_all(&root);
  }

  #[test]
  fn empty_map() {
    let map = StaticMap::empty("/static");
    assert!(map.is_empty());
    assert_eq!(map.url_for("anything"), None);
    assert_eq!(map.to_json(), serde_json::json!({}));
  }
}
