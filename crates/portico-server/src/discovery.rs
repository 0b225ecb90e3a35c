/* crates/portico-server/src/discovery.rs */

// View discovery: convert the view root directory into groups of descriptors,
// deterministically and exactly once per startup. Each subdirectory is a
// group (nested directories produce dotted names), each non-underscore TOML
// file is one view module. Entries are sorted lexicographically so the
// registration order never depends on the filesystem's listing order.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::errors::ConfigError;
use crate::view::{ViewDef, ViewModule};

/// Per-directory settings, read from an optional `_group.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
struct GroupSettings {
  /// Subdomain label this group's views are served under. Nested groups
  /// inherit the nearest ancestor's host. Empty means the default host.
  #[serde(default)]
  host: Option<String>,
}

/// One view module file and the descriptors it exports.
#[derive(Debug, Clone)]
pub struct DiscoveredModule {
  pub path: PathBuf,
  /// Path relative to the view root, for error messages.
  pub rel: String,
  pub views: Vec<ViewDef>,
}

/// A namespace of related views, corresponding to one directory.
#[derive(Debug, Clone)]
pub struct Group {
  pub name: String,
  pub host: String,
  pub modules: Vec<DiscoveredModule>,
}

/// Walk the view root and collect every group's descriptors. Any unreadable
/// or invalid module aborts the walk; there is no partial registration.
pub fn discover(view_root: &Path) -> Result<Vec<Group>, ConfigError> {
  let mut groups = Vec::new();
  for entry in sorted_entries(view_root)? {
    if entry.is_dir() {
      walk_group(view_root, &entry, "", "", &mut groups)?;
    } else if is_module_file(&entry) {
      // Modules must live inside a group directory; the directory name is
      // the route namespace, so a root-level module has no namespace.
      return Err(ConfigError::ModuleOutsideGroup(entry));
    }
  }
  Ok(groups)
}

fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
  let read = fs::read_dir(dir)
    .map_err(|source| ConfigError::Io { path: dir.to_path_buf(), source })?;
  let mut entries = Vec::new();
  for entry in read {
    let entry = entry.map_err(|source| ConfigError::Io { path: dir.to_path_buf(), source })?;
    entries.push(entry.path());
  }
  entries.sort();
  Ok(entries)
}

fn is_module_file(path: &Path) -> bool {
  let is_toml = path.extension().is_some_and(|ext| ext == "toml");
  let hidden = path.file_name().and_then(|n| n.to_str()).is_some_and(|n| n.starts_with('_'));
  is_toml && !hidden
}

fn walk_group(
  root: &Path,
  dir: &Path,
  parent_name: &str,
  parent_host: &str,
  groups: &mut Vec<Group>,
) -> Result<(), ConfigError> {
  let dir_name = dir.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
  let name =
    if parent_name.is_empty() { dir_name } else { format!("{parent_name}.{dir_name}") };

  let settings_path = dir.join("_group.toml");
  let host = if settings_path.is_file() {
    let content = fs::read_to_string(&settings_path)
      .map_err(|source| ConfigError::Io { path: settings_path.clone(), source })?;
    let settings: GroupSettings = toml::from_str(&content)
      .map_err(|e| ConfigError::Parse { path: settings_path.clone(), message: e.to_string() })?;
    settings.host.unwrap_or_else(|| parent_host.to_string())
  } else {
    parent_host.to_string()
  };

  let entries = sorted_entries(dir)?;
  let mut modules = Vec::new();
  for entry in &entries {
    if entry.is_dir() || !is_module_file(entry) {
      continue;
    }
    let rel = entry.strip_prefix(root).unwrap_or(entry).to_string_lossy().into_owned();
    let content = fs::read_to_string(entry)
      .map_err(|source| ConfigError::Io { path: entry.clone(), source })?;
    let module: ViewModule = toml::from_str(&content)
      .map_err(|e| ConfigError::Parse { path: entry.clone(), message: e.to_string() })?;
    for view in &module.views {
      view.validate(&rel)?;
    }
    if module.views.is_empty() {
      tracing::debug!(module = %rel, "view module declares no views, skipping");
      continue;
    }
    modules.push(DiscoveredModule { path: entry.clone(), rel, views: module.views });
  }

  groups.push(Group { name: name.clone(), host: host.clone(), modules });

  for entry in entries {
    if entry.is_dir() {
      walk_group(root, &entry, &name, &host, groups)?;
    }
  }

  Ok(())
}
