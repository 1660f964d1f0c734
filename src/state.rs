//! The on-disk state of one managed resource.
//!
//! The file is JSON: the resource type, its attributes, and when it was last
//! written. Writes go to a sibling temp file that is renamed into place, so a
//! crash mid-write leaves the previous state intact.

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fs;
use std::path::{Path, PathBuf};

/// State of a single resource instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceState {
    /// Resource type, e.g. `linode_domain`
    #[serde(rename = "type")]
    pub resource_type: String,

    /// Attribute name to JSON value
    pub attributes: JsonValue,

    /// Last time the state was written
    pub last_updated: DateTime<Utc>,
}

impl ResourceState {
    pub fn new(resource_type: &str, attributes: JsonValue) -> Self {
        Self {
            resource_type: resource_type.to_string(),
            attributes,
            last_updated: Utc::now(),
        }
    }

    /// Load state, or `None` if the file doesn't exist.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            log::debug!("State file {} does not exist", path.display());
            return Ok(None);
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read state file: {}", path.display()))?;
        let state: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse state file: {}", path.display()))?;

        log::debug!("Loaded {} state from {}", state.resource_type, path.display());
        Ok(Some(state))
    }

    /// Load state that must belong to `resource_type`.
    pub fn load_for(path: &Path, resource_type: &str) -> Result<Option<Self>> {
        match Self::load(path)? {
            Some(state) if state.resource_type != resource_type => bail!(
                "{} holds a {} resource, not {resource_type}",
                path.display(),
                state.resource_type
            ),
            other => Ok(other),
        }
    }

    /// Write state to disk.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create state directory: {}", dir.display()))?;
        }

        let content =
            serde_json::to_string_pretty(self).context("Failed to serialize state to JSON")?;
        let tmp = temp_path(path);
        fs::write(&tmp, content + "\n")
            .with_context(|| format!("Failed to write state file: {}", tmp.display()))?;
        fs::rename(&tmp, path)
            .with_context(|| format!("Failed to replace state file: {}", path.display()))?;

        log::debug!("Saved {} state to {}", self.resource_type, path.display());
        Ok(())
    }

    /// Replace the attributes and save.
    pub fn update(&mut self, attributes: JsonValue, path: &Path) -> Result<()> {
        self.attributes = attributes;
        self.last_updated = Utc::now();
        self.save(path)
    }

    /// Delete the state file, if present.
    pub fn remove(path: &Path) -> Result<()> {
        match fs::remove_file(path) {
            Ok(()) => {
                log::debug!("Removed state file {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e)
                .with_context(|| format!("Failed to remove state file: {}", path.display())),
        }
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_is_none() {
        let dir = TempDir::new().unwrap();
        assert!(ResourceState::load(&dir.path().join("none.json")).unwrap().is_none());
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("domain.json");
        let state = ResourceState::new(
            "linode_domain",
            json!({"id": "1", "domain": "example.com"}),
        );
        state.save(&path).unwrap();

        let loaded = ResourceState::load(&path).unwrap().unwrap();
        assert_eq!(loaded, state);
        assert!(!temp_path(&path).exists());

        let raw: JsonValue = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["type"], json!("linode_domain"));
    }

    #[test]
    fn test_load_for_checks_type() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        ResourceState::new("linode_firewall", json!({})).save(&path).unwrap();
        assert!(ResourceState::load_for(&path, "linode_firewall").unwrap().is_some());
        let err = ResourceState::load_for(&path, "linode_domain").unwrap_err();
        assert!(err.to_string().contains("not linode_domain"));
    }

    #[test]
    fn test_update_and_remove() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        let mut state = ResourceState::new("linode_domain", json!({"id": "1"}));
        state.update(json!({"id": "2"}), &path).unwrap();
        assert_eq!(
            ResourceState::load(&path).unwrap().unwrap().attributes,
            json!({"id": "2"})
        );

        ResourceState::remove(&path).unwrap();
        assert!(!path.exists());
        ResourceState::remove(&path).unwrap();
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, "{not json").unwrap();
        let err = ResourceState::load(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse state file"));
    }
}
