//! Key-value settings store used by the UI layer
//!
//! Values are JSON values so the UI can store whatever it likes (last target,
//! last output directory, toggle defaults). Setting a key to `null` removes it.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use fs2::FileExt;
use serde_json::Value;

use scrapedeck_core::prelude::*;

const SETTINGS_FILENAME: &str = "settings.toml";

/// Simple get/set capability; no transactions
pub trait SettingsStore: Send + Sync {
    fn get(&self, key: &str) -> Option<Value>;
    fn set(&self, key: &str, value: Value) -> Result<()>;
}

/// In-memory store, for tests and ephemeral sessions
#[derive(Debug, Default)]
pub struct MemorySettingsStore {
    values: Mutex<BTreeMap<String, Value>>,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsStore for MemorySettingsStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.values
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: Value) -> Result<()> {
        let mut values = self.values.lock().unwrap_or_else(|p| p.into_inner());
        if value.is_null() {
            values.remove(key);
        } else {
            values.insert(key.to_string(), value);
        }
        Ok(())
    }
}

/// File-backed store persisted as a flat TOML table.
///
/// Every `set` rewrites the file: temp file + rename, under an exclusive
/// `fs2` lock on a sidecar lock file so two processes never interleave writes.
#[derive(Debug)]
pub struct TomlSettingsStore {
    path: PathBuf,
    values: Mutex<BTreeMap<String, Value>>,
}

impl TomlSettingsStore {
    /// Open (or lazily create) the store at `path`.
    ///
    /// An unreadable or corrupt file is logged and treated as empty; it is
    /// replaced on the next `set`.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let values = load_values(&path);
        Self {
            path,
            values: Mutex::new(values),
        }
    }

    /// `<config_dir>/scrapedeck/settings.toml`
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("scrapedeck")
            .join(SETTINGS_FILENAME)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, values: &BTreeMap<String, Value>) -> Result<()> {
        let dir = self
            .path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        std::fs::create_dir_all(&dir)
            .map_err(|e| Error::settings(format!("Failed to create settings dir: {}", e)))?;

        let content = toml::to_string_pretty(values)
            .map_err(|e| Error::settings(format!("Failed to serialize settings: {}", e)))?;

        let lock_path = dir.join(".settings.toml.lock");
        let lock = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|e| Error::settings(format!("Failed to open settings lock: {}", e)))?;
        lock.lock_exclusive()
            .map_err(|e| Error::settings(format!("Failed to lock settings: {}", e)))?;

        let temp_path = dir.join(".settings.toml.tmp");
        let mut temp = std::fs::File::create(&temp_path)
            .map_err(|e| Error::settings(format!("Failed to write temp file: {}", e)))?;
        temp.write_all(content.as_bytes())
            .and_then(|_| temp.sync_all())
            .map_err(|e| Error::settings(format!("Failed to write temp file: {}", e)))?;
        drop(temp);

        std::fs::rename(&temp_path, &self.path)
            .map_err(|e| Error::settings(format!("Failed to rename temp file: {}", e)))?;

        // Lock is released when `lock` is dropped
        debug!("Saved settings to {:?}", self.path);
        Ok(())
    }
}

impl SettingsStore for TomlSettingsStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.values
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: Value) -> Result<()> {
        let mut values = self.values.lock().unwrap_or_else(|p| p.into_inner());

        let mut next = values.clone();
        if value.is_null() {
            next.remove(key);
        } else {
            next.insert(key.to_string(), value);
        }

        // Memory only changes once the file does
        self.persist(&next)?;
        *values = next;
        Ok(())
    }
}

fn load_values(path: &Path) -> BTreeMap<String, Value> {
    if !path.exists() {
        debug!("No settings file at {:?}, starting empty", path);
        return BTreeMap::new();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str::<BTreeMap<String, Value>>(&content) {
            Ok(values) => values,
            Err(e) => {
                warn!("Failed to parse {:?}: {}", path, e);
                BTreeMap::new()
            }
        },
        Err(e) => {
            warn!("Failed to read {:?}: {}", path, e);
            BTreeMap::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn test_memory_store_get_set() {
        let store = MemorySettingsStore::new();
        assert_eq!(store.get("lastManufacturer"), None);

        store.set("lastManufacturer", json!("lodes")).unwrap();
        assert_eq!(store.get("lastManufacturer"), Some(json!("lodes")));

        store.set("lastManufacturer", Value::Null).unwrap();
        assert_eq!(store.get("lastManufacturer"), None);
    }

    #[test]
    fn test_toml_store_persists_across_instances() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("settings.toml");

        let store = TomlSettingsStore::open(&path);
        store.set("outputDir", json!("/tmp/out")).unwrap();
        store.set("skipImages", json!(true)).unwrap();
        store.set("recent", json!(["kelly", "megaphone"])).unwrap();

        let reopened = TomlSettingsStore::open(&path);
        assert_eq!(reopened.get("outputDir"), Some(json!("/tmp/out")));
        assert_eq!(reopened.get("skipImages"), Some(json!(true)));
        assert_eq!(reopened.get("recent"), Some(json!(["kelly", "megaphone"])));
    }

    #[test]
    fn test_toml_store_atomic_write_leaves_no_temp() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("settings.toml");

        let store = TomlSettingsStore::open(&path);
        store.set("key", json!(1)).unwrap();

        assert!(path.exists());
        assert!(!temp.path().join(".settings.toml.tmp").exists());
    }

    #[test]
    fn test_toml_store_null_removes_key() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("settings.toml");

        let store = TomlSettingsStore::open(&path);
        store.set("key", json!("v")).unwrap();
        store.set("key", Value::Null).unwrap();

        assert_eq!(TomlSettingsStore::open(&path).get("key"), None);
    }

    #[test]
    fn test_toml_store_unrepresentable_value_is_rejected() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("settings.toml");

        let store = TomlSettingsStore::open(&path);
        store.set("kept", json!("yes")).unwrap();

        // TOML has no null, even nested
        let err = store.set("bad", json!([1, null])).unwrap_err();
        assert!(matches!(err, Error::Settings { .. }));
        assert_eq!(store.get("bad"), None);
        assert_eq!(store.get("kept"), Some(json!("yes")));
    }

    #[test]
    fn test_toml_store_corrupt_file_starts_empty() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("settings.toml");
        std::fs::write(&path, "not = [valid").unwrap();

        let store = TomlSettingsStore::open(&path);
        assert_eq!(store.get("not"), None);

        store.set("fresh", json!(2)).unwrap();
        assert_eq!(TomlSettingsStore::open(&path).get("fresh"), Some(json!(2)));
    }
}
