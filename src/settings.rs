use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Result;
use tracing::warn;

use crate::types::{SettingsPatch, SystemSettings};

const SETTINGS_FILE: &str = "system_settings.json";

/// Raw persistence for the single settings record. The store itself never
/// touches the filesystem directly, so tests can swap in a memory backend.
pub trait SettingsStorage: Send + Sync {
    fn load(&self) -> Result<Option<String>>;
    fn store(&self, raw: &str) -> Result<()>;
}

/// JSON file under a configurable directory, one fixed file name.
pub struct JsonFileStorage {
    path: PathBuf,
}

impl JsonFileStorage {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        JsonFileStorage {
            path: dir.as_ref().join(SETTINGS_FILE),
        }
    }
}

impl SettingsStorage for JsonFileStorage {
    fn load(&self) -> Result<Option<String>> {
        if !self.path.exists() {
            return Ok(None);
        }
        Ok(Some(fs::read_to_string(&self.path)?))
    }

    fn store(&self, raw: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, raw)?;
        Ok(())
    }
}

/// In-memory backend for tests.
pub struct MemoryStorage {
    record: Mutex<Option<String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        MemoryStorage {
            record: Mutex::new(None),
        }
    }
}

impl SettingsStorage for MemoryStorage {
    fn load(&self) -> Result<Option<String>> {
        Ok(self.record.lock().unwrap().clone())
    }

    fn store(&self, raw: &str) -> Result<()> {
        *self.record.lock().unwrap() = Some(raw.to_string());
        Ok(())
    }
}

/// Reads and writes the one locally owned settings record, seeding defaults
/// on first access. An unreadable or unparseable record is replaced by the
/// defaults rather than surfaced.
pub struct SettingsStore {
    storage: Box<dyn SettingsStorage>,
}

impl SettingsStore {
    pub fn new(storage: Box<dyn SettingsStorage>) -> Self {
        SettingsStore { storage }
    }

    pub fn get(&self) -> SystemSettings {
        match self.storage.load() {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(settings) => settings,
                Err(e) => {
                    warn!(error = %e, "Stored settings record is malformed, reseeding defaults");
                    self.seed_defaults()
                }
            },
            Ok(None) => self.seed_defaults(),
            Err(e) => {
                warn!(error = %e, "Failed to read stored settings, falling back to defaults");
                SystemSettings::default()
            }
        }
    }

    /// Read-merge-write. Called on both the success and failure paths of a
    /// remote settings update, so the local record always reflects the user's
    /// latest edit.
    pub fn merge_and_store(&self, patch: &SettingsPatch) -> SystemSettings {
        let merged = self.get().merged(patch);
        self.persist(&merged);
        merged
    }

    fn seed_defaults(&self) -> SystemSettings {
        let defaults = SystemSettings::default();
        self.persist(&defaults);
        defaults
    }

    fn persist(&self, settings: &SystemSettings) {
        match serde_json::to_string_pretty(settings) {
            Ok(raw) => {
                if let Err(e) = self.storage.store(&raw) {
                    warn!(error = %e, "Failed to persist settings record");
                }
            }
            Err(e) => warn!(error = %e, "Failed to serialize settings record"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_store() -> SettingsStore {
        SettingsStore::new(Box::new(MemoryStorage::new()))
    }

    #[test]
    fn first_access_seeds_and_persists_defaults() {
        let storage = MemoryStorage::new();
        assert!(storage.load().unwrap().is_none());

        let store = SettingsStore::new(Box::new(storage));
        assert_eq!(store.get(), SystemSettings::default());

        // The seeded record is now on "disk" and parses back.
        let again = store.get();
        assert_eq!(again, SystemSettings::default());
    }

    #[test]
    fn merge_and_store_round_trips() {
        let store = memory_store();
        let patch = SettingsPatch {
            ear_threshold: Some(0.18),
            ..Default::default()
        };
        let merged = store.merge_and_store(&patch);
        assert_eq!(merged.ear_threshold, 0.18);
        // get() immediately afterwards returns the merged record.
        assert_eq!(store.get(), merged);
    }

    #[test]
    fn corrupt_record_reseeds_defaults() {
        let storage = MemoryStorage::new();
        storage.store("not json").unwrap();
        let store = SettingsStore::new(Box::new(storage));
        assert_eq!(store.get(), SystemSettings::default());
    }

    #[test]
    fn file_storage_round_trips() {
        let dir = std::env::temp_dir().join(format!("drowsy-settings-{}", uuid::Uuid::new_v4()));
        let store = SettingsStore::new(Box::new(JsonFileStorage::new(&dir)));
        let merged = store.merge_and_store(&SettingsPatch {
            notification_cooldown: Some(120),
            ..Default::default()
        });
        assert_eq!(merged.notification_cooldown, 120);
        assert_eq!(store.get().notification_cooldown, 120);
        fs::remove_dir_all(&dir).ok();
    }
}
