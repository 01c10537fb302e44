//! Persisted local settings
//!
//! A flat key → integer store. Missing keys read as 0.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Settings I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Settings file is malformed: {0}")]
    Format(#[from] serde_json::Error),
}

pub trait SettingsStore {
    fn get(&self, key: &str) -> Option<i32>;

    fn set_int(&mut self, key: &str, value: i32) -> Result<(), SettingsError>;

    /// Read an integer, defaulting to 0 when absent
    fn get_int(&self, key: &str) -> i32 {
        self.get(key).unwrap_or(0)
    }
}

impl<T: SettingsStore + ?Sized> SettingsStore for Box<T> {
    fn get(&self, key: &str) -> Option<i32> {
        (**self).get(key)
    }

    fn set_int(&mut self, key: &str, value: i32) -> Result<(), SettingsError> {
        (**self).set_int(key, value)
    }
}

/// Volatile store
#[derive(Debug, Default, Clone)]
pub struct MemorySettings {
    values: BTreeMap<String, i32>,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsStore for MemorySettings {
    fn get(&self, key: &str) -> Option<i32> {
        self.values.get(key).copied()
    }

    fn set_int(&mut self, key: &str, value: i32) -> Result<(), SettingsError> {
        self.values.insert(key.to_string(), value);
        Ok(())
    }
}

/// JSON-file backed store, rewritten on every change
#[derive(Debug)]
pub struct JsonFileSettings {
    path: PathBuf,
    values: BTreeMap<String, i32>,
}

impl JsonFileSettings {
    /// Open the file at `path`, starting empty if it does not exist yet
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref().to_path_buf();
        let values = match std::fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str(&text)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        debug!("Loaded {} settings from {}", values.len(), path.display());
        Ok(Self { path, values })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn save(&self) -> Result<(), SettingsError> {
        let text = serde_json::to_string_pretty(&self.values)?;
        std::fs::write(&self.path, text)?;
        Ok(())
    }
}

impl SettingsStore for JsonFileSettings {
    fn get(&self, key: &str) -> Option<i32> {
        self.values.get(key).copied()
    }

    /// Memory only changes if the file write succeeds
    fn set_int(&mut self, key: &str, value: i32) -> Result<(), SettingsError> {
        let previous = self.values.insert(key.to_string(), value);
        if let Err(e) = self.save() {
            match previous {
                Some(old) => self.values.insert(key.to_string(), old),
                None => self.values.remove(key),
            };
            return Err(e);
        }
        Ok(())
    }
}
