//! Action registry: the read-only `action_id -> endpoint` lookup that every
//! suggested action is validated against.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The registry shipped with the crate.
pub const BUILTIN_REGISTRY: &str = include_str!("../../assets/actions.toml");

/// Registry loading errors.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The registry file could not be read.
    #[error("failed to read action registry {path}: {source}")]
    Io {
        /// File that failed to load.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The registry is not valid TOML for this schema.
    #[error("failed to parse action registry: {0}")]
    Parse(#[from] toml::de::Error),
    /// Two entries share an action id.
    #[error("duplicate action id '{0}' in registry")]
    Duplicate(String),
}

/// A registered action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionDescriptor {
    /// Registry key.
    pub action_id: String,
    /// Label shown to the user.
    pub display_name: String,
    /// Endpoint the action invokes.
    pub endpoint: String,
}

/// Lookup of known actions.
pub trait ActionRegistry: Send + Sync {
    /// Descriptor for `action_id`, if registered.
    fn get(&self, action_id: &str) -> Option<&ActionDescriptor>;
}

#[derive(Deserialize)]
struct RegistryFile {
    #[serde(default)]
    actions: Vec<ActionDescriptor>,
}

/// Registry backed by an in-memory map, loaded once.
#[derive(Debug, Clone, Default)]
pub struct StaticActionRegistry {
    actions: HashMap<String, ActionDescriptor>,
}

impl StaticActionRegistry {
    /// Build from descriptors.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Duplicate`] if two descriptors share an id.
    pub fn new(descriptors: impl IntoIterator<Item = ActionDescriptor>) -> Result<Self, RegistryError> {
        let mut actions = HashMap::new();
        for descriptor in descriptors {
            let id = descriptor.action_id.clone();
            if actions.insert(id.clone(), descriptor).is_some() {
                return Err(RegistryError::Duplicate(id));
            }
        }
        Ok(Self { actions })
    }

    /// The built-in registry.
    ///
    /// # Errors
    ///
    /// Returns an error if the embedded file is malformed.
    pub fn builtin() -> Result<Self, RegistryError> {
        Self::from_toml(BUILTIN_REGISTRY)
    }

    /// Parse a registry from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Parse`] or [`RegistryError::Duplicate`].
    pub fn from_toml(text: &str) -> Result<Self, RegistryError> {
        let file: RegistryFile = toml::from_str(text)?;
        Self::new(file.actions)
    }

    /// Read and parse a registry file.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Io`] if the file cannot be read, otherwise
    /// as [`StaticActionRegistry::from_toml`].
    pub fn from_path(path: &Path) -> Result<Self, RegistryError> {
        let text = std::fs::read_to_string(path).map_err(|source| RegistryError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    /// Number of registered actions.
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Whether no action is registered.
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

impl ActionRegistry for StaticActionRegistry {
    fn get(&self, action_id: &str) -> Option<&ActionDescriptor> {
        self.actions.get(action_id)
    }
}
