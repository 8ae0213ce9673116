//! Entity catalog: the read-only set of projects known to a session.

use std::collections::HashSet;
use std::path::Path;

use crate::error::CatalogError;
use crate::types::Entity;

const BUILTIN_CATALOG: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/data/projects.json"));

/// Ordered, key-unique collection of entities.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entities: Vec<Entity>,
}

impl Catalog {
    /// Build a catalog, rejecting duplicate keys.
    pub fn new(entities: Vec<Entity>) -> Result<Self, CatalogError> {
        let mut seen = HashSet::new();
        for entity in &entities {
            if !seen.insert(entity.key()) {
                return Err(CatalogError::DuplicateKey(entity.key().to_string()));
            }
        }
        Ok(Self { entities })
    }

    /// Parse a JSON array of `{id, title, summary?, details}` records.
    pub fn from_json_str(json: &str) -> Result<Self, CatalogError> {
        let entities: Vec<Entity> = serde_json::from_str(json)?;
        Self::new(entities)
    }

    /// Load a catalog file from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        tracing::debug!("Loading catalog from {}", path.display());
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// The projects that ship with the profile page.
    pub fn builtin() -> Result<Self, CatalogError> {
        Self::from_json_str(BUILTIN_CATALOG)
    }

    pub fn get(&self, key: &str) -> Option<&Entity> {
        self.entities.iter().find(|e| e.key() == key)
    }

    /// Look up a key, failing with [`CatalogError::UnknownKey`].
    pub fn require(&self, key: &str) -> Result<&Entity, CatalogError> {
        self.get(key)
            .ok_or_else(|| CatalogError::UnknownKey(key.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.entities.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entities.iter().map(|e| e.key())
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}
