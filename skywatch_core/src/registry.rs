//! Classification registry: name → display color.

use skywatch_env::ClassificationEntry;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::config::RenderConfig;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("Classification '{0}' already exists")]
    AlreadyExists(String),

    #[error("Classification name is empty")]
    EmptyName,
}

/// Append-only registry of classification colors.
#[derive(Debug, Clone)]
pub struct ClassificationRegistry {
    colors: BTreeMap<String, String>,
    fallback: String,
}

impl Default for ClassificationRegistry {
    fn default() -> Self {
        Self::from_config(&RenderConfig::default())
    }
}

impl ClassificationRegistry {
    /// Empty registry; unknown names render in `fallback`.
    pub fn new(fallback: impl Into<String>) -> Self {
        Self {
            colors: BTreeMap::new(),
            fallback: fallback.into(),
        }
    }

    /// Registry seeded from the configured palette.
    pub fn from_config(config: &RenderConfig) -> Self {
        Self {
            colors: config.palette.clone(),
            fallback: config.fallback_color.clone(),
        }
    }

    /// Adds a new classification. Existing names are rejected untouched.
    pub fn add(&mut self, entry: ClassificationEntry) -> Result<(), RegistryError> {
        if entry.name.trim().is_empty() {
            return Err(RegistryError::EmptyName);
        }
        if self.colors.contains_key(&entry.name) {
            return Err(RegistryError::AlreadyExists(entry.name));
        }
        self.colors.insert(entry.name, entry.color);
        Ok(())
    }

    /// Merges a server-side list; server colors win. Returns how many names were new.
    pub fn merge(&mut self, entries: impl IntoIterator<Item = ClassificationEntry>) -> usize {
        let mut added = 0;
        for entry in entries {
            if entry.name.trim().is_empty() {
                continue;
            }
            if self.colors.insert(entry.name, entry.color).is_none() {
                added += 1;
            }
        }
        added
    }

    /// Display color for `name`, or the fallback color.
    pub fn color_of(&self, name: &str) -> &str {
        self.colors.get(name).map(String::as_str).unwrap_or(&self.fallback)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.colors.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.colors.keys().map(String::as_str)
    }

    pub fn entries(&self) -> Vec<ClassificationEntry> {
        self.colors
            .iter()
            .map(|(name, color)| ClassificationEntry::new(name.clone(), color.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_from_palette() {
        let registry = ClassificationRegistry::default();
        assert_eq!(registry.color_of("commercial"), "#00ff00");
        assert_eq!(registry.color_of("never-heard-of-it"), "#808080");
        assert!(registry.contains("unknown"));
    }

    #[test]
    fn test_duplicate_add_rejected_without_mutation() {
        let mut registry = ClassificationRegistry::default();
        let err = registry
            .add(ClassificationEntry::new("survey", "#123456"))
            .unwrap_err();
        assert_eq!(err, RegistryError::AlreadyExists("survey".to_string()));
        assert_eq!(registry.color_of("survey"), "#ff0000");
    }

    #[test]
    fn test_add_new_name() {
        let mut registry = ClassificationRegistry::new("#000000");
        registry.add(ClassificationEntry::new("medevac", "#00ffff")).unwrap();
        assert_eq!(registry.color_of("medevac"), "#00ffff");
        assert_eq!(
            registry.add(ClassificationEntry::new(" ", "#fff")),
            Err(RegistryError::EmptyName)
        );
    }

    #[test]
    fn test_merge_counts_new_names() {
        let mut registry = ClassificationRegistry::default();
        let before = registry.len();
        let added = registry.merge(vec![
            ClassificationEntry::new("survey", "#aa0000"),
            ClassificationEntry::new("balloon", "#ffffff"),
        ]);
        assert_eq!(added, 1);
        assert_eq!(registry.len(), before + 1);
        assert_eq!(registry.color_of("survey"), "#aa0000");
    }
}
