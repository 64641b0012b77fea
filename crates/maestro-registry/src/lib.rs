//! The generic provider/model registry behind the card list UI.
//!
//! Entries keep their list order (the cards are drag-reorderable; the view
//! layer translates a drop into [`ProviderRegistry::move_entry`]). All
//! mutation goes through validation/normalization so imports and UI edits
//! obey the same rules.

use std::path::Path;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use maestro_types::{ModelInfo, ProviderEntry, ProviderSummary};

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RegistryError>;

static PROVIDER_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z][a-z0-9-]*$").expect("valid provider id regex"));

/// Serialized registry shape, shared by persistence and import/export.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RegistryFile {
    #[serde(default)]
    entries: Vec<ProviderEntry>,
    #[serde(default)]
    default_provider: Option<String>,
}

#[derive(Clone, Default)]
pub struct ProviderRegistry {
    entries: Arc<RwLock<Vec<ProviderEntry>>>,
    default_provider: Arc<RwLock<Option<String>>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn list(&self) -> Vec<ProviderSummary> {
        self.entries
            .read()
            .await
            .iter()
            .map(ProviderSummary::from)
            .collect()
    }

    pub async fn entries(&self) -> Vec<ProviderEntry> {
        self.entries.read().await.clone()
    }

    pub async fn get(&self, id: &str) -> Option<ProviderEntry> {
        self.entries
            .read()
            .await
            .iter()
            .find(|e| e.id == id)
            .cloned()
    }

    pub async fn add(&self, entry: ProviderEntry) -> Result<()> {
        let entry = normalize_entry(entry);
        validate_entry(&entry)?;
        let mut entries = self.entries.write().await;
        if entries.iter().any(|e| e.id == entry.id) {
            return Err(RegistryError::Validation(format!(
                "provider id '{}' already exists",
                entry.id
            )));
        }
        tracing::info!(provider = %entry.id, "provider added");
        entries.push(entry);
        Ok(())
    }

    pub async fn update(&self, entry: ProviderEntry) -> Result<()> {
        let mut entry = normalize_entry(entry);
        validate_entry(&entry)?;
        entry.touch();
        let mut entries = self.entries.write().await;
        let Some(existing) = entries.iter_mut().find(|e| e.id == entry.id) else {
            return Err(RegistryError::NotFound(format!(
                "provider '{}' is not configured",
                entry.id
            )));
        };
        *existing = entry;
        Ok(())
    }

    pub async fn remove(&self, id: &str) -> Result<ProviderEntry> {
        let removed = {
            let mut entries = self.entries.write().await;
            let Some(idx) = entries.iter().position(|e| e.id == id) else {
                return Err(RegistryError::NotFound(format!(
                    "provider '{}' is not configured",
                    id
                )));
            };
            entries.remove(idx)
        };
        let mut default = self.default_provider.write().await;
        if default.as_deref() == Some(id) {
            *default = None;
        }
        tracing::info!(provider = %id, "provider removed");
        Ok(removed)
    }

    /// Drag-reorder: move the entry at `from` so it lands at `to`.
    pub async fn move_entry(&self, from: usize, to: usize) -> Result<()> {
        let mut entries = self.entries.write().await;
        if from >= entries.len() || to >= entries.len() {
            return Err(RegistryError::Validation(format!(
                "move out of range: {} -> {} with {} entries",
                from,
                to,
                entries.len()
            )));
        }
        let entry = entries.remove(from);
        entries.insert(to, entry);
        Ok(())
    }

    pub async fn set_default(&self, id: Option<&str>) -> Result<()> {
        if let Some(id) = id {
            let entries = self.entries.read().await;
            if !entries.iter().any(|e| e.id == id) {
                return Err(RegistryError::NotFound(format!(
                    "provider '{}' is not configured",
                    id
                )));
            }
        }
        *self.default_provider.write().await = id.map(str::to_string);
        Ok(())
    }

    pub async fn default_provider(&self) -> Option<String> {
        self.default_provider.read().await.clone()
    }

    /// Resolve the entry a request should use: explicit id wins, then the
    /// configured default, then the first enabled entry.
    pub async fn select(&self, id: Option<&str>) -> Result<ProviderEntry> {
        let entries = self.entries.read().await;

        if let Some(id) = id {
            if let Some(entry) = entries.iter().find(|e| e.id == id) {
                return Ok(entry.clone());
            }
            let available = entries.iter().map(|e| e.id.as_str()).collect::<Vec<_>>();
            return Err(RegistryError::NotFound(format!(
                "provider '{}' is not configured. configured providers: {}",
                id,
                available.join(", ")
            )));
        }

        if let Some(default_id) = self.default_provider.read().await.as_deref() {
            if let Some(entry) = entries.iter().find(|e| e.id == default_id) {
                return Ok(entry.clone());
            }
        }

        entries
            .iter()
            .find(|e| e.enabled)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound("no provider configured".to_string()))
    }

    pub async fn add_model(&self, provider_id: &str, model: ModelInfo) -> Result<()> {
        if model.id.trim().is_empty() {
            return Err(RegistryError::Validation(
                "model id cannot be empty".to_string(),
            ));
        }
        let mut entries = self.entries.write().await;
        let Some(entry) = entries.iter_mut().find(|e| e.id == provider_id) else {
            return Err(RegistryError::NotFound(format!(
                "provider '{}' is not configured",
                provider_id
            )));
        };
        if entry.models.iter().any(|m| m.id == model.id) {
            return Err(RegistryError::Validation(format!(
                "model '{}' already exists for provider '{}'",
                model.id, provider_id
            )));
        }
        entry.models.push(model);
        entry.touch();
        Ok(())
    }

    pub async fn remove_model(&self, provider_id: &str, model_id: &str) -> Result<()> {
        let mut entries = self.entries.write().await;
        let Some(entry) = entries.iter_mut().find(|e| e.id == provider_id) else {
            return Err(RegistryError::NotFound(format!(
                "provider '{}' is not configured",
                provider_id
            )));
        };
        let before = entry.models.len();
        entry.models.retain(|m| m.id != model_id);
        if entry.models.len() == before {
            return Err(RegistryError::NotFound(format!(
                "model '{}' not found for provider '{}'",
                model_id, provider_id
            )));
        }
        entry.touch();
        Ok(())
    }

    pub async fn move_model(&self, provider_id: &str, from: usize, to: usize) -> Result<()> {
        let mut entries = self.entries.write().await;
        let Some(entry) = entries.iter_mut().find(|e| e.id == provider_id) else {
            return Err(RegistryError::NotFound(format!(
                "provider '{}' is not configured",
                provider_id
            )));
        };
        if from >= entry.models.len() || to >= entry.models.len() {
            return Err(RegistryError::Validation(format!(
                "model move out of range: {} -> {} with {} models",
                from,
                to,
                entry.models.len()
            )));
        }
        let model = entry.models.remove(from);
        entry.models.insert(to, model);
        Ok(())
    }

    pub async fn export_json(&self) -> Result<String> {
        let file = RegistryFile {
            entries: self.entries.read().await.clone(),
            default_provider: self.default_provider.read().await.clone(),
        };
        Ok(serde_json::to_string_pretty(&file)?)
    }

    /// Replace the whole registry from an export. The payload is validated
    /// up front; any invalid entry rejects the entire import.
    pub async fn import_json(&self, json: &str) -> Result<()> {
        let file: RegistryFile = serde_json::from_str(json)?;
        let mut seen = std::collections::HashSet::new();
        let mut entries = Vec::with_capacity(file.entries.len());
        for entry in file.entries {
            let entry = normalize_entry(entry);
            validate_entry(&entry)?;
            if !seen.insert(entry.id.clone()) {
                return Err(RegistryError::Validation(format!(
                    "duplicate provider id '{}' in import payload",
                    entry.id
                )));
            }
            entries.push(entry);
        }
        if let Some(default_id) = file.default_provider.as_deref() {
            if !seen.contains(default_id) {
                return Err(RegistryError::Validation(format!(
                    "default provider '{}' is not part of the import payload",
                    default_id
                )));
            }
        }
        *self.entries.write().await = entries;
        *self.default_provider.write().await = file.default_provider;
        tracing::info!("registry replaced from import");
        Ok(())
    }

    /// Load from disk. Missing or corrupt files yield an empty registry;
    /// startup must not fail because a state file rotted.
    pub async fn load(&self, path: &Path) -> Result<()> {
        if !path.exists() {
            return Ok(());
        }
        let raw = tokio::fs::read_to_string(path).await?;
        match serde_json::from_str::<RegistryFile>(&raw) {
            Ok(file) => {
                *self.entries.write().await = file.entries.into_iter().map(normalize_entry).collect();
                *self.default_provider.write().await = file.default_provider;
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "ignoring corrupt registry file");
            }
        }
        Ok(())
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = self.export_json().await?;
        tokio::fs::write(path, json).await?;
        Ok(())
    }
}

pub fn validate_entry(entry: &ProviderEntry) -> Result<()> {
    if !PROVIDER_ID_RE.is_match(&entry.id) {
        return Err(RegistryError::Validation(format!(
            "invalid provider id '{}'. Use kebab-case like 'azure-openai'.",
            entry.id
        )));
    }
    if entry.name.trim().is_empty() {
        return Err(RegistryError::Validation(
            "provider name cannot be empty".to_string(),
        ));
    }
    Ok(())
}

fn normalize_entry(mut entry: ProviderEntry) -> ProviderEntry {
    entry.id = entry.id.trim().to_string();
    entry.name = entry.name.trim().to_string();
    let mut seen = std::collections::HashSet::new();
    entry.models.retain(|m| seen.insert(m.id.clone()));
    entry
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str) -> ProviderEntry {
        ProviderEntry::new(id, id.to_uppercase())
    }

    async fn registry_with(ids: &[&str]) -> ProviderRegistry {
        let registry = ProviderRegistry::new();
        for id in ids {
            registry.add(entry(id)).await.expect("add");
        }
        registry
    }

    #[tokio::test]
    async fn add_rejects_duplicate_and_invalid_ids() {
        let registry = registry_with(&["openai"]).await;
        let err = registry.add(entry("openai")).await.unwrap_err();
        assert!(err.to_string().contains("already exists"));

        let err = registry.add(entry("Bad Id")).await.unwrap_err();
        assert!(err.to_string().contains("invalid provider id"));
    }

    #[tokio::test]
    async fn move_entry_reorders_cards() {
        let registry = registry_with(&["a", "b", "c"]).await;
        registry.move_entry(0, 2).await.unwrap();
        let order: Vec<String> = registry.list().await.into_iter().map(|s| s.id).collect();
        assert_eq!(order, vec!["b", "c", "a"]);

        let err = registry.move_entry(0, 3).await.unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }

    #[tokio::test]
    async fn explicit_provider_wins_over_default() {
        let registry = registry_with(&["openai", "openrouter"]).await;
        registry.set_default(Some("openai")).await.unwrap();
        let selected = registry.select(Some("openrouter")).await.unwrap();
        assert_eq!(selected.id, "openrouter");
    }

    #[tokio::test]
    async fn select_falls_back_to_first_enabled_when_default_missing() {
        let registry = registry_with(&["openai", "openrouter"]).await;
        let mut first = registry.get("openai").await.unwrap();
        first.enabled = false;
        registry.update(first).await.unwrap();

        let selected = registry.select(None).await.unwrap();
        assert_eq!(selected.id, "openrouter");
    }

    #[tokio::test]
    async fn select_unknown_provider_errors() {
        let registry = registry_with(&["openai"]).await;
        let err = registry.select(Some("openruter")).await.unwrap_err();
        assert!(err.to_string().contains("'openruter' is not configured"));
    }

    #[tokio::test]
    async fn removing_default_provider_clears_default() {
        let registry = registry_with(&["openai"]).await;
        registry.set_default(Some("openai")).await.unwrap();
        registry.remove("openai").await.unwrap();
        assert_eq!(registry.default_provider().await, None);
    }

    #[tokio::test]
    async fn model_crud_and_reorder() {
        let registry = registry_with(&["openai"]).await;
        registry
            .add_model("openai", ModelInfo::new("gpt-4o-mini"))
            .await
            .unwrap();
        registry
            .add_model("openai", ModelInfo::new("gpt-4o"))
            .await
            .unwrap();

        let err = registry
            .add_model("openai", ModelInfo::new("gpt-4o"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("already exists"));

        registry.move_model("openai", 1, 0).await.unwrap();
        let models = registry.get("openai").await.unwrap().models;
        assert_eq!(models[0].id, "gpt-4o");

        registry.remove_model("openai", "gpt-4o-mini").await.unwrap();
        assert_eq!(registry.get("openai").await.unwrap().models.len(), 1);
    }

    #[tokio::test]
    async fn export_import_round_trip() {
        let registry = registry_with(&["openai", "openrouter"]).await;
        registry.set_default(Some("openrouter")).await.unwrap();
        let json = registry.export_json().await.unwrap();

        let other = ProviderRegistry::new();
        other.import_json(&json).await.unwrap();
        assert_eq!(other.default_provider().await.as_deref(), Some("openrouter"));
        let order: Vec<String> = other.list().await.into_iter().map(|s| s.id).collect();
        assert_eq!(order, vec!["openai", "openrouter"]);
    }

    #[tokio::test]
    async fn import_rejects_duplicates_atomically() {
        let registry = registry_with(&["keep-me"]).await;
        let json = r#"{"entries": [
            {"id": "a", "name": "A", "created_at": "2026-01-01T00:00:00Z", "updated_at": "2026-01-01T00:00:00Z"},
            {"id": "a", "name": "A again", "created_at": "2026-01-01T00:00:00Z", "updated_at": "2026-01-01T00:00:00Z"}
        ]}"#;
        let err = registry.import_json(json).await.unwrap_err();
        assert!(err.to_string().contains("duplicate provider id"));

        // The old contents survive a failed import.
        assert_eq!(registry.list().await.len(), 1);
    }

    #[tokio::test]
    async fn load_ignores_corrupt_state_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("registry.json");
        std::fs::write(&path, "{broken").unwrap();

        let registry = ProviderRegistry::new();
        registry.load(&path).await.unwrap();
        assert!(registry.list().await.is_empty());
    }

    #[tokio::test]
    async fn save_and_load_round_trip() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("state").join("registry.json");

        let registry = registry_with(&["openai"]).await;
        registry.save(&path).await.unwrap();

        let reloaded = ProviderRegistry::new();
        reloaded.load(&path).await.unwrap();
        assert_eq!(reloaded.list().await.len(), 1);
    }
}
