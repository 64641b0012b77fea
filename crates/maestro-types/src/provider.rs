use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Selected model (provider + model id) for outgoing requests.
///
/// Why: assistant tools accept arbitrary provider ids (including
/// user-defined ones), so we keep both halves as free-form strings instead
/// of baking them into an enum.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SelectedModel {
    #[serde(alias = "providerID", alias = "providerId")]
    pub provider_id: String,
    #[serde(alias = "modelID", alias = "modelId")]
    pub model_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModelInfo {
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub context_window: Option<usize>,
}

impl ModelInfo {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            display_name: id.clone(),
            id,
            context_window: None,
        }
    }
}

/// One configured provider: a display card in the registry plus the raw
/// material the tool-specific editors operate on.
///
/// `config` holds the provider's serialized config document verbatim; the
/// editors treat it as opaque text and only touch individual fields.
/// `auth` is the companion credentials map, persisted separately from the
/// config document so secrets never land in the settings layers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderEntry {
    pub id: String,
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub auth: BTreeMap<String, String>,
    #[serde(default)]
    pub config: String,
    #[serde(default)]
    pub models: Vec<ModelInfo>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_enabled() -> bool {
    true
}

impl ProviderEntry {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            enabled: true,
            auth: BTreeMap::new(),
            config: String::new(),
            models: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub fn has_credentials(&self) -> bool {
        self.auth.values().any(|v| !v.trim().is_empty())
    }
}

/// Serializable card info for the view layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSummary {
    pub id: String,
    pub name: String,
    pub enabled: bool,
    pub model_count: usize,
    pub has_credentials: bool,
}

impl From<&ProviderEntry> for ProviderSummary {
    fn from(entry: &ProviderEntry) -> Self {
        Self {
            id: entry.id.clone(),
            name: entry.name.clone(),
            enabled: entry.enabled,
            model_count: entry.models.len(),
            has_credentials: entry.has_credentials(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selected_model_accepts_camel_case_aliases() {
        let parsed: SelectedModel =
            serde_json::from_str(r#"{"providerID":"openai","modelID":"gpt-4o-mini"}"#)
                .expect("parse");
        assert_eq!(parsed.provider_id, "openai");
        assert_eq!(parsed.model_id, "gpt-4o-mini");
    }

    #[test]
    fn summary_reflects_credentials_and_models() {
        let mut entry = ProviderEntry::new("openai", "OpenAI");
        entry.models.push(ModelInfo::new("gpt-4o-mini"));
        entry.auth.insert("OPENAI_API_KEY".to_string(), "  ".to_string());

        let summary = ProviderSummary::from(&entry);
        assert_eq!(summary.model_count, 1);
        assert!(!summary.has_credentials);

        entry
            .auth
            .insert("OPENAI_API_KEY".to_string(), "sk-test".to_string());
        assert!(ProviderSummary::from(&entry).has_credentials);
    }
}
