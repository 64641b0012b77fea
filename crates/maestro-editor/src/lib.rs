//! Provider editor view-model.
//!
//! One open editor form owns one provider entry: dedicated inputs for the
//! endpoint URL, model and API key, plus the free-text config document
//! rendered by the embedded editor widget. Field/document consistency is
//! delegated to the sync controller; this layer applies its effects to the
//! widget, keeps validity markers fresh, routes the API key to the
//! credentials map and fires persistence at the host without awaiting it.

use std::sync::Arc;

use serde::Serialize;
use serde_json::json;

use maestro_document::{validate_document, FieldSpec, Marker};
use maestro_host::{ops, spawn_invoke, HostCommands};
use maestro_observability::redact_text;
use maestro_settings::{
    credentials_path_for, load_credentials, load_entry_file, CredentialsFile, EntryFile,
};
use maestro_sync::{FieldState, SyncController, SyncEffect, SyncEvent};
use maestro_types::ProviderEntry;

pub const FIELD_BASE_URL: &str = "base_url";
pub const FIELD_MODEL: &str = "model";

/// The embedded structured-text editor, as a capability: accept external
/// value updates and render inline diagnostics. Change events flow the
/// other way, from the host application into [`ProviderEditor::document_edited`].
pub trait EditorWidget {
    fn set_text(&mut self, text: &str);
    fn set_markers(&mut self, markers: &[Marker]);
}

#[derive(Debug, Clone, Serialize)]
pub struct FieldBinding {
    pub value: String,
    pub state: FieldState,
}

/// Serializable form state for the view layer.
#[derive(Debug, Clone, Serialize)]
pub struct FormBindings {
    pub provider_id: String,
    pub provider_name: String,
    pub base_url: FieldBinding,
    pub model: FieldBinding,
    pub api_key_set: bool,
    pub document: String,
    pub markers: Vec<Marker>,
}

pub struct ProviderEditor<W: EditorWidget> {
    entry: ProviderEntry,
    auth_key: String,
    controller: SyncController,
    widget: W,
    host: Arc<dyn HostCommands>,
    markers: Vec<Marker>,
    correlation_id: String,
}

impl<W: EditorWidget> ProviderEditor<W> {
    pub fn open(entry: ProviderEntry, mut widget: W, host: Arc<dyn HostCommands>) -> Self {
        let controller = SyncController::new(entry.config.clone(), tracked_fields());
        let markers = validate_document(&entry.config);
        widget.set_text(&entry.config);
        widget.set_markers(&markers);

        let auth_key = auth_key_for(&entry);
        let correlation_id = uuid::Uuid::new_v4().to_string();
        tracing::debug!(
            provider = %entry.id,
            correlation_id = %correlation_id,
            "provider editor opened"
        );

        Self {
            entry,
            auth_key,
            controller,
            widget,
            host,
            markers,
            correlation_id,
        }
    }

    /// Load an editor straight from a provider entry file and its
    /// companion credentials blob.
    pub async fn open_from_file(
        path: &std::path::Path,
        widget: W,
        host: Arc<dyn HostCommands>,
    ) -> anyhow::Result<Self> {
        let file = load_entry_file(path).await?;
        let credentials = load_credentials(&credentials_path_for(path)).await?;

        let id = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("provider")
            .to_string();
        let mut entry = ProviderEntry::new(id.clone(), id);
        entry.config = file.config;
        for (slot, placeholder) in file.auth {
            let value = credentials
                .keys
                .get(&slot)
                .cloned()
                .unwrap_or(placeholder);
            entry.auth.insert(slot, value);
        }
        Ok(Self::open(entry, widget, host))
    }

    /// Split the in-memory entry back into its on-disk halves: the entry
    /// file keeps empty credential slots, the blob keeps the secrets.
    pub fn to_entry_file(&self) -> (EntryFile, CredentialsFile) {
        let mut file = EntryFile {
            config: self.entry.config.clone(),
            ..EntryFile::default()
        };
        let mut credentials = CredentialsFile::default();
        for (slot, value) in &self.entry.auth {
            file.auth.insert(slot.clone(), String::new());
            if !value.is_empty() {
                credentials.keys.insert(slot.clone(), value.clone());
            }
        }
        (file, credentials)
    }

    /// The user typed into a dedicated input.
    pub fn edit_field(&mut self, field: &str, value: &str) {
        let effects = self.controller.apply(SyncEvent::InputEdited {
            field: field.to_string(),
            value: value.to_string(),
        });
        let changed = !effects.is_empty();
        self.apply_effects(effects);
        if changed {
            self.entry.touch();
            self.save();
        }
    }

    pub fn clear_field(&mut self, field: &str) {
        let effects = self.controller.apply(SyncEvent::InputCleared {
            field: field.to_string(),
        });
        let changed = !effects.is_empty();
        self.apply_effects(effects);
        if changed {
            self.entry.touch();
            self.save();
        }
    }

    /// The editor widget reported changed text. This is also how the echo
    /// of a controller-initiated write arrives; the sync guards swallow it
    /// and nothing is persisted twice.
    pub fn document_edited(&mut self, text: &str) {
        let external_change = text != self.entry.config;
        let effects = self.controller.apply(SyncEvent::DocumentEdited {
            text: text.to_string(),
        });
        self.entry.config = self.controller.document().to_string();
        self.apply_effects(effects);
        if external_change {
            self.refresh_markers();
            self.entry.touch();
            self.save();
        }
    }

    /// Scheduler tick; expires the sync guards. The embedding UI calls
    /// this once per render cycle.
    pub fn tick(&mut self) {
        self.controller.apply(SyncEvent::Tick);
    }

    /// The API key input writes to the credentials map, not the document;
    /// an empty value clears the slot.
    pub fn set_api_key(&mut self, value: &str) {
        if value.is_empty() {
            self.entry.auth.remove(&self.auth_key);
        } else {
            self.entry
                .auth
                .insert(self.auth_key.clone(), value.to_string());
        }
        tracing::debug!(
            provider = %self.entry.id,
            key = %self.auth_key,
            value = %redact_text(value),
            "api key updated"
        );
        self.entry.touch();
        self.save();
    }

    /// External reset/import: replace the entry and reseed everything,
    /// clearing all override latches.
    pub fn reset(&mut self, entry: ProviderEntry) {
        self.auth_key = auth_key_for(&entry);
        self.entry = entry;
        let effects = self.controller.apply(SyncEvent::Reset {
            document: self.entry.config.clone(),
        });
        self.apply_effects(effects);
        self.refresh_markers();
        self.save();
    }

    /// "Apply a template" keeps the entry identity and credentials but
    /// swaps in new config text, through the same reset path.
    pub fn apply_template(&mut self, config: &str) {
        let mut entry = self.entry.clone();
        entry.config = config.to_string();
        entry.touch();
        self.reset(entry);
    }

    pub fn bindings(&self) -> FormBindings {
        let field = |id: &str| {
            let tracked = self
                .controller
                .field(id)
                .expect("tracked field is registered at open");
            FieldBinding {
                value: tracked.input().to_string(),
                state: tracked.state(),
            }
        };
        FormBindings {
            provider_id: self.entry.id.clone(),
            provider_name: self.entry.name.clone(),
            base_url: field(FIELD_BASE_URL),
            model: field(FIELD_MODEL),
            api_key_set: self
                .entry
                .auth
                .get(&self.auth_key)
                .map(|v| !v.is_empty())
                .unwrap_or(false),
            document: self.entry.config.clone(),
            markers: self.markers.clone(),
        }
    }

    pub fn entry(&self) -> &ProviderEntry {
        &self.entry
    }

    fn apply_effects(&mut self, effects: Vec<SyncEffect>) {
        for effect in effects {
            match effect {
                SyncEffect::SetDocument { text } => {
                    self.entry.config = text;
                    self.widget.set_text(&self.entry.config);
                    self.refresh_markers();
                }
                // Inputs are read back out of the controller via
                // `bindings()`; nothing to push here.
                SyncEffect::SetInput { .. } => {}
            }
        }
    }

    fn refresh_markers(&mut self) {
        self.markers = validate_document(&self.entry.config);
        self.widget.set_markers(&self.markers);
    }

    /// Fire-and-forget persistence; in-memory state is already current and
    /// the UI never blocks on the host.
    fn save(&self) {
        let payload = json!({
            "entry": self.entry,
            "correlationId": self.correlation_id,
        });
        spawn_invoke(self.host.clone(), ops::SAVE_PROVIDER_ENTRY, payload);
    }
}

fn tracked_fields() -> Vec<(String, FieldSpec)> {
    vec![
        (FIELD_BASE_URL.to_string(), FieldSpec::top_level("base_url")),
        (
            FIELD_MODEL.to_string(),
            FieldSpec::in_section("chat", "model"),
        ),
    ]
}

/// Credential slot for an entry: the first declared slot, or a name
/// derived from the provider id.
fn auth_key_for(entry: &ProviderEntry) -> String {
    if let Some(slot) = entry.auth.keys().next() {
        return slot.clone();
    }
    let normalized = entry
        .id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect::<String>();
    format!("{}_API_KEY", normalized)
}
