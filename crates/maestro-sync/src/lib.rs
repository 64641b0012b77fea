//! Synchronization controller for the provider editors.
//!
//! Keeps N dedicated form inputs consistent with one free-text config
//! document that the user can also edit directly. Either side may change;
//! the controller decides which direction of sync applies and swallows the
//! echo of its own writes so two one-directional change listeners never
//! feed each other.
//!
//! The controller is a plain reducer: feed it a [`SyncEvent`], apply the
//! returned [`SyncEffect`]s to the view, in order. It runs on the UI
//! thread, holds no locks and never fails; invalid values are written
//! through as-is and document validity is someone else's concern.

use serde::Serialize;

use maestro_document::{extract_field, remove_field, set_field, FieldSpec};

/// Per-field sync state.
///
/// `UserOverridden` is a one-way latch: once the user has typed into the
/// dedicated input, free-text document edits no longer overwrite that
/// input. Clearing the input or resetting the document releases it.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FieldState {
    Unset,
    DerivedFromDocument,
    UserOverridden,
}

/// Transient latch that keeps a controller-initiated document write from
/// being re-processed as a user edit.
///
/// Armed synchronously before the write, cleared by the next [`SyncEvent::Tick`].
/// The widget delivers its change echo before that tick (event-queue
/// ordering), so exactly one pending render cycle is covered.
#[derive(Debug, Clone, Copy, Default)]
struct SyncGuard {
    remaining: u8,
}

impl SyncGuard {
    fn arm(&mut self) {
        self.remaining = 1;
    }

    fn clear(&mut self) {
        self.remaining = 0;
    }

    fn is_armed(&self) -> bool {
        self.remaining > 0
    }

    fn tick(&mut self) {
        self.remaining = self.remaining.saturating_sub(1);
    }
}

/// A form field paired with a location in the document.
#[derive(Debug, Clone)]
pub struct TrackedField {
    id: String,
    spec: FieldSpec,
    input: String,
    state: FieldState,
    guard: SyncGuard,
}

impl TrackedField {
    fn seed(id: String, spec: FieldSpec, document: &str) -> Self {
        let (input, state) = match extract_field(document, &spec) {
            Some(value) => (value, FieldState::DerivedFromDocument),
            None => (String::new(), FieldState::Unset),
        };
        Self {
            id,
            spec,
            input,
            state,
            guard: SyncGuard::default(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn state(&self) -> FieldState {
        self.state
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// The user typed a non-empty value into a dedicated input.
    InputEdited { field: String, value: String },
    /// The user cleared a dedicated input.
    InputCleared { field: String },
    /// The user edited the document text directly (or the widget echoed a
    /// controller-initiated write).
    DocumentEdited { text: String },
    /// External reset/import: reseed everything from the new document.
    Reset { document: String },
    /// Scheduler tick; expires pending guards. Emitted once per render cycle.
    Tick,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SyncEffect {
    /// Push a new value into a dedicated input.
    SetInput { field: String, value: String },
    /// Push new text into the document widget.
    SetDocument { text: String },
}

pub struct SyncController {
    document: String,
    fields: Vec<TrackedField>,
}

impl SyncController {
    /// Seed the controller from a freshly loaded document. Fields found in
    /// the document start `DerivedFromDocument`, the rest `Unset`.
    pub fn new(document: impl Into<String>, specs: Vec<(String, FieldSpec)>) -> Self {
        let document = document.into();
        let fields = specs
            .into_iter()
            .map(|(id, spec)| TrackedField::seed(id, spec, &document))
            .collect();
        Self { document, fields }
    }

    pub fn document(&self) -> &str {
        &self.document
    }

    pub fn fields(&self) -> &[TrackedField] {
        &self.fields
    }

    pub fn field(&self, id: &str) -> Option<&TrackedField> {
        self.fields.iter().find(|f| f.id == id)
    }

    /// Apply one event and return the effects the view must apply, in
    /// order. Document effects precede input effects so no intermediate
    /// inconsistent state is observable.
    pub fn apply(&mut self, event: SyncEvent) -> Vec<SyncEffect> {
        match event {
            SyncEvent::InputEdited { field, value } => {
                if value.is_empty() {
                    return self.clear_input(&field);
                }
                self.edit_input(&field, value)
            }
            SyncEvent::InputCleared { field } => self.clear_input(&field),
            SyncEvent::DocumentEdited { text } => self.document_edited(text),
            SyncEvent::Reset { document } => self.reset(document),
            SyncEvent::Tick => {
                for field in &mut self.fields {
                    field.guard.tick();
                }
                Vec::new()
            }
        }
    }

    fn edit_input(&mut self, field_id: &str, value: String) -> Vec<SyncEffect> {
        let Some(idx) = self.fields.iter().position(|f| f.id == field_id) else {
            tracing::warn!(field = field_id, "input edit for unknown tracked field");
            return Vec::new();
        };
        let field = &mut self.fields[idx];
        field.input = value.clone();
        field.state = FieldState::UserOverridden;

        let updated = set_field(&self.document, &field.spec, &value);
        if updated == self.document {
            return Vec::new();
        }
        // Guard must be armed before the document change becomes visible.
        field.guard.arm();
        self.document = updated;
        tracing::debug!(field = field_id, "input edit written through to document");
        vec![SyncEffect::SetDocument {
            text: self.document.clone(),
        }]
    }

    fn clear_input(&mut self, field_id: &str) -> Vec<SyncEffect> {
        let Some(idx) = self.fields.iter().position(|f| f.id == field_id) else {
            tracing::warn!(field = field_id, "input clear for unknown tracked field");
            return Vec::new();
        };
        let field = &mut self.fields[idx];
        field.input.clear();
        // Release the override latch so document-derived values can
        // populate the input again.
        field.state = FieldState::Unset;

        let updated = remove_field(&self.document, &field.spec);
        if updated == self.document {
            return Vec::new();
        }
        field.guard.arm();
        self.document = updated;
        tracing::debug!(field = field_id, "input cleared, field removed from document");
        vec![SyncEffect::SetDocument {
            text: self.document.clone(),
        }]
    }

    fn document_edited(&mut self, text: String) -> Vec<SyncEffect> {
        self.document = text;
        let mut effects = Vec::new();
        for field in &mut self.fields {
            if field.guard.is_armed() {
                // Echo of our own write; swallow it.
                continue;
            }
            match field.state {
                // Input wins: manual input is never silently overwritten by
                // free-text edits.
                FieldState::UserOverridden => {}
                FieldState::Unset | FieldState::DerivedFromDocument => {
                    match extract_field(&self.document, &field.spec) {
                        Some(value) => {
                            if value != field.input {
                                field.input = value.clone();
                                effects.push(SyncEffect::SetInput {
                                    field: field.id.clone(),
                                    value,
                                });
                            }
                            field.state = FieldState::DerivedFromDocument;
                        }
                        // Absent stays a non-event; the input keeps its
                        // last derived value.
                        None => {}
                    }
                }
            }
        }
        effects
    }

    fn reset(&mut self, document: String) -> Vec<SyncEffect> {
        self.document = document;
        let mut effects = vec![SyncEffect::SetDocument {
            text: self.document.clone(),
        }];
        for field in &mut self.fields {
            field.guard.clear();
            let (input, state) = match extract_field(&self.document, &field.spec) {
                Some(value) => (value, FieldState::DerivedFromDocument),
                None => (String::new(), FieldState::Unset),
            };
            field.input = input.clone();
            field.state = state;
            effects.push(SyncEffect::SetInput {
                field: field.id.clone(),
                value: input,
            });
        }
        tracing::debug!("sync controller reset from new document");
        effects
    }
}
