mod provider;

pub use provider::{ModelInfo, ProviderEntry, ProviderSummary, SelectedModel};
