use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::fs;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Default)]
struct SettingsLayers {
    global: Value,
    project: Value,
    runtime: Value,
}

/// Layered JSON settings: global < project < runtime.
///
/// Global and project layers persist to disk; the runtime layer lives only
/// for the session. Reads merge all three, later layers winning per key.
#[derive(Clone)]
pub struct SettingsStore {
    project_path: PathBuf,
    global_path: PathBuf,
    layers: Arc<RwLock<SettingsLayers>>,
}

impl SettingsStore {
    pub async fn new(project_path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let global_path = resolve_global_settings_path().await?;
        Self::with_paths(project_path, global_path).await
    }

    pub async fn with_paths(
        project_path: impl AsRef<Path>,
        global_path: impl AsRef<Path>,
    ) -> anyhow::Result<Self> {
        let project_path = project_path.as_ref().to_path_buf();
        let global_path = global_path.as_ref().to_path_buf();
        if let Some(parent) = project_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut global = read_json_file(&global_path).await;
        let mut project = read_json_file(&project_path).await;
        scrub_persisted_secrets(&mut global, &global_path).await?;
        scrub_persisted_secrets(&mut project, &project_path).await?;

        let layers = SettingsLayers {
            global,
            project,
            runtime: empty_object(),
        };

        Ok(Self {
            project_path,
            global_path,
            layers: Arc::new(RwLock::new(layers)),
        })
    }

    pub async fn get_effective(&self) -> Value {
        let layers = self.layers.read().await;
        let mut merged = empty_object();
        deep_merge(&mut merged, &layers.global);
        deep_merge(&mut merged, &layers.project);
        deep_merge(&mut merged, &layers.runtime);
        merged
    }

    pub async fn get_project(&self) -> Value {
        self.layers.read().await.project.clone()
    }

    pub async fn get_global(&self) -> Value {
        self.layers.read().await.global.clone()
    }

    pub async fn patch_project(&self, patch: Value) -> anyhow::Result<Value> {
        {
            let mut layers = self.layers.write().await;
            deep_merge(&mut layers.project, &patch);
        }
        self.save_project().await?;
        Ok(self.get_effective().await)
    }

    pub async fn patch_global(&self, patch: Value) -> anyhow::Result<Value> {
        {
            let mut layers = self.layers.write().await;
            deep_merge(&mut layers.global, &patch);
        }
        self.save_global().await?;
        Ok(self.get_effective().await)
    }

    pub async fn patch_runtime(&self, patch: Value) -> anyhow::Result<Value> {
        {
            let mut layers = self.layers.write().await;
            deep_merge(&mut layers.runtime, &patch);
        }
        Ok(self.get_effective().await)
    }

    pub async fn replace_project(&self, value: Value) -> anyhow::Result<Value> {
        {
            let mut layers = self.layers.write().await;
            layers.project = value;
        }
        self.save_project().await?;
        Ok(self.get_effective().await)
    }

    async fn save_project(&self) -> anyhow::Result<()> {
        let snapshot = self.layers.read().await.project.clone();
        write_json_file(&self.project_path, &snapshot).await
    }

    async fn save_global(&self) -> anyhow::Result<()> {
        let snapshot = self.layers.read().await.global.clone();
        write_json_file(&self.global_path, &snapshot).await
    }
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

/// Later layers win per key; objects merge recursively, everything else
/// replaces. Null overlay values are ignored.
pub fn deep_merge(base: &mut Value, overlay: &Value) {
    if overlay.is_null() {
        return;
    }
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                if value.is_null() {
                    continue;
                }
                match base_map.get_mut(key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        base_map.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (base_value, overlay_value) => {
            *base_value = overlay_value.clone();
        }
    }
}

/// Secrets never persist in settings layers; they belong to the
/// credentials blob next to each provider entry.
fn strip_persisted_secrets(value: &mut Value) {
    let Some(root) = value.as_object_mut() else {
        return;
    };
    let Some(providers) = root.get_mut("providers").and_then(|v| v.as_object_mut()) else {
        return;
    };
    for (provider_id, provider_cfg) in providers.iter_mut() {
        let Value::Object(cfg) = provider_cfg else {
            continue;
        };
        if cfg.remove("api_key").is_some() | cfg.remove("apiKey").is_some() {
            tracing::debug!(provider = %provider_id, "stripped persisted api key from settings");
        }
    }
}

async fn scrub_persisted_secrets(value: &mut Value, path: &Path) -> anyhow::Result<()> {
    let before = value.clone();
    strip_persisted_secrets(value);
    if *value != before {
        write_json_file(path, value).await?;
    }
    Ok(())
}

async fn read_json_file(path: &Path) -> Value {
    if !path.exists() {
        return empty_object();
    }
    match fs::read_to_string(path).await {
        Ok(raw) => serde_json::from_str::<Value>(&raw).unwrap_or_else(|e| {
            tracing::warn!(path = %path.display(), error = %e, "ignoring malformed settings file");
            empty_object()
        }),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to read settings file");
            empty_object()
        }
    }
}

async fn write_json_file(path: &Path, value: &Value) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let mut to_write = value.clone();
    strip_persisted_secrets(&mut to_write);
    let raw = serde_json::to_string_pretty(&to_write)?;
    fs::write(path, raw).await?;
    Ok(())
}

async fn resolve_global_settings_path() -> anyhow::Result<PathBuf> {
    if let Ok(path) = std::env::var("MAESTRO_GLOBAL_SETTINGS") {
        let path = PathBuf::from(path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        return Ok(path);
    }
    if let Some(config_dir) = dirs::config_dir() {
        let path = config_dir.join("maestro").join("settings.json");
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        return Ok(path);
    }
    Ok(PathBuf::from(".maestro/global_settings.json"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    async fn store(dir: &TempDir) -> SettingsStore {
        SettingsStore::with_paths(
            dir.path().join("project").join("settings.json"),
            dir.path().join("global").join("settings.json"),
        )
        .await
        .expect("store")
    }

    #[tokio::test]
    async fn project_layer_overrides_global() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;

        store
            .patch_global(json!({"theme": "light", "telemetry": false}))
            .await
            .unwrap();
        let effective = store.patch_project(json!({"theme": "dark"})).await.unwrap();

        assert_eq!(effective["theme"], "dark");
        assert_eq!(effective["telemetry"], false);
    }

    #[tokio::test]
    async fn runtime_layer_wins_but_does_not_persist() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;

        store.patch_project(json!({"theme": "dark"})).await.unwrap();
        let effective = store.patch_runtime(json!({"theme": "solar"})).await.unwrap();
        assert_eq!(effective["theme"], "solar");

        // A fresh store sees only the persisted layers.
        let reloaded = SettingsStore::with_paths(
            dir.path().join("project").join("settings.json"),
            dir.path().join("global").join("settings.json"),
        )
        .await
        .unwrap();
        assert_eq!(reloaded.get_effective().await["theme"], "dark");
    }

    #[tokio::test]
    async fn api_keys_never_reach_disk() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;

        store
            .patch_project(json!({"providers": {"openai": {"api_key": "sk-leak", "endpoint": "https://x"}}}))
            .await
            .unwrap();

        let raw = std::fs::read_to_string(dir.path().join("project").join("settings.json")).unwrap();
        assert!(!raw.contains("sk-leak"));
        assert!(raw.contains("endpoint"));
    }

    #[tokio::test]
    async fn malformed_settings_file_loads_as_empty() {
        let dir = TempDir::new().unwrap();
        let project = dir.path().join("settings.json");
        std::fs::write(&project, "{not json").unwrap();

        let store = SettingsStore::with_paths(&project, dir.path().join("global.json"))
            .await
            .unwrap();
        assert_eq!(store.get_effective().await, json!({}));
    }

    #[test]
    fn deep_merge_replaces_scalars_and_merges_objects() {
        let mut base = json!({"a": {"b": 1, "c": 2}, "d": "x"});
        deep_merge(&mut base, &json!({"a": {"b": 9}, "d": null, "e": true}));
        assert_eq!(base, json!({"a": {"b": 9, "c": 2}, "d": "x", "e": true}));
    }
}
