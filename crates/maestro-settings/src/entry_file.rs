use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use maestro_observability::redact_text;
use serde::{Deserialize, Serialize};
use tokio::fs;

/// On-disk provider entry: the raw config document plus the name of each
/// credential slot it expects. Secret values live in the companion
/// credentials file, never here.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct EntryFile {
    #[serde(default)]
    pub auth: BTreeMap<String, String>,
    #[serde(default)]
    pub config: String,
}

/// Companion credentials blob (`<entry>.auth.json`).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CredentialsFile {
    #[serde(default)]
    pub keys: BTreeMap<String, String>,
}

impl CredentialsFile {
    pub fn has(&self, key: &str) -> bool {
        self.keys.get(key).map(|v| !v.trim().is_empty()).unwrap_or(false)
    }
}

/// The credentials blob lives next to its entry file.
pub fn credentials_path_for(entry_path: &Path) -> PathBuf {
    let stem = entry_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("entry");
    entry_path.with_file_name(format!("{stem}.auth.json"))
}

/// Missing file loads as an empty entry; a malformed one is an error the
/// caller surfaces (unlike settings layers, an entry file is explicit
/// user content).
pub async fn load_entry_file(path: &Path) -> anyhow::Result<EntryFile> {
    if !path.exists() {
        return Ok(EntryFile::default());
    }
    let raw = fs::read_to_string(path).await?;
    let entry = toml::from_str::<EntryFile>(&raw)
        .map_err(|e| anyhow::anyhow!("invalid entry file {}: {}", path.display(), e.message()))?;
    Ok(entry)
}

pub async fn save_entry_file(path: &Path, entry: &EntryFile) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let raw = toml::to_string_pretty(entry)?;
    fs::write(path, raw).await?;
    tracing::debug!(path = %path.display(), "saved provider entry file");
    Ok(())
}

pub async fn load_credentials(path: &Path) -> anyhow::Result<CredentialsFile> {
    if !path.exists() {
        return Ok(CredentialsFile::default());
    }
    let raw = fs::read_to_string(path).await?;
    Ok(serde_json::from_str(&raw)?)
}

pub async fn save_credentials(path: &Path, credentials: &CredentialsFile) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    for (key, value) in &credentials.keys {
        tracing::debug!(key = %key, value = %redact_text(value), "persisting credential");
    }
    let raw = serde_json::to_string_pretty(credentials)?;
    fs::write(path, raw).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn entry_file_round_trips_through_toml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("openai.toml");

        let mut entry = EntryFile::default();
        entry
            .auth
            .insert("OPENAI_API_KEY".to_string(), String::new());
        entry.config = "base_url = \"https://api.example.com/v1\"\n".to_string();

        save_entry_file(&path, &entry).await.unwrap();
        let loaded = load_entry_file(&path).await.unwrap();
        assert_eq!(loaded, entry);
    }

    #[tokio::test]
    async fn missing_entry_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let loaded = load_entry_file(&dir.path().join("none.toml")).await.unwrap();
        assert_eq!(loaded, EntryFile::default());
    }

    #[tokio::test]
    async fn malformed_entry_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "config = ").unwrap();
        assert!(load_entry_file(&path).await.is_err());
    }

    #[tokio::test]
    async fn credentials_round_trip_and_presence() {
        let dir = TempDir::new().unwrap();
        let entry_path = dir.path().join("openai.toml");
        let path = credentials_path_for(&entry_path);
        assert_eq!(path, dir.path().join("openai.auth.json"));

        let mut creds = CredentialsFile::default();
        creds
            .keys
            .insert("OPENAI_API_KEY".to_string(), "sk-test".to_string());
        save_credentials(&path, &creds).await.unwrap();

        let loaded = load_credentials(&path).await.unwrap();
        assert!(loaded.has("OPENAI_API_KEY"));
        assert!(!loaded.has("MISSING"));
    }
}
