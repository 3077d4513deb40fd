//! Registry endpoint configuration.

use crate::{RemoteError, PROTOCOL_VERSION};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Where and how a registry is reached.
///
/// Persisted at `~/.config/stevedore/registry.json` and overridable per
/// invocation through [`RegistryConfig::resolve`]. The `namespace` is the
/// path segment bundles are published under, so one registry can host
/// several independent bundle collections.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Base URL; a bare host is reached over https.
    pub url: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default)]
    pub auth_token: Option<String>,
    /// Protocol the file was written for. Files from a newer engine are
    /// rejected on load instead of being half-understood.
    #[serde(default = "current_protocol")]
    pub protocol: u32,
}

fn default_namespace() -> String {
    "bundles".to_owned()
}

fn current_protocol() -> u32 {
    PROTOCOL_VERSION
}

impl RegistryConfig {
    pub fn new(url: &str) -> Self {
        let url = url.trim_end_matches('/');
        let url = if url.contains("://") {
            url.to_owned()
        } else {
            format!("https://{url}")
        };
        Self {
            url,
            namespace: default_namespace(),
            auth_token: None,
            protocol: PROTOCOL_VERSION,
        }
    }

    #[must_use]
    pub fn with_token(mut self, token: &str) -> Self {
        self.auth_token = Some(token.to_owned());
        self
    }

    #[must_use]
    pub fn with_namespace(mut self, namespace: &str) -> Self {
        self.namespace = namespace.trim_matches('/').to_owned();
        self
    }

    /// Effective config for one invocation: an explicit URL replaces the
    /// config file entirely, an explicit token overrides the file's token.
    pub fn resolve(url: Option<&str>, token: Option<&str>) -> Result<Self, RemoteError> {
        let mut config = match url {
            Some(url) => Self::new(url),
            None => Self::load_default()?,
        };
        if let Some(token) = token {
            config.auth_token = Some(token.to_owned());
        }
        Ok(config)
    }

    /// Load config from `~/.config/stevedore/registry.json`.
    pub fn load_default() -> Result<Self, RemoteError> {
        let path = default_config_path()?;
        if !path.exists() {
            return Err(RemoteError::Config(format!(
                "no registry configured; pass a registry URL or create {}",
                path.display()
            )));
        }
        Self::load(&path)
    }

    pub fn load(path: &Path) -> Result<Self, RemoteError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| RemoteError::Config(format!("invalid registry config: {e}")))?;
        if config.protocol > PROTOCOL_VERSION {
            return Err(RemoteError::Config(format!(
                "registry config {} requires protocol {} (this engine speaks {PROTOCOL_VERSION})",
                path.display(),
                config.protocol
            )));
        }
        Ok(config)
    }

    /// Write the config atomically; a crash mid-save never leaves a
    /// truncated file behind.
    pub fn save(&self, path: &Path) -> Result<(), RemoteError> {
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(parent)?;
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| RemoteError::Serialization(e.to_string()))?;
        let mut tmp = NamedTempFile::new_in(parent)?;
        tmp.write_all(content.as_bytes())?;
        tmp.persist(path).map_err(|e| RemoteError::Io(e.error))?;
        Ok(())
    }
}

fn default_config_path() -> Result<PathBuf, RemoteError> {
    let home = std::env::var("HOME").map_err(|_| RemoteError::Config("HOME not set".to_owned()))?;
    Ok(PathBuf::from(home).join(".config/stevedore/registry.json"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.json");

        let config = RegistryConfig::new("https://registry.example.com/v1")
            .with_token("secret123")
            .with_namespace("team-bundles");
        config.save(&path).unwrap();

        let loaded = RegistryConfig::load(&path).unwrap();
        assert_eq!(loaded.url, "https://registry.example.com/v1");
        assert_eq!(loaded.namespace, "team-bundles");
        assert_eq!(loaded.auth_token.as_deref(), Some("secret123"));
        assert_eq!(loaded.protocol, PROTOCOL_VERSION);
    }

    #[test]
    fn save_replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.json");
        RegistryConfig::new("https://old.example.com").save(&path).unwrap();
        RegistryConfig::new("https://new.example.com").save(&path).unwrap();
        assert_eq!(RegistryConfig::load(&path).unwrap().url, "https://new.example.com");
    }

    #[test]
    fn bare_host_defaults_to_https_and_trailing_slash_is_stripped() {
        assert_eq!(RegistryConfig::new("reg.example.com").url, "https://reg.example.com");
        assert_eq!(RegistryConfig::new("http://example.com/").url, "http://example.com");
    }

    #[test]
    fn missing_fields_get_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.json");
        std::fs::write(&path, r#"{"url": "https://example.com"}"#).unwrap();

        let loaded = RegistryConfig::load(&path).unwrap();
        assert_eq!(loaded.namespace, "bundles");
        assert!(loaded.auth_token.is_none());
        assert_eq!(loaded.protocol, PROTOCOL_VERSION);
    }

    #[test]
    fn newer_protocol_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.json");
        std::fs::write(
            &path,
            format!(r#"{{"url": "https://example.com", "protocol": {}}}"#, PROTOCOL_VERSION + 1),
        )
        .unwrap();

        let err = RegistryConfig::load(&path).unwrap_err();
        assert!(err.to_string().contains("protocol"));
    }

    #[test]
    fn resolve_prefers_explicit_url_and_token() {
        let config = RegistryConfig::resolve(Some("reg.example.com"), Some("cli-token")).unwrap();
        assert_eq!(config.url, "https://reg.example.com");
        assert_eq!(config.auth_token.as_deref(), Some("cli-token"));
    }
}
