//! Runtime configuration, parsed from TOML.
//!
//! ```toml
//! [wiring]
//! parallel_threshold = 100
//! workers = 8
//!
//! [codec]
//! max_frame_bytes = 268435456
//!
//! [signing]
//! enabled = true
//! key_id = "packager"
//! private_key = "keys/packager.key"
//!
//! [signing.public_keys]
//! packager = "keys/packager.pub"
//! ```
//!
//! Relative key paths are resolved against the directory of the file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::codec::DEFAULT_FRAME_LIMIT;
use crate::error::ConfigError;
use crate::wiring::WiringConfig;

/// Complete runtime configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub wiring: WiringConfig,
    pub codec: CodecSettings,
    pub signing: SigningSettings,
}

/// Decoding bounds for serialized stores.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecSettings {
    /// Largest single value (name, blob, section) a stream may declare.
    pub max_frame_bytes: u64,
}

impl Default for CodecSettings {
    fn default() -> Self {
        Self {
            max_frame_bytes: DEFAULT_FRAME_LIMIT,
        }
    }
}

/// Where signing keys live and whether streams are signed at all.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SigningSettings {
    /// Serialize signed and accept only signed streams.
    pub enabled: bool,
    /// Alias written into signed streams.
    pub key_id: Option<String>,
    /// File with the 32-byte Ed25519 secret for `key_id`.
    pub private_key: Option<PathBuf>,
    /// Alias → file with a 32-byte Ed25519 public key.
    pub public_keys: HashMap<String, PathBuf>,
}

impl RuntimeConfig {
    /// Parse configuration text. `origin` is only used in error messages.
    pub fn from_toml_str(text: &str, origin: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError::Parse {
            path: origin.to_string(),
            message: e.to_string(),
        })
    }

    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        let mut config = Self::from_toml_str(&text, &path.display().to_string())?;
        if let Some(base) = path.parent() {
            config.signing.resolve_paths(base);
        }
        Ok(config)
    }
}

impl SigningSettings {
    fn resolve_paths(&mut self, base: &Path) {
        if let Some(private_key) = self.private_key.take() {
            self.private_key = Some(base.join(private_key));
        }
        for path in self.public_keys.values_mut() {
            *path = base.join(&*path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_yields_defaults() {
        let config = RuntimeConfig::from_toml_str("", "<inline>").unwrap();
        assert_eq!(config, RuntimeConfig::default());
        assert_eq!(config.wiring.parallel_threshold, 100);
        assert_eq!(config.codec.max_frame_bytes, DEFAULT_FRAME_LIMIT);
        assert!(!config.signing.enabled);
    }

    #[test]
    fn parses_all_sections() {
        let text = r#"
            [wiring]
            parallel_threshold = 50
            workers = 4

            [codec]
            max_frame_bytes = 4096

            [signing]
            enabled = true
            key_id = "packager"
            private_key = "packager.key"

            [signing.public_keys]
            packager = "packager.pub"
        "#;
        let config = RuntimeConfig::from_toml_str(text, "<inline>").unwrap();
        assert_eq!(config.wiring.parallel_threshold, 50);
        assert_eq!(config.wiring.workers, Some(4));
        assert_eq!(config.codec.max_frame_bytes, 4096);
        assert!(config.signing.enabled);
        assert_eq!(config.signing.key_id.as_deref(), Some("packager"));
        assert_eq!(
            config.signing.public_keys.get("packager"),
            Some(&PathBuf::from("packager.pub"))
        );
    }

    #[test]
    fn invalid_toml_is_a_parse_error() {
        let err = RuntimeConfig::from_toml_str("[wiring\n", "broken.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { path, .. } if path == "broken.toml"));
    }

    #[test]
    fn load_resolves_key_paths_relative_to_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("units.toml");
        std::fs::write(
            &path,
            "[signing]\nenabled = true\nprivate_key = \"k.key\"\n[signing.public_keys]\nk = \"k.pub\"\n",
        )
        .unwrap();
        let config = RuntimeConfig::load(&path).unwrap();
        assert_eq!(config.signing.private_key, Some(dir.path().join("k.key")));
        assert_eq!(config.signing.public_keys["k"], dir.path().join("k.pub"));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = RuntimeConfig::load(Path::new("/nonexistent/units.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
