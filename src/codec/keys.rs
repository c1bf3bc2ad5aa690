//! Signing keys for the blob section.
//!
//! [`KeyProvider`] is the capability the codec is constructed with; there is
//! no process-wide key store. [`KeyRing`] implements it with Ed25519.

use std::collections::HashMap;
use std::path::Path;

use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};

use super::error::{CodecError, CodecResult};
use crate::config::SigningSettings;
use crate::error::ConfigError;

/// Signs and verifies blob sections.
pub trait KeyProvider: Send + Sync {
    /// Alias of the private key used for signing, if one is configured.
    fn signing_key_id(&self) -> Option<&str>;

    /// Sign `data` with the private key.
    fn sign(&self, data: &[u8]) -> CodecResult<Vec<u8>>;

    /// Check `signature` over `data` with the public key registered as `key_id`.
    fn verify(&self, key_id: &str, data: &[u8], signature: &[u8]) -> CodecResult<()>;
}

/// Ed25519 key ring: one optional signing key plus any number of public keys.
#[derive(Default)]
pub struct KeyRing {
    signer: Option<(String, SigningKey)>,
    public_keys: HashMap<String, VerifyingKey>,
}

impl KeyRing {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate a fresh signing key from the OS RNG.
    pub fn generate(alias: impl Into<String>) -> Self {
        let key = SigningKey::generate(&mut rand::rngs::OsRng);
        Self::new().with_signer(alias, key)
    }

    /// Use `key` for signing. Its public half is registered under the same alias.
    pub fn with_signer(mut self, alias: impl Into<String>, key: SigningKey) -> Self {
        let alias = alias.into();
        self.public_keys.insert(alias.clone(), key.verifying_key());
        self.signer = Some((alias, key));
        self
    }

    pub fn with_public_key(mut self, alias: impl Into<String>, key: VerifyingKey) -> Self {
        self.public_keys.insert(alias.into(), key);
        self
    }

    /// Public key registered as `alias`.
    pub fn public_key(&self, alias: &str) -> Option<&VerifyingKey> {
        self.public_keys.get(alias)
    }

    /// The signing key, if configured.
    pub fn signing_key(&self) -> Option<&SigningKey> {
        self.signer.as_ref().map(|(_, key)| key)
    }

    /// Load key files named by `[signing]`. Key files hold 32 raw bytes.
    pub fn from_settings(settings: &SigningSettings) -> Result<Self, ConfigError> {
        let mut ring = Self::new();
        if let (Some(alias), Some(path)) = (&settings.key_id, &settings.private_key) {
            let bytes = read_key_file(path)?;
            ring = ring.with_signer(alias.clone(), SigningKey::from_bytes(&bytes));
        }
        for (alias, path) in &settings.public_keys {
            let bytes = read_key_file(path)?;
            let key = VerifyingKey::from_bytes(&bytes).map_err(|e| ConfigError::Key {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
            ring = ring.with_public_key(alias.clone(), key);
        }
        Ok(ring)
    }
}

impl KeyProvider for KeyRing {
    fn signing_key_id(&self) -> Option<&str> {
        self.signer.as_ref().map(|(alias, _)| alias.as_str())
    }

    fn sign(&self, data: &[u8]) -> CodecResult<Vec<u8>> {
        let (_, key) = self.signer.as_ref().ok_or(CodecError::MissingSigningKey)?;
        Ok(key.sign(data).to_bytes().to_vec())
    }

    fn verify(&self, key_id: &str, data: &[u8], signature: &[u8]) -> CodecResult<()> {
        let key = self
            .public_keys
            .get(key_id)
            .ok_or_else(|| CodecError::UnknownKey {
                key_id: key_id.to_string(),
            })?;
        let signature =
            Signature::from_slice(signature).map_err(|e| CodecError::SecurityViolation {
                key_id: key_id.to_string(),
                reason: format!("malformed signature: {e}"),
            })?;
        key.verify_strict(data, &signature)
            .map_err(|_| CodecError::SecurityViolation {
                key_id: key_id.to_string(),
                reason: "signature does not match the blob section".into(),
            })
    }
}

impl std::fmt::Debug for KeyRing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut aliases: Vec<&String> = self.public_keys.keys().collect();
        aliases.sort();
        f.debug_struct("KeyRing")
            .field("signer", &self.signing_key_id())
            .field("public_keys", &aliases)
            .finish()
    }
}

fn read_key_file(path: &Path) -> Result<[u8; 32], ConfigError> {
    let bytes = std::fs::read(path).map_err(|e| ConfigError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    <[u8; 32]>::try_from(bytes.as_slice()).map_err(|_| ConfigError::Key {
        path: path.display().to_string(),
        message: format!("expected 32 bytes, found {}", bytes.len()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ring() -> KeyRing {
        KeyRing::new().with_signer("packager", SigningKey::from_bytes(&[7u8; 32]))
    }

    #[test]
    fn sign_and_verify() {
        let ring = ring();
        let sig = ring.sign(b"section").unwrap();
        assert_eq!(sig.len(), 64);
        ring.verify("packager", b"section", &sig).unwrap();
    }

    #[test]
    fn tampered_data_is_a_violation() {
        let ring = ring();
        let sig = ring.sign(b"section").unwrap();
        let err = ring.verify("packager", b"sectioN", &sig).unwrap_err();
        assert!(matches!(err, CodecError::SecurityViolation { .. }));
    }

    #[test]
    fn short_signature_is_a_violation() {
        let err = ring().verify("packager", b"section", &[1, 2, 3]).unwrap_err();
        assert!(matches!(err, CodecError::SecurityViolation { .. }));
    }

    #[test]
    fn unknown_alias() {
        let err = ring().verify("stranger", b"x", &[0; 64]).unwrap_err();
        assert!(matches!(err, CodecError::UnknownKey { key_id } if key_id == "stranger"));
    }

    #[test]
    fn verify_only_ring_cannot_sign() {
        let public = SigningKey::from_bytes(&[7u8; 32]).verifying_key();
        let ring = KeyRing::new().with_public_key("packager", public);
        assert!(ring.signing_key_id().is_none());
        assert!(matches!(ring.sign(b"x"), Err(CodecError::MissingSigningKey)));
    }

    #[test]
    fn key_files_load_from_settings() {
        let dir = tempfile::TempDir::new().unwrap();
        let secret = SigningKey::from_bytes(&[3u8; 32]);
        std::fs::write(dir.path().join("packager.key"), secret.to_bytes()).unwrap();
        std::fs::write(
            dir.path().join("packager.pub"),
            secret.verifying_key().to_bytes(),
        )
        .unwrap();

        let settings = SigningSettings {
            enabled: true,
            key_id: Some("packager".into()),
            private_key: Some(dir.path().join("packager.key")),
            public_keys: [("other".to_string(), dir.path().join("packager.pub"))]
                .into_iter()
                .collect(),
        };
        let ring = KeyRing::from_settings(&settings).unwrap();
        assert_eq!(ring.signing_key_id(), Some("packager"));
        assert!(ring.public_key("other").is_some());
        let sig = ring.sign(b"data").unwrap();
        ring.verify("other", b"data", &sig).unwrap();
    }

    #[test]
    fn wrong_length_key_file_is_rejected() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("bad.pub");
        std::fs::write(&path, [0u8; 5]).unwrap();
        let err = read_key_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Key { .. }));
    }
}
