//! Signed transport codec for whole unit stores.
//!
//! Only the blob section is signed: handler values and definitions travel
//! unsigned after it. Materialized units never travel, so every decoded store
//! is dirty and must reload before use.
//!
//! - [`Envelope`]: the raw frame, independent of the handler type
//! - [`KeyProvider`] / [`KeyRing`]: signing capability passed at construction
//! - [`SignedCodec`]: encodes and decodes typed stores through envelopes

pub mod envelope;
pub mod error;
pub mod keys;

use std::io::{Read, Write};
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;

pub use envelope::{DEFAULT_FRAME_LIMIT, Envelope};
pub use error::{CodecError, CodecResult};
pub use keys::{KeyProvider, KeyRing};

use crate::config::RuntimeConfig;
use crate::error::ConfigError;
use crate::handler::Handler;
use crate::store::{UnitStore, WireState};

/// Serializes and deserializes stores, signing the blob section when keys are set.
#[derive(Clone)]
pub struct SignedCodec {
    keys: Option<Arc<dyn KeyProvider>>,
    frame_limit: u64,
}

impl SignedCodec {
    /// Codec for environments that exchange unsigned stores.
    pub fn unsigned() -> Self {
        Self {
            keys: None,
            frame_limit: DEFAULT_FRAME_LIMIT,
        }
    }

    /// Codec for environments that require signed stores.
    pub fn signed(keys: Arc<dyn KeyProvider>) -> Self {
        Self {
            keys: Some(keys),
            frame_limit: DEFAULT_FRAME_LIMIT,
        }
    }

    /// Largest single value a decoded frame may declare, in bytes.
    pub fn with_frame_limit(mut self, limit: u64) -> Self {
        self.frame_limit = limit;
        self
    }

    /// Build from the `[codec]` and `[signing]` sections of `config`.
    pub fn from_config(config: &RuntimeConfig) -> Result<Self, ConfigError> {
        let codec = if config.signing.enabled {
            Self::signed(Arc::new(KeyRing::from_settings(&config.signing)?))
        } else {
            Self::unsigned()
        };
        Ok(codec.with_frame_limit(config.codec.max_frame_bytes))
    }

    pub fn is_signed(&self) -> bool {
        self.keys.is_some()
    }

    pub fn frame_limit(&self) -> u64 {
        self.frame_limit
    }

    // -----------------------------------------------------------------------
    // Encoding
    // -----------------------------------------------------------------------

    /// Build the frame for `store`.
    pub fn encode<H>(&self, store: &UnitStore<H>) -> CodecResult<Envelope>
    where
        H: Handler + Serialize,
    {
        let blob_section = envelope::encode_blob_section(&store.blobs)?;

        let (key_id, signature) = match &self.keys {
            Some(keys) => {
                let key_id = keys
                    .signing_key_id()
                    .ok_or(CodecError::MissingSigningKey)?
                    .to_string();
                let signature = keys.sign(&blob_section)?;
                (Some(key_id), Some(signature))
            }
            None => (None, None),
        };

        let mut bindings = store
            .bindings
            .iter()
            .map(|(name, handler)| -> CodecResult<(String, Vec<u8>)> {
                Ok((name.clone(), bincode::serialize(handler.as_ref())?))
            })
            .collect::<CodecResult<Vec<_>>>()?;
        bindings.sort_by(|a, b| a.0.cmp(&b.0));

        let mut definitions: Vec<(String, Vec<u8>)> = store
            .definitions
            .iter()
            .map(|(name, bytes)| (name.clone(), bytes.clone()))
            .collect();
        definitions.sort_by(|a, b| a.0.cmp(&b.0));

        Ok(Envelope {
            key_id,
            blob_section,
            signature,
            bindings,
            definitions,
        })
    }

    /// Serialize `store` into `w`.
    pub fn serialize<H, W>(&self, store: &UnitStore<H>, w: W) -> CodecResult<()>
    where
        H: Handler + Serialize,
        W: Write,
    {
        let envelope = self.encode(store)?;
        envelope.write_to(w)?;
        tracing::info!(
            blobs = store.blobs.len(),
            bindings = envelope.bindings.len(),
            definitions = envelope.definitions.len(),
            signed = envelope.is_signed(),
            "serialized unit store"
        );
        Ok(())
    }

    pub fn to_bytes<H>(&self, store: &UnitStore<H>) -> CodecResult<Vec<u8>>
    where
        H: Handler + Serialize,
    {
        let mut buf = Vec::new();
        self.serialize(store, &mut buf)?;
        Ok(buf)
    }

    // -----------------------------------------------------------------------
    // Decoding
    // -----------------------------------------------------------------------

    /// Read a frame, rejecting it before the rest of the stream is consumed
    /// if its signed flag disagrees with this codec. The signature is checked
    /// as soon as it has been read, before the unsigned sections.
    pub fn read_envelope<R: Read>(&self, mut r: R) -> CodecResult<Envelope> {
        let signed = envelope::read_signed_flag(&mut r)?;
        if signed != self.is_signed() {
            return Err(CodecError::ConfigurationMismatch {
                local: signing_label(self.is_signed()).into(),
                stream: signing_label(signed).into(),
            });
        }
        let mut envelope = Envelope::read_head(&mut r, signed, self.frame_limit)?;
        self.verify(&envelope)?;
        envelope.read_tail(&mut r, self.frame_limit)?;
        Ok(envelope)
    }

    /// Check a frame's signature against this codec's keys.
    pub fn verify(&self, envelope: &Envelope) -> CodecResult<()> {
        if envelope.is_signed() != self.is_signed() {
            return Err(CodecError::ConfigurationMismatch {
                local: signing_label(self.is_signed()).into(),
                stream: signing_label(envelope.is_signed()).into(),
            });
        }
        if let (Some(keys), Some(key_id)) = (&self.keys, &envelope.key_id) {
            let signature = envelope.signature.as_deref().unwrap_or_default();
            keys.verify(key_id, &envelope.blob_section, signature)?;
        }
        Ok(())
    }

    /// Deserialize into `store`, extending its maps and marking it dirty.
    ///
    /// Everything is decoded and verified before `store` is touched, so on
    /// error the store is exactly as it was.
    pub fn read_into<H, R>(&self, r: R, store: &mut UnitStore<H>) -> CodecResult<()>
    where
        H: Handler + DeserializeOwned,
        R: Read,
    {
        let envelope = self.read_envelope(r)?;
        let blobs = envelope.blobs()?;
        let bindings = envelope
            .bindings
            .iter()
            .map(|(name, bytes)| -> CodecResult<(String, Arc<H>)> {
                Ok((name.clone(), Arc::new(envelope::decode_value::<H>(bytes)?)))
            })
            .collect::<CodecResult<Vec<_>>>()?;

        let counts = (blobs.len(), bindings.len(), envelope.definitions.len());
        store.blobs.extend(blobs);
        store.bindings.extend(bindings);
        store.definitions.extend(envelope.definitions);
        store.state = WireState::Dirty;

        tracing::info!(
            blobs = counts.0,
            bindings = counts.1,
            definitions = counts.2,
            signed = self.is_signed(),
            "deserialized unit store"
        );
        Ok(())
    }

    /// Deserialize into a new detached store.
    pub fn deserialize<H, R>(&self, r: R) -> CodecResult<UnitStore<H>>
    where
        H: Handler + DeserializeOwned,
        R: Read,
    {
        let mut store = UnitStore::new();
        self.read_into(r, &mut store)?;
        Ok(store)
    }

    pub fn from_bytes<H>(&self, bytes: &[u8]) -> CodecResult<UnitStore<H>>
    where
        H: Handler + DeserializeOwned,
    {
        self.deserialize(bytes)
    }
}

impl std::fmt::Debug for SignedCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignedCodec")
            .field("signed", &self.is_signed())
            .field("frame_limit", &self.frame_limit)
            .finish()
    }
}

fn signing_label(signed: bool) -> &'static str {
    if signed { "signed" } else { "unsigned" }
}

#[cfg(test)]
mod tests {
    use ed25519_dalek::SigningKey;
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Invoker {
        target: String,
    }

    impl Handler for Invoker {}

    fn sample() -> UnitStore<Invoker> {
        let mut store = UnitStore::new();
        store.write("org/rules/Rule_1.unit", vec![0xCA, 0xFE]);
        store.write("org/rules/Rule_2.unit", vec![1, 2, 3]);
        store.put_handler(
            "org.rules.Rule_1",
            Arc::new(Invoker {
                target: "consequence".into(),
            }),
        );
        store.put_definition("org.rules.Fact", vec![42]);
        store
    }

    fn signed_codec() -> SignedCodec {
        let ring = KeyRing::new().with_signer("packager", SigningKey::from_bytes(&[5u8; 32]));
        SignedCodec::signed(Arc::new(ring))
    }

    #[test]
    fn unsigned_round_trip_marks_dirty() {
        let codec = SignedCodec::unsigned();
        let bytes = codec.to_bytes(&sample()).unwrap();
        let back: UnitStore<Invoker> = codec.from_bytes(&bytes).unwrap();

        assert_eq!(back.read("org/rules/Rule_1.unit"), Some(&[0xCA, 0xFE][..]));
        assert_eq!(back.read("org/rules/Rule_2.unit"), Some(&[1, 2, 3][..]));
        assert_eq!(back.handler("org.rules.Rule_1").unwrap().target, "consequence");
        assert!(back.has_definition("org.rules.Fact"));
        assert!(back.is_dirty());
        assert!(back.pending().is_empty());
    }

    #[test]
    fn signed_round_trip() {
        let codec = signed_codec();
        let bytes = codec.to_bytes(&sample()).unwrap();
        let back: UnitStore<Invoker> = codec.from_bytes(&bytes).unwrap();
        assert_eq!(back.len(), 2);
        assert!(back.is_dirty());
    }

    #[test]
    fn encoding_is_deterministic() {
        let codec = signed_codec();
        let store = sample();
        assert_eq!(codec.to_bytes(&store).unwrap(), codec.to_bytes(&store).unwrap());
    }

    #[test]
    fn signed_stream_rejected_by_unsigned_codec() {
        let bytes = signed_codec().to_bytes(&sample()).unwrap();
        let err = SignedCodec::unsigned()
            .from_bytes::<Invoker>(&bytes)
            .unwrap_err();
        assert!(matches!(
            err,
            CodecError::ConfigurationMismatch { ref local, ref stream }
                if local == "unsigned" && stream == "signed"
        ));
    }

    #[test]
    fn signing_without_private_key_fails() {
        let public = SigningKey::from_bytes(&[5u8; 32]).verifying_key();
        let codec = SignedCodec::signed(Arc::new(KeyRing::new().with_public_key("packager", public)));
        let err = codec.to_bytes(&sample()).unwrap_err();
        assert!(matches!(err, CodecError::MissingSigningKey));
    }

    #[test]
    fn verify_only_codec_accepts_signed_stream() {
        let bytes = signed_codec().to_bytes(&sample()).unwrap();
        let public = SigningKey::from_bytes(&[5u8; 32]).verifying_key();
        let reader =
            SignedCodec::signed(Arc::new(KeyRing::new().with_public_key("packager", public)));
        let back: UnitStore<Invoker> = reader.from_bytes(&bytes).unwrap();
        assert_eq!(back.len(), 2);
    }

    #[test]
    fn wrong_handler_type_is_an_encoding_error() {
        #[derive(Debug, Serialize, Deserialize)]
        struct Wide {
            a: u64,
            b: u64,
            c: u64,
        }
        impl Handler for Wide {}

        let codec = SignedCodec::unsigned();
        let bytes = codec.to_bytes(&sample()).unwrap();
        let mut target: UnitStore<Wide> = UnitStore::new();
        target.write("x/Keep.unit", vec![1]);
        let err = codec.read_into(bytes.as_slice(), &mut target).unwrap_err();
        assert!(matches!(err, CodecError::Encoding { .. } | CodecError::Io { .. }));
        assert_eq!(target.list(), vec!["x/Keep.unit".to_string()]);
        assert!(!target.is_dirty());
    }
}
