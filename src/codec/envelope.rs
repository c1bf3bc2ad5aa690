//! Raw frame of a serialized store, readable without knowing the handler type.
//!
//! Layout, in order:
//!
//! ```text
//! signed: bool
//! if signed: key_id: string
//! blob_section: bytes        (i32 count, then count x (name: string, bytes))
//! if signed: signature: bytes
//! binding_count: i32, then count x (name: string, handler: bytes)
//! definition_count: i32, then count x (name: string, bytes)
//! ```
//!
//! Primitives use bincode's fixed-width little-endian encoding; strings and
//! byte buffers carry a u64 length prefix. Decoding refuses any value whose
//! declared length exceeds the frame limit, so a forged prefix cannot force
//! a huge allocation.

use std::collections::HashMap;
use std::io::{Read, Write};

use bincode::Options;
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::error::{CodecError, CodecResult};

/// Largest single value (alias, name, blob or section) a frame may declare: 256 MiB.
pub const DEFAULT_FRAME_LIMIT: u64 = 256 * 1024 * 1024;

/// One serialized store frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Signer alias; present exactly when the frame is signed.
    pub key_id: Option<String>,
    /// Encoded blob map, the only signed region.
    pub blob_section: Vec<u8>,
    pub signature: Option<Vec<u8>>,
    /// Handler values, each bincode-encoded on its own.
    pub bindings: Vec<(String, Vec<u8>)>,
    pub definitions: Vec<(String, Vec<u8>)>,
}

impl Envelope {
    pub fn is_signed(&self) -> bool {
        self.key_id.is_some()
    }

    /// Write the frame to `w`.
    pub fn write_to<W: Write>(&self, mut w: W) -> CodecResult<()> {
        put(&mut w, &self.is_signed())?;
        if let Some(key_id) = &self.key_id {
            put(&mut w, key_id)?;
        }
        put(&mut w, &self.blob_section)?;
        if self.is_signed() {
            let signature = self.signature.as_deref().unwrap_or_default();
            put(&mut w, signature)?;
        }
        write_pairs(&mut w, &self.bindings)?;
        write_pairs(&mut w, &self.definitions)?;
        w.flush().map_err(|source| CodecError::Io { source })
    }

    /// Read a complete frame from `r` under [`DEFAULT_FRAME_LIMIT`].
    pub fn read_from<R: Read>(r: R) -> CodecResult<Self> {
        Self::read_from_limited(r, DEFAULT_FRAME_LIMIT)
    }

    /// Read a complete frame, rejecting any single value larger than `limit` bytes.
    pub fn read_from_limited<R: Read>(mut r: R, limit: u64) -> CodecResult<Self> {
        let signed = read_signed_flag(&mut r)?;
        let mut envelope = Self::read_head(&mut r, signed, limit)?;
        envelope.read_tail(&mut r, limit)?;
        Ok(envelope)
    }

    /// Read key id, blob section and signature: everything verification needs.
    /// Bindings and definitions are left empty.
    pub(crate) fn read_head<R: Read>(mut r: R, signed: bool, limit: u64) -> CodecResult<Self> {
        let key_id: Option<String> = if signed {
            Some(take(&mut r, limit)?)
        } else {
            None
        };
        let blob_section: Vec<u8> = take(&mut r, limit)?;
        let signature: Option<Vec<u8>> = if signed {
            Some(take(&mut r, limit)?)
        } else {
            None
        };
        Ok(Self {
            key_id,
            blob_section,
            signature,
            bindings: Vec::new(),
            definitions: Vec::new(),
        })
    }

    /// Read the unsigned sections that follow the signature.
    pub(crate) fn read_tail<R: Read>(&mut self, mut r: R, limit: u64) -> CodecResult<()> {
        self.bindings = read_pairs(&mut r, limit)?;
        self.definitions = read_pairs(&mut r, limit)?;
        Ok(())
    }

    /// Decode the blob section into `(key, bytes)` pairs.
    pub fn blobs(&self) -> CodecResult<Vec<(String, Vec<u8>)>> {
        read_pairs(self.blob_section.as_slice(), self.blob_section.len() as u64)
    }
}

/// Read only the leading signed flag.
pub(crate) fn read_signed_flag<R: Read>(r: R) -> CodecResult<bool> {
    take(r, 1)
}

/// Decode one value that was encoded on its own, such as a handler.
pub(crate) fn decode_value<T: DeserializeOwned>(bytes: &[u8]) -> CodecResult<T> {
    Ok(options(bytes.len() as u64).deserialize(bytes)?)
}

/// Encode a blob map as a self-contained section, sorted by key so the
/// signed bytes are reproducible.
pub fn encode_blob_section(blobs: &HashMap<String, Vec<u8>>) -> CodecResult<Vec<u8>> {
    let mut entries: Vec<(String, Vec<u8>)> = blobs
        .iter()
        .map(|(key, bytes)| (key.clone(), bytes.clone()))
        .collect();
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    let mut section = Vec::new();
    write_pairs(&mut section, &entries)?;
    Ok(section)
}

fn put<W: Write, T: Serialize + ?Sized>(w: W, value: &T) -> CodecResult<()> {
    bincode::serialize_into(w, value)?;
    Ok(())
}

/// Fixed-width little-endian options, identical on the wire to `bincode::serialize`,
/// with every length prefix checked against `limit` before allocating.
fn options(limit: u64) -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .allow_trailing_bytes()
        .with_limit(limit)
}

fn take<R: Read, T: DeserializeOwned>(r: R, limit: u64) -> CodecResult<T> {
    Ok(options(limit).deserialize_from(r)?)
}

fn write_pairs<W: Write>(mut w: W, pairs: &[(String, Vec<u8>)]) -> CodecResult<()> {
    let count = i32::try_from(pairs.len()).map_err(|_| CodecError::Encoding {
        message: format!("{} entries exceed the i32 count field", pairs.len()),
    })?;
    put(&mut w, &count)?;
    for (name, bytes) in pairs {
        put(&mut w, name)?;
        put(&mut w, bytes)?;
    }
    Ok(())
}

fn read_pairs<R: Read>(mut r: R, limit: u64) -> CodecResult<Vec<(String, Vec<u8>)>> {
    let count: i32 = take(&mut r, limit)?;
    let count = usize::try_from(count).map_err(|_| CodecError::Encoding {
        message: format!("negative entry count {count}"),
    })?;
    // Counts come from the stream; do not trust them for preallocation.
    let mut pairs = Vec::with_capacity(count.min(1024));
    for _ in 0..count {
        let name: String = take(&mut r, limit)?;
        let bytes: Vec<u8> = take(&mut r, limit)?;
        pairs.push((name, bytes));
    }
    Ok(pairs)
}
