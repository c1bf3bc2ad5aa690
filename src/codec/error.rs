//! Codec-specific error types with rich diagnostics.

use miette::Diagnostic;
use thiserror::Error;

/// Errors arising from serializing or deserializing a unit store.
#[derive(Debug, Error, Diagnostic)]
pub enum CodecError {
    #[error("this environment expects {local} stores, but the stream is {stream}")]
    #[diagnostic(
        code(units::codec::configuration_mismatch),
        help(
            "Serializer and deserializer must agree on signing. Enable `[signing]` \
             on both sides or on neither. Deserialization was aborted before any \
             state was touched."
        )
    )]
    ConfigurationMismatch { local: String, stream: String },

    #[error("signature check failed for key {key_id}: {reason}")]
    #[diagnostic(
        code(units::codec::security_violation),
        help(
            "The blob section does not match its signature. The stream was \
             tampered with or signed by a different key. Nothing was loaded."
        )
    )]
    SecurityViolation { key_id: String, reason: String },

    #[error("no public key registered for {key_id}")]
    #[diagnostic(
        code(units::codec::unknown_key),
        help(
            "The stream was signed with key \"{key_id}\". Add its public key to \
             `[signing.public_keys]` to verify it."
        )
    )]
    UnknownKey { key_id: String },

    #[error("signing is enabled but no private key is configured")]
    #[diagnostic(
        code(units::codec::missing_signing_key),
        help("Set `signing.key_id` and `signing.private_key` to serialize signed stores.")
    )]
    MissingSigningKey,

    #[error("malformed store stream: {message}")]
    #[diagnostic(
        code(units::codec::encoding),
        help(
            "The stream is truncated or was not produced by this codec. \
             Handler values must deserialize into the same handler type they were written from."
        )
    )]
    Encoding { message: String },

    #[error("I/O error: {source}")]
    #[diagnostic(
        code(units::codec::io),
        help("Reading or writing the underlying stream failed.")
    )]
    Io {
        #[source]
        source: std::io::Error,
    },
}

impl From<bincode::Error> for CodecError {
    fn from(err: bincode::Error) -> Self {
        match *err {
            bincode::ErrorKind::Io(source) => CodecError::Io { source },
            bincode::ErrorKind::SizeLimit => CodecError::Encoding {
                message: "declared length exceeds the frame limit".into(),
            },
            other => CodecError::Encoding {
                message: other.to_string(),
            },
        }
    }
}

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;
