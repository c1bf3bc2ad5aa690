//! Rich diagnostic error types for the unit runtime.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes and help text so callers know exactly which step failed
//! and what recovery is available.

use miette::Diagnostic;
use thiserror::Error;

pub use crate::codec::error::CodecError;

/// Top-level error type for the unit runtime.
#[derive(Debug, Error, Diagnostic)]
pub enum UnitsError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Loader(#[from] LoaderError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),
}

// ---------------------------------------------------------------------------
// Loader errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum LoaderError {
    #[error("unit not found: {name}")]
    #[diagnostic(
        code(units::loader::not_found),
        help(
            "Neither the local store nor the parent resolver knows this unit. \
             A handler bound without a matching blob ends up here; write the \
             blob or remove the stale binding."
        )
    )]
    UnitNotFound { name: String },

    #[error("failed to materialize unit {name}: {message}")]
    #[diagnostic(
        code(units::loader::materialization),
        help(
            "The stored bytes could not be turned into an executable unit. \
             The store is left dirty; replace the corrupt blob and call `reload()`."
        )
    )]
    Materialization { name: String, message: String },

    #[error("store is not attached to a loader context, cannot resolve {name}")]
    #[diagnostic(
        code(units::loader::detached),
        help("Call `attach(LoaderContext)` before wiring or reloading the store.")
    )]
    Detached { name: String },
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    #[diagnostic(
        code(units::config::io),
        help("Check that the file exists and is readable.")
    )]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration in {path}: {message}")]
    #[diagnostic(
        code(units::config::parse),
        help(
            "The file must be valid TOML with optional [wiring], [codec] and [signing] tables."
        )
    )]
    Parse { path: String, message: String },

    #[error("invalid key material in {path}: {message}")]
    #[diagnostic(
        code(units::config::key),
        help(
            "Key files hold exactly 32 raw bytes. \
             Generate a fresh pair with `rule-units keygen`."
        )
    )]
    Key { path: String, message: String },

    #[error("cannot start wiring pool: {message}")]
    #[diagnostic(
        code(units::config::pool),
        help("Lower `wiring.workers` or leave it unset to share rayon's global pool.")
    )]
    Pool { message: String },
}

/// Result type for loader and wiring operations.
pub type LoaderResult<T> = std::result::Result<T, LoaderError>;

/// Convenience alias for functions returning unit runtime results.
pub type UnitsResult<T> = std::result::Result<T, UnitsError>;
