//! Unified error types for the honeypot engine.
//!
//! Session-local failures (handshake, channel) stay inside the SSH layer and
//! are logged where they happen; only startup and resource-acquisition
//! failures surface here and propagate to the process exit code.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type for engine startup and lifecycle.
#[derive(Error, Debug)]
pub enum EngineError {
    /// A listener could not bind its configured address.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    /// No host key could be installed; the SSH honeypot cannot serve.
    #[error("no usable host key could be installed")]
    NoHostKeys,

    /// Invalid configuration (unknown sink scheme, unknown cipher, ...).
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Host-key storage could not be set up at all.
    #[error("host key error: {0}")]
    Key(#[from] KeyError),

    /// The event store could not be opened or prepared.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A sink could not be constructed.
    #[error("sink error: {0}")]
    Sink(#[from] SinkError),

    /// A low-level I/O error during startup.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while interpreting configuration values.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The sink URL has a scheme no registered sink understands.
    #[error("unknown sink scheme: {0}")]
    UnknownScheme(String),

    /// The sink URL is missing a target path.
    #[error("sink URL has no path: {0}")]
    MissingPath(String),

    /// A cipher name outside the supported host-key algorithm set.
    #[error("unknown cipher suite: {0}")]
    UnknownCipher(String),

    /// A requested component depends on another that is not configured.
    #[error("{0}")]
    Unsatisfied(String),
}

/// Errors from loading or generating host keys.
#[derive(Error, Debug)]
pub enum KeyError {
    /// Existing key material on disk could not be parsed.
    #[error("failed to parse host key at {path}: {source}")]
    Load {
        path: PathBuf,
        source: russh::keys::ssh_key::Error,
    },

    /// Key generation or encoding failed.
    #[error("failed to generate {algorithm} host key: {source}")]
    Gen {
        algorithm: &'static str,
        source: russh::keys::ssh_key::Error,
    },

    /// The home directory could not be resolved.
    #[error("cannot resolve home directory")]
    NoHome,

    /// A low-level I/O error while reading or persisting a key.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Per-sink, per-event write or close failures.
///
/// Never escalated to producers; the dispatcher logs them and keeps going.
#[derive(Error, Debug)]
pub enum SinkError {
    /// Encoding the event to JSON failed.
    #[error("failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),

    /// The database rejected the insert.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A low-level I/O error on the sink target.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from the event-store reader.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The underlying query failed.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}
