//! Configuration types for the honeypot engine.
//!
//! Sink URLs are parsed once here, at configuration time; the engine core
//! only ever sees pre-constructed sinks. The SSH section mirrors the CLI
//! surface: bind address, server banner, auth policy inputs, host-key
//! algorithm set, home directory and shell prompt.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;
use crate::keys::HostKeyAlgorithm;

pub const DEFAULT_BIND: &str = ":2022";
pub const DEFAULT_BANNER: &str = "SSH-2.0-Open";
pub const DEFAULT_MAX_RETRY: u32 = 3;
pub const DEFAULT_HOMEDIR: &str = "~";
pub const DEFAULT_PROMPT: &str = "$ ";

/// A parsed sink destination, selected by URL scheme.
///
/// `console://` / `stdout://` → console, `file://PATH` → append-only JSON
/// file, `sqlite://PATH` / `sqlite3://PATH` → embedded database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkTarget {
    Console,
    File(PathBuf),
    Sqlite(PathBuf),
}

impl SinkTarget {
    /// Parse a sink URL. Unknown schemes are a configuration error.
    pub fn parse(url: &str) -> Result<Self, ConfigError> {
        let (scheme, rest) = url
            .split_once("://")
            .ok_or_else(|| ConfigError::UnknownScheme(url.to_string()))?;

        match scheme {
            "console" | "stdout" => Ok(Self::Console),
            "file" => Ok(Self::File(non_empty_path(url, rest)?)),
            "sqlite" | "sqlite3" => Ok(Self::Sqlite(non_empty_path(url, rest)?)),
            other => Err(ConfigError::UnknownScheme(other.to_string())),
        }
    }

    /// The database path, when this is a SQLite target.
    pub fn sqlite_path(&self) -> Option<&Path> {
        match self {
            Self::Sqlite(path) => Some(path),
            _ => None,
        }
    }
}

fn non_empty_path(url: &str, rest: &str) -> Result<PathBuf, ConfigError> {
    if rest.is_empty() {
        return Err(ConfigError::MissingPath(url.to_string()));
    }
    Ok(PathBuf::from(rest))
}

/// Configuration for the SSH honeypot service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshConfig {
    /// Address to listen on; a bare `:port` binds all interfaces.
    #[serde(default = "default_bind")]
    pub bind: String,

    /// SSH version banner announced to clients.
    #[serde(default = "default_banner")]
    pub banner: String,

    /// Maximum password attempts per connection.
    #[serde(default = "default_max_retry")]
    pub max_retry: u32,

    /// Authorized username; unset means record-only (reject everyone).
    #[serde(default)]
    pub username: Option<String>,

    /// Authorized password; unset accepts any password for the username.
    #[serde(default)]
    pub password: Option<String>,

    /// Announced host-key algorithm names.
    #[serde(default = "default_ciphers")]
    pub ciphers: Vec<String>,

    /// Home directory for host-key storage; `~` means the user's home.
    #[serde(default = "default_homedir")]
    pub homedir: String,

    /// Prompt shown in interactive shell sessions.
    #[serde(default = "default_prompt")]
    pub prompt: String,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            banner: default_banner(),
            max_retry: default_max_retry(),
            username: None,
            password: None,
            ciphers: default_ciphers(),
            homedir: default_homedir(),
            prompt: default_prompt(),
        }
    }
}

impl SshConfig {
    /// Resolve the configured cipher names against the supported set.
    pub fn host_key_algorithms(&self) -> Result<Vec<HostKeyAlgorithm>, ConfigError> {
        self.ciphers
            .iter()
            .map(|name| {
                HostKeyAlgorithm::parse(name)
                    .ok_or_else(|| ConfigError::UnknownCipher(name.clone()))
            })
            .collect()
    }

    /// The bind address in `host:port` form, expanding a bare `:port`.
    pub fn bind_addr(&self) -> String {
        normalize_bind(&self.bind)
    }
}

/// Expand a bare `:port` bind address to all interfaces.
pub fn normalize_bind(addr: &str) -> String {
    if let Some(port) = addr.strip_prefix(':') {
        format!("0.0.0.0:{port}")
    } else {
        addr.to_string()
    }
}

fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}

fn default_banner() -> String {
    DEFAULT_BANNER.to_string()
}

fn default_max_retry() -> u32 {
    DEFAULT_MAX_RETRY
}

fn default_ciphers() -> Vec<String> {
    HostKeyAlgorithm::ALL
        .iter()
        .map(|alg| alg.name().to_string())
        .collect()
}

fn default_homedir() -> String {
    DEFAULT_HOMEDIR.to_string()
}

fn default_prompt() -> String {
    DEFAULT_PROMPT.to_string()
}
