//! The event exchanged between honeypot producers and the sink pipeline.
//!
//! An [`Event`] records exactly one attacker action: a password attempt
//! (`auth` populated) or a command (`command` populated), never both. Events
//! are immutable once constructed; `created_at` is stamped at construction
//! with nanosecond resolution and is the stable wire representation in both
//! the JSON file sink and the SQLite `message` table.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::fmt;

/// Service tag for the SSH honeypot.
pub const SERVICE_SSH: &str = "ssh";
/// Service tag for the restricted-shell producer.
pub const SERVICE_SHELL: &str = "shell";
/// Service tag for the fake HTTP login form.
pub const SERVICE_FORM: &str = "form";

/// A captured username/password pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Auth {
    pub username: String,
    pub password: String,
}

impl fmt::Display for Auth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.username, self.password)
    }
}

/// One recorded attacker action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Tag of the producing honeypot service (`"ssh"`, `"shell"`, `"form"`).
    pub service: String,

    /// Remote peer at capture time. Auth events carry the bare host; command
    /// events carry `host:port`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub remote: String,

    /// Present on password-attempt events, absent on command events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<Auth>,

    /// Present on shell/exec events, absent on auth events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    /// UTC instant assigned at construction; serialized as nanoseconds since
    /// the epoch.
    #[serde(with = "chrono::serde::ts_nanoseconds")]
    pub created_at: DateTime<Utc>,
}

impl Event {
    /// Create a new event for `service`, stamped with the current UTC time.
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            remote: String::new(),
            auth: None,
            command: None,
            created_at: Utc::now(),
        }
    }

    /// Set the remote peer address.
    pub fn with_remote(mut self, remote: impl Into<String>) -> Self {
        self.remote = remote.into();
        self
    }

    /// Set the captured credentials.
    pub fn with_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.auth = Some(Auth {
            username: username.into(),
            password: password.into(),
        });
        self
    }

    /// Set the captured command line.
    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    /// The IP portion of `remote`, as persisted in the `client_ip` column.
    ///
    /// Handles bare hosts, `host:port` and bracketed IPv6 `[addr]:port`.
    pub fn client_ip(&self) -> &str {
        let host = match self.remote.rsplit_once(':') {
            Some((host, port)) if port.chars().all(|c| c.is_ascii_digit()) => host,
            _ => self.remote.as_str(),
        };
        host.trim_start_matches('[').trim_end_matches(']')
    }

    /// `created_at` as nanoseconds since the epoch, the storage encoding.
    pub fn created_at_nanos(&self) -> i64 {
        self.created_at.timestamp_nanos_opt().unwrap_or(i64::MAX)
    }

    /// Reconstruct an event from a `message` row.
    ///
    /// Columns are read in table order: service, client_ip, username,
    /// password, command, created_at. `auth` is materialized only when both
    /// username and password are non-NULL; `command` only when non-NULL.
    pub fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        let service: String = row.try_get(0)?;
        let client_ip: String = row.try_get(1)?;
        let username: Option<String> = row.try_get(2)?;
        let password: Option<String> = row.try_get(3)?;
        let command: Option<String> = row.try_get(4)?;
        let created_at: i64 = row.try_get(5)?;

        let auth = match (username, password) {
            (Some(username), Some(password)) => Some(Auth { username, password }),
            _ => None,
        };

        Ok(Self {
            service,
            remote: client_ip,
            auth,
            command,
            created_at: DateTime::from_timestamp_nanos(created_at),
        })
    }
}

impl fmt::Display for Event {
    /// Console form: `[YYYY-MM-DDTHH:MM:SS] <service@remote> <auth-or-command>`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let time = self.created_at.format("%Y-%m-%dT%H:%M:%S");
        write!(f, "[{}] <{}@{}> ", time, self.service, self.remote)?;
        match (&self.auth, &self.command) {
            (Some(auth), _) => write!(f, "{auth}"),
            (None, Some(command)) => write!(f, "{command}"),
            (None, None) => write!(f, "-"),
        }
    }
}
