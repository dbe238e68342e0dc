use sqlx::SqlitePool;

use crate::errors::SinkError;
use crate::event::Event;

const INSERT: &str = "\
INSERT OR IGNORE INTO message (service, client_ip, username, password, command, created_at) \
VALUES (?, ?, ?, ?, ?, ?)";

/// Persists events into the `message` table.
///
/// Uses `INSERT OR IGNORE` so exact-duplicate rows are silently dropped.
/// The pool is owned by the engine and shared with the event-store reader;
/// sqlx re-uses the prepared statement across writes.
#[derive(Debug)]
pub struct SqliteSink {
    pool: SqlitePool,
}

impl SqliteSink {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn write(&mut self, event: &Event) -> Result<(), SinkError> {
        let (username, password) = match &event.auth {
            Some(auth) => (Some(auth.username.as_str()), Some(auth.password.as_str())),
            None => (None, None),
        };

        sqlx::query(INSERT)
            .bind(&event.service)
            .bind(event.client_ip())
            .bind(username)
            .bind(password)
            .bind(event.command.as_deref())
            .bind(event.created_at_nanos())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// The pool itself is closed by the engine after the dispatcher drains.
    pub fn close(self) -> Result<(), SinkError> {
        Ok(())
    }
}
