//! Event sinks: the destinations the dispatcher fans events out to.
//!
//! A sink is one of a closed set of variants sharing the `write`/`close`
//! contract. Sinks are constructed from parsed [`crate::config::SinkTarget`]s
//! by the engine; the SQLite variant borrows the engine-owned connection
//! pool so the dashboard reader sees the same database handle.

mod console;
mod file;
mod sqlite;

pub use console::ConsoleSink;
pub use file::FileSink;
pub use sqlite::SqliteSink;

use crate::errors::SinkError;
use crate::event::Event;

/// A destination for recorded events.
#[derive(Debug)]
pub enum Sink {
    Console(ConsoleSink),
    File(FileSink),
    Sqlite(SqliteSink),
}

impl Sink {
    /// Short tag for log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Console(_) => "console",
            Self::File(_) => "file",
            Self::Sqlite(_) => "sqlite",
        }
    }

    /// Persist one event.
    pub async fn write(&mut self, event: &Event) -> Result<(), SinkError> {
        match self {
            Self::Console(sink) => sink.write(event),
            Self::File(sink) => sink.write(event).await,
            Self::Sqlite(sink) => sink.write(event).await,
        }
    }

    /// Flush and release the sink.
    pub async fn close(self) -> Result<(), SinkError> {
        match self {
            Self::Console(_) => Ok(()),
            Self::File(sink) => sink.close().await,
            Self::Sqlite(sink) => sink.close(),
        }
    }
}
