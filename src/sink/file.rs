use std::path::Path;

use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;

use crate::errors::SinkError;
use crate::event::Event;

/// Appends one JSON-encoded event per line to a file.
///
/// The target is opened in append+create mode with permissions 0600; the
/// wire format is the event JSON defined by [`Event`]'s serde encoding and
/// must stay stable.
#[derive(Debug)]
pub struct FileSink {
    file: File,
}

impl FileSink {
    pub async fn open(path: &Path) -> Result<Self, SinkError> {
        let mut options = OpenOptions::new();
        options.append(true).create(true);
        #[cfg(unix)]
        options.mode(0o600);

        let file = options.open(path).await?;
        Ok(Self { file })
    }

    pub async fn write(&mut self, event: &Event) -> Result<(), SinkError> {
        let mut line = serde_json::to_vec(event)?;
        line.push(b'\n');
        self.file.write_all(&line).await?;
        Ok(())
    }

    pub async fn close(mut self) -> Result<(), SinkError> {
        self.file.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Event, SERVICE_SSH};

    #[tokio::test]
    async fn appends_one_json_line_per_event() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.json");

        let mut sink = FileSink::open(&path).await.unwrap();
        sink.write(&Event::new(SERVICE_SSH).with_auth("root", "toor"))
            .await
            .unwrap();
        sink.write(&Event::new(SERVICE_SSH).with_command("pwd"))
            .await
            .unwrap();
        sink.close().await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: Event = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first.auth.unwrap().username, "root");
        let second: Event = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second.command.as_deref(), Some("pwd"));
    }

    #[tokio::test]
    async fn reopening_appends_rather_than_truncates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.json");

        let mut sink = FileSink::open(&path).await.unwrap();
        sink.write(&Event::new(SERVICE_SSH).with_command("ls"))
            .await
            .unwrap();
        sink.close().await.unwrap();

        let mut sink = FileSink::open(&path).await.unwrap();
        sink.write(&Event::new(SERVICE_SSH).with_command("pwd"))
            .await
            .unwrap();
        sink.close().await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn created_file_has_mode_0600() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.json");
        let sink = FileSink::open(&path).await.unwrap();
        sink.close().await.unwrap();

        let meta = std::fs::metadata(&path).unwrap();
        assert_eq!(meta.permissions().mode() & 0o777, 0o600);
    }
}
