use crate::errors::SinkError;
use crate::event::Event;

/// Writes each event's console form to standard output.
#[derive(Debug)]
pub struct ConsoleSink;

impl ConsoleSink {
    pub fn write(&mut self, event: &Event) -> Result<(), SinkError> {
        println!("{event}");
        Ok(())
    }
}
