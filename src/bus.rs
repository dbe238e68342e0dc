//! The fan-in event bus between honeypot producers and the sinks.
//!
//! Every connection handler holds a clone of the sender; one dispatcher task
//! owns the receiver and serialises writes across all configured sinks. The
//! channel is bounded: a slow sink eventually blocks producers instead of
//! dropping events.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::event::Event;
use crate::sink::Sink;

/// Buffer between producers and the dispatcher. When full, producers block.
pub const BUS_CAPACITY: usize = 1024;

/// Create the event bus channel.
pub fn channel() -> (mpsc::Sender<Event>, mpsc::Receiver<Event>) {
    mpsc::channel(BUS_CAPACITY)
}

/// Send an event, logging instead of failing when the bus is already gone.
///
/// Producers never observe sink errors; a closed bus only happens during
/// shutdown, when losing the tail of a session is acceptable.
pub async fn publish(tx: &mpsc::Sender<Event>, event: Event) {
    if tx.send(event).await.is_err() {
        warn!("event bus closed, dropping event");
    }
}

/// Consumes the bus and fans each event out to every sink.
#[derive(Debug)]
pub struct Dispatcher {
    sinks: Vec<Sink>,
}

impl Dispatcher {
    pub fn new(sinks: Vec<Sink>) -> Self {
        Self { sinks }
    }

    /// Run until the bus closes, then close every sink.
    ///
    /// Per-sink failures are logged and never stop the dispatcher or the
    /// other sinks; writes are strictly sequential, which is the pipeline's
    /// backpressure point.
    pub async fn run(mut self, mut rx: mpsc::Receiver<Event>) {
        while let Some(event) = rx.recv().await {
            for sink in &mut self.sinks {
                if let Err(err) = sink.write(&event).await {
                    warn!(sink = sink.kind(), error = %err, "failed to write event");
                }
            }
        }

        debug!("event bus closed, closing sinks");
        for sink in self.sinks {
            let kind = sink.kind();
            if let Err(err) = sink.close().await {
                warn!(sink = kind, error = %err, "failed to close sink");
            }
        }
    }

    /// Spawn the dispatcher; the handle resolves once all sinks are closed.
    pub fn spawn(self, rx: mpsc::Receiver<Event>) -> JoinHandle<()> {
        tokio::spawn(self.run(rx))
    }
}
