//! Upload lifecycle notifications
//!
//! The protocol engine publishes every session transition on a broadcast
//! channel. Collaborators such as loggers or post-processing jobs subscribe;
//! publishing never blocks and succeeds with no subscribers.

use crate::session::UploadFile;
use log::{debug, info, warn};
use tokio::sync::broadcast;

/// Event channel capacity
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// A session transition
#[derive(Debug, Clone, PartialEq)]
pub enum UploadEvent {
    Created(UploadFile),
    /// A chunk landed but the upload is not complete yet
    Part(UploadFile),
    Completed(UploadFile),
    Deleted(UploadFile),
}

impl UploadEvent {
    pub fn file(&self) -> &UploadFile {
        match self {
            UploadEvent::Created(file)
            | UploadEvent::Part(file)
            | UploadEvent::Completed(file)
            | UploadEvent::Deleted(file) => file,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            UploadEvent::Created(_) => "created",
            UploadEvent::Part(_) => "part",
            UploadEvent::Completed(_) => "completed",
            UploadEvent::Deleted(_) => "deleted",
        }
    }
}

/// Sending half of the event channel
#[derive(Clone)]
pub struct EventPublisher {
    tx: broadcast::Sender<UploadEvent>,
}

impl EventPublisher {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn publish(&self, event: UploadEvent) {
        let name = event.name();
        let id = event.file().id.clone();
        if self.tx.send(event).is_err() {
            debug!("No subscribers for {} event of upload {}", name, id);
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UploadEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new(EVENT_CHANNEL_CAPACITY)
    }
}

/// Log every event until the channel closes
pub async fn run_event_logger(mut rx: broadcast::Receiver<UploadEvent>) {
    info!("upload event logger started");
    loop {
        match rx.recv().await {
            Ok(event) => {
                let file = event.file();
                info!(
                    "upload {} {}: {} ({}/{} bytes, owner {})",
                    file.id,
                    event.name(),
                    file.filename,
                    file.bytes_written,
                    file.size,
                    file.user_id.as_deref().unwrap_or("-")
                );
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("upload event logger skipped {} events", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
    info!("upload event logger stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::FileMetadata;

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let publisher = EventPublisher::default();
        let mut rx = publisher.subscribe();

        let file = UploadFile::new(FileMetadata::new());
        publisher.publish(UploadEvent::Created(file.clone()));
        publisher.publish(UploadEvent::Completed(file.clone()));

        assert_eq!(rx.recv().await.unwrap(), UploadEvent::Created(file.clone()));
        let done = rx.recv().await.unwrap();
        assert_eq!(done.name(), "completed");
        assert_eq!(done.file(), &file);
    }

    #[test]
    fn test_publish_without_subscribers() {
        let publisher = EventPublisher::new(4);
        publisher.publish(UploadEvent::Deleted(UploadFile::new(FileMetadata::new())));
    }

    #[tokio::test]
    async fn test_logger_stops_when_channel_closes() {
        let publisher = EventPublisher::new(4);
        let handle = tokio::spawn(run_event_logger(publisher.subscribe()));
        publisher.publish(UploadEvent::Part(UploadFile::new(FileMetadata::new())));
        drop(publisher);
        handle.await.unwrap();
    }
}
