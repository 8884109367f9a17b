//! Receiving side of the client's event channel.

use super::event::StreamEvent;
use futures::Stream;
use tokio::sync::broadcast;

/// Receives [`StreamEvent`]s from an [`EventStreamClient`](super::EventStreamClient).
///
/// A subscriber that falls behind skips the oldest events instead of
/// blocking the connection.
#[derive(Debug)]
pub struct EventSubscriber {
    receiver: broadcast::Receiver<StreamEvent>,
    lagged: u64,
}

impl EventSubscriber {
    pub(crate) fn new(receiver: broadcast::Receiver<StreamEvent>) -> Self {
        Self {
            receiver,
            lagged: 0,
        }
    }

    /// Receive the next event.
    ///
    /// Returns `None` once the client handle and its task are gone and every
    /// buffered event was consumed.
    pub async fn recv(&mut self) -> Option<StreamEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(count)) => {
                    self.lagged += count;
                    tracing::warn!(
                        lagged_events = count,
                        "EventSubscriber lagged behind, skipped {} events",
                        count
                    );
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Receive an event if one is buffered.
    pub fn try_recv(&mut self) -> Option<StreamEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(count)) => self.lagged += count,
                Err(_) => return None,
            }
        }
    }

    /// Total events skipped because this subscriber lagged.
    pub fn lag_count(&self) -> u64 {
        self.lagged
    }

    /// Convert into a stream of events.
    pub fn into_stream(self) -> impl Stream<Item = StreamEvent> + Send + 'static {
        let mut subscriber = self;
        async_stream::stream! {
            while let Some(event) = subscriber.recv().await {
                yield event;
            }
        }
    }
}
