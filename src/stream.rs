//! Bounded event streams.
//!
//! The pipeline watch publishes every re-merged view through one of these:
//! a tokio channel whose receiving half is exposed as a boxed [`Stream`].

use std::pin::Pin;

use futures_core::Stream;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// A boxed, sendable stream of events.
pub type EventStream<T> = Pin<Box<dyn Stream<Item = T> + Send>>;

/// Producing half of an [`EventStream`].
#[derive(Debug)]
pub struct EventSender<T> {
    tx: mpsc::Sender<T>,
}

impl<T> EventSender<T> {
    /// Send an event, waiting for room in the buffer.
    ///
    /// Gives the event back if the stream was dropped.
    pub async fn send(&self, event: T) -> Result<(), T> {
        self.tx.send(event).await.map_err(|e| e.0)
    }

    /// Send without waiting; gives the event back if the buffer is full or
    /// the stream was dropped.
    pub fn try_send(&self, event: T) -> Result<(), T> {
        self.tx.try_send(event).map_err(|e| match e {
            mpsc::error::TrySendError::Full(v) | mpsc::error::TrySendError::Closed(v) => v,
        })
    }

    /// True once the stream has been dropped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl<T> Clone for EventSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

/// Builder for a sender/stream pair.
///
/// # Example
///
/// ```rust
/// use bootstrata::StreamBuilder;
///
/// # async fn example() {
/// let (sender, _stream) = StreamBuilder::<String>::new().buffer_size(4).build();
/// sender.send("logger.level changed".to_string()).await.unwrap();
/// # }
/// ```
#[derive(Debug)]
pub struct StreamBuilder<T> {
    buffer_size: usize,
    _marker: std::marker::PhantomData<T>,
}

impl<T: Send + 'static> StreamBuilder<T> {
    /// Builder with a buffer of 16 events.
    pub fn new() -> Self {
        Self {
            buffer_size: 16,
            _marker: std::marker::PhantomData,
        }
    }

    /// Set the buffer size. Zero is raised to one.
    pub fn buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size.max(1);
        self
    }

    /// Build the pair.
    pub fn build(self) -> (EventSender<T>, EventStream<T>) {
        let (tx, rx) = mpsc::channel(self.buffer_size);
        (EventSender { tx }, Box::pin(ReceiverStream::new(rx)))
    }
}

impl<T: Send + 'static> Default for StreamBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}
