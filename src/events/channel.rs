//! Event channel implementation using crossbeam-channel.
//!
//! Provides a thread-safe way to send events from the core library
//! to any UI layer.

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};

use super::Event;

/// Sends events from the core library.
///
/// This is a thin wrapper around crossbeam's Sender that can be
/// cloned and sent across threads.
#[derive(Clone)]
pub struct EventSender {
    inner: Sender<Event>,
}

impl EventSender {
    /// Send an event. Non-blocking if the channel isn't full.
    ///
    /// If the receiver is dropped, the event is silently discarded.
    /// This allows progress reporting to be optional.
    pub fn send(&self, event: impl Into<Event>) {
        let _ = self.inner.send(event.into());
    }
}

/// Receives events from the core library.
///
/// Used by UI layers to subscribe to progress updates.
pub struct EventReceiver {
    inner: Receiver<Event>,
}

impl EventReceiver {
    /// Block until the next event is received
    pub fn recv(&self) -> Option<Event> {
        self.inner.recv().ok()
    }

    /// Try to receive an event without blocking
    pub fn try_recv(&self) -> Option<Event> {
        self.inner.try_recv().ok()
    }

    /// Returns an iterator over received events
    pub fn iter(&self) -> impl Iterator<Item = Event> + '_ {
        self.inner.iter()
    }
}

/// Factory for event channels between the core and a UI layer.
pub struct EventChannel;

impl EventChannel {
    /// Create a new unbounded event channel.
    pub fn new() -> (EventSender, EventReceiver) {
        let (sender, receiver) = unbounded();
        (
            EventSender { inner: sender },
            EventReceiver { inner: receiver },
        )
    }

    /// Create a bounded event channel with the specified capacity.
    ///
    /// Use this if you need backpressure (e.g., a slow UI that can't
    /// keep up with events).
    pub fn bounded(capacity: usize) -> (EventSender, EventReceiver) {
        let (sender, receiver) = bounded(capacity);
        (
            EventSender { inner: sender },
            EventReceiver { inner: receiver },
        )
    }
}

/// A no-op event sender for when you don't need progress reporting.
///
/// This is useful for tests or when running without a UI.
pub fn null_sender() -> EventSender {
    let (sender, _receiver) = EventChannel::new();
    sender
}
