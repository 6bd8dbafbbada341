use super::Endpoints;
use crate::error::ChannelClosed;
use crossbeam_channel::{Receiver, Sender, select};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// The one-shot signal behind `BoundedChannel::shutdown`.
///
/// Nothing is ever sent on `trigger`; dropping it disconnects `listener`, which
/// makes every pending and future `recv` on it return immediately. That is what
/// wakes callers parked inside a `select!`.
struct ShutdownSignal {
    flag: AtomicBool,
    trigger: Mutex<Option<Sender<()>>>,
    listener: Receiver<()>,
}

impl ShutdownSignal {
    fn new() -> Self {
        let (trigger, listener) = crossbeam_channel::bounded(0);
        Self {
            flag: AtomicBool::new(false),
            trigger: Mutex::new(Some(trigger)),
            listener,
        }
    }

    fn fire(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.trigger
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    fn is_fired(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// A fixed-capacity FIFO queue whose producers block while it is full.
pub struct BoundedChannel<T> {
    endpoints: Endpoints<T>,
    capacity: usize,
    shutdown: Arc<ShutdownSignal>,
}

impl<T> BoundedChannel<T> {
    /// Creates a channel holding at most `capacity` items. A capacity of zero is
    /// raised to one so that the channel always buffers.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            endpoints: Endpoints::bounded(capacity),
            capacity,
            shutdown: Arc::new(ShutdownSignal::new()),
        }
    }

    /// Enqueues `item`, waiting for free space if the channel is full.
    ///
    /// Fails once the channel has been shut down, including when the shutdown
    /// happens while this call is waiting. The rejected item is dropped.
    pub fn push(&self, item: T) -> Result<(), ChannelClosed> {
        if self.shutdown.is_fired() {
            return Err(ChannelClosed);
        }
        select! {
            send(self.endpoints.sender(), item) -> res => res.map_err(|_| ChannelClosed),
            recv(self.shutdown.listener) -> _ => Err(ChannelClosed),
        }
    }

    /// Removes and returns the oldest item, waiting up to `timeout` for one.
    ///
    /// Returns `None` on timeout, or when the channel is shut down and empty.
    /// Items queued before the shutdown can still be drained.
    pub fn pop(&self, timeout: Duration) -> Option<T> {
        self.pop_interruptible(timeout, &crossbeam_channel::never())
    }

    /// Like `pop`, but also gives up as soon as `interrupt` receives a value or
    /// disconnects.
    pub(crate) fn pop_interruptible(
        &self,
        timeout: Duration,
        interrupt: &Receiver<()>,
    ) -> Option<T> {
        let rx = self.endpoints.receiver();
        if let Ok(item) = rx.try_recv() {
            return Some(item);
        }
        if self.shutdown.is_fired() {
            return None;
        }
        select! {
            recv(rx) -> msg => msg.ok(),
            recv(self.shutdown.listener) -> _ => rx.try_recv().ok(),
            recv(interrupt) -> _ => None,
            default(timeout) => None,
        }
    }

    /// Wakes every blocked caller and makes all later waits fail fast.
    /// Calling it again has no further effect.
    pub fn shutdown(&self) {
        if !self.shutdown.is_fired() {
            tracing::debug!(queued = self.len(), "frame channel shut down");
        }
        self.shutdown.fire();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.is_fired()
    }

    /// Number of queued items at the moment of the call.
    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<T> Clone for BoundedChannel<T> {
    fn clone(&self) -> Self {
        Self {
            endpoints: self.endpoints.clone(),
            capacity: self.capacity,
            shutdown: Arc::clone(&self.shutdown),
        }
    }
}
