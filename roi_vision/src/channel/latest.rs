use super::Endpoints;

/// An unbounded queue whose consumer normally only wants the newest value.
///
/// Pushing never blocks. Intended for a single consumer: two threads draining
/// the same channel concurrently would each see only part of the backlog.
pub struct LatestChannel<T> {
    endpoints: Endpoints<T>,
}

impl<T> LatestChannel<T> {
    pub fn new() -> Self {
        Self {
            endpoints: Endpoints::unbounded(),
        }
    }

    /// Appends `value`. Always succeeds immediately.
    pub fn push(&self, value: T) {
        // The receiver lives in `self`, so the queue can never be disconnected.
        let _ = self.endpoints.sender().send(value);
    }

    /// Drains the queue and returns only the most recently pushed value.
    pub fn try_pop_latest(&self) -> Option<T> {
        let latest = self.endpoints.receiver().try_iter().last();
        if latest.is_some() {
            tracing::trace!("drained latest value");
        }
        latest
    }

    /// Removes and returns the oldest value, if any.
    pub fn try_pop(&self) -> Option<T> {
        self.endpoints.receiver().try_recv().ok()
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.receiver().is_empty()
    }
}

impl<T> Default for LatestChannel<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for LatestChannel<T> {
    fn clone(&self) -> Self {
        Self {
            endpoints: self.endpoints.clone(),
        }
    }
}
