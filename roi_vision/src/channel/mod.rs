// THEORY:
// Every thread in the pipeline talks to every other thread through a channel
// from this module and through nothing else. There are two delivery policies,
// both built by composing the same primitive (`Endpoints`, a crossbeam
// sender/receiver pair) rather than by specializing a base queue type:
//
// 1.  **Bounded, blocking, FIFO** (`BoundedChannel`): carries captured frames.
//     The producer blocks when the queue is full, which is what throttles
//     capture to the speed of detection and keeps memory bounded. It can be
//     shut down, which releases every blocked caller on both sides.
// 2.  **Unbounded, non-blocking, latest-wins** (`LatestChannel`): carries
//     configuration updates and published results. Producers never wait. The
//     consumer drains whatever has accumulated and keeps only the newest value,
//     because both payloads are snapshots of current state.
//
// Both types are cheap handles; cloning one yields another handle onto the same
// queue, so producer and consumer each hold their own copy.

mod bounded;
mod latest;

pub use bounded::BoundedChannel;
pub use latest::LatestChannel;

use crossbeam_channel::{Receiver, Sender};

/// The shared primitive under both channel policies: one sender and one
/// receiver over the same crossbeam queue, kept together so that neither side
/// can ever observe a disconnect while a handle is alive.
pub(crate) struct Endpoints<T> {
    tx: Sender<T>,
    rx: Receiver<T>,
}

impl<T> Endpoints<T> {
    pub(crate) fn bounded(capacity: usize) -> Self {
        let (tx, rx) = crossbeam_channel::bounded(capacity);
        Self { tx, rx }
    }

    pub(crate) fn unbounded() -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self { tx, rx }
    }

    pub(crate) fn sender(&self) -> &Sender<T> {
        &self.tx
    }

    pub(crate) fn receiver(&self) -> &Receiver<T> {
        &self.rx
    }

    pub(crate) fn len(&self) -> usize {
        self.rx.len()
    }
}

impl<T> Clone for Endpoints<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            rx: self.rx.clone(),
        }
    }
}
