//! Spawning a thread that takes ownership of its state.

use std::io;
use std::thread::{Builder, JoinHandle};

/// Spawns a named thread that runs `body` on `state`.
///
/// The state is handed over only once the thread exists, so a failed spawn
/// returns it alongside the error. The thread yields `None` only if the state
/// never arrived.
pub(crate) fn spawn_owned<S, R, F>(
    name: &str,
    state: S,
    body: F,
) -> Result<JoinHandle<Option<R>>, (io::Error, S)>
where
    S: Send + 'static,
    R: Send + 'static,
    F: FnOnce(S) -> R + Send + 'static,
{
    spawn_owned_with(Builder::new().name(name.into()), state, body)
}

fn spawn_owned_with<S, R, F>(
    builder: Builder,
    state: S,
    body: F,
) -> Result<JoinHandle<Option<R>>, (io::Error, S)>
where
    S: Send + 'static,
    R: Send + 'static,
    F: FnOnce(S) -> R + Send + 'static,
{
    let (handoff, inbox) = crossbeam_channel::bounded::<S>(1);
    let handle = match builder.spawn(move || inbox.recv().ok().map(body)) {
        Ok(handle) => handle,
        Err(err) => return Err((err, state)),
    };
    match handoff.send(state) {
        Ok(()) => Ok(handle),
        Err(unsent) => Err((
            io::Error::other("worker thread exited before receiving its state"),
            unsent.into_inner(),
        )),
    }
}
