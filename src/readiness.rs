//! One-shot readiness signal shared between the synchronizer and the client.
use std::{
    sync::{Condvar, Mutex, MutexGuard},
    time::Duration,
};

use crate::{Error, Result};

type ReadyCallback = Box<dyn FnOnce(Option<Error>) + Send>;

enum State {
    /// Not settled yet. Holds callbacks to fire once it is.
    Pending(Vec<ReadyCallback>),
    /// Settled with the first reported result.
    Settled(Result<()>),
}

/// Holds `Pending` until the first flag definitions have been published (or the initial fetch
/// failed for good), then `Settled` forever.
pub(crate) struct Readiness {
    state: Mutex<State>,
    condvar: Condvar,
}

impl Readiness {
    pub(crate) fn new() -> Readiness {
        Readiness {
            state: Mutex::new(State::Pending(Vec::new())),
            condvar: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // Callbacks run outside of the lock, so it can't be poisoned by user code.
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Settle readiness. Only the first call has an effect. Returns `true` if this call settled
    /// it.
    pub(crate) fn settle(&self, result: Result<()>) -> bool {
        let callbacks = {
            let mut state = self.lock();
            let State::Pending(callbacks) = &mut *state else {
                return false;
            };
            let callbacks = std::mem::take(callbacks);
            *state = State::Settled(result.clone());
            callbacks
        };
        self.condvar.notify_all();

        for callback in callbacks {
            callback(result.clone().err());
        }
        true
    }

    pub(crate) fn is_settled(&self) -> bool {
        matches!(&*self.lock(), State::Settled(_))
    }

    /// Register a callback fired exactly once when readiness settles. If it has already settled,
    /// the callback runs on a separate thread rather than synchronously.
    pub(crate) fn on_ready(&self, callback: impl FnOnce(Option<Error>) + Send + 'static) {
        let mut state = self.lock();
        match &mut *state {
            State::Pending(callbacks) => callbacks.push(Box::new(callback)),
            State::Settled(result) => {
                let error = result.clone().err();
                drop(state);
                let spawned = std::thread::Builder::new()
                    .name("featureflow-ready".to_owned())
                    .spawn(move || callback(error));
                if let Err(err) = spawned {
                    log::warn!(
                        target: "featureflow",
                        "failed to spawn readiness callback thread: {:?}",
                        err
                    );
                }
            }
        }
    }

    /// Block until readiness settles, or until `timeout` elapses if given.
    pub(crate) fn wait(&self, timeout: Option<Duration>) -> Result<()> {
        let state = self.lock();
        let is_pending = |state: &mut State| matches!(state, State::Pending(_));
        let state = match timeout {
            None => self
                .condvar
                .wait_while(state, is_pending)
                .map_err(|_| Error::SynchronizerPanicked)?,
            Some(timeout) => {
                let (state, _) = self
                    .condvar
                    .wait_timeout_while(state, timeout, is_pending)
                    .map_err(|_| Error::SynchronizerPanicked)?;
                state
            }
        };
        match &*state {
            State::Settled(result) => result.clone(),
            State::Pending(_) => Err(Error::ReadyTimeout(timeout.unwrap_or_default())),
        }
    }
}
