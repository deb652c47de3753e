//! Background synchronization of flag definitions.
use std::{
    collections::HashMap,
    ops::ControlFlow,
    sync::{
        mpsc::{Receiver, RecvTimeoutError, Sender},
        Arc, Mutex, MutexGuard,
    },
    thread::JoinHandle,
    time::{Duration, Instant},
};

use rand::{thread_rng, Rng};

use crate::{
    fetcher::{FetchOutcome, FlagSource},
    flag::into_definitions,
    readiness::Readiness,
    registry::FlagRegistry,
    Error, FlagDefinition, Result, StreamEvent,
};

/// Lifecycle state of the background synchronizer.
///
/// ```text
/// Unstarted -> Syncing -> Ready <-> Syncing -> Closed
///              Syncing -> FailedRetrying -> Syncing
///              Syncing -> Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// `Client::start` has not been called yet.
    Unstarted,
    /// A fetch is in progress.
    Syncing,
    /// Definitions are up to date (or no network is used at all).
    Ready,
    /// The last fetch failed with a transient error and will be retried.
    FailedRetrying,
    /// Synchronization stopped after an unrecoverable error. The last snapshot stays in use.
    Failed,
    /// The client was closed.
    Closed,
}

pub(crate) type ErrorHandler = Arc<dyn Fn(&Error) + Send + Sync>;

/// State shared between the client and the synchronizer thread.
pub(crate) struct SyncStatus {
    state: Mutex<SyncState>,
    pub(crate) readiness: Readiness,
}

impl SyncStatus {
    pub(crate) fn new() -> SyncStatus {
        SyncStatus {
            state: Mutex::new(SyncState::Unstarted),
            readiness: Readiness::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SyncState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn state(&self) -> SyncState {
        *self.lock()
    }

    /// Move to `state` unless the client was closed.
    pub(crate) fn set(&self, state: SyncState) {
        let mut current = self.lock();
        if *current != SyncState::Closed {
            *current = state;
        }
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.state() == SyncState::Closed
    }

    /// Run `f` only if the client is still open. The state lock is held while `f` runs, so once
    /// [`SyncStatus::close`] returns `f` is never called again.
    fn while_open<T>(&self, f: impl FnOnce() -> T) -> Option<T> {
        let state = self.lock();
        if *state == SyncState::Closed {
            return None;
        }
        let result = f();
        drop(state);
        Some(result)
    }

    /// Returns `true` on the first call.
    pub(crate) fn close(&self) -> bool {
        let was_closed = {
            let mut state = self.lock();
            std::mem::replace(&mut *state, SyncState::Closed) == SyncState::Closed
        };
        if !was_closed {
            self.readiness.settle(Err(Error::Closed));
        }
        !was_closed
    }
}

pub(crate) struct SynchronizerConfig {
    pub registry: Arc<FlagRegistry>,
    pub source: Box<dyn FlagSource>,
    /// Locally declared features. Remote definitions override them by key.
    pub local_features: Vec<FlagDefinition>,
    pub polling_interval: Duration,
    pub poll_jitter: Duration,
    pub retry_backoff: Duration,
    pub ready_timeout: Option<Duration>,
    pub streaming: bool,
    /// Reconnect when the stream delivers no event for this long.
    pub stream_idle_timeout: Duration,
    pub debug: bool,
    pub error_handler: Option<ErrorHandler>,
}

/// Stream signals carry the id of the subscription they belong to, so leftovers of an abandoned
/// stream are told apart from the current one.
enum Signal {
    Stop,
    Stream(u64, Result<StreamEvent>),
    StreamEnded(u64),
}

/// Handle to the synchronizer thread.
pub(crate) struct Synchronizer {
    join_handle: JoinHandle<()>,
    /// Used to send a stop command to the synchronizer thread.
    sender: Sender<Signal>,
}

impl Synchronizer {
    pub(crate) fn start(
        config: SynchronizerConfig,
        status: Arc<SyncStatus>,
    ) -> Result<Synchronizer> {
        let (sender, receiver) = std::sync::mpsc::channel();

        if let Some(timeout) = config.ready_timeout {
            watch_ready_timeout(Arc::clone(&status), timeout, config.error_handler.clone())?;
        }

        let mut worker = Worker::new(config, Arc::clone(&status), sender.clone());
        let join_handle = std::thread::Builder::new()
            .name("featureflow-sync".to_owned())
            .spawn(move || {
                let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    worker.run(&receiver);
                }));

                // If catch_unwind returns Err, it means a panic occurred.
                if result.is_err() {
                    log::error!(target: "featureflow", "synchronizer thread panicked");
                    status.set(SyncState::Failed);
                    status.readiness.settle(Err(Error::SynchronizerPanicked));
                }
            })?;

        Ok(Synchronizer {
            join_handle,
            sender,
        })
    }

    /// Stop the synchronizer thread.
    ///
    /// This function does not wait for the thread to actually stop.
    pub(crate) fn stop(&self) {
        // Error means that the receiver was dropped (thread exited). Ignoring it as there's nothing
        // useful we can do.
        let _ = self.sender.send(Signal::Stop);
    }

    /// Stop the synchronizer thread and block waiting for it to exit.
    pub(crate) fn shutdown(self) -> Result<()> {
        self.stop();
        self.join_handle
            .join()
            .map_err(|_| Error::SynchronizerPanicked)?;
        Ok(())
    }
}

/// Settle readiness with [`Error::ReadyTimeout`] once `timeout` elapses, no matter what the
/// synchronizer thread is blocked on.
fn watch_ready_timeout(
    status: Arc<SyncStatus>,
    timeout: Duration,
    error_handler: Option<ErrorHandler>,
) -> Result<()> {
    std::thread::Builder::new()
        .name("featureflow-ready-timeout".to_owned())
        .spawn(move || {
            if !matches!(status.readiness.wait(Some(timeout)), Err(Error::ReadyTimeout(_))) {
                return;
            }
            let err = Error::ReadyTimeout(timeout);
            if status.readiness.settle(Err(err.clone())) {
                log::warn!(target: "featureflow", "{}; retrying in the background", err);
                if let Some(handler) = &error_handler {
                    handler(&err);
                }
            }
        })?;
    Ok(())
}

struct Worker {
    registry: Arc<FlagRegistry>,
    source: Box<dyn FlagSource>,
    local: HashMap<String, Arc<FlagDefinition>>,
    local_features: Vec<FlagDefinition>,
    polling_interval: Duration,
    poll_jitter: Duration,
    backoff: Backoff,
    streaming: bool,
    stream_idle_timeout: Duration,
    /// Id of the latest subscription.
    subscription: u64,
    /// Thread forwarding events of the open stream.
    reader: Option<JoinHandle<()>>,
    debug: bool,
    error_handler: Option<ErrorHandler>,
    status: Arc<SyncStatus>,
    sender: Sender<Signal>,
}

/// Synchronization diagnostics are raised from `debug` to `info` when the client runs in debug
/// mode.
macro_rules! diag {
    ($worker:expr, $($arg:tt)+) => {
        log::log!(
            target: "featureflow",
            if $worker.debug { log::Level::Info } else { log::Level::Debug },
            $($arg)+
        )
    };
}

impl Worker {
    fn new(config: SynchronizerConfig, status: Arc<SyncStatus>, sender: Sender<Signal>) -> Worker {
        let local = config
            .local_features
            .iter()
            .map(|flag| (flag.key.clone(), Arc::new(flag.clone())))
            .collect();
        Worker {
            registry: config.registry,
            source: config.source,
            local,
            local_features: config.local_features,
            polling_interval: config.polling_interval,
            // Never jitter more than half of the interval away.
            poll_jitter: config.poll_jitter.min(config.polling_interval / 2),
            backoff: Backoff::new(config.retry_backoff, config.polling_interval),
            streaming: config.streaming,
            stream_idle_timeout: config.stream_idle_timeout,
            subscription: 0,
            reader: None,
            debug: config.debug,
            error_handler: config.error_handler,
            status,
            sender,
        }
    }

    fn run(&mut self, receiver: &Receiver<Signal>) {
        self.synchronize(receiver);
        self.close_stream();
    }

    fn synchronize(&mut self, receiver: &Receiver<Signal>) {
        if !self.local_features.is_empty() {
            diag!(self, "registering {} local features", self.local_features.len());
            if let Err(err) = self.source.register(&self.local_features) {
                log::warn!(target: "featureflow", "failed to register local features: {}", err);
            }
        }

        let mut stream_supported = self.streaming;
        loop {
            if self.status.is_closed() {
                return;
            }

            self.status.set(SyncState::Syncing);
            let delay = match self.refresh() {
                Ok(()) => {
                    // A stream that keeps dropping right after the catch-up fetch must keep
                    // backing off, so streaming resets the backoff on received events instead.
                    if !stream_supported {
                        self.backoff.reset();
                    }
                    self.status.set(SyncState::Ready);
                    if self.status.readiness.settle(Ok(())) {
                        diag!(self, "feature definitions are ready");
                    }

                    if !stream_supported {
                        jitter(self.polling_interval, self.poll_jitter)
                    } else {
                        match self.subscribe() {
                            Ok(true) => {
                                if self.stream(receiver).is_break() {
                                    return;
                                }
                                self.backoff.next_delay()
                            }
                            Ok(false) => {
                                diag!(self, "streaming is not supported, falling back to polling");
                                stream_supported = false;
                                jitter(self.polling_interval, self.poll_jitter)
                            }
                            Err(err) if is_fatal(&err) => {
                                self.fail(err);
                                return;
                            }
                            Err(err) => {
                                self.report(&err);
                                self.backoff.next_delay()
                            }
                        }
                    }
                }
                Err(err) if is_fatal(&err) => {
                    self.fail(err);
                    return;
                }
                Err(err) => {
                    self.status.set(SyncState::FailedRetrying);
                    self.report(&err);
                    self.backoff.next_delay()
                }
            };

            if self.sleep(receiver, delay).is_break() {
                return;
            }
        }
    }

    /// Fetch the full set of definitions and publish them if they changed.
    fn refresh(&mut self) -> Result<()> {
        diag!(self, "fetching feature definitions");
        match self.source.fetch()? {
            FetchOutcome::NotModified => {
                diag!(self, "feature definitions not modified");
            }
            FetchOutcome::Flags(flags) => {
                let mut merged = self.local.clone();
                merged.extend(
                    into_definitions(flags)
                        .into_iter()
                        .map(|(key, flag)| (key, Arc::new(flag))),
                );
                self.publish(merged);
            }
        }
        Ok(())
    }

    fn publish(&self, flags: HashMap<String, Arc<FlagDefinition>>) {
        match self
            .status
            .while_open(|| self.registry.replace_if_changed(flags))
        {
            Some(true) => {
                let snapshot = self.registry.snapshot();
                diag!(
                    self,
                    generation = snapshot.generation(),
                    count = snapshot.len();
                    "published new feature definitions"
                );
            }
            Some(false) => diag!(self, "feature definitions unchanged"),
            None => {}
        }
    }

    /// Open the streaming channel and start forwarding its events. Returns `Ok(false)` if the
    /// source does not support streaming.
    fn subscribe(&mut self) -> Result<bool> {
        let Some(events) = self.source.subscribe()? else {
            return Ok(false);
        };
        diag!(self, "subscribed to feature updates");

        self.subscription += 1;
        let id = self.subscription;
        let sender = self.sender.clone();
        let reader = std::thread::Builder::new()
            .name("featureflow-stream".to_owned())
            .spawn(move || {
                for event in events {
                    // A broken connection keeps failing, so give up on it.
                    let broken = matches!(event, Err(Error::Io(_) | Error::Network(_)));
                    if sender.send(Signal::Stream(id, event)).is_err() {
                        // The synchronizer is gone.
                        return;
                    }
                    if broken {
                        break;
                    }
                }
                let _ = sender.send(Signal::StreamEnded(id));
            });
        match reader {
            Ok(reader) => {
                self.reader = Some(reader);
                Ok(true)
            }
            Err(err) => {
                self.source.unsubscribe();
                Err(err.into())
            }
        }
    }

    /// Apply stream events until the stream ends or goes idle (`Continue`) or a stop is requested
    /// (`Break`).
    fn stream(&mut self, receiver: &Receiver<Signal>) -> ControlFlow<()> {
        let mut idle_since = Instant::now();
        loop {
            let idle_deadline = idle_since + self.stream_idle_timeout;
            let timeout = idle_deadline.saturating_duration_since(Instant::now());
            match receiver.recv_timeout(timeout) {
                Ok(Signal::Stop) | Err(RecvTimeoutError::Disconnected) => {
                    log::debug!(target: "featureflow", "synchronizer thread received stop command");
                    return ControlFlow::Break(());
                }
                Err(RecvTimeoutError::Timeout) => {
                    diag!(self, "feature stream is idle, reconnecting");
                    self.close_stream();
                    return ControlFlow::Continue(());
                }
                Ok(Signal::Stream(id, event)) if id == self.subscription => {
                    idle_since = Instant::now();
                    match event {
                        Ok(event) => {
                            self.backoff.reset();
                            self.apply(event);
                        }
                        Err(err) => self.report(&err),
                    }
                }
                Ok(Signal::StreamEnded(id)) if id == self.subscription => {
                    diag!(self, "feature stream ended, reconnecting");
                    self.close_stream();
                    return ControlFlow::Continue(());
                }
                Ok(Signal::Stream(..) | Signal::StreamEnded(_)) => {
                    // Leftovers of an abandoned stream.
                }
            }
        }
    }

    /// Release the open stream, if any, and wait for its reader thread to exit.
    fn close_stream(&mut self) {
        let Some(reader) = self.reader.take() else {
            return;
        };
        self.source.unsubscribe();
        if reader.join().is_err() {
            log::warn!(target: "featureflow", "feature stream reader panicked");
        }
    }

    fn apply(&self, event: StreamEvent) {
        let mut flags = self.registry.snapshot().flags().clone();
        match event {
            StreamEvent::Updated(updated) => {
                diag!(self, count = updated.len(); "received feature updates");
                flags.extend(
                    into_definitions(updated)
                        .into_iter()
                        .map(|(key, flag)| (key, Arc::new(flag))),
                );
            }
            StreamEvent::Deleted(keys) => {
                diag!(self, count = keys.len(); "received feature deletions");
                for key in keys {
                    // Deleting a remote definition uncovers the local one with the same key.
                    match self.local.get(&key) {
                        Some(local) => flags.insert(key, Arc::clone(local)),
                        None => flags.remove(&key),
                    };
                }
            }
            StreamEvent::Heartbeat => return,
        }
        self.publish(flags);
    }

    /// Wait for `delay` or until a stop is requested (`Break`).
    fn sleep(&mut self, receiver: &Receiver<Signal>, delay: Duration) -> ControlFlow<()> {
        let wake_at = Instant::now() + delay;
        loop {
            let timeout = wake_at.saturating_duration_since(Instant::now());
            match receiver.recv_timeout(timeout) {
                Err(RecvTimeoutError::Timeout) => return ControlFlow::Continue(()),
                Ok(Signal::Stop) | Err(RecvTimeoutError::Disconnected) => {
                    log::debug!(target: "featureflow", "synchronizer thread received stop command");
                    return ControlFlow::Break(());
                }
                Ok(Signal::Stream(..) | Signal::StreamEnded(_)) => {
                    // Leftovers of an abandoned stream.
                }
            }
        }
    }

    fn report(&self, err: &Error) {
        log::warn!(target: "featureflow", "failed to synchronize feature definitions: {}", err);
        self.call_error_handler(err);
    }

    fn fail(&self, err: Error) {
        log::error!(target: "featureflow", "stopping synchronization: {}", err);
        self.status.set(SyncState::Failed);
        self.status.readiness.settle(Err(err.clone()));
        self.call_error_handler(&err);
    }

    fn call_error_handler(&self, err: &Error) {
        if let Some(handler) = &self.error_handler {
            handler(err);
        }
    }
}

/// Errors that retrying cannot fix.
fn is_fatal(err: &Error) -> bool {
    matches!(err, Error::Unauthorized | Error::InvalidBaseUrl(_))
}

/// Exponential retry delays, capped at `max`.
struct Backoff {
    base: Duration,
    max: Duration,
    attempt: u32,
}

impl Backoff {
    fn new(base: Duration, max: Duration) -> Backoff {
        Backoff {
            base,
            max: max.max(base),
            attempt: 0,
        }
    }

    fn next_delay(&mut self) -> Duration {
        let delay = self
            .base
            .saturating_mul(2u32.saturating_pow(self.attempt))
            .min(self.max);
        self.attempt = self.attempt.saturating_add(1);
        jitter(delay, delay / 2)
    }

    fn reset(&mut self) {
        self.attempt = 0;
    }
}

/// Apply randomized `jitter` to `interval`.
fn jitter(interval: Duration, jitter: Duration) -> Duration {
    Duration::saturating_sub(interval, thread_rng().gen_range(Duration::ZERO..=jitter))
}
