use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use chrono::Utc;

use crate::{
    fetcher::{FlagSource, HttpFlagSource, HttpFlagSourceConfig},
    poller::{SyncState, SyncStatus, Synchronizer, SynchronizerConfig},
    registry::{FlagRegistry, Snapshot},
    rules::CustomOperators,
    ClientConfig, Context, Error, Evaluation, EvaluationEvent, EvaluationLogger, Result,
};

/// A client for Featureflow.
///
/// In order to create a client instance, first create [`ClientConfig`].
///
/// # Examples
/// ```
/// # use featureflow::{Client, ClientConfig, Context};
/// # fn test() -> featureflow::Result<()> {
/// let client = Client::new(ClientConfig::from_api_key("srv-env-key"))?;
/// client.start()?;
/// client.wait_for_ready()?;
///
/// let context = Context::builder("user@example.com")
///     .with_attribute("subscription", "premium")
///     .build()?;
/// if client.evaluate("example-feature", Some(&context)).is_on() {
///     // ...
/// }
/// # Ok(())
/// # }
/// ```
pub struct Client<'a> {
    registry: Arc<FlagRegistry>,
    status: Arc<SyncStatus>,
    /// Taken by [`Client::start`]. `None` in offline mode.
    pending: Mutex<Option<SynchronizerConfig>>,
    synchronizer: Mutex<Option<Synchronizer>>,
    operators: CustomOperators,
    evaluation_logger: Box<dyn EvaluationLogger + Send + Sync + 'a>,
    offline: bool,
    debug: bool,
}

impl<'a> Client<'a> {
    /// Create a new `Client` using the specified configuration.
    ///
    /// Local features are available for evaluation right away. Call [`Client::start`] to begin
    /// synchronizing with the server.
    ///
    /// # Errors
    ///
    /// - [`Error::ConfigurationError`] if there is neither an API key nor a local feature.
    /// - [`Error::Network`] if the HTTP client cannot be initialized.
    pub fn new(config: ClientConfig<'a>) -> Result<Self> {
        let api_key = config.api_key.filter(|api_key| !api_key.trim().is_empty());

        let source: Option<Box<dyn FlagSource>> = match (config.flag_source, api_key) {
            (Some(source), _) => Some(source),
            (None, Some(api_key)) => Some(Box::new(HttpFlagSource::new(HttpFlagSourceConfig {
                api_key,
                base_url: config.base_url,
                stream_url: config.stream_url,
            })?)),
            (None, None) if config.features.is_empty() => {
                return Err(Error::ConfigurationError(
                    "an API key or local features are required".to_owned(),
                ));
            }
            (None, None) => None,
        };

        let offline = source.is_none();
        let registry = Arc::new(FlagRegistry::with_flags(config.features.iter().cloned()));

        let pending = source.map(|source| SynchronizerConfig {
            registry: Arc::clone(&registry),
            source,
            local_features: config.features,
            polling_interval: config.polling_interval,
            poll_jitter: config.poll_jitter,
            retry_backoff: config.retry_backoff,
            ready_timeout: config.ready_timeout,
            streaming: config.streaming,
            stream_idle_timeout: config.stream_idle_timeout,
            debug: config.debug,
            error_handler: config.error_handler,
        });

        Ok(Client {
            registry,
            status: Arc::new(SyncStatus::new()),
            pending: Mutex::new(pending),
            synchronizer: Mutex::new(None),
            operators: config.operators,
            evaluation_logger: config.evaluation_logger,
            offline,
            debug: config.debug,
        })
    }

    /// Start synchronizing flag definitions in the background.
    ///
    /// Without an API key the client becomes ready immediately and never touches the network.
    /// Calling `start` again has no effect.
    ///
    /// # Errors
    ///
    /// - [`Error::Closed`] if the client has been closed.
    /// - [`Error::Io`] if the background thread failed to start.
    pub fn start(&self) -> Result<()> {
        if self.status.is_closed() {
            return Err(Error::Closed);
        }
        if self.status.state() != SyncState::Unstarted {
            log::debug!(target: "featureflow", "client is already started");
            return Ok(());
        }

        let pending = self
            .pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        let config = match pending {
            Some(config) => config,
            None if self.offline => {
                log::info!(
                    target: "featureflow",
                    features = self.registry.snapshot().len();
                    "starting in offline mode"
                );
                self.status.set(SyncState::Ready);
                self.status.readiness.settle(Ok(()));
                return Ok(());
            }
            // Another thread got here first.
            None => return Ok(()),
        };

        self.status.set(SyncState::Syncing);
        let synchronizer = match Synchronizer::start(config, Arc::clone(&self.status)) {
            Ok(synchronizer) => synchronizer,
            Err(err) => {
                self.status.set(SyncState::Failed);
                self.status.readiness.settle(Err(err.clone()));
                return Err(err);
            }
        };
        *self
            .synchronizer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(synchronizer);

        // `close` may have raced with us and found no synchronizer to stop.
        if self.status.is_closed() {
            self.stop_synchronizer();
        }
        Ok(())
    }

    /// Register a callback fired exactly once when the client becomes ready, or fails to. The
    /// callback receives the error, if any.
    ///
    /// If the client is already ready, the callback runs on a separate thread.
    pub fn on_ready(&self, callback: impl FnOnce(Option<Error>) + Send + 'static) {
        self.status.readiness.on_ready(callback);
    }

    /// Block waiting for the first flag definitions to get fetched.
    ///
    /// # Errors
    ///
    /// - [`Error::Unauthorized`] or [`Error::InvalidBaseUrl`] if fetching can never succeed.
    /// - [`Error::ReadyTimeout`] if [`ClientConfig::ready_timeout`] elapsed first.
    /// - [`Error::Closed`] if the client was closed before becoming ready.
    pub fn wait_for_ready(&self) -> Result<()> {
        self.status.readiness.wait(None)
    }

    /// Like [`Client::wait_for_ready`], giving up after `timeout` with [`Error::ReadyTimeout`].
    /// Synchronization continues in the background.
    pub fn wait_for_ready_timeout(&self, timeout: Duration) -> Result<()> {
        self.status.readiness.wait(Some(timeout))
    }

    /// Current state of the background synchronization.
    pub fn state(&self) -> SyncState {
        self.status.state()
    }

    /// Snapshot of the current flag definitions.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.registry.snapshot()
    }

    /// Evaluate a flag for the given context.
    ///
    /// Unknown flags resolve to the `"off"` variant. Evaluation never fails and never blocks on
    /// the network.
    pub fn evaluate(&self, flag_key: &str, context: Option<&Context>) -> Evaluation {
        self.evaluate_inner(flag_key, context, None)
    }

    /// Evaluate a flag, serving the `fallback` variant if the flag is unknown.
    pub fn evaluate_with_fallback(
        &self,
        flag_key: &str,
        context: Option<&Context>,
        fallback: &str,
    ) -> Evaluation {
        self.evaluate_inner(flag_key, context, Some(fallback))
    }

    fn evaluate_inner(
        &self,
        flag_key: &str,
        context: Option<&Context>,
        fallback: Option<&str>,
    ) -> Evaluation {
        let snapshot = self.registry.snapshot();
        let evaluation = snapshot.evaluate(flag_key, context, fallback, &self.operators);

        if self.debug {
            log::debug!(target: "featureflow",
                        flag_key,
                        context_key = context.map(Context::key),
                        variant = evaluation.variant(),
                        generation = snapshot.generation();
                        "evaluated a flag");
        }

        self.evaluation_logger.log_evaluation(EvaluationEvent {
            feature_key: evaluation.feature_key().to_owned(),
            variant: evaluation.variant().to_owned(),
            context_key: context.map(|context| context.key().to_owned()),
            reason: evaluation.reason(),
            timestamp: Utc::now(),
        });

        evaluation
    }

    /// Evaluate every known flag for the given context.
    ///
    /// All results come from the same snapshot, even if definitions are updated concurrently.
    pub fn evaluate_all(&self, context: Option<&Context>) -> HashMap<String, Evaluation> {
        self.registry
            .snapshot()
            .evaluate_all(context, &self.operators)
    }

    /// Stop synchronization. Evaluations keep working on the last fetched definitions.
    ///
    /// This function does not wait for the background thread to exit; use [`Client::shutdown`]
    /// for that. Calling `close` more than once is harmless.
    pub fn close(&self) {
        if self.status.close() {
            log::debug!(target: "featureflow", "closing client");
        }
        self.stop_synchronizer();
    }

    /// Close the client and block waiting for the background thread to exit.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SynchronizerPanicked`] if the background thread has panicked.
    pub fn shutdown(&self) -> Result<()> {
        self.close();
        let synchronizer = self
            .synchronizer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        match synchronizer {
            Some(synchronizer) => synchronizer.shutdown(),
            None => Ok(()),
        }
    }

    fn stop_synchronizer(&self) {
        if let Some(synchronizer) = &*self
            .synchronizer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
        {
            synchronizer.stop();
        }
    }
}

impl Drop for Client<'_> {
    fn drop(&mut self) {
        self.close();
    }
}
