use std::{sync::Arc, time::Duration};

use crate::{
    evaluation_logger::NoopEvaluationLogger, rules::CustomOperators, Client, CustomOperator, Error,
    EvaluationLogger, FlagDefinition, FlagSource, Result,
};

/// Configuration for [`Client`].
pub struct ClientConfig<'a> {
    pub(crate) api_key: Option<String>,
    pub(crate) base_url: String,
    pub(crate) stream_url: String,
    pub(crate) features: Vec<FlagDefinition>,
    pub(crate) polling_interval: Duration,
    pub(crate) poll_jitter: Duration,
    pub(crate) retry_backoff: Duration,
    pub(crate) ready_timeout: Option<Duration>,
    pub(crate) streaming: bool,
    pub(crate) stream_idle_timeout: Duration,
    pub(crate) debug: bool,
    pub(crate) operators: CustomOperators,
    pub(crate) evaluation_logger: Box<dyn EvaluationLogger + Send + Sync + 'a>,
    pub(crate) error_handler: Option<Arc<dyn Fn(&Error) + Send + Sync>>,
    pub(crate) flag_source: Option<Box<dyn FlagSource>>,
}

impl<'a> ClientConfig<'a> {
    /// Create a default configuration using the specified server environment API key.
    ///
    /// ```
    /// # use featureflow::ClientConfig;
    /// ClientConfig::from_api_key("srv-env-key");
    /// ```
    pub fn from_api_key(api_key: impl Into<String>) -> Self {
        let mut config = ClientConfig::offline();
        config.api_key = Some(api_key.into());
        config
    }

    /// Create a configuration that never talks to the network. Declare features with
    /// [`ClientConfig::with_features`].
    ///
    /// ```
    /// # use featureflow::{ClientConfig, Feature};
    /// let mut config = ClientConfig::offline();
    /// config.with_features([Feature::new("feature-one").variant("on").build()]);
    /// ```
    pub fn offline() -> Self {
        ClientConfig {
            api_key: None,
            base_url: ClientConfig::DEFAULT_BASE_URL.to_owned(),
            stream_url: ClientConfig::DEFAULT_STREAM_URL.to_owned(),
            features: Vec::new(),
            polling_interval: ClientConfig::DEFAULT_POLLING_INTERVAL,
            poll_jitter: ClientConfig::DEFAULT_POLL_JITTER,
            retry_backoff: ClientConfig::DEFAULT_RETRY_BACKOFF,
            ready_timeout: None,
            streaming: false,
            stream_idle_timeout: ClientConfig::DEFAULT_STREAM_IDLE_TIMEOUT,
            debug: false,
            operators: CustomOperators::new(),
            evaluation_logger: Box::new(NoopEvaluationLogger),
            error_handler: None,
            flag_source: None,
        }
    }

    /// Default base URL for API calls.
    pub const DEFAULT_BASE_URL: &'static str = "https://app.featureflow.io";

    /// Default base URL of the streaming endpoint.
    pub const DEFAULT_STREAM_URL: &'static str = "https://features.featureflow.io";

    /// Default interval between refreshes when polling.
    pub const DEFAULT_POLLING_INTERVAL: Duration = Duration::from_secs(5 * 60);

    /// Default upper bound of the random amount subtracted from each polling interval.
    pub const DEFAULT_POLL_JITTER: Duration = Duration::from_secs(3);

    /// Default delay before the first retry of a failed fetch.
    pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_secs(1);

    /// Default time without stream events after which the stream is reopened.
    pub const DEFAULT_STREAM_IDLE_TIMEOUT: Duration = Duration::from_secs(2 * 60);

    /// Override base URL for API calls. Clients should use the default setting in most cases.
    pub fn base_url(&mut self, base_url: impl Into<String>) -> &mut Self {
        self.base_url = base_url.into();
        self
    }

    /// Override base URL of the streaming endpoint.
    pub fn stream_url(&mut self, stream_url: impl Into<String>) -> &mut Self {
        self.stream_url = stream_url.into();
        self
    }

    /// Declare features locally.
    ///
    /// Without an API key they are the only definitions the client knows. With an API key they
    /// are registered with the server and serve until remote definitions with the same key
    /// replace them.
    pub fn with_features(
        &mut self,
        features: impl IntoIterator<Item = FlagDefinition>,
    ) -> &mut Self {
        self.features.extend(features);
        self
    }

    /// Set how often definitions are refreshed when polling.
    pub fn polling_interval(&mut self, polling_interval: Duration) -> &mut Self {
        self.polling_interval = polling_interval;
        self
    }

    /// Set the upper bound of the random amount subtracted from each polling interval, so that
    /// many clients don't poll in lockstep. Capped at half of the polling interval.
    pub fn poll_jitter(&mut self, poll_jitter: Duration) -> &mut Self {
        self.poll_jitter = poll_jitter;
        self
    }

    /// Set the delay before the first retry of a failed fetch. Each following retry waits twice
    /// as long, up to the polling interval.
    pub fn retry_backoff(&mut self, retry_backoff: Duration) -> &mut Self {
        self.retry_backoff = retry_backoff;
        self
    }

    /// Settle readiness with [`Error::ReadyTimeout`] if no definitions arrive within
    /// `ready_timeout`. Fetching keeps retrying in the background.
    pub fn ready_timeout(&mut self, ready_timeout: Duration) -> &mut Self {
        self.ready_timeout = Some(ready_timeout);
        self
    }

    /// Receive updates over a streaming connection instead of polling.
    pub fn streaming(&mut self, streaming: bool) -> &mut Self {
        self.streaming = streaming;
        self
    }

    /// Reopen the stream, with a catch-up fetch, when no event (heartbeats included) arrives for
    /// `stream_idle_timeout`.
    pub fn stream_idle_timeout(&mut self, stream_idle_timeout: Duration) -> &mut Self {
        self.stream_idle_timeout = stream_idle_timeout;
        self
    }

    /// Log synchronization at `info` and every evaluation at `debug`.
    pub fn debug(&mut self, debug: bool) -> &mut Self {
        self.debug = debug;
        self
    }

    /// Register a custom rule operator under `name`.
    ///
    /// ```
    /// # use featureflow::{AttributeValue, ClientConfig, ConditionValue};
    /// let mut config = ClientConfig::from_api_key("srv-env-key");
    /// config.operator("isEven", |attribute: &AttributeValue, _values: &[ConditionValue]| {
    ///     match attribute {
    ///         AttributeValue::Number(n) => Some(n % 2.0 == 0.0),
    ///         _ => None,
    ///     }
    /// });
    /// ```
    pub fn operator(
        &mut self,
        name: impl Into<String>,
        operator: impl CustomOperator + 'static,
    ) -> &mut Self {
        self.operators.register(name, operator);
        self
    }

    /// Set evaluation logger to pass evaluation events to your analytics pipeline.
    ///
    /// ```
    /// # use featureflow::{ClientConfig, EvaluationEvent};
    /// let mut config = ClientConfig::from_api_key("srv-env-key");
    /// config.evaluation_logger(|event: EvaluationEvent| {
    ///   println!("{:?}", event);
    /// });
    /// ```
    pub fn evaluation_logger(
        &mut self,
        evaluation_logger: impl EvaluationLogger + Send + Sync + 'a,
    ) -> &mut Self {
        self.evaluation_logger = Box::new(evaluation_logger);
        self
    }

    /// Set a handler called with every synchronization error. It runs on the background thread.
    pub fn error_handler(
        &mut self,
        handler: impl Fn(&Error) + Send + Sync + 'static,
    ) -> &mut Self {
        self.error_handler = Some(Arc::new(handler));
        self
    }

    /// Fetch definitions from `source` instead of the Featureflow API.
    pub fn flag_source(&mut self, source: impl FlagSource + 'static) -> &mut Self {
        self.flag_source = Some(Box::new(source));
        self
    }

    /// Create a new [`Client`] using the specified configuration.
    ///
    /// ```
    /// # use featureflow::{ClientConfig, Client};
    /// let client: Client = ClientConfig::from_api_key("srv-env-key").to_client().unwrap();
    /// ```
    ///
    /// # Errors
    ///
    /// See [`Client::new`].
    pub fn to_client(self) -> Result<Client<'a>> {
        Client::new(self)
    }
}
