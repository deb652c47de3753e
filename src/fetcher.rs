//! Remote sources of flag definitions.
use std::{
    io::{self, Read},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use reqwest::{
    header::{ACCEPT, ETAG, IF_NONE_MATCH},
    StatusCode, Url,
};

use crate::{flag::FlagSet, sse::EventStream, Error, FlagDefinition, Result, StreamEvent};

/// Result of a successful fetch.
#[derive(Debug)]
pub enum FetchOutcome {
    /// A full set of flag definitions.
    Flags(FlagSet),
    /// Definitions have not changed since the previous fetch.
    NotModified,
}

/// A blocking iterator of stream events.
pub type EventIter = Box<dyn Iterator<Item = Result<StreamEvent>> + Send>;

/// A remote source of flag definitions.
///
/// The synchronizer calls all methods from its background thread, never concurrently.
pub trait FlagSource: Send {
    /// Fetch the full set of flag definitions. Must be idempotent.
    fn fetch(&mut self) -> Result<FetchOutcome>;

    /// Open a streaming channel of definition updates.
    ///
    /// Returns `Ok(None)` if the source does not support streaming; the synchronizer then falls
    /// back to polling. The returned iterator is consumed on a separate thread.
    ///
    /// Sources that support streaming must also implement [`FlagSource::unsubscribe`].
    fn subscribe(&mut self) -> Result<Option<EventIter>> {
        Ok(None)
    }

    /// Release the channel opened by the last [`FlagSource::subscribe`] call. Its iterator must
    /// end promptly afterwards, even while it is waiting for the next event.
    ///
    /// Called when the stream goes idle and when the client is closed.
    fn unsubscribe(&mut self) {}

    /// Register locally declared features with the remote source.
    fn register(&mut self, _features: &[FlagDefinition]) -> Result<()> {
        Ok(())
    }
}

/// Configuration for [`HttpFlagSource`].
#[derive(Debug, Clone)]
pub struct HttpFlagSourceConfig {
    /// Server environment API key.
    pub api_key: String,
    /// Base URL of the features and registration endpoints.
    pub base_url: String,
    /// Base URL of the streaming endpoint.
    pub stream_url: String,
}

const FEATURES_ENDPOINT: &str = "/api/sdk/v1/features";
const STREAM_ENDPOINT: &str = "/api/sdk/v1/features/stream";
const REGISTER_ENDPOINT: &str = "/api/sdk/v1/register";

/// Bounds each blocking read of the stream body so the reader notices cancellation.
const STREAM_READ_TIMEOUT: Duration = Duration::from_secs(1);

/// A [`FlagSource`] that fetches flag definitions over HTTP.
pub struct HttpFlagSource {
    // Client holds a connection pool internally, so we're reusing the client between requests.
    client: reqwest::blocking::Client,
    // Reads of the stream body time out quickly and are retried until the stream is cancelled.
    stream_client: reqwest::blocking::Client,
    config: HttpFlagSourceConfig,
    /// `ETag` of the last successful fetch, sent back as `If-None-Match`.
    etag: Option<String>,
    /// If we receive a 401 Unauthorized error during a request, it means the API key is not
    /// valid. We cache this error so we don't issue additional requests to the server.
    unauthorized: bool,
    /// Cancellation flag of the open stream, if any.
    subscription: Option<Arc<AtomicBool>>,
}

impl HttpFlagSource {
    /// Create a new HTTP source.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Network`] if the HTTP client cannot be initialized.
    pub fn new(config: HttpFlagSourceConfig) -> Result<HttpFlagSource> {
        let user_agent = concat!("featureflow-rust/", env!("CARGO_PKG_VERSION"));
        let client = reqwest::blocking::Client::builder()
            .user_agent(user_agent)
            .build()?;
        let stream_client = reqwest::blocking::Client::builder()
            .user_agent(user_agent)
            .timeout(STREAM_READ_TIMEOUT)
            .build()?;

        Ok(HttpFlagSource {
            client,
            stream_client,
            config,
            etag: None,
            unauthorized: false,
            subscription: None,
        })
    }

    fn url(base_url: &str, endpoint: &str) -> Result<Url> {
        Url::parse(&format!("{}{}", base_url.trim_end_matches('/'), endpoint))
            .map_err(Error::InvalidBaseUrl)
    }

    fn check_status(
        &mut self,
        response: reqwest::blocking::Response,
    ) -> Result<reqwest::blocking::Response> {
        match response.status() {
            status if status.is_success() || status == StatusCode::NOT_MODIFIED => Ok(response),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                log::warn!(target: "featureflow", "client is not authorized. Check your API key");
                self.unauthorized = true;
                Err(Error::Unauthorized)
            }
            status => {
                log::warn!(target: "featureflow", "received non-200 response: {:?}", status);
                Err(Error::UnexpectedStatus(status.as_u16()))
            }
        }
    }
}

impl FlagSource for HttpFlagSource {
    fn fetch(&mut self) -> Result<FetchOutcome> {
        if self.unauthorized {
            return Err(Error::Unauthorized);
        }

        let url = HttpFlagSource::url(&self.config.base_url, FEATURES_ENDPOINT)?;

        log::debug!(target: "featureflow", "fetching feature definitions");
        let mut request = self.client.get(url).bearer_auth(&self.config.api_key);
        if let Some(etag) = &self.etag {
            request = request.header(IF_NONE_MATCH, etag);
        }
        let response = self.check_status(request.send()?)?;

        if response.status() == StatusCode::NOT_MODIFIED {
            log::debug!(target: "featureflow", "feature definitions not modified");
            return Ok(FetchOutcome::NotModified);
        }

        let etag = response
            .headers()
            .get(ETAG)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        let flags = response.json()?;
        self.etag = etag;

        log::debug!(target: "featureflow", "successfully fetched feature definitions");
        Ok(FetchOutcome::Flags(flags))
    }

    fn subscribe(&mut self) -> Result<Option<EventIter>> {
        if self.unauthorized {
            return Err(Error::Unauthorized);
        }

        let url = HttpFlagSource::url(&self.config.stream_url, STREAM_ENDPOINT)?;

        log::debug!(target: "featureflow", "opening feature stream");
        let response = self
            .stream_client
            .get(url)
            .bearer_auth(&self.config.api_key)
            .header(ACCEPT, "text/event-stream")
            .send()?;
        let response = self.check_status(response)?;

        let cancelled = Arc::new(AtomicBool::new(false));
        if let Some(previous) = self.subscription.replace(Arc::clone(&cancelled)) {
            previous.store(true, Ordering::SeqCst);
        }
        let body = StreamBody {
            response,
            cancelled,
        };
        Ok(Some(Box::new(EventStream::new(body))))
    }

    fn unsubscribe(&mut self) {
        if let Some(cancelled) = self.subscription.take() {
            log::debug!(target: "featureflow", "closing feature stream");
            cancelled.store(true, Ordering::SeqCst);
        }
    }

    fn register(&mut self, features: &[FlagDefinition]) -> Result<()> {
        if self.unauthorized {
            return Err(Error::Unauthorized);
        }

        let url = HttpFlagSource::url(&self.config.base_url, REGISTER_ENDPOINT)?;

        log::debug!(target: "featureflow", count = features.len(); "registering local features");
        let response = self
            .client
            .put(url)
            .bearer_auth(&self.config.api_key)
            .json(features)
            .send()?;
        self.check_status(response)?;
        Ok(())
    }
}

/// Chunks of a streaming response body. Ends once cancelled, dropping the response and with it
/// the connection.
struct StreamBody {
    response: reqwest::blocking::Response,
    cancelled: Arc<AtomicBool>,
}

impl Iterator for StreamBody {
    type Item = io::Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut buf = [0; 4096];
        loop {
            if self.cancelled.load(Ordering::SeqCst) {
                return None;
            }
            match self.response.read(&mut buf) {
                Ok(0) => return None,
                Ok(n) => return Some(Ok(buf[..n].to_vec())),
                // Nothing arrived within the read timeout. Check for cancellation and keep
                // waiting.
                Err(err) if is_timeout(&err) => {}
                Err(err) => return Some(Err(err)),
            }
        }
    }
}

fn is_timeout(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::TimedOut
        || err
            .get_ref()
            .and_then(|inner| inner.downcast_ref::<reqwest::Error>())
            .is_some_and(reqwest::Error::is_timeout)
}

#[cfg(test)]
mod tests {
    use std::{
        io::{self, Read, Write},
        net::TcpListener,
        thread,
        time::Duration,
    };

    use wiremock::{
        matchers::{body_json, header, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    use super::{FetchOutcome, FlagSource, HttpFlagSource, HttpFlagSourceConfig};
    use crate::{Error, Feature, StreamEvent};

    // The blocking client must be created and dropped outside of the async runtime, so tests
    // build it inside `spawn_blocking`.
    fn source(uri: &str) -> HttpFlagSource {
        HttpFlagSource::new(HttpFlagSourceConfig {
            api_key: "srv-env-key".into(),
            base_url: uri.to_owned(),
            stream_url: uri.to_owned(),
        })
        .unwrap()
    }

    fn features_body() -> serde_json::Value {
        serde_json::from_str(include_str!("../tests/data/features.json")).unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn fetches_with_bearer_auth_and_etag() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/sdk/v1/features"))
            .and(header("if-none-match", "\"v1\""))
            .respond_with(ResponseTemplate::new(304))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/sdk/v1/features"))
            .and(header("authorization", "Bearer srv-env-key"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("etag", "\"v1\"")
                    .set_body_json(features_body()),
            )
            .mount(&server)
            .await;

        let uri = server.uri();
        let (first, second) = tokio::task::spawn_blocking(move || {
            let mut source = source(&uri);
            let first = source.fetch();
            let second = source.fetch();
            (first, second)
        })
        .await
        .unwrap();

        assert!(matches!(
            first,
            Ok(FetchOutcome::Flags(flags)) if flags.contains_key("example-feature")
        ));
        assert!(matches!(second, Ok(FetchOutcome::NotModified)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unauthorized_is_sticky() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/sdk/v1/features"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let uri = server.uri();
        let (first, second) = tokio::task::spawn_blocking(move || {
            let mut source = source(&uri);
            (source.fetch(), source.fetch())
        })
        .await
        .unwrap();

        assert!(matches!(first, Err(Error::Unauthorized)));
        assert!(matches!(second, Err(Error::Unauthorized)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn server_errors_are_transient() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/sdk/v1/features"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let uri = server.uri();
        let result = tokio::task::spawn_blocking(move || source(&uri).fetch())
            .await
            .unwrap();

        let err = result.unwrap_err();
        assert!(matches!(err, Error::UnexpectedStatus(503)));
        assert!(err.is_transient());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn registers_local_features() {
        let server = MockServer::start().await;
        let features = vec![Feature::on("feature-one")];
        Mock::given(method("PUT"))
            .and(path("/api/sdk/v1/register"))
            .and(body_json(&features))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let uri = server.uri();
        let result = tokio::task::spawn_blocking(move || source(&uri).register(&features))
            .await
            .unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn subscribes_to_event_stream() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/sdk/v1/features/stream"))
            .and(header("accept", "text/event-stream"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                "event: features.deleted\ndata: [\"dark-mode\"]\n\n",
                "text/event-stream",
            ))
            .mount(&server)
            .await;

        let uri = server.uri();
        let events = tokio::task::spawn_blocking(move || {
            source(&uri)
                .subscribe()
                .unwrap()
                .expect("http source supports streaming")
                .collect::<Vec<_>>()
        })
        .await
        .unwrap();

        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], Ok(StreamEvent::Deleted(keys)) if keys == &["dark-mode"]));
    }

    #[test]
    fn unsubscribe_releases_a_silent_stream() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let uri = format!("http://{}", listener.local_addr().unwrap());
        let server = thread::spawn(move || {
            let (mut socket, _) = listener.accept().unwrap();
            let mut request = [0; 1024];
            let _ = socket.read(&mut request).unwrap();
            socket
                .write_all(b"HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\n\r\n")
                .unwrap();
            // Blocks until the client drops the connection.
            socket
                .set_read_timeout(Some(Duration::from_secs(10)))
                .unwrap();
            socket.read(&mut request)
        });

        let mut source = source(&uri);
        let mut events = source.subscribe().unwrap().expect("streaming is supported");
        let reader = thread::spawn(move || events.next().is_none());

        thread::sleep(Duration::from_millis(100));
        source.unsubscribe();

        assert!(reader.join().unwrap(), "the stream ends once unsubscribed");
        let closed = match server.join().unwrap() {
            Ok(n) => n == 0,
            Err(err) => !matches!(err.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut),
        };
        assert!(closed, "the connection is closed");
    }

    #[test]
    fn invalid_base_url() {
        let mut source = HttpFlagSource::new(HttpFlagSourceConfig {
            api_key: "srv-env-key".into(),
            base_url: "not a url".into(),
            stream_url: "not a url".into(),
        })
        .unwrap();
        assert!(matches!(source.fetch(), Err(Error::InvalidBaseUrl(_))));
    }
}
