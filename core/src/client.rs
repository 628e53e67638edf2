//! Execution engine shared by every completion style.
//!
//! # Design
//! `ApiClient` has exactly one dispatch path. It builds the request, picks
//! the session (pinned or shared), registers a `RequestHandle`, and spawns the
//! transport call on the client's runtime. When the transport settles, the
//! rest of the work (classification, the 401/403 notification, decoding and
//! the caller's completion) runs as one job on the endpoint's `Delivery`.
//!
//! The front ends are thin adapters over that path:
//! - `request` / `request_data` take a completion closure,
//! - `fetch` / `fetch_data` are `async fn`s resolving to the same result,
//! - `request_stream` / `stream_data` return a lazy single-item stream.
//!
//! The `_text` variants of each style deliver the success body as UTF-8;
//! invalid bytes are a decoding failure.
//!
//! Because every adapter ends in the same job, the error mapping and the
//! at-most-once delivery hold for all of them.

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use futures::stream::{self, Stream};
use serde::de::DeserializeOwned;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use url::Url;

use crate::classify::settle;
use crate::coding::CodingStrategy;
use crate::config::{ConfigError, HttpConfig};
use crate::endpoint::Endpoint;
use crate::error::{NetError, TransportError};
use crate::events::{EventBus, NetEvent, SubscriptionId};
use crate::http::{build_request, TransportOutcome};
use crate::pinning::PinningValidator;
use crate::registry::{RequestHandle, RequestRegistry};
use crate::transport::{LiveTransport, SessionOptions, Transport};

/// Single-item stream produced by the stream front ends.
pub type ResponseStream<T> = Pin<Box<dyn Stream<Item = Result<T, NetError>> + Send>>;

type Decode<T> = fn(CodingStrategy, Bytes) -> Result<T, NetError>;

/// Cheaply clonable request service. Clones share the transport, the
/// registry of in-flight requests and the event subscribers.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<Inner>,
}

struct Inner {
    transport: Arc<dyn Transport>,
    runtime: Handle,
    registry: RequestRegistry,
    events: EventBus,
}

impl ApiClient {
    /// Client that runs transport calls on the current tokio runtime.
    ///
    /// # Panics
    /// Panics when called outside a tokio runtime.
    pub fn new(transport: impl Transport) -> Self {
        Self::with_runtime(transport, Handle::current())
    }

    pub fn with_runtime(transport: impl Transport, runtime: Handle) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport: Arc::new(transport),
                runtime,
                registry: RequestRegistry::new(),
                events: EventBus::new(),
            }),
        }
    }

    /// Client over reqwest, configured by `config`.
    ///
    /// # Panics
    /// Panics when called outside a tokio runtime.
    pub fn live(config: HttpConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(LiveTransport::new(config)?))
    }

    /// Execute `endpoint` and call `completion` exactly once with the decoded
    /// body or the classified error.
    pub fn request<T, F>(&self, endpoint: &Endpoint, completion: F) -> Arc<RequestHandle>
    where
        T: DeserializeOwned + Send + 'static,
        F: FnOnce(Result<T, NetError>) + Send + 'static,
    {
        self.dispatch(endpoint, decode_json::<T>, completion)
    }

    /// Like `request`, but delivers the success body unchanged.
    pub fn request_data<F>(&self, endpoint: &Endpoint, completion: F) -> Arc<RequestHandle>
    where
        F: FnOnce(Result<Bytes, NetError>) + Send + 'static,
    {
        self.dispatch(endpoint, raw_body, completion)
    }

    /// Like `request`, but delivers the success body as a UTF-8 string.
    pub fn request_text<F>(&self, endpoint: &Endpoint, completion: F) -> Arc<RequestHandle>
    where
        F: FnOnce(Result<String, NetError>) + Send + 'static,
    {
        self.dispatch(endpoint, decode_text, completion)
    }

    /// Execute `endpoint` and wait for the decoded body. Dropping the future
    /// before it resolves cancels the request.
    pub async fn fetch<T>(&self, endpoint: &Endpoint) -> Result<T, NetError>
    where
        T: DeserializeOwned + Send + 'static,
    {
        self.await_dispatch(endpoint, decode_json::<T>).await
    }

    pub async fn fetch_data(&self, endpoint: &Endpoint) -> Result<Bytes, NetError> {
        self.await_dispatch(endpoint, raw_body).await
    }

    pub async fn fetch_text(&self, endpoint: &Endpoint) -> Result<String, NetError> {
        self.await_dispatch(endpoint, decode_text).await
    }

    /// Stream that executes `endpoint` when first polled, yields one item and
    /// ends. Dropping it early cancels the request.
    pub fn request_stream<T>(&self, endpoint: &Endpoint) -> ResponseStream<T>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let client = self.clone();
        let endpoint = endpoint.clone();
        Box::pin(stream::once(async move {
            client.await_dispatch(&endpoint, decode_json::<T>).await
        }))
    }

    pub fn stream_data(&self, endpoint: &Endpoint) -> ResponseStream<Bytes> {
        let client = self.clone();
        let endpoint = endpoint.clone();
        Box::pin(stream::once(async move {
            client.await_dispatch(&endpoint, raw_body).await
        }))
    }

    pub fn stream_text(&self, endpoint: &Endpoint) -> ResponseStream<String> {
        let client = self.clone();
        let endpoint = endpoint.clone();
        Box::pin(stream::once(async move {
            client.await_dispatch(&endpoint, decode_text).await
        }))
    }

    /// Cancel every registered request and clear the registry.
    pub fn cancel_all(&self) {
        self.inner.registry.cancel_all();
    }

    /// Number of registered handles, finished ones included until a bulk
    /// cancel or `registry().prune()`.
    pub fn in_flight(&self) -> usize {
        self.inner.registry.count()
    }

    pub fn registry(&self) -> &RequestRegistry {
        &self.inner.registry
    }

    /// Observe 401/403 classifications from any request on this client.
    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&NetEvent) + Send + Sync + 'static,
    {
        self.inner.events.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.events.unsubscribe(id)
    }

    async fn await_dispatch<T>(&self, endpoint: &Endpoint, decode: Decode<T>) -> Result<T, NetError>
    where
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let handle = self.dispatch(endpoint, decode, move |result| {
            let _ = tx.send(result);
        });
        let _guard = CancelOnDrop(handle);
        rx.await.unwrap_or(Err(NetError::Unknown { source: None }))
    }

    /// The one execution path behind every front end.
    fn dispatch<T, F>(&self, endpoint: &Endpoint, decode: Decode<T>, completion: F) -> Arc<RequestHandle>
    where
        T: Send + 'static,
        F: FnOnce(Result<T, NetError>) + Send + 'static,
    {
        let request = build_request(endpoint);
        let session = self.session_for(endpoint, &request.url);
        let handle = Arc::new(RequestHandle::new());
        self.inner.registry.insert(handle.clone());
        tracing::debug!(id = %handle.id(), "{request}");

        let inner = self.inner.clone();
        let task = handle.clone();
        let delivery = endpoint.delivery.clone();
        let coding = endpoint.coding;
        self.inner.runtime.spawn(async move {
            let url = request.url.clone();
            let outcome = match session {
                Ok(options) => {
                    let token = task.token().clone();
                    tokio::select! {
                        biased;
                        _ = token.cancelled() => TransportOutcome::Failure(TransportError::Cancelled),
                        outcome = inner.transport.send(request, options) => outcome,
                    }
                }
                Err(error) => TransportOutcome::Failure(error),
            };
            // A cancel that lands after the transport settled still wins.
            let outcome = if task.complete() {
                outcome
            } else {
                TransportOutcome::Failure(TransportError::Cancelled)
            };
            match &outcome {
                TransportOutcome::Response(response) => {
                    tracing::debug!(id = %task.id(), "{} {url}", response.status)
                }
                TransportOutcome::Failure(error) => {
                    tracing::debug!(id = %task.id(), %error, "{url} failed")
                }
            }

            delivery.dispatch(Box::new(move || {
                let result = settle(outcome).and_then(|response| decode(coding, response.body));
                if let Err(error) = &result {
                    inner.notify(error);
                }
                completion(result);
            }));
        });

        handle
    }

    fn session_for(&self, endpoint: &Endpoint, url: &Url) -> Result<SessionOptions, TransportError> {
        let pinning = if endpoint.ssl_pinning_enabled {
            // Without TLS there is no handshake to pin.
            if url.scheme() != "https" {
                tracing::warn!(%url, "pinning enabled for a non-https target");
                return Err(TransportError::Other(format!(
                    "certificate pinning requires https, got {}",
                    url.scheme()
                )));
            }
            let pinned = endpoint
                .pinned_certificate
                .as_ref()
                .and_then(|cert| cert.load(self.inner.transport.certificate_dir()));
            if pinned.is_none() {
                tracing::warn!(url = %endpoint.target, "pinning enabled without a pinned certificate; handshakes will be rejected");
            }
            let roots = self.inner.transport.root_store();
            let validator = PinningValidator::new(roots, pinned).map_err(|e| {
                tracing::warn!(error = %e, "failed to build pinning validator");
                TransportError::Other(e.to_string())
            })?;
            Some(Arc::new(validator))
        } else {
            None
        };
        Ok(SessionOptions {
            timeout: endpoint.timeout,
            pinning,
        })
    }
}

impl Inner {
    fn notify(&self, error: &NetError) {
        match error {
            NetError::Unauthorized { .. } => self.events.publish(&NetEvent::Unauthorized),
            NetError::Prohibited { message, .. } => self.events.publish(&NetEvent::Prohibited {
                message: message.clone(),
            }),
            _ => {}
        }
    }
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("in_flight", &self.inner.registry.count())
            .field("events", &self.inner.events)
            .finish_non_exhaustive()
    }
}

fn decode_json<T: DeserializeOwned>(coding: CodingStrategy, body: Bytes) -> Result<T, NetError> {
    coding.decode(&body).map_err(NetError::decoding)
}

fn raw_body(_: CodingStrategy, body: Bytes) -> Result<Bytes, NetError> {
    Ok(body)
}

fn decode_text(_: CodingStrategy, body: Bytes) -> Result<String, NetError> {
    String::from_utf8(body.to_vec()).map_err(NetError::decoding)
}

/// Cancels the request if the awaiting future is dropped first. Cancelling a
/// completed handle does nothing.
struct CancelOnDrop(Arc<RequestHandle>);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}
