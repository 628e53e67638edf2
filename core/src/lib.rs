//! Declarative HTTP request execution with typed errors.
//!
//! # Overview
//! An `Endpoint` describes one HTTP call. `ApiClient` builds the transport
//! request, executes it, classifies the outcome into a `NetError` and
//! delivers the decoded result through a callback, an `async fn` or a
//! single-item stream. In-flight requests are tracked so they can be
//! cancelled in bulk, and https endpoints may pin the server certificate.
//!
//! # Design
//! - One dispatch path in `client`; the three completion styles only adapt
//!   its final delivery, so they classify and decode identically.
//! - `classify` is pure: status code and transport error in, `NetError` out.
//! - The network sits behind the `Transport` trait. `LiveTransport` uses
//!   reqwest over rustls; `MockTransport` answers from memory.
//! - The registry is the only shared mutable state, behind a reader-writer
//!   lock.
//!
//! ```no_run
//! use serde::Deserialize;
//! use wirecall_core::{ApiClient, Endpoint, HttpConfig};
//!
//! #[derive(Deserialize)]
//! struct User {
//!     name: String,
//! }
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let client = ApiClient::live(HttpConfig::default())?;
//! let endpoint = Endpoint::get("https://api.example.com/users/1").build();
//! let user: User = client.fetch(&endpoint).await?;
//! println!("{}", user.name);
//! # Ok(())
//! # }
//! ```

pub mod classify;
pub mod client;
pub mod coding;
pub mod config;
pub mod delivery;
pub mod endpoint;
pub mod error;
pub mod events;
pub mod http;
pub mod pinning;
pub mod registry;
pub mod transport;

pub use client::{ApiClient, ResponseStream};
pub use coding::{CodingStrategy, KeyCasing};
pub use config::{ConfigError, HttpConfig, HttpConfigBuilder};
pub use delivery::{Delivery, DeliveryQueue, DeliveryReceiver};
pub use endpoint::{CachePolicy, ContentType, Endpoint, EndpointBuilder, Parameters};
pub use error::{ErrorKind, NetError, TransportError};
pub use events::{NetEvent, SubscriptionId};
pub use http::{HttpMethod, HttpRequest, HttpResponse, TransportOutcome};
pub use pinning::{platform_roots, trust_roots, PinnedCertificate, PinningValidator};
pub use registry::{RequestHandle, RequestRegistry};
pub use transport::{LiveTransport, MockTransport, SessionOptions, Transport};
