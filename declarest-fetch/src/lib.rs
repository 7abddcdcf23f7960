// Lint configuration for this crate
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! # Declarest Fetch
//!
//! The requester and everything it plugs into: authenticators, decoders,
//! the default retry policy, declarative definitions, and a reqwest
//! transport with a retry loop on top.
//!
//! ## Requester
//!
//! - [`requester::Requester`] - Builds requests, interprets responses
//! - [`requester::HttpRequester`] - Template-driven implementation
//! - [`definition::RequesterDefinition`] - YAML/JSON form of a requester
//!
//! ## Capabilities
//!
//! - [`auth`] - Bearer, API key, and basic credentials
//! - [`decoder`] - JSON, JSON Lines, and XML bodies
//! - [`retry::DefaultRetryPolicy`] - Status-based retries with backoff
//!
//! ## I/O
//!
//! - [`host::HttpTransport`] - Sends a resolved request
//! - [`client::RequestClient`] - Fetches a page, sleeping between retries
//!
//! ## Example
//!
//! ```ignore
//! use declarest_core::{Config, PaginationContext};
//! use declarest_fetch::{RequestClient, RequesterDefinition};
//!
//! let definition = RequesterDefinition::from_yaml_str(YAML)?;
//! let requester = definition.build(Config::from_json_str(CONFIG)?)?;
//!
//! let client = RequestClient::new()?;
//! let context = PaginationContext::new().with_slice(json!({"id": "42"}));
//! let records = client.fetch(&requester, &context).await?;
//! ```

pub mod auth;
pub mod client;
pub mod decoder;
pub mod definition;
pub mod error;
pub mod host;
pub mod params;
pub mod requester;
pub mod retry;

// Errors
pub use error::{ErrorKind, FetchError, TransportError};

// Requester
pub use definition::{AuthenticatorDefinition, DecoderDefinition, RequesterDefinition, RetryDefinition};
pub use params::{BodyDefinition, InterpolatedBody, InterpolatedJson, InterpolatedMapping, InterpolatedParameterProvider};
pub use requester::{HttpRequester, HttpRequesterBuilder, Requester, ResponseAction};

// Capabilities
pub use auth::{ApiKeyAuthenticator, ApiKeyLocation, BasicAuthenticator, BearerAuthenticator, NoAuth};
pub use decoder::{JsonDecoder, JsonLinesDecoder, XmlDecoder};
pub use retry::DefaultRetryPolicy;

// I/O
pub use client::RequestClient;
pub use host::{HttpTransport, ReqwestTransport};
