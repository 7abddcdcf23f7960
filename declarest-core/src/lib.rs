// Lint configuration for this crate
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! # `declarest` Core
//!
//! Core types, templates, and capability traits for the `declarest`
//! request engine.
//!
//! This crate holds everything that does not touch the network:
//!
//! - Runtime configuration ([`Config`])
//! - The template language ([`Template`], [`Bindings`])
//! - Plain-data HTTP types ([`RequestDescriptor`], [`HttpResponse`])
//! - Capability traits ([`Authenticator`], [`Decoder`], [`ParameterProvider`],
//!   [`RetryPolicy`])
//! - Error types
//!
//! ## Key Types
//!
//! ### Requests
//! - [`HttpMethod`] - Supported HTTP methods
//! - [`RequestDescriptor`] - A fully resolved request, ready to send
//! - [`RequestBody`] - JSON, form, or raw body
//! - [`PaginationContext`] - State, slice, and page token for one page
//!
//! ### Responses
//! - [`HttpResponse`] - A completed exchange handed back by the transport
//! - [`RetryDecision`] - Accept, retry after a delay, or give up

pub mod config;
pub mod error;
pub mod models;
pub mod template;
pub mod traits;

// Re-export error types
pub use error::{CoreError, DecodeError, TemplateError};

// Re-export configuration and templates
pub use config::Config;
pub use template::{Bindings, Template, evaluate};

// Re-export all model types
pub use models::{
    GiveUpReason, HttpMethod, HttpResponse, PaginationContext, RequestBody, RequestDescriptor,
    RetryDecision, join_url,
};

// Re-export traits
pub use traits::{Authenticator, Decoder, ParameterProvider, RetryPolicy, exponential_backoff};
