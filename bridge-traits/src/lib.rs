//! # Host Bridge Traits
//!
//! Capability traits the contact sync core consumes but does not implement.
//!
//! ## Overview
//!
//! The core never talks to the network, the system clock or a credential
//! vault directly. Each of those is a trait defined here and injected by the
//! host, which keeps the sync and matching logic deterministic under test.
//!
//! ## Traits
//!
//! - [`HttpClient`](http::HttpClient) - Async HTTP with retry policies
//! - [`AccessTokenProvider`](auth::AccessTokenProvider) - OAuth access tokens per connected account
//! - [`Clock`](time::Clock) - Time source for deterministic scheduling
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Implementations
//! should convert platform errors into it and keep messages actionable.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so adapters can be shared across
//! async tasks behind `Arc`.

pub mod auth;
pub mod error;
pub mod http;
pub mod time;

pub use error::BridgeError;

// Re-export commonly used types
pub use auth::AccessTokenProvider;
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
pub use time::{Clock, LogLevel, SystemClock};
