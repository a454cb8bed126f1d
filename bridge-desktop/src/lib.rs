//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop and server hosts.
//!
//! - `HttpClient` using `reqwest`
//! - `AccessTokenProvider` backed by an in-memory token table, for hosts that
//!   refresh tokens elsewhere and push them in
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{ReqwestHttpClient, StaticTokenProvider};
//!
//! let http_client = ReqwestHttpClient::new()?;
//! let tokens = StaticTokenProvider::new();
//! tokens.set_token("alice@example.com", "ya29...");
//! ```

mod http;
mod tokens;

pub use http::ReqwestHttpClient;
pub use tokens::StaticTokenProvider;
