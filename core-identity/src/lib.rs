//! # Identity Resolution
//!
//! Maps identifiers seen by sync sources (emails, phone numbers, chat handles)
//! to local contacts.
//!
//! ## Overview
//!
//! - `ExternalIdentity` rows are unique per `(identifier, identifier_type, source)`
//! - `IdentityResolver::match_or_create` links through a known contact, a cached
//!   link, or an exact search over contact methods, and never guesses when more
//!   than one contact matches
//! - Manual link/unlink and the unmatched review queue

pub mod error;
pub mod models;
pub mod repository;
pub mod resolver;

pub use core_contacts::normalize;
pub use error::{IdentityError, Result};
pub use models::{ExternalIdentity, MatchType, UpsertIdentity};
pub use repository::{IdentityRepository, SqliteIdentityRepository};
pub use resolver::{BulkLinkReport, IdentityResolver, MatchRequest, MatchResult};
