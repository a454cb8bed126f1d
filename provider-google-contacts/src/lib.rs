//! # Google Contacts Provider
//!
//! Implements `SyncProvider` over the Google People API.
//!
//! ## Overview
//!
//! This module provides:
//! - Paginated listing of `people/me/connections` with incremental sync tokens
//! - Conversion of People API persons into external contact records
//! - Duplicate detection across connected accounts by email
//! - Identity matching of each record's emails and phones, with enrichment on a match

pub mod client;
pub mod error;
pub mod provider;
pub mod types;

pub use client::PeopleClient;
pub use error::{GoogleContactsError, Result};
pub use provider::{GoogleContactsProvider, SOURCE_NAME};
