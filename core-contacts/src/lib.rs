//! # Contact Store
//!
//! The local contact records the sync core links external data to.
//!
//! ## Overview
//!
//! This crate owns:
//! - The SQLite pool and embedded schema migrations for every table the core uses
//! - Contacts, their identifying methods, external contacts and enrichment audit rows
//! - Identifier normalization shared by matching and storage
//! - Trigram name similarity for fuzzy contact search

pub mod db;
pub mod error;
pub mod models;
pub mod normalize;
pub mod repositories;
pub mod similarity;

pub use db::{create_pool, create_test_pool, DatabaseConfig};
pub use error::{ContactsError, Result};
pub use models::{
    AddressEntry, Contact, ContactEnrichment, ContactMatch, ContactMethod, EmailEntry,
    ExternalContact, MatchStatus, NewContactMethod, NewEnrichment, PhoneEntry, ProfileField,
    UpsertExternalContact,
};
pub use normalize::{ContactMethodType, IdentifierType};
