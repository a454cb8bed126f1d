//! # Repository Pattern Implementation
//!
//! Each record type has a trait describing its data access and a SQLite
//! implementation on `sqlx`. Services depend on the traits through `Arc<dyn _>`.
//!
//! ## Available Repositories
//!
//! - `ContactRepository` / `ContactSearch` - contacts, transactional method writes, fuzzy name search
//! - `ContactMethodRepository` - identifying methods and normalized-value lookup
//! - `ExternalContactRepository` - source-side records and their review state
//! - `EnrichmentRepository` - enrichment provenance

pub mod contact;
pub mod contact_method;
pub mod enrichment;
pub mod external_contact;
pub mod pagination;

pub use contact::{ContactRepository, ContactSearch, SqliteContactRepository};
pub use contact_method::{ContactMethodRepository, SqliteContactMethodRepository};
pub use enrichment::{EnrichmentRepository, SqliteEnrichmentRepository};
pub use external_contact::{
    ExternalContactRepository, SqliteExternalContactRepository, UpsertOutcome,
};
pub use pagination::{Page, PageRequest};
