//! # Import Matching & Enrichment
//!
//! Works on contact-like records pulled from external sources.
//!
//! ## Overview
//!
//! - `ImportMatcher` suggests an existing contact for an external record by
//!   blending fuzzy name similarity with identifier overlap
//! - `EnrichmentMerger` fills empty contact fields and missing methods from an
//!   external record, never overwriting what the user entered, and records
//!   where each value came from
//! - `ImportReviewService` is the acceptance side: import a record as a new
//!   contact, link it to an existing one, or ignore it

pub mod error;
pub mod matcher;
pub mod merger;
pub mod review;

pub use error::{EnrichmentError, Result};
pub use matcher::{ImportMatcher, SuggestedMatch};
pub use merger::{
    ConflictReason, ConflictResolution, EnrichmentMerger, EnrichmentReport, MethodConflict,
    MethodSelection,
};
pub use review::{ImportCandidate, ImportReviewService, LinkOutcome};
