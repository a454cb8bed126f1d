//! Workspace placeholder crate.
//!
//! This crate exists to expose shared feature flags that map to the individual
//! workspace crates (e.g., `core-service`, `core-sync`, `provider-google-contacts`).
//! Host applications can depend on `contact-sync-workspace` and enable the
//! documented features without needing to wire each crate individually.

#[cfg(any(feature = "desktop-shims", feature = "google-contacts"))]
pub use core_service::{ContactSyncService, CoreError};
