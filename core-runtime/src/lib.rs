//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the contact sync core:
//! - Logging and tracing infrastructure
//! - Configuration management
//! - Event bus system
//! - The error taxonomy shared by every domain crate
//!
//! ## Overview
//!
//! This crate contains the runtime utilities that other modules depend on.
//! It establishes logging conventions, configuration validation and the
//! event broadcasting used to surface sync and enrichment progress.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, ErrorKind, Result};
