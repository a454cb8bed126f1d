//! # Core Configuration Module
//!
//! Provides configuration management for the contact sync core.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a `CoreConfig`
//! instance that holds the settings and injected bridges the core needs.
//! Validation happens once, in [`CoreConfigBuilder::build`].
//!
//! ## Optional Dependencies
//!
//! - `HttpClient` - Required only by remote providers (desktop default: reqwest)
//! - `AccessTokenProvider` - Required only by OAuth-backed providers
//! - `Clock` - Defaults to the system clock
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::{CoreConfig, MatchingConfig};
//!
//! let config = CoreConfig::builder()
//!     .database_path("/var/lib/contacts/contacts.db")
//!     .matching(MatchingConfig::default().with_confidence_threshold(0.6))
//!     .build()?;
//! ```

use crate::error::{Error, Result};
use crate::logging::{build_filter, LoggingConfig};
use bridge_traits::{AccessTokenProvider, Clock, HttpClient, SystemClock};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Minimum trigram similarity for a contact to be considered a candidate.
pub const DEFAULT_MIN_SIMILARITY: f64 = 0.3;

/// Minimum blended score for an import suggestion.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.5;

/// Stricter threshold used when matching calendar attendees.
pub const CALENDAR_CONFIDENCE_THRESHOLD: f64 = 0.7;

/// Weight of name similarity in the blended score.
pub const DEFAULT_NAME_WEIGHT: f64 = 0.6;

/// Weight of identifier overlap in the blended score.
pub const DEFAULT_METHOD_WEIGHT: f64 = 0.4;

/// Number of similar contacts fetched per candidate.
pub const DEFAULT_CANDIDATE_LIMIT: u32 = 5;

/// Upper bound on contacts handed to contact-driven providers.
pub const DEFAULT_CONTACT_PRELOAD_LIMIT: u32 = 10_000;

/// Interval between scheduler passes over due sync states.
pub const DEFAULT_SCHEDULER_TICK: Duration = Duration::from_secs(60);

/// Default buffer size for the event bus.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

const WEIGHT_TOLERANCE: f64 = 1e-6;

/// Thresholds and weights used by the import matcher.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchingConfig {
    /// Similarity floor applied by the fuzzy name search.
    pub min_similarity: f64,
    /// Minimum score for a suggestion to be returned.
    pub confidence_threshold: f64,
    pub name_weight: f64,
    pub method_weight: f64,
    /// How many candidates the fuzzy search returns.
    pub candidate_limit: u32,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self::import()
    }
}

impl MatchingConfig {
    /// Preset used when reviewing address-book imports.
    pub fn import() -> Self {
        Self {
            min_similarity: DEFAULT_MIN_SIMILARITY,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            name_weight: DEFAULT_NAME_WEIGHT,
            method_weight: DEFAULT_METHOD_WEIGHT,
            candidate_limit: DEFAULT_CANDIDATE_LIMIT,
        }
    }

    /// Preset used for calendar attendees, where names are often partial.
    pub fn calendar() -> Self {
        Self {
            confidence_threshold: CALENDAR_CONFIDENCE_THRESHOLD,
            ..Self::import()
        }
    }

    pub fn with_min_similarity(mut self, value: f64) -> Self {
        self.min_similarity = value;
        self
    }

    pub fn with_confidence_threshold(mut self, value: f64) -> Self {
        self.confidence_threshold = value;
        self
    }

    pub fn with_weights(mut self, name_weight: f64, method_weight: f64) -> Self {
        self.name_weight = name_weight;
        self.method_weight = method_weight;
        self
    }

    pub fn with_candidate_limit(mut self, limit: u32) -> Self {
        self.candidate_limit = limit;
        self
    }

    /// Blend name similarity with identifier overlap.
    ///
    /// Overlap only contributes when the candidate has comparable methods, so
    /// a candidate without any never scores above its weighted name similarity.
    ///
    /// ```
    /// use core_runtime::config::MatchingConfig;
    ///
    /// let config = MatchingConfig::import();
    /// assert!((config.score(1.0, 0, 0) - 0.6).abs() < 1e-9);
    /// assert!((config.score(0.5, 1, 2) - 0.5).abs() < 1e-9);
    /// ```
    pub fn score(&self, similarity: f64, method_matches: usize, total_methods: usize) -> f64 {
        let mut score = similarity * self.name_weight;
        if total_methods > 0 {
            score += method_matches as f64 / total_methods as f64 * self.method_weight;
        }
        score
    }

    /// Validates thresholds and weights.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("min_similarity", self.min_similarity),
            ("confidence_threshold", self.confidence_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(Error::Config(format!(
                    "{} must be within [0, 1], got {}",
                    name, value
                )));
            }
        }

        if self.name_weight < 0.0 || self.method_weight < 0.0 {
            return Err(Error::Config(
                "Matching weights cannot be negative".to_string(),
            ));
        }

        let total = self.name_weight + self.method_weight;
        if (total - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(Error::Config(format!(
                "Matching weights must sum to 1.0, got {}",
                total
            )));
        }

        if self.candidate_limit == 0 {
            return Err(Error::Config(
                "Candidate limit must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Core configuration for the contact sync core.
///
/// Use [`CoreConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    /// Path to the SQLite database file. `None` keeps everything in memory.
    pub database_path: Option<PathBuf>,

    /// Maximum pooled database connections
    pub max_db_connections: u32,

    /// Import matching thresholds
    pub matching: MatchingConfig,

    /// How often the scheduler looks for due sync states
    pub scheduler_tick: Duration,

    /// Contacts preloaded for contact-driven providers
    pub contact_preload_limit: u32,

    /// Event bus capacity
    pub event_buffer_size: usize,

    /// Logging setup applied by the service bootstrap
    pub logging: LoggingConfig,

    /// HTTP client for remote providers (optional)
    pub http_client: Option<Arc<dyn HttpClient>>,

    /// OAuth token source for remote providers (optional)
    pub token_provider: Option<Arc<dyn AccessTokenProvider>>,

    /// Time source
    pub clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("database_path", &self.database_path)
            .field("max_db_connections", &self.max_db_connections)
            .field("matching", &self.matching)
            .field("scheduler_tick", &self.scheduler_tick)
            .field("contact_preload_limit", &self.contact_preload_limit)
            .field("event_buffer_size", &self.event_buffer_size)
            .field(
                "http_client",
                &self.http_client.as_ref().map(|_| "HttpClient { ... }"),
            )
            .field(
                "token_provider",
                &self
                    .token_provider
                    .as_ref()
                    .map(|_| "AccessTokenProvider { ... }"),
            )
            .finish()
    }
}

impl CoreConfig {
    /// Creates a new builder for constructing a `CoreConfig`.
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - The database directory exists when a path is given
    /// - Pool size, tick, preload limit and buffer size are non-zero
    /// - Matching thresholds and weights are consistent
    /// - The log filter parses
    pub fn validate(&self) -> Result<()> {
        if let Some(path) = &self.database_path {
            if path.as_os_str().is_empty() {
                return Err(Error::Config("Database path cannot be empty".to_string()));
            }
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() && !parent.exists() {
                    return Err(Error::Config(format!(
                        "Database directory does not exist: {}",
                        parent.display()
                    )));
                }
            }
        }

        if self.max_db_connections == 0 {
            return Err(Error::Config(
                "Database pool needs at least one connection".to_string(),
            ));
        }

        if self.scheduler_tick.is_zero() {
            return Err(Error::Config(
                "Scheduler tick must be greater than zero".to_string(),
            ));
        }

        if self.contact_preload_limit == 0 {
            return Err(Error::Config(
                "Contact preload limit must be greater than 0".to_string(),
            ));
        }

        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "Event buffer size must be greater than 0".to_string(),
            ));
        }

        self.matching.validate()?;
        build_filter(&self.logging)?;

        Ok(())
    }
}

/// Builder for constructing [`CoreConfig`] instances.
#[derive(Default)]
pub struct CoreConfigBuilder {
    database_path: Option<PathBuf>,
    max_db_connections: Option<u32>,
    matching: Option<MatchingConfig>,
    scheduler_tick: Option<Duration>,
    contact_preload_limit: Option<u32>,
    event_buffer_size: Option<usize>,
    logging: Option<LoggingConfig>,
    http_client: Option<Arc<dyn HttpClient>>,
    token_provider: Option<Arc<dyn AccessTokenProvider>>,
    clock: Option<Arc<dyn Clock>>,
}

impl CoreConfigBuilder {
    /// Sets the database path.
    ///
    /// # Examples
    ///
    /// ```
    /// use core_runtime::config::CoreConfig;
    ///
    /// let builder = CoreConfig::builder()
    ///     .database_path("/path/to/contacts.db");
    /// ```
    pub fn database_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.database_path = Some(path.into());
        self
    }

    /// Sets the maximum number of pooled connections. Default: 5
    pub fn max_db_connections(mut self, connections: u32) -> Self {
        self.max_db_connections = Some(connections);
        self
    }

    /// Overrides the import matching thresholds.
    pub fn matching(mut self, matching: MatchingConfig) -> Self {
        self.matching = Some(matching);
        self
    }

    /// Sets how often the scheduler checks for due syncs. Default: 60s
    pub fn scheduler_tick(mut self, tick: Duration) -> Self {
        self.scheduler_tick = Some(tick);
        self
    }

    pub fn contact_preload_limit(mut self, limit: u32) -> Self {
        self.contact_preload_limit = Some(limit);
        self
    }

    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    pub fn logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = Some(logging);
        self
    }

    /// Injects the HTTP client used by remote providers.
    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Injects the OAuth token source used by remote providers.
    pub fn token_provider(mut self, provider: Arc<dyn AccessTokenProvider>) -> Self {
        self.token_provider = Some(provider);
        self
    }

    /// Replaces the system clock, typically with a manual clock in tests.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Builds the final `CoreConfig` instance.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when any value fails validation.
    pub fn build(self) -> Result<CoreConfig> {
        let config = CoreConfig {
            database_path: self.database_path,
            max_db_connections: self.max_db_connections.unwrap_or(5),
            matching: self.matching.unwrap_or_default(),
            scheduler_tick: self.scheduler_tick.unwrap_or(DEFAULT_SCHEDULER_TICK),
            contact_preload_limit: self
                .contact_preload_limit
                .unwrap_or(DEFAULT_CONTACT_PRELOAD_LIMIT),
            event_buffer_size: self.event_buffer_size.unwrap_or(DEFAULT_EVENT_BUFFER_SIZE),
            logging: self.logging.unwrap_or_default(),
            http_client: self.http_client,
            token_provider: self.token_provider,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
        };

        config.validate()?;

        Ok(config)
    }
}
