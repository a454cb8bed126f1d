//! Core service façade and bootstrap helpers.
//!
//! This crate wires a [`CoreConfig`] into a running contact sync core: the
//! SQLite pool, repositories, identity resolver, import matcher, enrichment
//! merger, review workflow, source registry, orchestrator and scheduler.
//!
//! Desktop hosts typically enable the `desktop-shims` feature, which supplies
//! a `reqwest` HTTP client when the config does not inject one. The
//! `google-contacts` feature registers the Google Contacts provider whenever
//! an HTTP client and a token provider are available.
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//! use core_service::ContactSyncService;
//!
//! let config = CoreConfig::builder().database_path("contacts.db").build()?;
//! let service = ContactSyncService::bootstrap(config).await?;
//! service.start_scheduler();
//! ```

pub mod error;

pub use error::{CoreError, Result};

use std::sync::Arc;

use core_contacts::db::{create_pool, health_check, DatabaseConfig};
use core_contacts::repositories::{
    SqliteContactMethodRepository, SqliteContactRepository, SqliteEnrichmentRepository,
    SqliteExternalContactRepository,
};
use core_enrichment::{EnrichmentMerger, ImportMatcher, ImportReviewService};
use core_identity::{IdentityResolver, SqliteIdentityRepository};
use core_runtime::config::CoreConfig;
use core_runtime::events::{CoreEvent, EventBus};
use core_runtime::logging::init_logging;
use core_sync::{
    CancellationToken, SchedulerHandle, SourceRegistry, SqliteSyncLogRepository,
    SqliteSyncStateRepository, SyncLog, SyncOrchestrator, SyncProvider, SyncScheduler,
};
use parking_lot::Mutex;
use sqlx::SqlitePool;
use tokio::sync::broadcast::Receiver;
use tracing::{debug, info, instrument, warn};

/// Primary façade exposed to host applications.
pub struct ContactSyncService {
    config: CoreConfig,
    pool: SqlitePool,
    event_bus: Arc<EventBus>,
    contacts: Arc<SqliteContactRepository>,
    externals: Arc<SqliteExternalContactRepository>,
    resolver: Arc<IdentityResolver>,
    matcher: Arc<ImportMatcher>,
    merger: Arc<EnrichmentMerger>,
    review: Arc<ImportReviewService>,
    registry: Arc<SourceRegistry>,
    orchestrator: Arc<SyncOrchestrator>,
    shutdown: CancellationToken,
    scheduler: Mutex<Option<SchedulerHandle>>,
}

impl ContactSyncService {
    /// Install the configured logging, then build the service.
    ///
    /// A subscriber installed earlier by the host is kept.
    pub async fn bootstrap(config: CoreConfig) -> Result<Self> {
        if let Err(e) = init_logging(config.logging.clone()) {
            debug!(error = %e, "Logging already initialized, keeping host subscriber");
        }
        Self::new(config).await
    }

    /// Open the database, wire every component and recover syncs that were
    /// interrupted by a previous shutdown.
    pub async fn new(config: CoreConfig) -> Result<Self> {
        config.validate()?;

        let db_config = match &config.database_path {
            Some(path) => DatabaseConfig::new(path.clone()).max_connections(config.max_db_connections),
            None => DatabaseConfig::in_memory(),
        };
        let pool = create_pool(db_config).await?;

        let event_bus = Arc::new(EventBus::new(config.event_buffer_size));
        let clock = config.clock.clone();

        let contacts = Arc::new(SqliteContactRepository::new(pool.clone()));
        let methods = Arc::new(SqliteContactMethodRepository::new(pool.clone()));
        let externals = Arc::new(SqliteExternalContactRepository::new(pool.clone()));
        let enrichments = Arc::new(SqliteEnrichmentRepository::new(pool.clone()));

        let resolver = Arc::new(IdentityResolver::new(
            Arc::new(SqliteIdentityRepository::new(pool.clone())),
            methods.clone(),
            contacts.clone(),
            clock.clone(),
            event_bus.clone(),
        ));
        let matcher = Arc::new(ImportMatcher::new(contacts.clone(), config.matching));
        let merger = Arc::new(EnrichmentMerger::new(
            contacts.clone(),
            methods,
            enrichments,
            event_bus.clone(),
        ));
        let review = Arc::new(ImportReviewService::new(
            externals.clone(),
            contacts.clone(),
            matcher.clone(),
            merger.clone(),
            resolver.clone(),
            event_bus.clone(),
        ));

        let registry = Arc::new(SourceRegistry::new());
        let orchestrator = Arc::new(
            SyncOrchestrator::new(
                registry.clone(),
                Arc::new(SqliteSyncStateRepository::new(pool.clone())),
                Arc::new(SqliteSyncLogRepository::new(pool.clone())),
                contacts.clone(),
                clock,
                event_bus.clone(),
            )
            .with_contact_preload_limit(config.contact_preload_limit),
        );

        let service = Self {
            config,
            pool,
            event_bus,
            contacts,
            externals,
            resolver,
            matcher,
            merger,
            review,
            registry,
            orchestrator,
            shutdown: CancellationToken::new(),
            scheduler: Mutex::new(None),
        };

        service.register_builtin_providers()?;

        let recovered = service.orchestrator.recover_interrupted().await?;
        if recovered > 0 {
            warn!(recovered, "Recovered sync states interrupted by a previous shutdown");
        }

        info!(
            providers = service.registry.count(),
            in_memory = service.config.database_path.is_none(),
            "Contact sync core initialized"
        );
        Ok(service)
    }

    #[cfg(feature = "google-contacts")]
    fn register_builtin_providers(&self) -> Result<()> {
        let http = match &self.config.http_client {
            Some(client) => Some(client.clone()),
            None => default_http_client()?,
        };

        match (http, self.config.token_provider.clone()) {
            (Some(http), Some(tokens)) => {
                let provider = provider_google_contacts::GoogleContactsProvider::new(
                    provider_google_contacts::PeopleClient::new(http, tokens),
                    self.externals.clone(),
                    self.resolver.clone(),
                    self.merger.clone(),
                    self.config.clock.clone(),
                );
                self.register_provider(Arc::new(provider));
            }
            _ => warn!(
                "Google Contacts provider not registered: HTTP client or token provider missing"
            ),
        }
        Ok(())
    }

    #[cfg(not(feature = "google-contacts"))]
    fn register_builtin_providers(&self) -> Result<()> {
        Ok(())
    }

    /// Add a provider to the registry, replacing any with the same name.
    pub fn register_provider(&self, provider: Arc<dyn SyncProvider>) {
        let name = provider.config().name;
        if self.registry.register(provider).is_some() {
            warn!(source = %name, "Replaced registered sync provider");
        } else {
            debug!(source = %name, "Registered sync provider");
        }
    }

    /// Start the background scheduler. Returns `false` when it is already running.
    pub fn start_scheduler(&self) -> bool {
        let mut slot = self.scheduler.lock();
        if slot.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return false;
        }

        let handle = SyncScheduler::new(self.orchestrator.clone(), self.config.scheduler_tick)
            .with_cancellation(self.shutdown.child_token())
            .spawn();
        *slot = Some(handle);
        true
    }

    /// Stop the scheduler (if running) and cancel in-flight syncs.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let handle = self.scheduler.lock().take();
        if let Some(handle) = handle {
            handle.shutdown().await;
        }
        info!("Contact sync core stopped");
    }

    /// Run one sync now. Cancelled by [`shutdown`](Self::shutdown).
    #[instrument(skip(self))]
    pub async fn trigger_sync(&self, source: &str, account_id: Option<&str>) -> Result<SyncLog> {
        let cancel = self.shutdown.child_token();
        Ok(self
            .orchestrator
            .trigger_sync(source, account_id, &cancel)
            .await?)
    }

    pub async fn health_check(&self) -> Result<()> {
        Ok(health_check(&self.pool).await?)
    }

    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.event_bus.subscribe()
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    pub fn contacts(&self) -> &Arc<SqliteContactRepository> {
        &self.contacts
    }

    pub fn external_contacts(&self) -> &Arc<SqliteExternalContactRepository> {
        &self.externals
    }

    pub fn resolver(&self) -> &Arc<IdentityResolver> {
        &self.resolver
    }

    pub fn matcher(&self) -> &Arc<ImportMatcher> {
        &self.matcher
    }

    pub fn merger(&self) -> &Arc<EnrichmentMerger> {
        &self.merger
    }

    pub fn review(&self) -> &Arc<ImportReviewService> {
        &self.review
    }

    pub fn registry(&self) -> &Arc<SourceRegistry> {
        &self.registry
    }

    pub fn orchestrator(&self) -> &Arc<SyncOrchestrator> {
        &self.orchestrator
    }
}

/// `reqwest` client used when the host does not inject one.
#[cfg(all(
    feature = "google-contacts",
    feature = "desktop-shims",
    not(target_arch = "wasm32")
))]
fn default_http_client() -> Result<Option<Arc<dyn bridge_traits::http::HttpClient>>> {
    Ok(Some(Arc::new(bridge_desktop::ReqwestHttpClient::new()?)))
}

#[cfg(all(
    feature = "google-contacts",
    not(all(feature = "desktop-shims", not(target_arch = "wasm32")))
))]
fn default_http_client() -> Result<Option<Arc<dyn bridge_traits::http::HttpClient>>> {
    Ok(None)
}
