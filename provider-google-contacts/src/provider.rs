//! Google Contacts sync provider
//!
//! Pulls the account's connections, stores each one as an external contact,
//! flags cross-account duplicates by email, and links records to local
//! contacts through the identity resolver. Matched contacts are enriched with
//! the external data.

use crate::client::PeopleClient;
use crate::error::{GoogleContactsError, Result};
use crate::types::Person;
use async_trait::async_trait;
use bridge_traits::time::Clock;
use core_contacts::repositories::ExternalContactRepository;
use core_contacts::{Contact, ExternalContact, IdentifierType, MatchStatus};
use core_enrichment::EnrichmentMerger;
use core_identity::{IdentityResolver, MatchRequest};
use core_sync::{
    CancellationToken, SourceConfig, SyncError, SyncProvider, SyncResult, SyncState, SyncStrategy,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Registry key and identity source for Google Contacts.
pub const SOURCE_NAME: &str = "gcontacts";

const SYNC_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// What happened to one person during a run.
#[derive(Debug, Default, Clone, Copy)]
struct PersonOutcome {
    created: bool,
    matched: bool,
}

pub struct GoogleContactsProvider {
    client: PeopleClient,
    externals: Arc<dyn ExternalContactRepository>,
    resolver: Arc<IdentityResolver>,
    merger: Arc<EnrichmentMerger>,
    clock: Arc<dyn Clock>,
}

impl GoogleContactsProvider {
    pub fn new(
        client: PeopleClient,
        externals: Arc<dyn ExternalContactRepository>,
        resolver: Arc<IdentityResolver>,
        merger: Arc<EnrichmentMerger>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            client,
            externals,
            resolver,
            merger,
            clock,
        }
    }

    #[instrument(skip(self, cancel, state), fields(account = ?state.account_id))]
    async fn run(&self, cancel: &CancellationToken, state: &SyncState) -> Result<SyncResult> {
        let account_id = state
            .account_id
            .as_deref()
            .ok_or(GoogleContactsError::MissingAccount)?;
        let sync_token = state.sync_cursor.as_deref().filter(|t| !t.is_empty());

        let result = match self.fetch_all(cancel, account_id, sync_token).await {
            Err(GoogleContactsError::SyncTokenExpired) if sync_token.is_some() => {
                warn!("Sync token expired, falling back to a full sync");
                self.fetch_all(cancel, account_id, None).await?
            }
            other => other?,
        };

        info!(
            processed = result.items_processed,
            matched = result.items_matched,
            created = result.items_created,
            failed = result.items_failed,
            "Google Contacts sync finished"
        );
        Ok(result)
    }

    async fn fetch_all(
        &self,
        cancel: &CancellationToken,
        account_id: &str,
        sync_token: Option<&str>,
    ) -> Result<SyncResult> {
        let mut result = SyncResult::default();
        let mut page_token: Option<String> = None;
        let mut pages = 0u32;

        loop {
            if cancel.is_cancelled() {
                return Err(GoogleContactsError::Cancelled);
            }

            let page = self
                .client
                .list_connections(account_id, page_token.as_deref(), sync_token)
                .await?;
            pages += 1;

            for person in &page.connections {
                if cancel.is_cancelled() {
                    return Err(GoogleContactsError::Cancelled);
                }
                if person.is_deleted() || !person.has_identifying_data() {
                    continue;
                }

                match self.process_person(person, account_id).await {
                    Ok(outcome) => {
                        result.items_processed += 1;
                        if outcome.created {
                            result.items_created += 1;
                        }
                        if outcome.matched {
                            result.items_matched += 1;
                        }
                    }
                    Err(e) => {
                        warn!(resource = %person.resource_name, error = %e, "Failed to process contact");
                        result.items_failed += 1;
                    }
                }
            }

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(next) => page_token = Some(next),
                None => {
                    if let Some(token) = page.next_sync_token.filter(|t| !t.is_empty()) {
                        result.new_cursor = Some(token);
                    }
                    break;
                }
            }
        }

        result
            .metadata
            .insert("pages".to_string(), serde_json::Value::from(pages));
        result.metadata.insert(
            "incremental".to_string(),
            serde_json::Value::Bool(sync_token.is_some()),
        );
        Ok(result)
    }

    /// Store one person. Only the upsert can fail the item; duplicate and
    /// match problems are logged.
    async fn process_person(&self, person: &Person, account_id: &str) -> Result<PersonOutcome> {
        let record = person.to_record(SOURCE_NAME, account_id, self.clock.unix_timestamp());
        let upserted = self.externals.upsert(&record).await?;
        let contact = upserted.contact;

        let duplicate = match self.check_duplicates(&contact).await {
            Ok(duplicate) => duplicate,
            Err(e) => {
                debug!(id = %contact.id, error = %e, "Duplicate check failed");
                contact.duplicate_of_id.is_some()
            }
        };

        let matched = if duplicate {
            false
        } else {
            match self.attempt_match(&contact).await {
                Ok(matched) => matched,
                Err(e) => {
                    debug!(id = %contact.id, error = %e, "Match attempt failed");
                    false
                }
            }
        };

        Ok(PersonOutcome {
            created: upserted.inserted,
            matched,
        })
    }

    /// Mark `contact` as a duplicate of the oldest other record sharing one
    /// of its emails. Returns whether it is a duplicate.
    async fn check_duplicates(&self, contact: &ExternalContact) -> Result<bool> {
        for email in &contact.emails {
            let holders = self.externals.find_by_normalized_email(&email.value).await?;
            let Some(oldest) = holders.first() else {
                continue;
            };
            if oldest.id == contact.id {
                continue;
            }

            self.externals.mark_duplicate(&contact.id, &oldest.id).await?;
            debug!(id = %contact.id, duplicate_of = %oldest.id, "Marked external contact as duplicate");
            return Ok(true);
        }
        Ok(contact.duplicate_of_id.is_some())
    }

    /// Link `contact` through its emails, then its phones. The first
    /// identifier that resolves to a local contact wins.
    async fn attempt_match(&self, contact: &ExternalContact) -> Result<bool> {
        if contact.crm_contact_id.is_some() || contact.match_status == MatchStatus::Ignored {
            return Ok(false);
        }

        let identifiers = contact
            .emails
            .iter()
            .map(|e| (e.value.as_str(), IdentifierType::Email))
            .chain(
                contact
                    .phones
                    .iter()
                    .map(|p| (p.value.as_str(), IdentifierType::Phone)),
            );

        for (value, identifier_type) in identifiers {
            let mut request = MatchRequest::new(value, identifier_type, SOURCE_NAME)
                .with_source_id(contact.source_id.clone());
            if let Some(name) = &contact.display_name {
                request = request.with_display_name(name.clone());
            }

            let resolved = match self.resolver.match_or_create(request).await {
                Ok(resolved) => resolved,
                Err(e) => {
                    debug!(identifier_type = %identifier_type, error = %e, "Identifier not resolvable");
                    continue;
                }
            };

            let Some(contact_id) = resolved.contact_id else {
                continue;
            };

            let linked = self
                .externals
                .update_match(&contact.id, Some(&contact_id), MatchStatus::Matched)
                .await?;

            match self.merger.enrich(&contact_id, &linked).await {
                Ok(report) if report.changed() => {
                    debug!(contact_id = %contact_id, fields = report.fields_filled, methods = report.methods_added, "Enriched contact");
                }
                Ok(_) => {}
                Err(e) => warn!(contact_id = %contact_id, error = %e, "Enrichment failed"),
            }
            return Ok(true);
        }

        Ok(false)
    }
}

#[async_trait]
impl SyncProvider for GoogleContactsProvider {
    fn config(&self) -> SourceConfig {
        SourceConfig {
            name: SOURCE_NAME.to_string(),
            display_name: "Google Contacts".to_string(),
            strategy: SyncStrategy::FetchAll,
            supports_multi_account: true,
            supports_discovery: true,
            default_interval: SYNC_INTERVAL,
        }
    }

    async fn sync(
        &self,
        cancel: &CancellationToken,
        state: &SyncState,
        _contacts: &[Contact],
    ) -> core_sync::Result<SyncResult> {
        self.run(cancel, state).await.map_err(SyncError::from)
    }

    async fn validate_credentials(&self, account_id: Option<&str>) -> core_sync::Result<()> {
        self.client
            .validate(account_id)
            .await
            .map_err(SyncError::from)
    }
}
