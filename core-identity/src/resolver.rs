//! # Identity Resolver
//!
//! Links identifiers observed by sync providers to local contacts.
//!
//! ## Resolution order
//!
//! 1. Normalize the raw identifier. Unusable input is rejected before any write.
//! 2. When the provider already knows the contact, link to it directly.
//! 3. Otherwise reuse an existing link for the same `(identifier, type, source)`.
//! 4. Otherwise search contact methods for the exact normalized value. A single
//!    hit links the identity; several hits leave it unmatched for review.
//!
//! ```ignore
//! let result = resolver
//!     .match_or_create(MatchRequest::new("Jane@Example.com", IdentifierType::Email, "gmail"))
//!     .await?;
//! if result.contact_id.is_none() {
//!     // shows up in list_unmatched()
//! }
//! ```

use crate::error::{IdentityError, Result};
use crate::models::{ExternalIdentity, MatchType, UpsertIdentity};
use crate::repository::IdentityRepository;
use bridge_traits::time::Clock;
use core_contacts::normalize::{method_types_for, normalize};
use core_contacts::repositories::{ContactMethodRepository, ContactRepository, Page, PageRequest};
use core_contacts::IdentifierType;
use core_runtime::events::{CoreEvent, EventBus, IdentityEvent};
use core_runtime::logging::redact_identifier;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// One identifier observation from a provider.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchRequest {
    pub raw_identifier: String,
    pub identifier_type: IdentifierType,
    pub source: String,
    pub source_id: Option<String>,
    pub display_name: Option<String>,
    /// Set by contact-driven providers that queried on behalf of a contact
    pub known_contact_id: Option<String>,
}

impl MatchRequest {
    pub fn new(
        raw_identifier: impl Into<String>,
        identifier_type: IdentifierType,
        source: impl Into<String>,
    ) -> Self {
        Self {
            raw_identifier: raw_identifier.into(),
            identifier_type,
            source: source.into(),
            source_id: None,
            display_name: None,
            known_contact_id: None,
        }
    }

    pub fn with_source_id(mut self, source_id: impl Into<String>) -> Self {
        self.source_id = Some(source_id.into());
        self
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    pub fn with_known_contact(mut self, contact_id: impl Into<String>) -> Self {
        self.known_contact_id = Some(contact_id.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub identity: ExternalIdentity,
    pub contact_id: Option<String>,
    pub match_type: MatchType,
    /// The link came from a previous run; nothing was written
    pub cached: bool,
}

impl MatchResult {
    fn from_identity(identity: ExternalIdentity, cached: bool) -> Self {
        Self {
            contact_id: identity.contact_id.clone(),
            match_type: identity.match_type,
            identity,
            cached,
        }
    }
}

/// Outcome of [`IdentityResolver::bulk_link_identities`].
#[derive(Debug)]
pub struct BulkLinkReport {
    /// Identities linked before the first failure
    pub linked: usize,
    pub failed_id: Option<String>,
    pub error: Option<IdentityError>,
}

impl BulkLinkReport {
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }
}

pub struct IdentityResolver {
    identities: Arc<dyn IdentityRepository>,
    methods: Arc<dyn ContactMethodRepository>,
    contacts: Arc<dyn ContactRepository>,
    clock: Arc<dyn Clock>,
    event_bus: Arc<EventBus>,
}

impl IdentityResolver {
    pub fn new(
        identities: Arc<dyn IdentityRepository>,
        methods: Arc<dyn ContactMethodRepository>,
        contacts: Arc<dyn ContactRepository>,
        clock: Arc<dyn Clock>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            identities,
            methods,
            contacts,
            clock,
            event_bus,
        }
    }

    /// Resolve an observed identifier and record the observation.
    ///
    /// Ambiguous discovery is not an error: the identity is stored unmatched
    /// and an `IdentityEvent::Ambiguous` is emitted.
    ///
    /// # Errors
    /// `InvalidIdentifier` when the identifier normalizes to nothing. Storage
    /// failures propagate unchanged.
    #[instrument(
        skip(self, request),
        fields(source = %request.source, identifier_type = %request.identifier_type)
    )]
    pub async fn match_or_create(&self, request: MatchRequest) -> Result<MatchResult> {
        let normalized = normalize(&request.raw_identifier, request.identifier_type);
        if normalized.is_empty() {
            return Err(IdentityError::InvalidIdentifier(request.raw_identifier));
        }

        let existing = self
            .identities
            .find_by_identifier(request.identifier_type, &normalized, &request.source)
            .await?;

        if let Some(contact_id) = request.known_contact_id.clone() {
            let already_linked = existing
                .as_ref()
                .and_then(|identity| identity.contact_id.as_deref())
                == Some(contact_id.as_str());

            let stored = self
                .store(&request, normalized, Some(contact_id.clone()), MatchType::Exact)
                .await?;
            if !already_linked {
                self.emit_linked(&stored.id, &contact_id, MatchType::Exact, 1.0);
            }
            return Ok(MatchResult::from_identity(stored, false));
        }

        if let Some(identity) = existing.filter(ExternalIdentity::is_linked) {
            debug!(identity_id = %identity.id, "Using cached identity link");
            return Ok(MatchResult::from_identity(identity, true));
        }

        let contact_ids = self
            .methods
            .find_contact_ids(&normalized, method_types_for(request.identifier_type))
            .await?;

        match contact_ids.as_slice() {
            [] => {
                let stored = self.store(&request, normalized, None, MatchType::Unmatched).await?;
                debug!(identity_id = %stored.id, "No contact holds this identifier");
                Ok(MatchResult::from_identity(stored, false))
            }
            [contact_id] => {
                let contact_id = contact_id.clone();
                let stored = self
                    .store(&request, normalized, Some(contact_id.clone()), MatchType::Exact)
                    .await?;
                info!(identity_id = %stored.id, contact_id = %contact_id, "Identity matched");
                self.emit_linked(&stored.id, &contact_id, MatchType::Exact, 1.0);
                Ok(MatchResult::from_identity(stored, false))
            }
            candidates => {
                let count = candidates.len();
                warn!(
                    candidates = count,
                    identifier = %redact_identifier(&normalized),
                    "Identifier matches several contacts, leaving it for manual review"
                );
                let stored = self.store(&request, normalized, None, MatchType::Unmatched).await?;
                self.event_bus
                    .emit(CoreEvent::Identity(IdentityEvent::Ambiguous {
                        identity_id: stored.id.clone(),
                        source: stored.source.clone(),
                        candidates: u32::try_from(count).unwrap_or(u32::MAX),
                    }))
                    .ok();
                Ok(MatchResult::from_identity(stored, false))
            }
        }
    }

    async fn store(
        &self,
        request: &MatchRequest,
        normalized: String,
        contact_id: Option<String>,
        match_type: MatchType,
    ) -> Result<ExternalIdentity> {
        let match_confidence = contact_id.as_ref().map(|_| 1.0);
        let observation = UpsertIdentity {
            identifier: normalized,
            identifier_type: request.identifier_type,
            raw_identifier: request.raw_identifier.trim().to_string(),
            source: request.source.clone(),
            source_id: request.source_id.clone(),
            display_name: request.display_name.clone(),
            contact_id,
            match_type,
            match_confidence,
            seen_at: self.clock.unix_timestamp(),
            message_count: 1,
        };

        self.identities.upsert(&observation).await
    }

    /// Manually link an identity to a contact.
    #[instrument(skip(self))]
    pub async fn link_identity(&self, identity_id: &str, contact_id: &str) -> Result<ExternalIdentity> {
        self.ensure_contact(contact_id).await?;

        let identity = self
            .identities
            .link(
                identity_id,
                contact_id,
                MatchType::Manual,
                Some(1.0),
                self.clock.unix_timestamp(),
            )
            .await?;

        info!("Identity linked manually");
        self.emit_linked(&identity.id, contact_id, MatchType::Manual, 1.0);
        Ok(identity)
    }

    #[instrument(skip(self))]
    pub async fn unlink_identity(&self, identity_id: &str) -> Result<ExternalIdentity> {
        let identity = self
            .identities
            .unlink(identity_id, self.clock.unix_timestamp())
            .await?;

        info!("Identity unlinked");
        self.event_bus
            .emit(CoreEvent::Identity(IdentityEvent::Unlinked {
                identity_id: identity.id.clone(),
            }))
            .ok();
        Ok(identity)
    }

    /// Link several identities to one contact, stopping at the first failure.
    ///
    /// An unknown contact fails the whole call before anything is linked.
    #[instrument(skip(self, identity_ids), fields(count = identity_ids.len()))]
    pub async fn bulk_link_identities(
        &self,
        identity_ids: &[String],
        contact_id: &str,
    ) -> Result<BulkLinkReport> {
        self.ensure_contact(contact_id).await?;

        let now = self.clock.unix_timestamp();
        let mut linked = 0;
        for identity_id in identity_ids {
            match self
                .identities
                .link(identity_id, contact_id, MatchType::Manual, Some(1.0), now)
                .await
            {
                Ok(identity) => {
                    linked += 1;
                    self.emit_linked(&identity.id, contact_id, MatchType::Manual, 1.0);
                }
                Err(error) => {
                    warn!(identity_id = %identity_id, linked, error = %error, "Bulk link stopped");
                    return Ok(BulkLinkReport {
                        linked,
                        failed_id: Some(identity_id.clone()),
                        error: Some(error),
                    });
                }
            }
        }

        Ok(BulkLinkReport {
            linked,
            failed_id: None,
            error: None,
        })
    }

    pub async fn list_unmatched(&self, page_request: PageRequest) -> Result<Page<ExternalIdentity>> {
        self.identities.list_unmatched(page_request).await
    }

    pub async fn count_unmatched(&self) -> Result<i64> {
        self.identities.count_unmatched().await
    }

    /// Add `count` messages to an identity and mark it seen now.
    pub async fn increment_message_count(&self, identity_id: &str, count: i64) -> Result<ExternalIdentity> {
        self.identities
            .add_message_count(identity_id, count, self.clock.unix_timestamp())
            .await
    }

    pub async fn get_identity(&self, identity_id: &str) -> Result<ExternalIdentity> {
        self.identities
            .find_by_id(identity_id)
            .await?
            .ok_or_else(|| IdentityError::IdentityNotFound(identity_id.to_string()))
    }

    /// Look up the identity a raw identifier would resolve to, without recording anything.
    pub async fn find_identity(
        &self,
        raw_identifier: &str,
        identifier_type: IdentifierType,
        source: &str,
    ) -> Result<Option<ExternalIdentity>> {
        let normalized = normalize(raw_identifier, identifier_type);
        if normalized.is_empty() {
            return Ok(None);
        }

        self.identities
            .find_by_identifier(identifier_type, &normalized, source)
            .await
    }

    pub async fn list_identities_for_contact(&self, contact_id: &str) -> Result<Vec<ExternalIdentity>> {
        self.identities.list_for_contact(contact_id).await
    }

    /// Permanently remove an identity. The next observation recreates it unmatched.
    #[instrument(skip(self))]
    pub async fn delete_identity(&self, identity_id: &str) -> Result<()> {
        if self.identities.delete(identity_id).await? {
            Ok(())
        } else {
            Err(IdentityError::IdentityNotFound(identity_id.to_string()))
        }
    }

    async fn ensure_contact(&self, contact_id: &str) -> Result<()> {
        match self.contacts.find_by_id(contact_id).await? {
            Some(_) => Ok(()),
            None => Err(IdentityError::ContactNotFound(contact_id.to_string())),
        }
    }

    fn emit_linked(&self, identity_id: &str, contact_id: &str, match_type: MatchType, confidence: f64) {
        self.event_bus
            .emit(CoreEvent::Identity(IdentityEvent::Linked {
                identity_id: identity_id.to_string(),
                contact_id: contact_id.to_string(),
                match_type: match_type.to_string(),
                confidence,
            }))
            .ok();
    }
}
