//! Import review workflow
//!
//! External records that sync could not match wait here until the user
//! imports, links or ignores them.

use crate::error::{EnrichmentError, Result};
use crate::matcher::{ImportMatcher, SuggestedMatch};
use crate::merger::{EnrichmentMerger, EnrichmentReport};
use core_contacts::repositories::pagination::MAX_PAGE_SIZE;
use core_contacts::repositories::{ContactRepository, ExternalContactRepository, Page, PageRequest};
use core_contacts::{
    Contact, ContactMethodType, ExternalContact, IdentifierType, MatchStatus, NewContactMethod,
};
use core_identity::IdentityResolver;
use core_runtime::events::{CoreEvent, EnrichmentEvent, EventBus};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// An external record awaiting review, with the contact it most likely belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportCandidate {
    pub external: ExternalContact,
    pub suggested_match: Option<SuggestedMatch>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkOutcome {
    pub external: ExternalContact,
    pub report: EnrichmentReport,
    /// Identities of the record's emails and phones now linked to the contact
    pub identities_linked: u32,
}

pub struct ImportReviewService {
    externals: Arc<dyn ExternalContactRepository>,
    contacts: Arc<dyn ContactRepository>,
    matcher: Arc<ImportMatcher>,
    merger: Arc<EnrichmentMerger>,
    resolver: Arc<IdentityResolver>,
    event_bus: Arc<EventBus>,
}

impl ImportReviewService {
    pub fn new(
        externals: Arc<dyn ExternalContactRepository>,
        contacts: Arc<dyn ContactRepository>,
        matcher: Arc<ImportMatcher>,
        merger: Arc<EnrichmentMerger>,
        resolver: Arc<IdentityResolver>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            externals,
            contacts,
            matcher,
            merger,
            resolver,
            event_bus,
        }
    }

    /// Unmatched, non-duplicate records with their suggestions.
    ///
    /// Suggestions are scored in memory, so ordering is global over the
    /// oldest `MAX_PAGE_SIZE` records: suggested first by confidence, then
    /// the rest by name with nameless records last. `total` counts the whole
    /// queue; records past the scored window surface once earlier ones are
    /// resolved.
    #[instrument(skip(self))]
    pub async fn list_candidates(&self, page_request: PageRequest) -> Result<Page<ImportCandidate>> {
        let pending = self
            .externals
            .list_unmatched(PageRequest::new(0, MAX_PAGE_SIZE))
            .await?;

        let mut candidates = Vec::with_capacity(pending.items.len());
        for external in pending.items {
            let suggested_match = match self.matcher.find_best_match(&external).await {
                Ok(suggestion) => suggestion,
                Err(e) => {
                    warn!(external_id = %external.id, error = %e, "Failed to score import candidate");
                    None
                }
            };
            candidates.push(ImportCandidate {
                external,
                suggested_match,
            });
        }

        candidates.sort_by(compare_candidates);

        let total = pending.total;
        if total > candidates.len() as u64 {
            debug!(total, scored = candidates.len(), "Import queue larger than the scored window");
        }
        let items = candidates
            .into_iter()
            .skip(page_request.offset() as usize)
            .take(page_request.limit() as usize)
            .collect();

        Ok(Page::new(items, total, page_request))
    }

    pub async fn get_candidate(&self, external_id: &str) -> Result<ImportCandidate> {
        let external = self.load(external_id).await?;
        let suggested_match = self.matcher.find_best_match(&external).await?;

        Ok(ImportCandidate {
            external,
            suggested_match,
        })
    }

    /// Create a new contact from an unmatched record.
    ///
    /// The contact gets the first personal email, the first work or other
    /// email, and the primary (else first) phone, all in one transaction.
    ///
    /// # Errors
    /// `AlreadyProcessed` unless the record is unmatched, `InvalidCandidate`
    /// when it has no usable name.
    #[instrument(skip(self))]
    pub async fn import_candidate(&self, external_id: &str) -> Result<Contact> {
        let external = self.load(external_id).await?;
        if external.match_status != MatchStatus::Unmatched {
            return Err(EnrichmentError::AlreadyProcessed {
                id: external.id,
                status: external.match_status,
            });
        }

        let name = external
            .candidate_name()
            .ok_or_else(|| EnrichmentError::InvalidCandidate {
                id: external.id.clone(),
                reason: "record has no name".to_string(),
            })?;

        let mut contact = Contact::new(name);
        contact.birthday = external.birthday;
        contact.profile_photo = external
            .photo_url
            .clone()
            .filter(|p| !p.trim().is_empty());
        contact.location = external
            .addresses
            .first()
            .map(|a| a.formatted.trim().to_string())
            .filter(|a| !a.is_empty());

        let created = self
            .contacts
            .create(&contact, &methods_for_import(&external))
            .await?;

        if let Err(e) = self
            .externals
            .update_match(&external.id, Some(&created.id), MatchStatus::Imported)
            .await
        {
            warn!(error = %e, "Failed to mark external contact imported");
        }

        info!(contact_id = %created.id, "External contact imported");
        self.event_bus
            .emit(CoreEvent::Enrichment(EnrichmentEvent::CandidateImported {
                external_contact_id: external.id,
                contact_id: created.id.clone(),
            }))
            .ok();

        Ok(created)
    }

    /// Link a record to an existing contact and merge it in.
    ///
    /// Identities already observed for the record's emails and phones are
    /// linked manually to the contact. Failures there are logged and skipped.
    #[instrument(skip(self))]
    pub async fn link_candidate(&self, external_id: &str, contact_id: &str) -> Result<LinkOutcome> {
        let external = self.load(external_id).await?;
        if self.contacts.find_by_id(contact_id).await?.is_none() {
            return Err(EnrichmentError::ContactNotFound(contact_id.to_string()));
        }

        let external = self
            .externals
            .update_match(&external.id, Some(contact_id), MatchStatus::Matched)
            .await?;

        let identities_linked = self.link_identities(&external, contact_id).await;
        let report = self.merger.enrich(contact_id, &external).await?;

        info!(
            identities_linked,
            conflicts = report.conflicts.len(),
            "External contact linked"
        );

        Ok(LinkOutcome {
            external,
            report,
            identities_linked,
        })
    }

    #[instrument(skip(self))]
    pub async fn ignore_candidate(&self, external_id: &str) -> Result<ExternalContact> {
        let external = self.load(external_id).await?;
        let external = self
            .externals
            .update_match(&external.id, external.crm_contact_id.as_deref(), MatchStatus::Ignored)
            .await?;

        self.event_bus
            .emit(CoreEvent::Enrichment(EnrichmentEvent::CandidateIgnored {
                external_contact_id: external.id.clone(),
            }))
            .ok();

        Ok(external)
    }

    async fn load(&self, external_id: &str) -> Result<ExternalContact> {
        self.externals
            .find_by_id(external_id)
            .await?
            .ok_or_else(|| EnrichmentError::CandidateNotFound(external_id.to_string()))
    }

    async fn link_identities(&self, external: &ExternalContact, contact_id: &str) -> u32 {
        let identifiers = external
            .emails
            .iter()
            .map(|e| (e.value.as_str(), IdentifierType::Email))
            .chain(
                external
                    .phones
                    .iter()
                    .map(|p| (p.value.as_str(), IdentifierType::Phone)),
            );

        let mut linked = 0;
        for (raw, identifier_type) in identifiers {
            let identity = match self
                .resolver
                .find_identity(raw, identifier_type, &external.source)
                .await
            {
                Ok(Some(identity)) => identity,
                Ok(None) => continue,
                Err(e) => {
                    warn!(error = %e, "Failed to look up identity");
                    continue;
                }
            };

            if identity.contact_id.as_deref() == Some(contact_id) {
                continue;
            }

            match self.resolver.link_identity(&identity.id, contact_id).await {
                Ok(_) => linked += 1,
                Err(e) => warn!(identity_id = %identity.id, error = %e, "Failed to link identity"),
            }
        }

        linked
    }
}

fn methods_for_import(external: &ExternalContact) -> Vec<NewContactMethod> {
    let usable = |method: NewContactMethod| method.normalized().is_ok().then_some(method);

    let (work, personal): (Vec<_>, Vec<_>) = external.emails.iter().partition(|e| {
        let kind = e.kind.to_lowercase();
        kind == "work" || kind == "other"
    });

    let personal = personal
        .into_iter()
        .find_map(|e| usable(NewContactMethod::new(ContactMethodType::EmailPersonal, &e.value)));
    let work = work
        .into_iter()
        .find_map(|e| usable(NewContactMethod::new(ContactMethodType::EmailWork, &e.value)));

    let phone = external
        .phones
        .iter()
        .find(|p| p.primary)
        .into_iter()
        .chain(external.phones.iter())
        .find_map(|p| usable(NewContactMethod::new(ContactMethodType::Phone, &p.value)));

    [personal, work, phone].into_iter().flatten().collect()
}

fn compare_candidates(a: &ImportCandidate, b: &ImportCandidate) -> Ordering {
    match (&a.suggested_match, &b.suggested_match) {
        (Some(x), Some(y)) => y
            .confidence
            .partial_cmp(&x.confidence)
            .unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => match (a.external.candidate_name(), b.external.candidate_name()) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        },
    }
}
