//! # Enrichment Merger
//!
//! One-directional merge of an external record into a local contact.
//!
//! ## Policy
//!
//! - Scalar fields (`profile_photo`, `birthday`, `location`) are copied only
//!   when the contact's value is missing or blank. Each fill is a conditional
//!   write, so a value the user saves meanwhile is never replaced.
//! - Emails and phones are added when their normalized value is not already
//!   on the contact. A method type slot that already holds a different value
//!   is a conflict: reported, never overwritten.
//! - Every fill writes a `ContactEnrichment` audit row. The audit key is
//!   unique, so repeating a merge does not duplicate provenance.
//! - Only the initial contact lookup can fail the call. Every later write is
//!   best-effort: failures are logged, counted and skipped.

use crate::error::{EnrichmentError, Result};
use core_contacts::models::DATE_FORMAT;
use core_contacts::normalize::{identifier_type_for_method, normalize, normalize_email};
use core_contacts::repositories::{ContactMethodRepository, ContactRepository, EnrichmentRepository};
use core_contacts::{
    Contact, ContactEnrichment, ContactMethodType, ExternalContact, IdentifierType,
    NewContactMethod, NewEnrichment, ProfileField,
};
use core_runtime::events::{CoreEvent, EnrichmentEvent, EventBus};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// A value the user picked from an external record, and the slot to put it in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodSelection {
    pub value: String,
    pub method_type: ContactMethodType,
}

impl MethodSelection {
    pub fn new(method_type: ContactMethodType, value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            method_type,
        }
    }
}

/// What to do when a selected value targets a slot that is already filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictResolution {
    UseExternal,
    UseCrm,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum ConflictReason {
    /// The contact already holds `existing` in this slot
    SlotTaken { existing: String },
    /// The selected value is not part of the external record
    NotInExternal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodConflict {
    pub value: String,
    pub method_type: ContactMethodType,
    #[serde(flatten)]
    pub reason: ConflictReason,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichmentReport {
    pub fields_filled: u32,
    pub methods_added: u32,
    pub methods_replaced: u32,
    pub conflicts: Vec<MethodConflict>,
    /// Writes that failed and were skipped
    pub failures: u32,
}

impl EnrichmentReport {
    pub fn changed(&self) -> bool {
        self.fields_filled + self.methods_added + self.methods_replaced > 0
    }

    fn conflict(&mut self, method_type: ContactMethodType, value: &str, reason: ConflictReason) {
        self.conflicts.push(MethodConflict {
            value: value.to_string(),
            method_type,
            reason,
        });
    }
}

/// Stored methods of a contact, by slot and by normalized value.
struct MethodIndex {
    by_type: HashMap<ContactMethodType, (String, String)>,
    normalized: HashSet<String>,
}

impl MethodIndex {
    fn of(contact: &Contact) -> Self {
        let mut index = Self {
            by_type: HashMap::new(),
            normalized: HashSet::new(),
        };
        for method in &contact.methods {
            index.take(method.method_type, &method.id, &method.normalized_value);
        }
        index
    }

    fn take(&mut self, method_type: ContactMethodType, id: &str, normalized: &str) {
        self.by_type
            .insert(method_type, (id.to_string(), normalized.to_string()));
        self.normalized.insert(normalized.to_string());
    }
}

pub struct EnrichmentMerger {
    contacts: Arc<dyn ContactRepository>,
    methods: Arc<dyn ContactMethodRepository>,
    enrichments: Arc<dyn EnrichmentRepository>,
    event_bus: Arc<EventBus>,
}

impl EnrichmentMerger {
    pub fn new(
        contacts: Arc<dyn ContactRepository>,
        methods: Arc<dyn ContactMethodRepository>,
        enrichments: Arc<dyn EnrichmentRepository>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            contacts,
            methods,
            enrichments,
            event_bus,
        }
    }

    /// Fill empty fields and add missing emails and phones from `external`.
    ///
    /// Emails whose source label mentions "work" go to the `email_work` slot,
    /// all others to `email_personal`. Added methods are never primary.
    ///
    /// # Errors
    /// Only when the contact cannot be loaded.
    #[instrument(skip(self, external), fields(external_id = %external.id, source = %external.source))]
    pub async fn enrich(&self, contact_id: &str, external: &ExternalContact) -> Result<EnrichmentReport> {
        let mut contact = self.load(contact_id).await?;
        let mut report = EnrichmentReport::default();

        self.fill_fields(&mut contact, external, &mut report).await;

        let mut index = MethodIndex::of(&contact);

        for email in &external.emails {
            let normalized = normalize_email(&email.value);
            if normalized.is_empty() || index.normalized.contains(&normalized) {
                continue;
            }

            let method_type = if email.kind.to_lowercase().contains("work") {
                ContactMethodType::EmailWork
            } else {
                ContactMethodType::EmailPersonal
            };
            self.add_if_free(
                &contact,
                external,
                method_type,
                &email.value,
                &normalized,
                &mut index,
                &mut report,
            )
            .await;
        }

        for phone in &external.phones {
            let normalized = normalize(&phone.value, IdentifierType::Phone);
            if normalized.is_empty() || index.normalized.contains(&normalized) {
                continue;
            }

            self.add_if_free(
                &contact,
                external,
                ContactMethodType::Phone,
                &phone.value,
                &normalized,
                &mut index,
                &mut report,
            )
            .await;
        }

        self.finish(&contact, external, &report);
        Ok(report)
    }

    /// Enrich with methods the user picked, resolving slot conflicts as instructed.
    ///
    /// `resolutions` is keyed by the selected value. A slot conflict without a
    /// resolution is reported; `UseCrm` keeps the stored value silently.
    #[instrument(
        skip(self, external, selections, resolutions),
        fields(external_id = %external.id, selected = selections.len())
    )]
    pub async fn enrich_with_selections(
        &self,
        contact_id: &str,
        external: &ExternalContact,
        selections: &[MethodSelection],
        resolutions: &HashMap<String, ConflictResolution>,
    ) -> Result<EnrichmentReport> {
        let mut contact = self.load(contact_id).await?;
        let mut report = EnrichmentReport::default();

        self.fill_fields(&mut contact, external, &mut report).await;

        let mut index = MethodIndex::of(&contact);
        let offered: HashSet<&str> = external
            .emails
            .iter()
            .map(|e| e.value.as_str())
            .chain(external.phones.iter().map(|p| p.value.as_str()))
            .collect();

        for selection in selections {
            if !offered.contains(selection.value.as_str()) {
                report.conflict(
                    selection.method_type,
                    &selection.value,
                    ConflictReason::NotInExternal,
                );
                continue;
            }

            let normalized = normalize(
                &selection.value,
                identifier_type_for_method(selection.method_type),
            );
            if normalized.is_empty() || index.normalized.contains(&normalized) {
                continue;
            }

            let Some((existing_id, existing)) = index.by_type.get(&selection.method_type).cloned()
            else {
                self.add_method(
                    &contact,
                    external,
                    selection.method_type,
                    &selection.value,
                    &normalized,
                    &mut index,
                    &mut report,
                )
                .await;
                continue;
            };

            match resolutions.get(&selection.value) {
                Some(ConflictResolution::UseExternal) => {
                    match self.methods.update_value(&existing_id, &selection.value).await {
                        Ok(_) => {
                            index.normalized.remove(&existing);
                            index.take(selection.method_type, &existing_id, &normalized);
                            report.methods_replaced += 1;
                            let field = format!("method:{}:replaced", selection.method_type);
                            self.record(&contact, external, &field, &selection.value).await;
                        }
                        Err(e) => {
                            warn!(
                                method_type = %selection.method_type,
                                error = %e,
                                "Failed to replace contact method"
                            );
                            report.failures += 1;
                        }
                    }
                }
                Some(ConflictResolution::UseCrm) => {
                    debug!(method_type = %selection.method_type, "Keeping stored method");
                }
                None => {
                    report.conflict(
                        selection.method_type,
                        &selection.value,
                        ConflictReason::SlotTaken { existing },
                    );
                }
            }
        }

        self.finish(&contact, external, &report);
        Ok(report)
    }

    pub async fn has_enrichment(&self, contact_id: &str, field: &str) -> Result<bool> {
        Ok(self.enrichments.has_enrichment(contact_id, field).await?)
    }

    pub async fn list_enrichments(&self, contact_id: &str) -> Result<Vec<ContactEnrichment>> {
        Ok(self.enrichments.list_for_contact(contact_id).await?)
    }

    async fn load(&self, contact_id: &str) -> Result<Contact> {
        self.contacts
            .find_by_id(contact_id)
            .await?
            .ok_or_else(|| EnrichmentError::ContactNotFound(contact_id.to_string()))
    }

    async fn fill_fields(
        &self,
        contact: &mut Contact,
        external: &ExternalContact,
        report: &mut EnrichmentReport,
    ) {
        if is_blank(&contact.profile_photo) {
            if let Some(photo) = external.photo_url.as_deref().map(str::trim).filter(|p| !p.is_empty()) {
                if self.fill(contact, external, ProfileField::ProfilePhoto, photo, report).await {
                    contact.profile_photo = Some(photo.to_string());
                }
            }
        }

        if contact.birthday.is_none() {
            if let Some(birthday) = external.birthday {
                let value = birthday.format(DATE_FORMAT).to_string();
                if self.fill(contact, external, ProfileField::Birthday, &value, report).await {
                    contact.birthday = Some(birthday);
                }
            }
        }

        if is_blank(&contact.location) {
            let location = external
                .addresses
                .first()
                .map(|a| a.formatted.trim())
                .filter(|a| !a.is_empty());
            if let Some(location) = location {
                if self.fill(contact, external, ProfileField::Location, location, report).await {
                    contact.location = Some(location.to_string());
                }
            }
        }
    }

    /// Conditional single-field write. The audit row is only recorded when the
    /// field was still empty at write time.
    async fn fill(
        &self,
        contact: &Contact,
        external: &ExternalContact,
        field: ProfileField,
        value: &str,
        report: &mut EnrichmentReport,
    ) -> bool {
        match self.contacts.fill_if_empty(&contact.id, field, value).await {
            Ok(true) => {
                report.fields_filled += 1;
                self.record(contact, external, field.as_str(), value).await;
                true
            }
            Ok(false) => {
                debug!(contact_id = %contact.id, %field, "Field set concurrently, skipping");
                false
            }
            Err(e) => {
                warn!(contact_id = %contact.id, %field, error = %e, "Failed to fill contact field");
                report.failures += 1;
                false
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn add_if_free(
        &self,
        contact: &Contact,
        external: &ExternalContact,
        method_type: ContactMethodType,
        value: &str,
        normalized: &str,
        index: &mut MethodIndex,
        report: &mut EnrichmentReport,
    ) {
        if let Some((_, existing)) = index.by_type.get(&method_type) {
            debug!(method_type = %method_type, "Method slot already filled");
            report.conflict(
                method_type,
                value,
                ConflictReason::SlotTaken {
                    existing: existing.clone(),
                },
            );
            return;
        }

        self.add_method(contact, external, method_type, value, normalized, index, report)
            .await;
    }

    #[allow(clippy::too_many_arguments)]
    async fn add_method(
        &self,
        contact: &Contact,
        external: &ExternalContact,
        method_type: ContactMethodType,
        value: &str,
        normalized: &str,
        index: &mut MethodIndex,
        report: &mut EnrichmentReport,
    ) {
        match self
            .methods
            .insert(&contact.id, &NewContactMethod::new(method_type, value))
            .await
        {
            Ok(method) => {
                index.take(method_type, &method.id, normalized);
                report.methods_added += 1;
                let field = format!("method:{}:{}", method_type, normalized);
                self.record(contact, external, &field, value).await;
            }
            Err(e) => {
                warn!(method_type = %method_type, error = %e, "Failed to add contact method");
                report.failures += 1;
            }
        }
    }

    async fn record(&self, contact: &Contact, external: &ExternalContact, field: &str, value: &str) {
        let enrichment = NewEnrichment {
            contact_id: contact.id.clone(),
            source: external.source.clone(),
            account_id: external.account_id.clone(),
            field: field.to_string(),
            external_contact_id: Some(external.id.clone()),
            original_value: Some(value.to_string()),
        };

        if let Err(e) = self.enrichments.record(&enrichment).await {
            warn!(field, error = %e, "Failed to record enrichment");
        }
    }

    fn finish(&self, contact: &Contact, external: &ExternalContact, report: &EnrichmentReport) {
        if !report.conflicts.is_empty() {
            warn!(
                contact_id = %contact.id,
                conflicts = report.conflicts.len(),
                "Skipped conflicting contact methods"
            );
        }

        if !report.changed() && report.conflicts.is_empty() {
            return;
        }

        info!(
            contact_id = %contact.id,
            fields_filled = report.fields_filled,
            methods_added = report.methods_added,
            methods_replaced = report.methods_replaced,
            "Contact enriched"
        );
        self.event_bus
            .emit(CoreEvent::Enrichment(EnrichmentEvent::Applied {
                contact_id: contact.id.clone(),
                source: external.source.clone(),
                fields_filled: report.fields_filled,
                methods_added: report.methods_added + report.methods_replaced,
                conflicts: u32::try_from(report.conflicts.len()).unwrap_or(u32::MAX),
            }))
            .ok();
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |v| v.trim().is_empty())
}
