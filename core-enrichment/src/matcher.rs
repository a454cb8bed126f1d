//! Import matching
//!
//! Suggests which existing contact an external record most likely describes.
//! Suggestions are advisory: nothing here writes to the store.

use crate::error::Result;
use core_contacts::normalize::{normalize_email, normalize_phone_loose};
use core_contacts::repositories::ContactSearch;
use core_contacts::{ContactMethod, ContactMethodType, ExternalContact};
use core_runtime::config::MatchingConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Best existing contact for an external record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestedMatch {
    pub contact_id: String,
    pub contact_name: String,
    /// Blended score in `[0, 1]`
    pub confidence: f64,
}

pub struct ImportMatcher {
    search: Arc<dyn ContactSearch>,
    config: MatchingConfig,
}

impl ImportMatcher {
    pub fn new(search: Arc<dyn ContactSearch>, config: MatchingConfig) -> Self {
        Self { search, config }
    }

    pub fn config(&self) -> &MatchingConfig {
        &self.config
    }

    /// Find the highest scoring contact at or above the confidence threshold.
    ///
    /// Returns `None` without searching when the record has no usable name.
    /// Candidates arrive most similar first and only a strictly higher score
    /// replaces the current best, so ties go to the more similar name.
    #[instrument(skip(self, external), fields(external_id = %external.id))]
    pub async fn find_best_match(&self, external: &ExternalContact) -> Result<Option<SuggestedMatch>> {
        let Some(name) = external.candidate_name() else {
            debug!("No candidate name, skipping match");
            return Ok(None);
        };

        let candidates = self
            .search
            .find_similar(
                &name,
                self.config.min_similarity,
                self.config.candidate_limit as usize,
            )
            .await?;

        let emails: HashSet<String> = external
            .emails
            .iter()
            .map(|e| normalize_email(&e.value))
            .filter(|e| !e.is_empty())
            .collect();
        let phones: HashSet<String> = external
            .phones
            .iter()
            .map(|p| normalize_phone_loose(&p.value))
            .filter(|p| !p.is_empty())
            .collect();

        let mut best: Option<SuggestedMatch> = None;
        for candidate in candidates {
            let (matches, total) = method_overlap(&candidate.contact.methods, &emails, &phones);
            let score = self.config.score(candidate.similarity, matches, total);

            let beats_best = best.as_ref().map_or(true, |b| score > b.confidence);
            if score >= self.config.confidence_threshold && beats_best {
                best = Some(SuggestedMatch {
                    contact_id: candidate.contact.id.clone(),
                    contact_name: candidate.contact.full_name.clone(),
                    confidence: score,
                });
            }
        }

        Ok(best)
    }
}

/// `(matching, comparable)` counts over a contact's email and phone methods.
fn method_overlap(
    methods: &[ContactMethod],
    emails: &HashSet<String>,
    phones: &HashSet<String>,
) -> (usize, usize) {
    let mut matches = 0;
    let mut total = 0;

    for method in methods {
        let hit = match method.method_type {
            ContactMethodType::EmailPersonal | ContactMethodType::EmailWork => {
                emails.contains(&normalize_email(&method.value))
            }
            ContactMethodType::Phone => phones.contains(&normalize_phone_loose(&method.value)),
            _ => continue,
        };

        total += 1;
        if hit {
            matches += 1;
        }
    }

    (matches, total)
}
