//! External contact repository
//!
//! Upserts are keyed by `(source, source_id, account)`; a record without an
//! account is stored under an empty account key so it stays unique too.

use crate::error::{ContactsError, Result};
use crate::models::{encode_date, new_id, now_timestamp, ExternalContact, MatchStatus, UpsertExternalContact};
use crate::normalize::normalize_email;
use crate::repositories::{Page, PageRequest};
use async_trait::async_trait;
use sqlx::{query, query_as, SqlitePool};

/// Result of an upsert: the stored row and whether it was new.
#[derive(Debug, Clone)]
pub struct UpsertOutcome {
    pub contact: ExternalContact,
    pub inserted: bool,
}

#[async_trait]
pub trait ExternalContactRepository: Send + Sync {
    async fn find_by_id(&self, id: &str) -> Result<Option<ExternalContact>>;

    async fn find_by_source(
        &self,
        source: &str,
        source_id: &str,
        account_id: Option<&str>,
    ) -> Result<Option<ExternalContact>>;

    /// Insert or refresh a record. Review state survives refreshes.
    async fn upsert(&self, record: &UpsertExternalContact) -> Result<UpsertOutcome>;

    /// Unmatched records that are not duplicates, oldest first.
    async fn list_unmatched(&self, page_request: PageRequest) -> Result<Page<ExternalContact>>;

    async fn count_unmatched(&self) -> Result<i64>;

    /// Set the review state and the linked contact.
    async fn update_match(
        &self,
        id: &str,
        crm_contact_id: Option<&str>,
        status: MatchStatus,
    ) -> Result<ExternalContact>;

    async fn mark_duplicate(&self, id: &str, duplicate_of_id: &str) -> Result<()>;

    /// Records carrying `email` (compared normalized), oldest first.
    async fn find_by_normalized_email(&self, email: &str) -> Result<Vec<ExternalContact>>;

    async fn list_for_contact(&self, contact_id: &str) -> Result<Vec<ExternalContact>>;

    async fn delete(&self, id: &str) -> Result<bool>;
}

pub struct SqliteExternalContactRepository {
    pool: SqlitePool,
}

impl SqliteExternalContactRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ExternalContactRepository for SqliteExternalContactRepository {
    async fn find_by_id(&self, id: &str) -> Result<Option<ExternalContact>> {
        let contact = query_as::<_, ExternalContact>("SELECT * FROM external_contacts WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(contact)
    }

    async fn find_by_source(
        &self,
        source: &str,
        source_id: &str,
        account_id: Option<&str>,
    ) -> Result<Option<ExternalContact>> {
        let contact = query_as::<_, ExternalContact>(
            "SELECT * FROM external_contacts WHERE source = ? AND source_id = ? AND account_key = ?",
        )
        .bind(source)
        .bind(source_id)
        .bind(account_id.unwrap_or(""))
        .fetch_optional(&self.pool)
        .await?;

        Ok(contact)
    }

    async fn upsert(&self, record: &UpsertExternalContact) -> Result<UpsertOutcome> {
        if record.source.trim().is_empty() || record.source_id.trim().is_empty() {
            return Err(ContactsError::invalid(
                "ExternalContact",
                "source and source_id are required",
            ));
        }

        let id = new_id();
        let now = now_timestamp();

        let contact = query_as::<_, ExternalContact>(
            r#"
            INSERT INTO external_contacts (
                id, source, source_id, account_id, account_key, display_name, first_name,
                last_name, emails, phones, addresses, organization, job_title, birthday,
                photo_url, etag, metadata, synced_at, match_status, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 'unmatched', ?, ?)
            ON CONFLICT (source, source_id, account_key) DO UPDATE SET
                display_name = excluded.display_name,
                first_name = excluded.first_name,
                last_name = excluded.last_name,
                emails = excluded.emails,
                phones = excluded.phones,
                addresses = excluded.addresses,
                organization = excluded.organization,
                job_title = excluded.job_title,
                birthday = excluded.birthday,
                photo_url = excluded.photo_url,
                etag = excluded.etag,
                metadata = excluded.metadata,
                synced_at = excluded.synced_at,
                updated_at = excluded.updated_at
            RETURNING *
            "#,
        )
        .bind(&id)
        .bind(&record.source)
        .bind(&record.source_id)
        .bind(&record.account_id)
        .bind(record.account_id.as_deref().unwrap_or(""))
        .bind(&record.display_name)
        .bind(&record.first_name)
        .bind(&record.last_name)
        .bind(serde_json::to_string(&record.emails)?)
        .bind(serde_json::to_string(&record.phones)?)
        .bind(serde_json::to_string(&record.addresses)?)
        .bind(&record.organization)
        .bind(&record.job_title)
        .bind(encode_date(record.birthday))
        .bind(&record.photo_url)
        .bind(&record.etag)
        .bind(serde_json::to_string(&record.metadata)?)
        .bind(record.synced_at)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        let inserted = contact.id == id;
        Ok(UpsertOutcome { contact, inserted })
    }

    async fn list_unmatched(&self, page_request: PageRequest) -> Result<Page<ExternalContact>> {
        let total = self.count_unmatched().await?;

        let contacts = query_as::<_, ExternalContact>(
            r#"
            SELECT * FROM external_contacts
            WHERE match_status = 'unmatched' AND duplicate_of_id IS NULL
            ORDER BY created_at ASC, rowid ASC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(page_request.limit())
        .bind(page_request.offset())
        .fetch_all(&self.pool)
        .await?;

        Ok(Page::new(contacts, total as u64, page_request))
    }

    async fn count_unmatched(&self) -> Result<i64> {
        let count: i64 = query_as(
            "SELECT COUNT(*) FROM external_contacts WHERE match_status = 'unmatched' AND duplicate_of_id IS NULL",
        )
        .fetch_one(&self.pool)
        .await
        .map(|row: (i64,)| row.0)?;

        Ok(count)
    }

    async fn update_match(
        &self,
        id: &str,
        crm_contact_id: Option<&str>,
        status: MatchStatus,
    ) -> Result<ExternalContact> {
        query_as::<_, ExternalContact>(
            r#"
            UPDATE external_contacts
            SET crm_contact_id = ?, match_status = ?, updated_at = ?
            WHERE id = ?
            RETURNING *
            "#,
        )
        .bind(crm_contact_id)
        .bind(status)
        .bind(now_timestamp())
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| ContactsError::not_found("ExternalContact", id))
    }

    async fn mark_duplicate(&self, id: &str, duplicate_of_id: &str) -> Result<()> {
        if id == duplicate_of_id {
            return Err(ContactsError::invalid(
                "duplicate_of_id",
                "a record cannot duplicate itself",
            ));
        }

        let result =
            query("UPDATE external_contacts SET duplicate_of_id = ?, updated_at = ? WHERE id = ?")
                .bind(duplicate_of_id)
                .bind(now_timestamp())
                .bind(id)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(ContactsError::not_found("ExternalContact", id));
        }

        Ok(())
    }

    async fn find_by_normalized_email(&self, email: &str) -> Result<Vec<ExternalContact>> {
        let normalized = normalize_email(email);
        if normalized.is_empty() {
            return Ok(Vec::new());
        }

        let contacts = query_as::<_, ExternalContact>(
            r#"
            SELECT * FROM external_contacts
            WHERE EXISTS (
                SELECT 1 FROM json_each(external_contacts.emails) AS e
                WHERE lower(trim(json_extract(e.value, '$.value'))) = ?
            )
            ORDER BY created_at ASC, rowid ASC
            "#,
        )
        .bind(&normalized)
        .fetch_all(&self.pool)
        .await?;

        Ok(contacts)
    }

    async fn list_for_contact(&self, contact_id: &str) -> Result<Vec<ExternalContact>> {
        let contacts = query_as::<_, ExternalContact>(
            "SELECT * FROM external_contacts WHERE crm_contact_id = ? ORDER BY source ASC, created_at ASC",
        )
        .bind(contact_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(contacts)
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let result = query("DELETE FROM external_contacts WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
