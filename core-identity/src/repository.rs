//! Identity persistence

use crate::error::{IdentityError, Result};
use crate::models::{ExternalIdentity, MatchType, UpsertIdentity};
use async_trait::async_trait;
use core_contacts::repositories::{Page, PageRequest};
use core_contacts::IdentifierType;
use sqlx::{query, query_as, SqlitePool};
use uuid::Uuid;

#[async_trait]
pub trait IdentityRepository: Send + Sync {
    async fn find_by_id(&self, id: &str) -> Result<Option<ExternalIdentity>>;

    async fn find_by_identifier(
        &self,
        identifier_type: IdentifierType,
        identifier: &str,
        source: &str,
    ) -> Result<Option<ExternalIdentity>>;

    /// Insert or refresh an observation.
    ///
    /// On an existing row the message count is added to, `last_seen_at` moves
    /// forward, and the link only changes when `contact_id` is given.
    async fn upsert(&self, identity: &UpsertIdentity) -> Result<ExternalIdentity>;

    async fn link(
        &self,
        id: &str,
        contact_id: &str,
        match_type: MatchType,
        confidence: Option<f64>,
        now: i64,
    ) -> Result<ExternalIdentity>;

    async fn unlink(&self, id: &str, now: i64) -> Result<ExternalIdentity>;

    /// Unlinked identities, busiest and most recent first.
    async fn list_unmatched(&self, page_request: PageRequest) -> Result<Page<ExternalIdentity>>;

    async fn count_unmatched(&self) -> Result<i64>;

    async fn list_for_contact(&self, contact_id: &str) -> Result<Vec<ExternalIdentity>>;

    async fn add_message_count(&self, id: &str, count: i64, now: i64) -> Result<ExternalIdentity>;

    async fn delete(&self, id: &str) -> Result<bool>;
}

pub struct SqliteIdentityRepository {
    pool: SqlitePool,
}

impl SqliteIdentityRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdentityRepository for SqliteIdentityRepository {
    async fn find_by_id(&self, id: &str) -> Result<Option<ExternalIdentity>> {
        let identity = query_as::<_, ExternalIdentity>("SELECT * FROM external_identities WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(identity)
    }

    async fn find_by_identifier(
        &self,
        identifier_type: IdentifierType,
        identifier: &str,
        source: &str,
    ) -> Result<Option<ExternalIdentity>> {
        let identity = query_as::<_, ExternalIdentity>(
            r#"
            SELECT * FROM external_identities
            WHERE identifier = ? AND identifier_type = ? AND source = ?
            "#,
        )
        .bind(identifier)
        .bind(identifier_type)
        .bind(source)
        .fetch_optional(&self.pool)
        .await?;

        Ok(identity)
    }

    async fn upsert(&self, identity: &UpsertIdentity) -> Result<ExternalIdentity> {
        let stored = query_as::<_, ExternalIdentity>(
            r#"
            INSERT INTO external_identities (
                id, identifier, identifier_type, raw_identifier, source, source_id,
                contact_id, match_type, match_confidence, display_name,
                last_seen_at, message_count, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (identifier, identifier_type, source) DO UPDATE SET
                raw_identifier = excluded.raw_identifier,
                source_id = COALESCE(excluded.source_id, external_identities.source_id),
                display_name = COALESCE(excluded.display_name, external_identities.display_name),
                contact_id = COALESCE(excluded.contact_id, external_identities.contact_id),
                match_type = CASE WHEN excluded.contact_id IS NULL
                    THEN external_identities.match_type ELSE excluded.match_type END,
                match_confidence = CASE WHEN excluded.contact_id IS NULL
                    THEN external_identities.match_confidence ELSE excluded.match_confidence END,
                last_seen_at = MAX(excluded.last_seen_at, external_identities.last_seen_at),
                message_count = external_identities.message_count + excluded.message_count,
                updated_at = excluded.updated_at
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&identity.identifier)
        .bind(identity.identifier_type)
        .bind(&identity.raw_identifier)
        .bind(&identity.source)
        .bind(&identity.source_id)
        .bind(&identity.contact_id)
        .bind(identity.match_type)
        .bind(identity.match_confidence)
        .bind(&identity.display_name)
        .bind(identity.seen_at)
        .bind(identity.message_count)
        .bind(identity.seen_at)
        .bind(identity.seen_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(stored)
    }

    async fn link(
        &self,
        id: &str,
        contact_id: &str,
        match_type: MatchType,
        confidence: Option<f64>,
        now: i64,
    ) -> Result<ExternalIdentity> {
        query_as::<_, ExternalIdentity>(
            r#"
            UPDATE external_identities
            SET contact_id = ?, match_type = ?, match_confidence = ?, updated_at = ?
            WHERE id = ?
            RETURNING *
            "#,
        )
        .bind(contact_id)
        .bind(match_type)
        .bind(confidence)
        .bind(now)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| IdentityError::IdentityNotFound(id.to_string()))
    }

    async fn unlink(&self, id: &str, now: i64) -> Result<ExternalIdentity> {
        query_as::<_, ExternalIdentity>(
            r#"
            UPDATE external_identities
            SET contact_id = NULL, match_type = 'unmatched', match_confidence = NULL, updated_at = ?
            WHERE id = ?
            RETURNING *
            "#,
        )
        .bind(now)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| IdentityError::IdentityNotFound(id.to_string()))
    }

    async fn list_unmatched(&self, page_request: PageRequest) -> Result<Page<ExternalIdentity>> {
        let total = self.count_unmatched().await?;

        let identities = query_as::<_, ExternalIdentity>(
            r#"
            SELECT * FROM external_identities
            WHERE contact_id IS NULL
            ORDER BY message_count DESC, last_seen_at DESC, rowid ASC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(page_request.limit())
        .bind(page_request.offset())
        .fetch_all(&self.pool)
        .await?;

        Ok(Page::new(identities, total as u64, page_request))
    }

    async fn count_unmatched(&self) -> Result<i64> {
        let (count,): (i64,) =
            query_as("SELECT COUNT(*) FROM external_identities WHERE contact_id IS NULL")
                .fetch_one(&self.pool)
                .await?;

        Ok(count)
    }

    async fn list_for_contact(&self, contact_id: &str) -> Result<Vec<ExternalIdentity>> {
        let identities = query_as::<_, ExternalIdentity>(
            r#"
            SELECT * FROM external_identities
            WHERE contact_id = ?
            ORDER BY source ASC, identifier_type ASC, identifier ASC
            "#,
        )
        .bind(contact_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(identities)
    }

    async fn add_message_count(&self, id: &str, count: i64, now: i64) -> Result<ExternalIdentity> {
        query_as::<_, ExternalIdentity>(
            r#"
            UPDATE external_identities
            SET message_count = message_count + ?,
                last_seen_at = MAX(last_seen_at, ?),
                updated_at = ?
            WHERE id = ?
            RETURNING *
            "#,
        )
        .bind(count)
        .bind(now)
        .bind(now)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| IdentityError::IdentityNotFound(id.to_string()))
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let result = query("DELETE FROM external_identities WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_contacts::repositories::{ContactRepository, SqliteContactRepository};
    use core_contacts::{create_test_pool, Contact};

    fn observation(identifier: &str, seen_at: i64) -> UpsertIdentity {
        UpsertIdentity {
            identifier: identifier.to_string(),
            identifier_type: IdentifierType::Email,
            raw_identifier: identifier.to_uppercase(),
            source: "gmail".to_string(),
            source_id: None,
            display_name: None,
            contact_id: None,
            match_type: MatchType::Unmatched,
            match_confidence: None,
            seen_at,
            message_count: 1,
        }
    }

    #[tokio::test]
    async fn test_upsert_accumulates_counts() {
        let repo = SqliteIdentityRepository::new(create_test_pool().await.unwrap());

        let first = repo.upsert(&observation("a@example.com", 100)).await.unwrap();
        let second = repo.upsert(&observation("a@example.com", 200)).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.message_count, 2);
        assert_eq!(second.last_seen_at, 200);
        assert_eq!(second.created_at, 100);
    }

    #[tokio::test]
    async fn test_upsert_without_contact_keeps_existing_link() {
        let pool = create_test_pool().await.unwrap();
        let contact = Contact::new("Jane Doe");
        SqliteContactRepository::new(pool.clone())
            .create(&contact, &[])
            .await
            .unwrap();
        let repo = SqliteIdentityRepository::new(pool);

        let stored = repo.upsert(&observation("a@example.com", 100)).await.unwrap();
        repo.link(&stored.id, &contact.id, MatchType::Manual, Some(1.0), 150)
            .await
            .unwrap();

        let refreshed = repo.upsert(&observation("a@example.com", 200)).await.unwrap();
        assert_eq!(refreshed.contact_id.as_deref(), Some(contact.id.as_str()));
        assert_eq!(refreshed.match_type, MatchType::Manual);
    }

    #[tokio::test]
    async fn test_deleting_contact_returns_identity_to_queue() {
        let pool = create_test_pool().await.unwrap();
        let contacts = SqliteContactRepository::new(pool.clone());
        let contact = Contact::new("Jane Doe");
        contacts.create(&contact, &[]).await.unwrap();
        let repo = SqliteIdentityRepository::new(pool);

        let stored = repo.upsert(&observation("a@example.com", 100)).await.unwrap();
        repo.link(&stored.id, &contact.id, MatchType::Manual, Some(1.0), 150)
            .await
            .unwrap();
        assert_eq!(repo.count_unmatched().await.unwrap(), 0);

        contacts.delete(&contact.id).await.unwrap();

        let orphan = repo.find_by_id(&stored.id).await.unwrap().unwrap();
        assert!(orphan.contact_id.is_none());
        assert_eq!(repo.count_unmatched().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_list_unmatched_ordering() {
        let repo = SqliteIdentityRepository::new(create_test_pool().await.unwrap());

        repo.upsert(&observation("quiet@example.com", 300)).await.unwrap();
        let busy = repo.upsert(&observation("busy@example.com", 100)).await.unwrap();
        repo.add_message_count(&busy.id, 9, 50).await.unwrap();
        repo.upsert(&observation("recent@example.com", 400)).await.unwrap();

        let page = repo.list_unmatched(PageRequest::default()).await.unwrap();
        let order: Vec<&str> = page.items.iter().map(|i| i.identifier.as_str()).collect();
        assert_eq!(
            order,
            vec!["busy@example.com", "recent@example.com", "quiet@example.com"]
        );
        // last_seen_at never moves backwards
        assert_eq!(page.items[0].last_seen_at, 100);
    }

    #[tokio::test]
    async fn test_unknown_identity_is_not_found() {
        let repo = SqliteIdentityRepository::new(create_test_pool().await.unwrap());
        assert!(matches!(
            repo.unlink("missing", 0).await,
            Err(IdentityError::IdentityNotFound(_))
        ));
        assert!(!repo.delete("missing").await.unwrap());
    }
}
