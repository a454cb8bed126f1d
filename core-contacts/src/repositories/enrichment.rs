//! Enrichment audit repository

use crate::error::Result;
use crate::models::{new_id, now_timestamp, ContactEnrichment, NewEnrichment};
use crate::repositories::{Page, PageRequest};
use async_trait::async_trait;
use sqlx::{query, query_as, SqlitePool};

#[async_trait]
pub trait EnrichmentRepository: Send + Sync {
    /// Record a fill. Returns `false` when the same field was already recorded
    /// for this contact, source and account.
    async fn record(&self, enrichment: &NewEnrichment) -> Result<bool>;

    async fn has_enrichment(&self, contact_id: &str, field: &str) -> Result<bool>;

    async fn find_by_field(&self, contact_id: &str, field: &str) -> Result<Option<ContactEnrichment>>;

    async fn list_for_contact(&self, contact_id: &str) -> Result<Vec<ContactEnrichment>>;

    async fn list_by_source(
        &self,
        source: &str,
        page_request: PageRequest,
    ) -> Result<Page<ContactEnrichment>>;

    async fn delete_for_contact(&self, contact_id: &str) -> Result<u64>;
}

pub struct SqliteEnrichmentRepository {
    pool: SqlitePool,
}

impl SqliteEnrichmentRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EnrichmentRepository for SqliteEnrichmentRepository {
    async fn record(&self, enrichment: &NewEnrichment) -> Result<bool> {
        let result = query(
            r#"
            INSERT INTO contact_enrichments (
                id, contact_id, source, account_id, account_key, field,
                external_contact_id, original_value, enriched_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (contact_id, source, field, account_key) DO NOTHING
            "#,
        )
        .bind(new_id())
        .bind(&enrichment.contact_id)
        .bind(&enrichment.source)
        .bind(&enrichment.account_id)
        .bind(enrichment.account_id.as_deref().unwrap_or(""))
        .bind(&enrichment.field)
        .bind(&enrichment.external_contact_id)
        .bind(&enrichment.original_value)
        .bind(now_timestamp())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn has_enrichment(&self, contact_id: &str, field: &str) -> Result<bool> {
        let count: i64 = query_as(
            "SELECT COUNT(*) FROM contact_enrichments WHERE contact_id = ? AND field = ?",
        )
        .bind(contact_id)
        .bind(field)
        .fetch_one(&self.pool)
        .await
        .map(|row: (i64,)| row.0)?;

        Ok(count > 0)
    }

    async fn find_by_field(&self, contact_id: &str, field: &str) -> Result<Option<ContactEnrichment>> {
        let enrichment = query_as::<_, ContactEnrichment>(
            r#"
            SELECT id, contact_id, source, account_id, field, external_contact_id,
                   original_value, enriched_at
            FROM contact_enrichments
            WHERE contact_id = ? AND field = ?
            ORDER BY enriched_at DESC, rowid DESC
            LIMIT 1
            "#,
        )
        .bind(contact_id)
        .bind(field)
        .fetch_optional(&self.pool)
        .await?;

        Ok(enrichment)
    }

    async fn list_for_contact(&self, contact_id: &str) -> Result<Vec<ContactEnrichment>> {
        let enrichments = query_as::<_, ContactEnrichment>(
            r#"
            SELECT id, contact_id, source, account_id, field, external_contact_id,
                   original_value, enriched_at
            FROM contact_enrichments
            WHERE contact_id = ?
            ORDER BY enriched_at ASC, rowid ASC
            "#,
        )
        .bind(contact_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(enrichments)
    }

    async fn list_by_source(
        &self,
        source: &str,
        page_request: PageRequest,
    ) -> Result<Page<ContactEnrichment>> {
        let total: i64 = query_as("SELECT COUNT(*) FROM contact_enrichments WHERE source = ?")
            .bind(source)
            .fetch_one(&self.pool)
            .await
            .map(|row: (i64,)| row.0)?;

        let enrichments = query_as::<_, ContactEnrichment>(
            r#"
            SELECT id, contact_id, source, account_id, field, external_contact_id,
                   original_value, enriched_at
            FROM contact_enrichments
            WHERE source = ?
            ORDER BY enriched_at DESC, rowid DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(source)
        .bind(page_request.limit())
        .bind(page_request.offset())
        .fetch_all(&self.pool)
        .await?;

        Ok(Page::new(enrichments, total as u64, page_request))
    }

    async fn delete_for_contact(&self, contact_id: &str) -> Result<u64> {
        let result = query("DELETE FROM contact_enrichments WHERE contact_id = ?")
            .bind(contact_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
