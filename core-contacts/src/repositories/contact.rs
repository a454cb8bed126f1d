//! Contact repository trait and implementation

use crate::error::{ContactsError, Result};
use crate::models::{
    encode_date, now_timestamp, Contact, ContactMatch, ContactMethod, NewContactMethod, ProfileField,
};
use crate::repositories::contact_method::insert_method;
use crate::repositories::{Page, PageRequest};
use crate::similarity::similarity;
use async_trait::async_trait;
use sqlx::{query, query_as, SqliteConnection, SqlitePool};
use std::cmp::Ordering;
use std::collections::HashMap;
use tracing::debug;

/// Contact repository interface for data access operations
#[async_trait]
pub trait ContactRepository: Send + Sync {
    /// Find a contact by ID, with its methods loaded.
    async fn find_by_id(&self, id: &str) -> Result<Option<Contact>>;

    /// Insert a contact and its methods in one transaction.
    ///
    /// # Errors
    /// Fails without writing anything if the contact or any method is invalid,
    /// or if two methods share a type slot.
    async fn create(&self, contact: &Contact, methods: &[NewContactMethod]) -> Result<Contact>;

    /// Update the contact's own fields. Methods are left alone.
    async fn update(&self, contact: &Contact) -> Result<()>;

    /// Set one profile field, but only while it is still null or blank.
    ///
    /// Returns `false` when the contact is gone or the field already holds a value.
    /// Birthdays are passed in `DATE_FORMAT`.
    async fn fill_if_empty(&self, id: &str, field: ProfileField, value: &str) -> Result<bool>;

    /// Update the contact and replace all of its methods in one transaction.
    async fn update_with_methods(
        &self,
        contact: &Contact,
        methods: &[NewContactMethod],
    ) -> Result<Contact>;

    /// Delete a contact. Returns `false` if it did not exist.
    async fn delete(&self, id: &str) -> Result<bool>;

    /// Contacts ordered by name, without methods.
    async fn query(&self, page_request: PageRequest) -> Result<Page<Contact>>;

    /// Up to `limit` contacts ordered by name, with methods loaded.
    async fn list_with_methods(&self, limit: u32) -> Result<Vec<Contact>>;

    async fn count(&self) -> Result<i64>;
}

/// Fuzzy name search over contacts.
#[async_trait]
pub trait ContactSearch: Send + Sync {
    /// Contacts whose name scores at least `min_similarity` against `name`,
    /// best first, at most `limit`, with methods loaded.
    async fn find_similar(
        &self,
        name: &str,
        min_similarity: f64,
        limit: usize,
    ) -> Result<Vec<ContactMatch>>;
}

/// SQLite implementation of [`ContactRepository`] and [`ContactSearch`]
#[derive(Clone)]
pub struct SqliteContactRepository {
    pool: SqlitePool,
}

impl SqliteContactRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn load_methods(&self, contact_id: &str) -> Result<Vec<ContactMethod>> {
        let methods = query_as::<_, ContactMethod>(
            "SELECT * FROM contact_methods WHERE contact_id = ? ORDER BY is_primary DESC, type ASC",
        )
        .bind(contact_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(methods)
    }

    async fn write_fields(conn: &mut SqliteConnection, contact: &Contact, updated_at: i64) -> Result<()> {
        let result = query(
            r#"
            UPDATE contacts
            SET full_name = ?, location = ?, birthday = ?, profile_photo = ?, notes = ?,
                last_contacted_at = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&contact.full_name)
        .bind(&contact.location)
        .bind(encode_date(contact.birthday))
        .bind(&contact.profile_photo)
        .bind(&contact.notes)
        .bind(contact.last_contacted_at)
        .bind(updated_at)
        .bind(&contact.id)
        .execute(conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(ContactsError::not_found("Contact", contact.id.clone()));
        }

        Ok(())
    }
}

fn validate(contact: &Contact, methods: &[NewContactMethod]) -> Result<()> {
    contact
        .validate()
        .map_err(|e| ContactsError::invalid("Contact", e))?;

    for (i, method) in methods.iter().enumerate() {
        method
            .normalized()
            .map_err(|e| ContactsError::invalid("ContactMethod", e))?;

        if methods[..i].iter().any(|m| m.method_type == method.method_type) {
            return Err(ContactsError::invalid(
                "ContactMethod",
                format!("more than one {} method", method.method_type),
            ));
        }
    }

    Ok(())
}

#[async_trait]
impl ContactRepository for SqliteContactRepository {
    async fn find_by_id(&self, id: &str) -> Result<Option<Contact>> {
        let contact = query_as::<_, Contact>("SELECT * FROM contacts WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match contact {
            Some(mut contact) => {
                contact.methods = self.load_methods(&contact.id).await?;
                Ok(Some(contact))
            }
            None => Ok(None),
        }
    }

    async fn create(&self, contact: &Contact, methods: &[NewContactMethod]) -> Result<Contact> {
        validate(contact, methods)?;

        let mut tx = self.pool.begin().await?;

        query(
            r#"
            INSERT INTO contacts (
                id, full_name, location, birthday, profile_photo, notes,
                last_contacted_at, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&contact.id)
        .bind(&contact.full_name)
        .bind(&contact.location)
        .bind(encode_date(contact.birthday))
        .bind(&contact.profile_photo)
        .bind(&contact.notes)
        .bind(contact.last_contacted_at)
        .bind(contact.created_at)
        .bind(contact.updated_at)
        .execute(&mut *tx)
        .await?;

        let mut created = contact.clone();
        created.methods.clear();
        for method in methods {
            let stored = insert_method(&mut *tx, &contact.id, method, contact.created_at).await?;
            created.methods.push(stored);
        }

        tx.commit().await?;

        debug!(contact_id = %created.id, methods = created.methods.len(), "Contact created");
        Ok(created)
    }

    async fn update(&self, contact: &Contact) -> Result<()> {
        contact
            .validate()
            .map_err(|e| ContactsError::invalid("Contact", e))?;

        let mut conn = self.pool.acquire().await?;
        Self::write_fields(&mut conn, contact, now_timestamp()).await
    }

    async fn fill_if_empty(&self, id: &str, field: ProfileField, value: &str) -> Result<bool> {
        let column = field.as_str();
        let sql = format!(
            "UPDATE contacts SET {column} = ?, updated_at = ? \
             WHERE id = ? AND ({column} IS NULL OR trim({column}) = '')"
        );

        let result = query(&sql)
            .bind(value)
            .bind(now_timestamp())
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn update_with_methods(
        &self,
        contact: &Contact,
        methods: &[NewContactMethod],
    ) -> Result<Contact> {
        validate(contact, methods)?;

        let now = now_timestamp();
        let mut tx = self.pool.begin().await?;

        Self::write_fields(&mut tx, contact, now).await?;

        query("DELETE FROM contact_methods WHERE contact_id = ?")
            .bind(&contact.id)
            .execute(&mut *tx)
            .await?;

        let mut updated = contact.clone();
        updated.updated_at = now;
        updated.methods.clear();
        for method in methods {
            let stored = insert_method(&mut *tx, &contact.id, method, now).await?;
            updated.methods.push(stored);
        }

        tx.commit().await?;
        Ok(updated)
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let result = query("DELETE FROM contacts WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn query(&self, page_request: PageRequest) -> Result<Page<Contact>> {
        let total = self.count().await?;

        let contacts = query_as::<_, Contact>(
            "SELECT * FROM contacts ORDER BY full_name ASC, id ASC LIMIT ? OFFSET ?",
        )
        .bind(page_request.limit())
        .bind(page_request.offset())
        .fetch_all(&self.pool)
        .await?;

        Ok(Page::new(contacts, total as u64, page_request))
    }

    async fn list_with_methods(&self, limit: u32) -> Result<Vec<Contact>> {
        let mut contacts = query_as::<_, Contact>(
            "SELECT * FROM contacts ORDER BY full_name ASC, id ASC LIMIT ?",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        let methods = query_as::<_, ContactMethod>(
            "SELECT * FROM contact_methods ORDER BY is_primary DESC, type ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut by_contact: HashMap<String, Vec<ContactMethod>> = HashMap::new();
        for method in methods {
            by_contact
                .entry(method.contact_id.clone())
                .or_default()
                .push(method);
        }

        for contact in &mut contacts {
            contact.methods = by_contact.remove(&contact.id).unwrap_or_default();
        }

        Ok(contacts)
    }

    async fn count(&self) -> Result<i64> {
        let count: i64 = query_as("SELECT COUNT(*) FROM contacts")
            .fetch_one(&self.pool)
            .await
            .map(|row: (i64,)| row.0)?;

        Ok(count)
    }
}

#[async_trait]
impl ContactSearch for SqliteContactRepository {
    async fn find_similar(
        &self,
        name: &str,
        min_similarity: f64,
        limit: usize,
    ) -> Result<Vec<ContactMatch>> {
        if name.trim().is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let rows: Vec<(String, String)> = query_as("SELECT id, full_name FROM contacts")
            .fetch_all(&self.pool)
            .await?;

        let mut scored: Vec<(String, f64)> = rows
            .into_iter()
            .map(|(id, full_name)| {
                let score = similarity(name, &full_name);
                (id, score)
            })
            .filter(|(_, score)| *score >= min_similarity)
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
        scored.truncate(limit);

        let mut matches = Vec::with_capacity(scored.len());
        for (id, score) in scored {
            if let Some(contact) = self.find_by_id(&id).await? {
                matches.push(ContactMatch {
                    contact,
                    similarity: score,
                });
            }
        }

        debug!(candidates = matches.len(), "Similar contacts found");
        Ok(matches)
    }
}
