//! Contact method repository
//!
//! Methods are the join surface the identity resolver searches: every row
//! carries its normalized value, and lookups go by `(normalized_value, type)`.

use crate::error::{ContactsError, Result};
use crate::models::{new_id, now_timestamp, ContactMethod, NewContactMethod};
use crate::normalize::{identifier_type_for_method, normalize, ContactMethodType};
use async_trait::async_trait;
use sqlx::{query, query_as, Sqlite, SqlitePool};

#[async_trait]
pub trait ContactMethodRepository: Send + Sync {
    async fn list_for_contact(&self, contact_id: &str) -> Result<Vec<ContactMethod>>;

    /// Add a method to an existing contact.
    ///
    /// # Errors
    /// `Conflict` when the contact already has a method of that type.
    async fn insert(&self, contact_id: &str, method: &NewContactMethod) -> Result<ContactMethod>;

    /// Replace the value of a stored method, keeping its type and primary flag.
    async fn update_value(&self, id: &str, value: &str) -> Result<ContactMethod>;

    async fn delete_for_contact(&self, contact_id: &str) -> Result<u64>;

    /// Distinct ids of contacts holding `normalized` in any of `types`.
    async fn find_contact_ids(
        &self,
        normalized: &str,
        types: &[ContactMethodType],
    ) -> Result<Vec<String>>;
}

pub struct SqliteContactMethodRepository {
    pool: SqlitePool,
}

impl SqliteContactMethodRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

pub(crate) async fn insert_method<'e, E>(
    executor: E,
    contact_id: &str,
    method: &NewContactMethod,
    now: i64,
) -> Result<ContactMethod>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let normalized_value = method
        .normalized()
        .map_err(|e| ContactsError::invalid("ContactMethod", e))?;

    let stored = ContactMethod {
        id: new_id(),
        contact_id: contact_id.to_string(),
        method_type: method.method_type,
        value: method.value.trim().to_string(),
        normalized_value,
        is_primary: method.is_primary,
        created_at: now,
        updated_at: now,
    };

    query(
        r#"
        INSERT INTO contact_methods (
            id, contact_id, type, value, normalized_value, is_primary, created_at, updated_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&stored.id)
    .bind(&stored.contact_id)
    .bind(stored.method_type)
    .bind(&stored.value)
    .bind(&stored.normalized_value)
    .bind(stored.is_primary)
    .bind(stored.created_at)
    .bind(stored.updated_at)
    .execute(executor)
    .await?;

    Ok(stored)
}

#[async_trait]
impl ContactMethodRepository for SqliteContactMethodRepository {
    async fn list_for_contact(&self, contact_id: &str) -> Result<Vec<ContactMethod>> {
        let methods = query_as::<_, ContactMethod>(
            "SELECT * FROM contact_methods WHERE contact_id = ? ORDER BY is_primary DESC, type ASC",
        )
        .bind(contact_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(methods)
    }

    async fn insert(&self, contact_id: &str, method: &NewContactMethod) -> Result<ContactMethod> {
        insert_method(&self.pool, contact_id, method, now_timestamp()).await
    }

    async fn update_value(&self, id: &str, value: &str) -> Result<ContactMethod> {
        let mut method = query_as::<_, ContactMethod>("SELECT * FROM contact_methods WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ContactsError::not_found("ContactMethod", id))?;

        let normalized = normalize(value, identifier_type_for_method(method.method_type));
        if normalized.is_empty() {
            return Err(ContactsError::invalid(
                "ContactMethod",
                format!("{} value '{}' is not a usable identifier", method.method_type, value),
            ));
        }

        method.value = value.trim().to_string();
        method.normalized_value = normalized;
        method.updated_at = now_timestamp();

        query("UPDATE contact_methods SET value = ?, normalized_value = ?, updated_at = ? WHERE id = ?")
            .bind(&method.value)
            .bind(&method.normalized_value)
            .bind(method.updated_at)
            .bind(&method.id)
            .execute(&self.pool)
            .await?;

        Ok(method)
    }

    async fn delete_for_contact(&self, contact_id: &str) -> Result<u64> {
        let result = query("DELETE FROM contact_methods WHERE contact_id = ?")
            .bind(contact_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn find_contact_ids(
        &self,
        normalized: &str,
        types: &[ContactMethodType],
    ) -> Result<Vec<String>> {
        if normalized.is_empty() || types.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; types.len()].join(", ");
        let sql = format!(
            "SELECT DISTINCT contact_id FROM contact_methods \
             WHERE normalized_value = ? AND type IN ({}) ORDER BY contact_id",
            placeholders
        );

        let mut statement = query_as::<_, (String,)>(&sql).bind(normalized);
        for method_type in types {
            statement = statement.bind(*method_type);
        }

        let rows = statement.fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;
    use crate::models::Contact;
    use crate::repositories::{ContactRepository, SqliteContactRepository};

    async fn setup() -> (SqliteContactRepository, SqliteContactMethodRepository) {
        let pool = create_test_pool().await.unwrap();
        (
            SqliteContactRepository::new(pool.clone()),
            SqliteContactMethodRepository::new(pool),
        )
    }

    #[tokio::test]
    async fn test_insert_and_list() {
        let (contacts, methods) = setup().await;
        let contact = Contact::new("Jane Doe");
        contacts.create(&contact, &[]).await.unwrap();

        let stored = methods
            .insert(
                &contact.id,
                &NewContactMethod::new(ContactMethodType::EmailWork, " Jane@Corp.Example "),
            )
            .await
            .unwrap();

        assert_eq!(stored.value, "Jane@Corp.Example");
        assert_eq!(stored.normalized_value, "jane@corp.example");
        assert_eq!(methods.list_for_contact(&contact.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_second_method_in_slot_is_conflict() {
        let (contacts, methods) = setup().await;
        let contact = Contact::new("Jane Doe");
        contacts
            .create(
                &contact,
                &[NewContactMethod::new(ContactMethodType::Phone, "5550001111")],
            )
            .await
            .unwrap();

        let err = methods
            .insert(
                &contact.id,
                &NewContactMethod::new(ContactMethodType::Phone, "5550002222"),
            )
            .await
            .unwrap_err();

        assert_eq!(err.kind(), core_runtime::ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn test_update_value_renormalizes() {
        let (contacts, methods) = setup().await;
        let contact = Contact::new("Jane Doe");
        let created = contacts
            .create(
                &contact,
                &[NewContactMethod::new(ContactMethodType::Phone, "5550001111")],
            )
            .await
            .unwrap();

        let updated = methods
            .update_value(&created.methods[0].id, "+44 20 7946 0958")
            .await
            .unwrap();
        assert_eq!(updated.normalized_value, "+442079460958");

        assert!(methods
            .update_value(&created.methods[0].id, "none")
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_find_contact_ids_respects_types() {
        let (contacts, methods) = setup().await;
        let a = Contact::new("A");
        let b = Contact::new("B");
        contacts
            .create(
                &a,
                &[NewContactMethod::new(ContactMethodType::EmailPersonal, "shared@example.com")],
            )
            .await
            .unwrap();
        contacts
            .create(
                &b,
                &[NewContactMethod::new(ContactMethodType::Whatsapp, "+15550001111")],
            )
            .await
            .unwrap();

        let email_types = [ContactMethodType::EmailPersonal, ContactMethodType::EmailWork];
        assert_eq!(
            methods
                .find_contact_ids("shared@example.com", &email_types)
                .await
                .unwrap(),
            vec![a.id.clone()]
        );

        assert!(methods
            .find_contact_ids("+15550001111", &[ContactMethodType::Phone])
            .await
            .unwrap()
            .is_empty());
        assert_eq!(
            methods
                .find_contact_ids(
                    "+15550001111",
                    &[ContactMethodType::Whatsapp, ContactMethodType::Phone]
                )
                .await
                .unwrap(),
            vec![b.id]
        );
    }
}
