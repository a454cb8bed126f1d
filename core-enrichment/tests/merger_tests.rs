//! Integration tests for the EnrichmentMerger
//!
//! These run against an in-memory store and cover:
//! - Fill-only-empty behaviour for scalar fields
//! - Method enrichment without duplicates or overwrites
//! - Audit rows and their idempotence
//! - User selections with conflict resolutions

use async_trait::async_trait;
use chrono::NaiveDate;
use core_contacts::repositories::{
    ContactRepository, ExternalContactRepository, Page, PageRequest, SqliteContactMethodRepository,
    SqliteContactRepository, SqliteEnrichmentRepository, SqliteExternalContactRepository,
};
use core_contacts::{
    create_test_pool, AddressEntry, Contact, ContactMethodType, EmailEntry, ExternalContact,
    NewContactMethod, PhoneEntry, ProfileField, UpsertExternalContact,
};
use core_enrichment::{
    ConflictReason, ConflictResolution, EnrichmentError, EnrichmentMerger, MethodSelection,
};
use core_runtime::events::{CoreEvent, EnrichmentEvent, EventBus};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

struct Fixture {
    merger: EnrichmentMerger,
    contacts: Arc<SqliteContactRepository>,
    methods: Arc<SqliteContactMethodRepository>,
    enrichments: Arc<SqliteEnrichmentRepository>,
    externals: SqliteExternalContactRepository,
    events: Arc<EventBus>,
}

async fn fixture() -> Fixture {
    let pool = create_test_pool().await.unwrap();
    let contacts = Arc::new(SqliteContactRepository::new(pool.clone()));
    let methods = Arc::new(SqliteContactMethodRepository::new(pool.clone()));
    let enrichments = Arc::new(SqliteEnrichmentRepository::new(pool.clone()));
    let events = Arc::new(EventBus::new(32));

    let merger = EnrichmentMerger::new(
        contacts.clone(),
        methods.clone(),
        enrichments.clone(),
        events.clone(),
    );

    Fixture {
        merger,
        contacts,
        methods,
        enrichments,
        externals: SqliteExternalContactRepository::new(pool),
        events,
    }
}

fn email(value: &str, kind: &str) -> EmailEntry {
    EmailEntry {
        value: value.to_string(),
        kind: kind.to_string(),
        primary: false,
    }
}

fn phone(value: &str) -> PhoneEntry {
    PhoneEntry {
        value: value.to_string(),
        kind: "mobile".to_string(),
        primary: false,
    }
}

async fn store_external(fx: &Fixture, record: UpsertExternalContact) -> ExternalContact {
    let record = UpsertExternalContact {
        source: "gcontacts".to_string(),
        source_id: "people/c1".to_string(),
        account_id: Some("me@example.com".to_string()),
        ..record
    };
    fx.externals.upsert(&record).await.unwrap().contact
}

#[tokio::test]
async fn test_fills_only_empty_fields() {
    let fx = fixture().await;
    let mut contact = Contact::new("Robin Park");
    contact.birthday = NaiveDate::from_ymd_opt(1990, 1, 1);
    let contact = fx.contacts.create(&contact, &[]).await.unwrap();

    let external = store_external(
        &fx,
        UpsertExternalContact {
            birthday: NaiveDate::from_ymd_opt(1985, 6, 15),
            photo_url: Some("https://photos.example/robin.jpg".to_string()),
            addresses: vec![AddressEntry {
                formatted: "Lisbon, Portugal".to_string(),
                kind: "home".to_string(),
            }],
            ..Default::default()
        },
    )
    .await;

    let report = fx.merger.enrich(&contact.id, &external).await.unwrap();
    assert_eq!(report.fields_filled, 2);

    let stored = fx.contacts.find_by_id(&contact.id).await.unwrap().unwrap();
    assert_eq!(stored.birthday, NaiveDate::from_ymd_opt(1990, 1, 1));
    assert_eq!(stored.profile_photo.as_deref(), Some("https://photos.example/robin.jpg"));
    assert_eq!(stored.location.as_deref(), Some("Lisbon, Portugal"));

    assert!(fx.merger.has_enrichment(&contact.id, "location").await.unwrap());
    assert!(!fx.merger.has_enrichment(&contact.id, "birthday").await.unwrap());
}

#[tokio::test]
async fn test_second_run_changes_nothing() {
    let fx = fixture().await;
    let contact = fx.contacts.create(&Contact::new("Robin Park"), &[]).await.unwrap();
    let external = store_external(
        &fx,
        UpsertExternalContact {
            birthday: NaiveDate::from_ymd_opt(1985, 6, 15),
            emails: vec![email("robin@example.com", "home")],
            ..Default::default()
        },
    )
    .await;

    let first = fx.merger.enrich(&contact.id, &external).await.unwrap();
    assert_eq!(first.fields_filled, 1);
    assert_eq!(first.methods_added, 1);

    let second = fx.merger.enrich(&contact.id, &external).await.unwrap();
    assert!(!second.changed());
    assert!(second.conflicts.is_empty());

    let audit = fx.merger.list_enrichments(&contact.id).await.unwrap();
    let mut fields: Vec<&str> = audit.iter().map(|e| e.field.as_str()).collect();
    fields.sort();
    assert_eq!(fields, vec!["birthday", "method:email_personal:robin@example.com"]);
}

#[tokio::test]
async fn test_methods_are_added_without_duplicates() {
    let fx = fixture().await;
    let contact = fx
        .contacts
        .create(
            &Contact::new("Dana Kim"),
            &[NewContactMethod::new(ContactMethodType::Phone, "(555) 123-4567").primary()],
        )
        .await
        .unwrap();

    let external = store_external(
        &fx,
        UpsertExternalContact {
            emails: vec![email("Dana@Corp.Example", "Work"), email("dana@home.example", "")],
            phones: vec![phone("+1 555 123 4567")],
            ..Default::default()
        },
    )
    .await;

    let report = fx.merger.enrich(&contact.id, &external).await.unwrap();
    assert_eq!(report.methods_added, 2);
    assert!(report.conflicts.is_empty());

    let stored = fx.contacts.find_by_id(&contact.id).await.unwrap().unwrap();
    assert_eq!(stored.methods.len(), 3);
    let work = stored.method(ContactMethodType::EmailWork).unwrap();
    assert_eq!(work.normalized_value, "dana@corp.example");
    assert!(!work.is_primary);
    assert!(stored.method(ContactMethodType::EmailPersonal).is_some());
    assert!(fx
        .merger
        .has_enrichment(&contact.id, "method:email_work:dana@corp.example")
        .await
        .unwrap());
}

#[tokio::test]
async fn test_taken_slot_is_reported_not_overwritten() {
    let fx = fixture().await;
    let mut rx = fx.events.subscribe();
    let contact = fx
        .contacts
        .create(
            &Contact::new("Lee Chan"),
            &[NewContactMethod::new(ContactMethodType::EmailPersonal, "lee@old.example")],
        )
        .await
        .unwrap();

    let external = store_external(
        &fx,
        UpsertExternalContact {
            emails: vec![email("lee@new.example", "home")],
            ..Default::default()
        },
    )
    .await;

    let report = fx.merger.enrich(&contact.id, &external).await.unwrap();
    assert_eq!(report.methods_added, 0);
    assert_eq!(report.conflicts.len(), 1);
    assert_eq!(
        report.conflicts[0].reason,
        ConflictReason::SlotTaken {
            existing: "lee@old.example".to_string()
        }
    );

    let stored = fx.contacts.find_by_id(&contact.id).await.unwrap().unwrap();
    assert_eq!(
        stored.method(ContactMethodType::EmailPersonal).unwrap().value,
        "lee@old.example"
    );

    match rx.recv().await.unwrap() {
        CoreEvent::Enrichment(EnrichmentEvent::Applied { conflicts, .. }) => assert_eq!(conflicts, 1),
        other => panic!("unexpected event: {:?}", other),
    }
}

#[tokio::test]
async fn test_selections_follow_resolutions() {
    let fx = fixture().await;
    let contact = fx
        .contacts
        .create(
            &Contact::new("Ari Lane"),
            &[
                NewContactMethod::new(ContactMethodType::EmailPersonal, "ari@old.example"),
                NewContactMethod::new(ContactMethodType::Phone, "555-000-0000"),
            ],
        )
        .await
        .unwrap();

    let external = store_external(
        &fx,
        UpsertExternalContact {
            emails: vec![email("ari@new.example", ""), email("ari@work.example", "work")],
            phones: vec![phone("555-999-9999")],
            ..Default::default()
        },
    )
    .await;

    let selections = vec![
        MethodSelection::new(ContactMethodType::EmailPersonal, "ari@new.example"),
        MethodSelection::new(ContactMethodType::EmailWork, "ari@work.example"),
        MethodSelection::new(ContactMethodType::Phone, "555-999-9999"),
        MethodSelection::new(ContactMethodType::Telegram, "@not_offered"),
    ];
    let resolutions = HashMap::from([
        ("ari@new.example".to_string(), ConflictResolution::UseExternal),
        ("555-999-9999".to_string(), ConflictResolution::UseCrm),
    ]);

    let report = fx
        .merger
        .enrich_with_selections(&contact.id, &external, &selections, &resolutions)
        .await
        .unwrap();

    assert_eq!(report.methods_replaced, 1);
    assert_eq!(report.methods_added, 1);
    assert_eq!(report.conflicts.len(), 1);
    assert_eq!(report.conflicts[0].reason, ConflictReason::NotInExternal);

    let stored = fx.contacts.find_by_id(&contact.id).await.unwrap().unwrap();
    assert_eq!(
        stored.method(ContactMethodType::EmailPersonal).unwrap().value,
        "ari@new.example"
    );
    assert_eq!(
        stored.method(ContactMethodType::EmailWork).unwrap().value,
        "ari@work.example"
    );
    assert_eq!(stored.method(ContactMethodType::Phone).unwrap().value, "555-000-0000");
    assert!(fx
        .merger
        .has_enrichment(&contact.id, "method:email_personal:replaced")
        .await
        .unwrap());
}

/// Saves a user edit right after the first read, before the merger writes.
struct EditedAfterRead {
    inner: Arc<SqliteContactRepository>,
    armed: AtomicBool,
}

#[async_trait]
impl ContactRepository for EditedAfterRead {
    async fn find_by_id(&self, id: &str) -> core_contacts::Result<Option<Contact>> {
        let found = self.inner.find_by_id(id).await?;
        if let Some(contact) = &found {
            if self.armed.swap(false, Ordering::SeqCst) {
                let mut edited = contact.clone();
                edited.location = Some("User Town".to_string());
                edited.notes = Some("user note".to_string());
                self.inner.update(&edited).await?;
            }
        }
        Ok(found)
    }

    async fn create(&self, contact: &Contact, methods: &[NewContactMethod]) -> core_contacts::Result<Contact> {
        self.inner.create(contact, methods).await
    }

    async fn update(&self, contact: &Contact) -> core_contacts::Result<()> {
        self.inner.update(contact).await
    }

    async fn fill_if_empty(
        &self,
        id: &str,
        field: ProfileField,
        value: &str,
    ) -> core_contacts::Result<bool> {
        self.inner.fill_if_empty(id, field, value).await
    }

    async fn update_with_methods(
        &self,
        contact: &Contact,
        methods: &[NewContactMethod],
    ) -> core_contacts::Result<Contact> {
        self.inner.update_with_methods(contact, methods).await
    }

    async fn delete(&self, id: &str) -> core_contacts::Result<bool> {
        self.inner.delete(id).await
    }

    async fn query(&self, page_request: PageRequest) -> core_contacts::Result<Page<Contact>> {
        self.inner.query(page_request).await
    }

    async fn list_with_methods(&self, limit: u32) -> core_contacts::Result<Vec<Contact>> {
        self.inner.list_with_methods(limit).await
    }

    async fn count(&self) -> core_contacts::Result<i64> {
        self.inner.count().await
    }
}

#[tokio::test]
async fn test_concurrent_user_edit_is_kept() {
    let fx = fixture().await;
    let merger = EnrichmentMerger::new(
        Arc::new(EditedAfterRead {
            inner: fx.contacts.clone(),
            armed: AtomicBool::new(true),
        }),
        fx.methods.clone(),
        fx.enrichments.clone(),
        fx.events.clone(),
    );
    let contact = fx.contacts.create(&Contact::new("Sam Ortiz"), &[]).await.unwrap();

    let external = store_external(
        &fx,
        UpsertExternalContact {
            birthday: NaiveDate::from_ymd_opt(1979, 3, 2),
            addresses: vec![AddressEntry {
                formatted: "Lisbon".to_string(),
                kind: "home".to_string(),
            }],
            ..Default::default()
        },
    )
    .await;

    let report = merger.enrich(&contact.id, &external).await.unwrap();
    assert_eq!(report.fields_filled, 1);

    let stored = fx.contacts.find_by_id(&contact.id).await.unwrap().unwrap();
    assert_eq!(stored.location.as_deref(), Some("User Town"));
    assert_eq!(stored.notes.as_deref(), Some("user note"));
    assert_eq!(stored.birthday, NaiveDate::from_ymd_opt(1979, 3, 2));
    assert!(!merger.has_enrichment(&contact.id, "location").await.unwrap());
    assert!(merger.has_enrichment(&contact.id, "birthday").await.unwrap());
}

#[tokio::test]
async fn test_unknown_contact_fails() {
    let fx = fixture().await;
    let external = store_external(&fx, UpsertExternalContact::default()).await;

    let err = fx.merger.enrich("missing", &external).await.unwrap_err();
    assert!(matches!(err, EnrichmentError::ContactNotFound(_)));
}
