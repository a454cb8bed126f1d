use bridge_traits::time::SystemClock;
use core_contacts::repositories::{
    ContactRepository, ExternalContactRepository, PageRequest, SqliteContactMethodRepository,
    SqliteContactRepository, SqliteEnrichmentRepository, SqliteExternalContactRepository,
};
use core_contacts::{
    create_test_pool, Contact, ContactMethodType, EmailEntry, ExternalContact, IdentifierType,
    MatchStatus, NewContactMethod, PhoneEntry, UpsertExternalContact,
};
use core_enrichment::{EnrichmentError, EnrichmentMerger, ImportMatcher, ImportReviewService};
use core_identity::{IdentityResolver, MatchRequest, MatchType, SqliteIdentityRepository};
use core_runtime::config::MatchingConfig;
use core_runtime::events::EventBus;
use core_runtime::ErrorKind;
use std::sync::Arc;

struct Fixture {
    review: ImportReviewService,
    contacts: Arc<SqliteContactRepository>,
    externals: Arc<SqliteExternalContactRepository>,
    resolver: Arc<IdentityResolver>,
}

async fn fixture() -> Fixture {
    let pool = create_test_pool().await.unwrap();
    let events = Arc::new(EventBus::new(32));
    let contacts = Arc::new(SqliteContactRepository::new(pool.clone()));
    let methods = Arc::new(SqliteContactMethodRepository::new(pool.clone()));
    let externals = Arc::new(SqliteExternalContactRepository::new(pool.clone()));

    let resolver = Arc::new(IdentityResolver::new(
        Arc::new(SqliteIdentityRepository::new(pool.clone())),
        methods.clone(),
        contacts.clone(),
        Arc::new(SystemClock),
        events.clone(),
    ));
    let merger = Arc::new(EnrichmentMerger::new(
        contacts.clone(),
        methods,
        Arc::new(SqliteEnrichmentRepository::new(pool)),
        events.clone(),
    ));
    let matcher = Arc::new(ImportMatcher::new(contacts.clone(), MatchingConfig::import()));

    let review = ImportReviewService::new(
        externals.clone(),
        contacts.clone(),
        matcher,
        merger,
        resolver.clone(),
        events,
    );

    Fixture {
        review,
        contacts,
        externals,
        resolver,
    }
}

async fn external(
    fx: &Fixture,
    source_id: &str,
    display_name: Option<&str>,
    emails: &[(&str, &str)],
) -> ExternalContact {
    let record = UpsertExternalContact {
        source: "gcontacts".to_string(),
        source_id: source_id.to_string(),
        account_id: Some("me@example.com".to_string()),
        display_name: display_name.map(String::from),
        emails: emails
            .iter()
            .map(|(value, kind)| EmailEntry {
                value: value.to_string(),
                kind: kind.to_string(),
                primary: false,
            })
            .collect(),
        ..Default::default()
    };
    fx.externals.upsert(&record).await.unwrap().contact
}

#[tokio::test]
async fn test_candidates_with_suggestions_come_first() {
    let fx = fixture().await;
    fx.contacts
        .create(
            &Contact::new("Morgan Reyes"),
            &[NewContactMethod::new(ContactMethodType::EmailPersonal, "morgan@example.com")],
        )
        .await
        .unwrap();

    external(&fx, "people/1", Some("Zed Unknown"), &[]).await;
    external(&fx, "people/2", None, &[("nameless@example.com", "")]).await;
    let likely = external(
        &fx,
        "people/3",
        Some("Morgan Reyes"),
        &[("morgan@example.com", "home")],
    )
    .await;
    external(&fx, "people/4", Some("Abe Unknown"), &[]).await;

    let page = fx.review.list_candidates(PageRequest::new(0, 10)).await.unwrap();
    assert_eq!(page.total, 4);

    let first = &page.items[0];
    assert_eq!(first.external.id, likely.id);
    let suggestion = first.suggested_match.as_ref().unwrap();
    assert_eq!(suggestion.contact_name, "Morgan Reyes");
    assert!((suggestion.confidence - 1.0).abs() < 1e-9);

    let rest: Vec<Option<String>> = page.items[1..]
        .iter()
        .map(|c| c.external.display_name.clone())
        .collect();
    assert_eq!(
        rest,
        vec![Some("Abe Unknown".to_string()), Some("Zed Unknown".to_string()), None]
    );
}

#[tokio::test]
async fn test_import_creates_contact_and_marks_record() {
    let fx = fixture().await;
    let record = UpsertExternalContact {
        source: "gcontacts".to_string(),
        source_id: "people/9".to_string(),
        first_name: Some("Quinn".to_string()),
        last_name: Some("Ito".to_string()),
        emails: vec![
            EmailEntry {
                value: "quinn@corp.example".to_string(),
                kind: "work".to_string(),
                primary: true,
            },
            EmailEntry {
                value: "quinn@home.example".to_string(),
                kind: "home".to_string(),
                primary: false,
            },
        ],
        phones: vec![PhoneEntry {
            value: "555 010 2030".to_string(),
            kind: "mobile".to_string(),
            primary: false,
        }],
        ..Default::default()
    };
    let stored = fx.externals.upsert(&record).await.unwrap().contact;

    let contact = fx.review.import_candidate(&stored.id).await.unwrap();

    assert_eq!(contact.full_name, "Quinn Ito");
    assert_eq!(contact.methods.len(), 3);
    let reloaded = fx.externals.find_by_id(&stored.id).await.unwrap().unwrap();
    assert_eq!(reloaded.match_status, MatchStatus::Imported);
    assert_eq!(reloaded.crm_contact_id.as_deref(), Some(contact.id.as_str()));

    let err = fx.review.import_candidate(&stored.id).await.unwrap_err();
    assert!(matches!(err, EnrichmentError::AlreadyProcessed { .. }));
    assert_eq!(err.kind(), ErrorKind::Conflict);
}

#[tokio::test]
async fn test_import_without_name_is_rejected() {
    let fx = fixture().await;
    let stored = external(&fx, "people/5", None, &[("anon@example.com", "")]).await;

    let err = fx.review.import_candidate(&stored.id).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(fx.contacts.count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_link_marks_matched_links_identities_and_enriches() {
    let fx = fixture().await;
    let contact = fx.contacts.create(&Contact::new("Jordan Blake"), &[]).await.unwrap();
    let stored = external(
        &fx,
        "people/7",
        Some("J. Blake"),
        &[("jordan@example.com", "home")],
    )
    .await;

    let observed = fx
        .resolver
        .match_or_create(MatchRequest::new("jordan@example.com", IdentifierType::Email, "gcontacts"))
        .await
        .unwrap();
    assert!(observed.contact_id.is_none());

    let outcome = fx.review.link_candidate(&stored.id, &contact.id).await.unwrap();

    assert_eq!(outcome.external.match_status, MatchStatus::Matched);
    assert_eq!(outcome.identities_linked, 1);
    assert_eq!(outcome.report.methods_added, 1);

    let identity = fx.resolver.get_identity(&observed.identity.id).await.unwrap();
    assert_eq!(identity.contact_id.as_deref(), Some(contact.id.as_str()));
    assert_eq!(identity.match_type, MatchType::Manual);
}

#[tokio::test]
async fn test_link_to_unknown_contact_is_not_found() {
    let fx = fixture().await;
    let stored = external(&fx, "people/8", Some("Someone"), &[]).await;

    let err = fx.review.link_candidate(&stored.id, "missing").await.unwrap_err();
    assert!(matches!(err, EnrichmentError::ContactNotFound(_)));

    let unchanged = fx.externals.find_by_id(&stored.id).await.unwrap().unwrap();
    assert_eq!(unchanged.match_status, MatchStatus::Unmatched);
}

#[tokio::test]
async fn test_ignored_records_leave_the_queue() {
    let fx = fixture().await;
    let stored = external(&fx, "people/6", Some("Spam Sender"), &[]).await;

    let ignored = fx.review.ignore_candidate(&stored.id).await.unwrap();
    assert_eq!(ignored.match_status, MatchStatus::Ignored);

    let page = fx.review.list_candidates(PageRequest::default()).await.unwrap();
    assert!(page.items.is_empty());

    let err = fx.review.ignore_candidate("missing").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_total_counts_the_whole_queue() {
    let fx = fixture().await;
    for i in 0..505 {
        external(&fx, &format!("people/bulk-{i}"), Some(format!("Bulk Person {i}").as_str()), &[]).await;
    }

    let page = fx.review.list_candidates(PageRequest::new(0, 10)).await.unwrap();

    assert_eq!(page.total, 505);
    assert_eq!(page.items.len(), 10);
}
