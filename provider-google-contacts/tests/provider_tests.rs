//! Integration tests for the Google Contacts provider
//!
//! The People API and token source are mocked; storage, identity resolution
//! and enrichment run against an in-memory database.

use async_trait::async_trait;
use bridge_traits::auth::AccessTokenProvider;
use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse, RetryPolicy};
use bridge_traits::time::ManualClock;
use bytes::Bytes;
use chrono::{NaiveDate, TimeZone, Utc};
use core_contacts::repositories::{
    ContactRepository, ExternalContactRepository, SqliteContactMethodRepository,
    SqliteContactRepository, SqliteEnrichmentRepository, SqliteExternalContactRepository,
};
use core_contacts::{
    create_test_pool, Contact, ContactMethodType, MatchStatus, NewContactMethod,
};
use core_enrichment::EnrichmentMerger;
use core_identity::{IdentityResolver, SqliteIdentityRepository};
use core_runtime::events::EventBus;
use core_runtime::ErrorKind;
use core_sync::{
    CancellationToken, SyncError, SyncProvider, SyncState, SyncStatus, SyncStrategy,
};
use mockall::mock;
use provider_google_contacts::{GoogleContactsProvider, PeopleClient, SOURCE_NAME};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

mock! {
    Http {}

    #[async_trait]
    impl HttpClient for Http {
        async fn execute(&self, request: HttpRequest) -> bridge_traits::error::Result<HttpResponse>;
    }
}

mock! {
    Tokens {}

    #[async_trait]
    impl AccessTokenProvider for Tokens {
        async fn access_token(&self, account_id: &str) -> bridge_traits::error::Result<String>;
        async fn accounts(&self) -> bridge_traits::error::Result<Vec<String>>;
    }
}

const ACCOUNT: &str = "me@example.com";

const PAGE_ONE: &str = r#"{
    "connections": [
        {
            "resourceName": "people/c1",
            "etag": "e1",
            "names": [{"displayName": "Jane Doe", "givenName": "Jane", "familyName": "Doe"}],
            "emailAddresses": [{"value": "Jane@Example.com", "type": "home", "metadata": {"primary": true}}],
            "birthdays": [{"date": {"year": 1990, "month": 5, "day": 17}}],
            "addresses": [{"formattedValue": "Lisbon, Portugal", "type": "home"}]
        },
        {
            "resourceName": "people/c2",
            "metadata": {"deleted": true},
            "emailAddresses": [{"value": "gone@example.com"}]
        },
        {
            "resourceName": "people/c3"
        }
    ],
    "nextPageToken": "p2"
}"#;

const PAGE_TWO: &str = r#"{
    "connections": [
        {
            "resourceName": "people/c4",
            "names": [{"displayName": "Stranger"}],
            "phoneNumbers": [{"value": "+1 555 0100", "type": "mobile"}]
        }
    ],
    "nextSyncToken": "sync-1"
}"#;

struct Fixture {
    contacts: Arc<SqliteContactRepository>,
    externals: Arc<SqliteExternalContactRepository>,
    resolver: Arc<IdentityResolver>,
    merger: Arc<EnrichmentMerger>,
    clock: Arc<ManualClock>,
}

async fn fixture() -> Fixture {
    let pool = create_test_pool().await.unwrap();
    let contacts = Arc::new(SqliteContactRepository::new(pool.clone()));
    let methods = Arc::new(SqliteContactMethodRepository::new(pool.clone()));
    let externals = Arc::new(SqliteExternalContactRepository::new(pool.clone()));
    let events = Arc::new(EventBus::new(64));
    let clock = Arc::new(ManualClock::new(
        Utc.timestamp_opt(1_700_000_000, 0).single().unwrap(),
    ));

    let resolver = Arc::new(IdentityResolver::new(
        Arc::new(SqliteIdentityRepository::new(pool.clone())),
        methods.clone(),
        contacts.clone(),
        clock.clone(),
        events.clone(),
    ));
    let merger = Arc::new(EnrichmentMerger::new(
        contacts.clone(),
        methods,
        Arc::new(SqliteEnrichmentRepository::new(pool)),
        events,
    ));

    Fixture {
        contacts,
        externals,
        resolver,
        merger,
        clock,
    }
}

fn provider(fx: &Fixture, http: MockHttp) -> GoogleContactsProvider {
    let mut tokens = MockTokens::new();
    tokens
        .expect_access_token()
        .returning(|_| Ok("tok".to_string()));
    tokens
        .expect_accounts()
        .returning(|| Ok(vec![ACCOUNT.to_string()]));

    let client = PeopleClient::new(Arc::new(http), Arc::new(tokens)).with_retry_policy(
        RetryPolicy {
            base_delay: Duration::from_millis(1),
            ..RetryPolicy::default()
        },
    );

    GoogleContactsProvider::new(
        client,
        fx.externals.clone(),
        fx.resolver.clone(),
        fx.merger.clone(),
        fx.clock.clone(),
    )
}

fn ok(body: &str) -> HttpResponse {
    HttpResponse {
        status: 200,
        headers: HashMap::new(),
        body: Bytes::from(body.to_string()),
    }
}

fn status(code: u16) -> HttpResponse {
    HttpResponse {
        status: code,
        headers: HashMap::new(),
        body: Bytes::from_static(b"error"),
    }
}

/// Serves the two-page connection list.
fn paged_api() -> MockHttp {
    let mut http = MockHttp::new();
    http.expect_execute().returning(|req| {
        if req.url.contains("pageToken=p2") {
            Ok(ok(PAGE_TWO))
        } else {
            Ok(ok(PAGE_ONE))
        }
    });
    http
}

fn single_page_api(body: &'static str) -> MockHttp {
    let mut http = MockHttp::new();
    http.expect_execute().returning(move |_| Ok(ok(body)));
    http
}

fn state(account_id: Option<&str>, cursor: Option<&str>) -> SyncState {
    SyncState {
        id: "state-1".to_string(),
        source: SOURCE_NAME.to_string(),
        account_id: account_id.map(String::from),
        enabled: true,
        status: SyncStatus::Syncing,
        strategy: SyncStrategy::FetchAll,
        sync_cursor: cursor.map(String::from),
        last_sync_at: None,
        last_successful_sync_at: None,
        next_sync_at: None,
        error_message: None,
        error_count: 0,
        created_at: 1_700_000_000,
        updated_at: 1_700_000_000,
    }
}

async fn jane(fx: &Fixture) -> Contact {
    fx.contacts
        .create(
            &Contact::new("Jane Doe"),
            &[NewContactMethod::new(ContactMethodType::EmailPersonal, "jane@example.com")],
        )
        .await
        .unwrap()
}

#[tokio::test]
async fn test_full_sync_stores_matches_and_enriches() {
    let fx = fixture().await;
    let local = jane(&fx).await;
    let provider = provider(&fx, paged_api());

    let result = provider
        .sync(&CancellationToken::new(), &state(Some(ACCOUNT), None), &[])
        .await
        .unwrap();

    assert_eq!(result.items_processed, 2);
    assert_eq!(result.items_created, 2);
    assert_eq!(result.items_matched, 1);
    assert_eq!(result.items_failed, 0);
    assert_eq!(result.new_cursor.as_deref(), Some("sync-1"));
    assert_eq!(result.metadata.get("pages"), Some(&serde_json::json!(2)));

    let matched = fx
        .externals
        .find_by_source(SOURCE_NAME, "people/c1", Some(ACCOUNT))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(matched.match_status, MatchStatus::Matched);
    assert_eq!(matched.crm_contact_id.as_deref(), Some(local.id.as_str()));
    assert_eq!(matched.synced_at, Some(1_700_000_000));

    let stranger = fx
        .externals
        .find_by_source(SOURCE_NAME, "people/c4", Some(ACCOUNT))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stranger.match_status, MatchStatus::Unmatched);
    assert!(stranger.crm_contact_id.is_none());

    let deleted = fx
        .externals
        .find_by_source(SOURCE_NAME, "people/c2", Some(ACCOUNT))
        .await
        .unwrap();
    assert!(deleted.is_none());

    let enriched = fx.contacts.find_by_id(&local.id).await.unwrap().unwrap();
    assert_eq!(enriched.birthday, NaiveDate::from_ymd_opt(1990, 5, 17));
    assert_eq!(enriched.location.as_deref(), Some("Lisbon, Portugal"));
}

#[tokio::test]
async fn test_resync_updates_without_creating() {
    let fx = fixture().await;
    let provider = provider(&fx, paged_api());
    let cancel = CancellationToken::new();

    provider
        .sync(&cancel, &state(Some(ACCOUNT), None), &[])
        .await
        .unwrap();
    let second = provider
        .sync(&cancel, &state(Some(ACCOUNT), Some("sync-1")), &[])
        .await
        .unwrap();

    assert_eq!(second.items_processed, 2);
    assert_eq!(second.items_created, 0);
    assert_eq!(
        second.metadata.get("incremental"),
        Some(&serde_json::Value::Bool(true))
    );
}

#[tokio::test]
async fn test_expired_sync_token_falls_back_to_full_sync() {
    let fx = fixture().await;
    let mut http = MockHttp::new();
    http.expect_execute()
        .withf(|req| req.url.contains("syncToken=stale"))
        .times(1)
        .returning(|_| Ok(status(410)));
    http.expect_execute()
        .withf(|req| req.url.contains("requestSyncToken=true"))
        .times(1)
        .returning(|_| Ok(ok(PAGE_TWO)));

    let provider = provider(&fx, http);
    let result = provider
        .sync(
            &CancellationToken::new(),
            &state(Some(ACCOUNT), Some("stale")),
            &[],
        )
        .await
        .unwrap();

    assert_eq!(result.items_processed, 1);
    assert_eq!(result.new_cursor.as_deref(), Some("sync-1"));
}

#[tokio::test]
async fn test_same_email_in_second_account_is_marked_duplicate() {
    let fx = fixture().await;
    let provider = provider(
        &fx,
        single_page_api(
            r#"{"connections": [{
                "resourceName": "people/c9",
                "names": [{"displayName": "Sam"}],
                "emailAddresses": [{"value": "sam@example.com"}]
            }]}"#,
        ),
    );
    let cancel = CancellationToken::new();

    provider
        .sync(&cancel, &state(Some(ACCOUNT), None), &[])
        .await
        .unwrap();
    fx.clock.advance(chrono::Duration::seconds(10));
    provider
        .sync(&cancel, &state(Some("work@example.com"), None), &[])
        .await
        .unwrap();

    let original = fx
        .externals
        .find_by_source(SOURCE_NAME, "people/c9", Some(ACCOUNT))
        .await
        .unwrap()
        .unwrap();
    let copy = fx
        .externals
        .find_by_source(SOURCE_NAME, "people/c9", Some("work@example.com"))
        .await
        .unwrap()
        .unwrap();

    assert!(original.duplicate_of_id.is_none());
    assert_eq!(copy.duplicate_of_id.as_deref(), Some(original.id.as_str()));
}

#[tokio::test]
async fn test_ignored_records_are_not_matched() {
    let fx = fixture().await;
    jane(&fx).await;
    let provider = provider(&fx, paged_api());
    let cancel = CancellationToken::new();

    let stored = fx
        .externals
        .upsert(&core_contacts::UpsertExternalContact {
            source: SOURCE_NAME.to_string(),
            source_id: "people/c1".to_string(),
            account_id: Some(ACCOUNT.to_string()),
            ..Default::default()
        })
        .await
        .unwrap()
        .contact;
    fx.externals
        .update_match(&stored.id, None, MatchStatus::Ignored)
        .await
        .unwrap();

    let result = provider
        .sync(&cancel, &state(Some(ACCOUNT), None), &[])
        .await
        .unwrap();

    assert_eq!(result.items_matched, 0);
    let record = fx.externals.find_by_id(&stored.id).await.unwrap().unwrap();
    assert_eq!(record.match_status, MatchStatus::Ignored);
}

#[tokio::test]
async fn test_missing_account_is_a_validation_error() {
    let fx = fixture().await;
    let provider = provider(&fx, MockHttp::new());

    let err = provider
        .sync(&CancellationToken::new(), &state(None, None), &[])
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn test_cancelled_before_first_page() {
    let fx = fixture().await;
    let provider = provider(&fx, MockHttp::new());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = provider
        .sync(&cancel, &state(Some(ACCOUNT), None), &[])
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::Cancelled));
}

#[tokio::test]
async fn test_api_rejection_fails_the_run() {
    let fx = fixture().await;
    let mut http = MockHttp::new();
    http.expect_execute().times(1).returning(|_| Ok(status(401)));
    let provider = provider(&fx, http);

    let err = provider
        .sync(&CancellationToken::new(), &state(Some(ACCOUNT), None), &[])
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn test_validate_credentials() {
    let fx = fixture().await;
    let provider = provider(&fx, MockHttp::new());

    assert!(provider.validate_credentials(None).await.is_ok());
    assert!(provider.validate_credentials(Some(ACCOUNT)).await.is_ok());
}

#[tokio::test]
async fn test_config() {
    let fx = fixture().await;
    let config = provider(&fx, MockHttp::new()).config();

    assert_eq!(config.name, SOURCE_NAME);
    assert_eq!(config.strategy, SyncStrategy::FetchAll);
    assert!(config.supports_multi_account);
    assert_eq!(config.default_interval, Duration::from_secs(3600));
}
