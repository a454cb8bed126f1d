use async_trait::async_trait;
use bridge_traits::time::ManualClock;
use chrono::{TimeZone, Utc};
use core_contacts::repositories::ContactRepository;
use core_contacts::{Contact, ContactMethodType, NewContactMethod};
use core_runtime::config::CoreConfig;
use core_runtime::events::{CoreEvent, SyncEvent};
use core_runtime::ErrorKind;
use core_service::ContactSyncService;
use core_sync::{
    CancellationToken, SourceConfig, SyncLogStatus, SyncProvider, SyncResult, SyncState,
    SyncStrategy,
};
use std::sync::Arc;
use std::time::Duration;

struct StaticProvider;

#[async_trait]
impl SyncProvider for StaticProvider {
    fn config(&self) -> SourceConfig {
        SourceConfig {
            name: "static".to_string(),
            display_name: "Static".to_string(),
            strategy: SyncStrategy::ContactDriven,
            supports_multi_account: false,
            supports_discovery: false,
            default_interval: Duration::from_secs(600),
        }
    }

    async fn sync(
        &self,
        _cancel: &CancellationToken,
        _state: &SyncState,
        contacts: &[Contact],
    ) -> core_sync::Result<SyncResult> {
        Ok(SyncResult {
            items_processed: contacts.len() as u64,
            ..SyncResult::default()
        })
    }

    async fn validate_credentials(&self, _account_id: Option<&str>) -> core_sync::Result<()> {
        Ok(())
    }
}

fn config() -> CoreConfig {
    CoreConfig::builder()
        .clock(Arc::new(ManualClock::new(
            Utc.timestamp_opt(1_700_000_000, 0).single().unwrap(),
        )))
        .scheduler_tick(Duration::from_millis(20))
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_in_memory_service_starts() {
    let service = ContactSyncService::new(config()).await.unwrap();

    service.health_check().await.unwrap();
    assert!(service.config().database_path.is_none());
    // no token provider configured
    assert!(!service.registry().contains("gcontacts"));
}

#[tokio::test]
async fn test_invalid_config_is_rejected() {
    let mut config = config();
    config.max_db_connections = 0;

    let err = ContactSyncService::new(config).await.err().unwrap();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn test_trigger_sync_through_facade() {
    let service = ContactSyncService::new(config()).await.unwrap();
    service.register_provider(Arc::new(StaticProvider));
    service
        .contacts()
        .create(
            &Contact::new("Ada Lovelace"),
            &[NewContactMethod::new(ContactMethodType::EmailPersonal, "ada@example.com")],
        )
        .await
        .unwrap();
    let mut events = service.subscribe();

    let log = service.trigger_sync("static", None).await.unwrap();

    assert_eq!(log.status, SyncLogStatus::Success);
    assert_eq!(log.items_processed, 1);
    assert!(matches!(
        events.recv().await.unwrap(),
        CoreEvent::Sync(SyncEvent::Started { .. })
    ));

    let err = service.trigger_sync("missing", None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_scheduler_lifecycle() {
    let service = ContactSyncService::new(config()).await.unwrap();

    assert!(service.start_scheduler());
    assert!(!service.start_scheduler());

    service.shutdown().await;

    service.register_provider(Arc::new(StaticProvider));
    let err = service.trigger_sync("static", None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Transient);

    let state = service
        .orchestrator()
        .get_sync_state("static", None)
        .await
        .unwrap();
    assert_eq!(state.error_message.as_deref(), Some("sync cancelled"));
}

#[cfg(feature = "google-contacts")]
mod google {
    use super::*;
    use bridge_traits::auth::AccessTokenProvider;
    use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse};
    use bridge_traits::BridgeError;

    struct OfflineHttp;

    #[async_trait]
    impl HttpClient for OfflineHttp {
        async fn execute(&self, _request: HttpRequest) -> bridge_traits::error::Result<HttpResponse> {
            Err(BridgeError::NotAvailable("offline".to_string()))
        }
    }

    struct NoAccounts;

    #[async_trait]
    impl AccessTokenProvider for NoAccounts {
        async fn access_token(&self, account_id: &str) -> bridge_traits::error::Result<String> {
            Err(BridgeError::CredentialsMissing(account_id.to_string()))
        }

        async fn accounts(&self) -> bridge_traits::error::Result<Vec<String>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_google_contacts_registered_with_credentials() {
        let config = CoreConfig::builder()
            .http_client(Arc::new(OfflineHttp))
            .token_provider(Arc::new(NoAccounts))
            .build()
            .unwrap();
        let service = ContactSyncService::new(config).await.unwrap();

        assert!(service.registry().contains("gcontacts"));

        let err = service
            .orchestrator()
            .validate_credentials("gcontacts", None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}
