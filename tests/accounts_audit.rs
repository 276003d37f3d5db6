//! Account mutations and their audit trail: ordering, the creation sentinel,
//! delete-before-disappear, and the advisory (never blocking) write policy.

mod common;

use serde_json::json;
use uuid::Uuid;

use common::{state_with, state_with_config, Call, MockLive, MockRows};
use gestor::auth::Actor;
use gestor::config::AppConfig;
use gestor::support::{AccessLevel, AccountStore, AuditStore, UpdateAccount};
use gestor::StoreError;

#[tokio::test]
async fn create_then_delete_leaves_two_entries_in_order() {
    let rows = MockRows::new();
    let live = MockLive::new();
    let state = state_with(&rows, &live);
    let store = AccountStore::new(&state);
    let actor = Actor { id: Uuid::new_v4() };

    let account = store
        .create(
            Some(&actor),
            Uuid::new_v4(),
            "ana@gestor.app",
            AccessLevel::Support,
        )
        .await
        .unwrap();
    store.delete(Some(&actor), account.id).await.unwrap();

    let entries = rows.rows("support_audit_log");
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["action"], json!("create"));
    assert_eq!(entries[1]["action"], json!("delete"));

    // the subject did not exist yet when the create entry was written
    assert_eq!(entries[0]["account_id"], json!(Uuid::nil().to_string()));
    assert_eq!(entries[1]["account_id"], json!(account.id.to_string()));

    // both snapshots survive even though the account row is gone
    assert!(entries[0]["new_value"].is_object());
    assert!(entries[1]["old_value"].is_object());
    assert!(rows.rows("support_accounts").is_empty());
}

#[tokio::test]
async fn delete_audits_before_the_row_disappears() {
    let rows = MockRows::new();
    let live = MockLive::new();
    let state = state_with(&rows, &live);
    let store = AccountStore::new(&state);
    let actor = Actor { id: Uuid::new_v4() };

    let account = store
        .create(
            Some(&actor),
            Uuid::new_v4(),
            "rui@gestor.app",
            AccessLevel::Admin,
        )
        .await
        .unwrap();
    store.delete(Some(&actor), account.id).await.unwrap();

    let calls = rows.calls();
    let audit_pos = calls
        .iter()
        .rposition(|c| *c == Call::Insert("support_audit_log".to_string()))
        .expect("audit insert");
    let delete_pos = calls
        .iter()
        .position(|c| *c == Call::Delete("support_accounts".to_string()))
        .expect("account delete");
    assert!(audit_pos < delete_pos, "audit is logged before the delete");
}

#[tokio::test]
async fn update_captures_old_and_new_snapshots() {
    let rows = MockRows::new();
    let live = MockLive::new();
    let state = state_with(&rows, &live);
    let store = AccountStore::new(&state);
    let actor = Actor { id: Uuid::new_v4() };

    let account = store
        .create(
            Some(&actor),
            Uuid::new_v4(),
            "leo@gestor.app",
            AccessLevel::Support,
        )
        .await
        .unwrap();
    store
        .update(
            Some(&actor),
            account.id,
            UpdateAccount {
                access_level: Some(AccessLevel::Supervisor),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let entries = rows.rows("support_audit_log");
    assert_eq!(entries.len(), 2);
    let update_entry = &entries[1];
    assert_eq!(update_entry["action"], json!("update"));
    assert_eq!(update_entry["old_value"]["access_level"], json!("support"));
    assert_eq!(update_entry["new_value"]["access_level"], json!("supervisor"));
}

#[tokio::test]
async fn audit_failure_never_blocks_the_mutation() {
    let rows = MockRows::new();
    let live = MockLive::new();
    let state = state_with(&rows, &live);
    let store = AccountStore::new(&state);
    let actor = Actor { id: Uuid::new_v4() };

    rows.fail_insert_on("support_audit_log");

    let account = store
        .create(
            Some(&actor),
            Uuid::new_v4(),
            "bia@gestor.app",
            AccessLevel::Support,
        )
        .await
        .expect("the primary operation stands on its own");

    assert_eq!(rows.rows("support_accounts").len(), 1);
    assert!(rows.rows("support_audit_log").is_empty());
    assert_eq!(account.email, "bia@gestor.app");
}

#[tokio::test]
async fn foreign_domain_emails_are_rejected_before_any_call() {
    let rows = MockRows::new();
    let live = MockLive::new();
    let mut config = AppConfig::default();
    config.support.email_domain = Some("gestor.app".to_string());
    let state = state_with_config(&rows, &live, config);
    let store = AccountStore::new(&state);
    let actor = Actor { id: Uuid::new_v4() };

    let err = store
        .create(
            Some(&actor),
            Uuid::new_v4(),
            "intruder@elsewhere.com",
            AccessLevel::Support,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, StoreError::Validation(_)));
    assert_eq!(rows.call_count(), 0);
}

#[tokio::test]
async fn writes_without_an_actor_never_reach_the_transport() {
    let rows = MockRows::new();
    let live = MockLive::new();
    let state = state_with(&rows, &live);
    let store = AccountStore::new(&state);

    let err = store
        .create(None, Uuid::new_v4(), "ana@gestor.app", AccessLevel::Support)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::NotAuthenticated));

    let err = store.delete(None, Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, StoreError::NotAuthenticated));

    assert_eq!(rows.call_count(), 0, "no network call may be attempted");
}

#[tokio::test]
async fn audit_trail_is_scoped_per_account() {
    let rows = MockRows::new();
    let live = MockLive::new();
    let state = state_with(&rows, &live);
    let accounts = AccountStore::new(&state);
    let audit = AuditStore::new(&state);
    let actor = Actor { id: Uuid::new_v4() };

    let first = accounts
        .create(
            Some(&actor),
            Uuid::new_v4(),
            "um@gestor.app",
            AccessLevel::Support,
        )
        .await
        .unwrap();
    let second = accounts
        .create(
            Some(&actor),
            Uuid::new_v4(),
            "dois@gestor.app",
            AccessLevel::Support,
        )
        .await
        .unwrap();
    accounts
        .update(
            Some(&actor),
            second.id,
            UpdateAccount {
                is_active: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    audit.open(Some(second.id)).await.unwrap();
    let entries = audit.entries().await;
    assert_eq!(entries.len(), 1, "creation entries carry the sentinel id");
    assert_eq!(entries[0].account_id, second.id);
    let _ = first;
}
