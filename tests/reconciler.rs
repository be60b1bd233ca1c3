//! Lifecycle behaviour of the reconciler against an in-memory cluster.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{fields, RecordingSleeper, StubClient, CONFLICT_MESSAGE};
use nomad_reconcile::error::{Operation, ReconcileError};
use nomad_reconcile::reconciler::{ReconciliationResult, Reconciler, RetryPolicy, Severity};
use nomad_reconcile::resource::{
    DesiredState, FieldValue, ResourceKind, DEFAULT_NAMESPACE, DEFAULT_NAMESPACE_DESCRIPTION,
};

fn reconciler<'a>(
    client: &'a StubClient,
    kind: ResourceKind,
    sleeper: &Arc<RecordingSleeper>,
) -> Reconciler<'a, StubClient> {
    Reconciler::for_kind(client, kind).with_sleeper(sleeper.clone())
}

fn batch() -> DesiredState {
    DesiredState::new().with("name", "batch")
}

fn readonly_sentinel(level: &str) -> DesiredState {
    DesiredState::new()
        .with("name", "readonly")
        .with("scope", "submit-job")
        .with("enforcement_level", level)
        .with("policy", "main{}")
}

#[tokio::test]
async fn test_create_twice_is_idempotent_upsert() {
    let client = StubClient::new();
    let sleeper = Arc::new(RecordingSleeper::default());
    let namespaces = reconciler(&client, ResourceKind::Namespace, &sleeper);

    let desired = batch().with("description", "Batch jobs");
    let first = namespaces.create(&desired).await.expect("first create");
    let second = namespaces.create(&desired).await.expect("second create");

    assert_eq!(first, second);
    assert_eq!(client.len(ResourceKind::Namespace), 1);
}

#[tokio::test]
async fn test_create_then_read_round_trips() {
    let client = StubClient::new();
    let sleeper = Arc::new(RecordingSleeper::default());
    let policies = reconciler(&client, ResourceKind::AclPolicy, &sleeper);

    let desired = DesiredState::new()
        .with("name", "readonly")
        .with("description", "Read everything")
        .with("rules_hcl", "namespace \"*\" { policy = \"read\" }");
    let created = policies.create(&desired).await.expect("create");
    let read = policies
        .read("readonly")
        .await
        .expect("read")
        .expect("policy exists");

    assert_eq!(created, read);
    for (name, value) in desired.fields() {
        assert_eq!(read.get(name), Some(value), "field {name}");
    }
}

#[tokio::test]
async fn test_token_exposes_generated_identity_and_secret() {
    let client = StubClient::new();
    let sleeper = Arc::new(RecordingSleeper::default());
    let tokens = reconciler(&client, ResourceKind::AclToken, &sleeper);

    let desired = DesiredState::new()
        .with("name", "CI")
        .with("type", "client")
        .with("policies", vec![String::from("readonly")]);
    let created = tokens.create(&desired).await.expect("create");

    assert_eq!(created.identity, "accessor-1");
    assert_eq!(created.get_str("secret_id"), Some("secret-1"));
    assert!(!created.get_str("create_time").unwrap_or_default().is_empty());
    assert_eq!(created.get("global"), Some(&FieldValue::Bool(false)));
    assert_eq!(created.get("policies"), desired.get("policies"));
    assert!(!created.to_string().contains("secret-1"));

    let updated = tokens
        .update(&created.identity, &desired.clone().with("name", "CI runner"))
        .await
        .expect("update");
    assert_eq!(updated.identity, "accessor-1");
    assert_eq!(updated.get_str("name"), Some("CI runner"));
    assert_eq!(updated.get_str("secret_id"), Some("secret-1"));
}

#[tokio::test]
async fn test_global_token_updates_in_place() {
    let client = StubClient::new();
    let sleeper = Arc::new(RecordingSleeper::default());
    let tokens = reconciler(&client, ResourceKind::AclToken, &sleeper);

    let desired = DesiredState::new()
        .with("name", "replicator")
        .with("type", "client")
        .with("policies", vec![String::from("readonly")])
        .with("global", true);
    let created = tokens.create(&desired).await.expect("create");
    assert_eq!(created.get("global"), Some(&FieldValue::Bool(true)));

    let changed = desired
        .with("name", "replicator-eu")
        .with("policies", vec![String::from("readonly"), String::from("ops")]);
    let updated = tokens
        .update(&created.identity, &changed)
        .await
        .expect("global token updates in place");

    assert_eq!(updated.identity, created.identity);
    assert_eq!(updated.get_str("name"), Some("replicator-eu"));
    assert_eq!(updated.get("global"), Some(&FieldValue::Bool(true)));

    let sent = client.updates();
    assert_eq!(sent.len(), 1);
    assert!(!sent[0].contains_key("global"));
    assert!(sent[0].contains_key("accessor_id"));
}

#[tokio::test]
async fn test_update_never_renames() {
    let client = StubClient::new();
    let sleeper = Arc::new(RecordingSleeper::default());
    let namespaces = reconciler(&client, ResourceKind::Namespace, &sleeper);
    namespaces.create(&batch()).await.expect("create");
    let calls_before = client.calls().len();

    let err = namespaces
        .update("batch", &DesiredState::new().with("name", "batch-2"))
        .await
        .expect_err("rename is rejected");

    assert!(matches!(
        err,
        ReconcileError::RequiresReplacement { ref identity, ref field, .. }
            if identity == "batch" && field == "name"
    ));
    assert_eq!(client.calls().len(), calls_before);
    assert!(client.object(ResourceKind::Namespace, "batch-2").is_none());
}

#[tokio::test]
async fn test_delete_retries_fewer_than_ten_conflicts() {
    for k in [0_u32, 1, 3, 9] {
        let client = StubClient::new()
            .seed(ResourceKind::Namespace, "batch", fields(&[("name", "batch")]))
            .conflict("batch", k);
        let sleeper = Arc::new(RecordingSleeper::default());

        let outcome = reconciler(&client, ResourceKind::Namespace, &sleeper)
            .delete("batch")
            .await
            .expect("delete succeeds");

        assert_eq!(outcome.attempts, k + 1, "k = {k}");
        assert_eq!(outcome.conflicts.len(), k as usize);
        assert!(!outcome.reset);
        assert!(!outcome.already_absent);
        assert_eq!(client.count("delete"), (k + 1) as usize);
        assert_eq!(sleeper.waits(), vec![Duration::from_secs(5); k as usize]);
        assert!(client.object(ResourceKind::Namespace, "batch").is_none());
    }
}

#[tokio::test]
async fn test_delete_gives_up_after_ten_attempts() {
    for k in [10_u32, 15] {
        let client = StubClient::new()
            .seed(ResourceKind::Namespace, "batch", fields(&[("name", "batch")]))
            .conflict("batch", k);
        let sleeper = Arc::new(RecordingSleeper::default());

        let err = reconciler(&client, ResourceKind::Namespace, &sleeper)
            .delete("batch")
            .await
            .expect_err("retries run out");

        match err {
            ReconcileError::RetriesExhausted {
                attempts,
                last_message,
                ..
            } => {
                assert_eq!(attempts, 10);
                assert_eq!(last_message, CONFLICT_MESSAGE);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(client.count("delete"), 10);
        assert_eq!(sleeper.waits().len(), 9);
        assert!(client.object(ResourceKind::Namespace, "batch").is_some());
    }
}

#[tokio::test]
async fn test_non_conflict_failure_is_not_retried() {
    let client = StubClient::new()
        .seed(ResourceKind::AclPolicy, "readonly", fields(&[("name", "readonly")]))
        .reject("readonly", 403, "Permission denied");
    let sleeper = Arc::new(RecordingSleeper::default());

    let err = reconciler(&client, ResourceKind::AclPolicy, &sleeper)
        .delete("readonly")
        .await
        .expect_err("permission denied");

    assert!(matches!(
        err,
        ReconcileError::RemoteRejected { operation: Operation::Delete, .. }
    ));
    assert!(err.to_string().contains("Permission denied"));
    assert_eq!(client.count("delete"), 1);
    assert!(sleeper.waits().is_empty());
}

#[tokio::test]
async fn test_rejection_after_conflicts_keeps_attempt_history() {
    let client = StubClient::new()
        .seed(ResourceKind::Namespace, "batch", fields(&[("name", "batch")]))
        .conflict("batch", 2)
        .reject("batch", 403, "Permission denied");
    let sleeper = Arc::new(RecordingSleeper::default());

    let err = reconciler(&client, ResourceKind::Namespace, &sleeper)
        .delete("batch")
        .await
        .expect_err("refused on the third attempt");

    match &err {
        ReconcileError::RemoteRejected { attempts, conflicts, .. } => {
            assert_eq!(*attempts, 3);
            assert_eq!(conflicts, &vec![CONFLICT_MESSAGE.to_string(); 2]);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(client.count("delete"), 3);
    assert_eq!(sleeper.waits().len(), 2);

    let result = ReconciliationResult::failed(
        ResourceKind::Namespace,
        Some(String::from("batch")),
        Operation::Delete,
        &err,
    );
    assert_eq!(result.attempts, 3);
    let severities: Vec<Severity> = result.diagnostics.iter().map(|d| d.severity).collect();
    assert_eq!(
        severities,
        vec![Severity::Warning, Severity::Warning, Severity::Error]
    );
    assert_eq!(result.diagnostics[0].detail, CONFLICT_MESSAGE);
    assert_eq!(result.diagnostics[2].detail, "Permission denied");
}

#[tokio::test]
async fn test_default_namespace_is_reset_not_deleted() {
    let client = StubClient::new()
        .seed(
            ResourceKind::Namespace,
            DEFAULT_NAMESPACE,
            fields(&[
                ("name", DEFAULT_NAMESPACE),
                ("description", "Customised"),
                ("quota", "small"),
            ]),
        )
        .conflict(DEFAULT_NAMESPACE, 2);
    let sleeper = Arc::new(RecordingSleeper::default());

    let outcome = reconciler(&client, ResourceKind::Namespace, &sleeper)
        .delete(DEFAULT_NAMESPACE)
        .await
        .expect("reset succeeds");

    assert!(outcome.reset);
    assert_eq!(outcome.attempts, 3);
    assert_eq!(client.count("delete"), 0);
    assert_eq!(client.count("update"), 3);
    assert_eq!(sleeper.waits().len(), 2);

    let reset = client
        .object(ResourceKind::Namespace, DEFAULT_NAMESPACE)
        .expect("default namespace remains");
    assert_eq!(
        reset.get("description").and_then(FieldValue::as_str),
        Some(DEFAULT_NAMESPACE_DESCRIPTION)
    );
    assert_eq!(reset.get("quota").and_then(FieldValue::as_str), Some(""));
}

#[tokio::test]
async fn test_default_namespace_reset_shares_retry_cap() {
    let client = StubClient::new().conflict(DEFAULT_NAMESPACE, 10);
    let sleeper = Arc::new(RecordingSleeper::default());

    let err = reconciler(&client, ResourceKind::Namespace, &sleeper)
        .delete(DEFAULT_NAMESPACE)
        .await
        .expect_err("reset retries run out");

    assert!(matches!(err, ReconcileError::RetriesExhausted { attempts: 10, .. }));
    assert_eq!(client.count("delete"), 0);
    assert_eq!(sleeper.waits().len(), 9);
}

#[tokio::test]
async fn test_validation_precedes_network_calls() {
    let client = StubClient::new();
    let sleeper = Arc::new(RecordingSleeper::default());
    let sentinel = reconciler(&client, ResourceKind::SentinelPolicy, &sleeper);

    let err = sentinel
        .create(&readonly_sentinel("strict"))
        .await
        .expect_err("strict is not a level");
    assert!(matches!(
        err,
        ReconcileError::Validation { ref field, .. } if field == "enforcement_level"
    ));

    let err = sentinel
        .update("readonly", &readonly_sentinel("strict"))
        .await
        .expect_err("strict is not a level");
    assert!(matches!(err, ReconcileError::Validation { .. }));

    let tokens = reconciler(&client, ResourceKind::AclToken, &sleeper);
    let err = tokens
        .create(&DesiredState::new().with("type", "superuser"))
        .await
        .expect_err("unknown token type");
    assert!(matches!(err, ReconcileError::Validation { .. }));

    assert!(client.calls().is_empty());
}

#[tokio::test]
async fn test_sentinel_policy_scenario() {
    let client = StubClient::new();
    let sleeper = Arc::new(RecordingSleeper::default());
    let sentinel = reconciler(&client, ResourceKind::SentinelPolicy, &sleeper);
    let desired = readonly_sentinel("advisory");

    sentinel.create(&desired).await.expect("create");
    let read = sentinel
        .read("readonly")
        .await
        .expect("read")
        .expect("policy exists");
    for (name, value) in desired.fields() {
        assert_eq!(read.get(name), Some(value), "field {name}");
    }

    let outcome = sentinel.delete("readonly").await.expect("delete");
    assert_eq!(outcome.attempts, 1);
    assert!(sentinel.read("readonly").await.expect("read").is_none());

    let err = sentinel.import("readonly").await.expect_err("gone");
    assert!(matches!(err, ReconcileError::NotFound { .. }));
}

#[tokio::test]
async fn test_namespace_batch_scenario() {
    let client = StubClient::new().conflict("batch", 3);
    let sleeper = Arc::new(RecordingSleeper::default());
    let namespaces = reconciler(&client, ResourceKind::Namespace, &sleeper)
        .with_retry(RetryPolicy::new(10, Duration::from_secs(1)));

    namespaces.create(&batch()).await.expect("create");
    let outcome = namespaces.delete("batch").await.expect("delete");

    assert_eq!(outcome.attempts, 4);
    assert_eq!(sleeper.total(), Duration::from_secs(3));
    assert!(namespaces.read("batch").await.expect("read").is_none());
}

#[tokio::test]
async fn test_delete_of_missing_object_succeeds() {
    let client = StubClient::new();
    let sleeper = Arc::new(RecordingSleeper::default());

    let outcome = reconciler(&client, ResourceKind::AclPolicy, &sleeper)
        .delete("gone")
        .await
        .expect("absence is success");
    assert!(outcome.already_absent);
    assert_eq!(outcome.attempts, 1);
}

#[tokio::test]
async fn test_import_returns_full_snapshot() {
    let client = StubClient::new().seed(
        ResourceKind::Namespace,
        "ops",
        fields(&[("name", "ops"), ("description", "Operations"), ("quota", "")]),
    );
    let sleeper = Arc::new(RecordingSleeper::default());
    let namespaces = reconciler(&client, ResourceKind::Namespace, &sleeper);

    let snapshot = namespaces.import("ops").await.expect("import");
    assert_eq!(snapshot.get_str("description"), Some("Operations"));

    let updated = namespaces.update("ops", &snapshot).await.expect("feed back");
    assert_eq!(updated.get_str("description"), Some("Operations"));
}
