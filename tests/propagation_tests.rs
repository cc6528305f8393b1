//! Integration tests for config propagation
//!
//! These tests run the reconcilers against the in-memory cluster and check
//! which copies end up in which namespaces.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use clap::Parser;
use k8s_openapi::api::core::v1::{ConfigMap, Namespace, ObjectReference, Secret, ServiceAccount};
use k8s_openapi::ByteString;
use kube::api::ObjectMeta;
use kube::runtime::controller::Action;
use tokio_test::{assert_err, assert_ok};

use config_propagation_controller::config::Config;
use config_propagation_controller::labels::{CONFIG_LABEL, MANAGED_BY_LABEL};
use config_propagation_controller::reconcilers::{base, namespace, Services};
use config_propagation_controller::services::{Change, CredentialsService};
use config_propagation_controller::store::{MemoryCluster, ObjectStore};
use config_propagation_controller::Error;

// ============================================================================
// Test Helpers
// ============================================================================

const BASE_NS: &str = "base-ns";
const REQUEUE: Duration = Duration::from_secs(60);

fn test_config() -> Config {
    Config::parse_from([
        "config-propagation-controller",
        "--base-namespace",
        BASE_NS,
        "--excluded-namespaces",
        "kube-system,istio-system",
    ])
}

fn meta(namespace: &str, name: &str, labels: &[(&str, &str)]) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(namespace.to_string()),
        labels: Some(
            labels
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        ),
        ..Default::default()
    }
}

fn namespace_object(name: &str) -> Namespace {
    Namespace {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Cluster with the base namespace, two tenants and one excluded namespace
fn cluster() -> MemoryCluster {
    let cluster = MemoryCluster::new();
    for name in [BASE_NS, "tenant-a", "tenant-b", "kube-system"] {
        cluster.namespaces().insert(namespace_object(name));
    }
    cluster
}

fn base_secret(name: &str) -> Secret {
    Secret {
        metadata: meta(BASE_NS, name, &[(CONFIG_LABEL, "credentials")]),
        data: Some(BTreeMap::from([(
            "username".to_string(),
            ByteString(b"admin".to_vec()),
        )])),
        type_: Some("Opaque".to_string()),
        ..Default::default()
    }
}

fn user_managed_secret(name: &str) -> Secret {
    Secret {
        metadata: meta(
            BASE_NS,
            name,
            &[(CONFIG_LABEL, "credentials"), (MANAGED_BY_LABEL, "user")],
        ),
        ..base_secret(name)
    }
}

fn base_runtime(name: &str) -> ConfigMap {
    ConfigMap {
        metadata: meta(BASE_NS, name, &[(CONFIG_LABEL, "runtime")]),
        data: Some(BTreeMap::from([(
            "Dockerfile".to_string(),
            "FROM node:20-alpine".to_string(),
        )])),
        ..Default::default()
    }
}

fn secret_refs(names: &[&str]) -> Vec<ObjectReference> {
    names
        .iter()
        .map(|n| ObjectReference {
            name: Some(n.to_string()),
            ..Default::default()
        })
        .collect()
}

fn base_service_account(name: &str) -> ServiceAccount {
    let token = format!("{name}-token-abcde");
    ServiceAccount {
        metadata: meta(BASE_NS, name, &[(CONFIG_LABEL, "service-account")]),
        secrets: Some(secret_refs(&["registry-credentials", token.as_str()])),
        automount_service_account_token: Some(false),
        ..Default::default()
    }
}

fn password(secret: &Secret) -> Option<Vec<u8>> {
    secret
        .data
        .as_ref()
        .and_then(|d| d.get("username"))
        .map(|b| b.0.clone())
}

// ============================================================================
// Base Resource Propagation Tests
// ============================================================================

#[tokio::test]
async fn base_secret_is_copied_into_every_target_namespace() {
    let cluster = cluster();
    let services = Services::new(cluster.clone(), &test_config());
    let secret = cluster.secrets().insert(base_secret("registry"));

    let action = assert_ok!(base::apply(&secret, &services, REQUEUE).await);
    assert_eq!(action, Action::requeue(REQUEUE));

    for ns in ["tenant-a", "tenant-b"] {
        let copy = cluster.secrets().object(ns, "registry").expect("copy exists");
        assert_eq!(copy.metadata.labels, secret.metadata.labels);
        assert_eq!(copy.data, secret.data);
        assert_eq!(copy.type_, secret.type_);
    }
    assert!(cluster.secrets().object("kube-system", "registry").is_none());
    assert_eq!(cluster.secrets().objects().len(), 3);
}

#[tokio::test]
async fn replicating_into_namespace_with_existing_copy_does_not_error() {
    let cluster = cluster();
    let services = Services::new(cluster.clone(), &test_config());
    let secret = cluster.secrets().insert(base_secret("registry"));

    assert_ok!(services.credentials.create_in("tenant-a", &secret).await);
    assert_ok!(services.credentials.create_in("tenant-a", &secret).await);
    assert_ok!(services.credentials.sync(&["tenant-a".to_string()], &secret, Change::Created).await);

    assert!(cluster.secrets().object("tenant-a", "registry").is_some());
}

#[tokio::test]
async fn base_update_is_propagated_and_drift_is_repaired() {
    let cluster = cluster();
    let services = Services::new(cluster.clone(), &test_config());
    let secret = cluster.secrets().insert(base_secret("registry"));
    assert_ok!(base::apply(&secret, &services, REQUEUE).await);

    // Update the base
    let mut changed = secret.clone();
    changed
        .metadata
        .labels
        .get_or_insert_with(BTreeMap::new)
        .insert("test".to_string(), "value".to_string());
    changed.data = Some(BTreeMap::from([(
        "username".to_string(),
        ByteString(b"root".to_vec()),
    )]));
    let changed = assert_ok!(cluster.secrets().replace(&changed).await);
    assert_ok!(base::apply(&changed, &services, REQUEUE).await);

    let copy = cluster.secrets().object("tenant-a", "registry").unwrap();
    assert_eq!(password(&copy), Some(b"root".to_vec()));
    assert_eq!(copy.metadata.labels, changed.metadata.labels);

    // Modify a copy by hand, the next pass restores it
    let mut drifted = copy.clone();
    drifted.data = None;
    assert_ok!(cluster.secrets().replace(&drifted).await);
    assert_ok!(base::apply(&changed, &services, REQUEUE).await);

    let restored = cluster.secrets().object("tenant-a", "registry").unwrap();
    assert_eq!(password(&restored), Some(b"root".to_vec()));
}

#[tokio::test]
async fn missing_copy_is_created_on_update() {
    let cluster = cluster();
    let services = Services::new(cluster.clone(), &test_config());
    let runtime = cluster.config_maps().insert(base_runtime("nodejs20"));

    assert_ok!(services.runtimes.update_in("tenant-b", &runtime).await);

    let copy = cluster.config_maps().object("tenant-b", "nodejs20").unwrap();
    assert_eq!(copy.data, runtime.data);
}

#[tokio::test]
async fn non_base_resources_are_ignored() {
    let cluster = cluster();
    let services = Services::new(cluster.clone(), &test_config());

    let unlabelled = cluster
        .secrets()
        .insert(Secret { metadata: meta(BASE_NS, "plain", &[]), ..Default::default() });
    let elsewhere = cluster.secrets().insert(Secret {
        metadata: meta("tenant-a", "foreign", &[(CONFIG_LABEL, "credentials")]),
        ..Default::default()
    });

    assert_eq!(
        assert_ok!(base::apply(&unlabelled, &services, REQUEUE).await),
        Action::await_change()
    );
    assert_eq!(
        assert_ok!(base::apply(&elsewhere, &services, REQUEUE).await),
        Action::await_change()
    );
    assert_eq!(cluster.secrets().objects().len(), 2);
}

#[tokio::test]
async fn deleting_base_removes_copies() {
    let cluster = cluster();
    let services = Services::new(cluster.clone(), &test_config());
    let runtime = cluster.config_maps().insert(base_runtime("python312"));
    assert_ok!(base::apply(&runtime, &services, REQUEUE).await);
    assert!(services.runtimes.cached("python312").is_some());

    // One copy already gone must not fail the cleanup
    assert_ok!(cluster.config_maps().delete("tenant-b", "python312").await);

    let action = assert_ok!(base::cleanup(&runtime, &services).await);
    assert_eq!(action, Action::await_change());
    assert!(cluster.config_maps().object("tenant-a", "python312").is_none());
    assert!(services.runtimes.cached("python312").is_none());
}

// ============================================================================
// User-Managed Copies
// ============================================================================

#[tokio::test]
async fn user_managed_copies_are_created_but_never_overwritten_or_deleted() {
    let cluster = cluster();
    let services = Services::new(cluster.clone(), &test_config());
    let secret = cluster.secrets().insert(user_managed_secret("user-registry"));

    assert_ok!(base::apply(&secret, &services, REQUEUE).await);
    let original = cluster.secrets().object("tenant-a", "user-registry").unwrap();
    assert_eq!(original.data, secret.data);

    let mut changed = secret.clone();
    changed.data = Some(BTreeMap::from([(
        "username".to_string(),
        ByteString(b"other".to_vec()),
    )]));
    let changed = assert_ok!(cluster.secrets().replace(&changed).await);
    assert_ok!(base::apply(&changed, &services, REQUEUE).await);

    let after_update = cluster.secrets().object("tenant-a", "user-registry").unwrap();
    assert_eq!(after_update, original);

    assert_ok!(base::cleanup(&changed, &services).await);
    assert!(cluster.secrets().object("tenant-a", "user-registry").is_some());
    assert!(cluster.secrets().object("tenant-b", "user-registry").is_some());
}

// ============================================================================
// Service Accounts
// ============================================================================

#[tokio::test]
async fn service_account_copies_keep_their_own_tokens() {
    let cluster = cluster();
    let services = Services::new(cluster.clone(), &test_config());
    let sa = cluster
        .service_accounts()
        .insert(base_service_account("function-controller"));

    assert_ok!(base::apply(&sa, &services, REQUEUE).await);
    let copy = cluster
        .service_accounts()
        .object("tenant-a", "function-controller")
        .unwrap();
    assert_eq!(copy.secrets, Some(secret_refs(&["registry-credentials"])));
    assert_eq!(copy.automount_service_account_token, Some(false));

    // The API server adds a token to the copy
    let mut with_token = copy.clone();
    with_token
        .secrets
        .get_or_insert_with(Vec::new)
        .push(secret_refs(&["function-controller-token-xyz12"]).remove(0));
    assert_ok!(cluster.service_accounts().replace(&with_token).await);

    let mut changed = sa.clone();
    changed.automount_service_account_token = Some(true);
    let changed = assert_ok!(cluster.service_accounts().replace(&changed).await);
    assert_ok!(base::apply(&changed, &services, REQUEUE).await);

    let refreshed = cluster
        .service_accounts()
        .object("tenant-a", "function-controller")
        .unwrap();
    assert_eq!(refreshed.automount_service_account_token, Some(true));
    assert_eq!(
        refreshed.secrets,
        Some(secret_refs(&["registry-credentials", "function-controller-token-xyz12"]))
    );
}

// ============================================================================
// Namespace Reconciliation
// ============================================================================

#[tokio::test]
async fn new_namespace_receives_every_base_resource() {
    let cluster = cluster();
    let services = Services::new(cluster.clone(), &test_config());
    cluster.secrets().insert(base_secret("registry"));
    cluster.config_maps().insert(base_runtime("nodejs20"));
    cluster
        .service_accounts()
        .insert(base_service_account("function-controller"));

    let fresh = cluster.namespaces().insert(namespace_object("tenant-c"));
    let action = assert_ok!(namespace::reconcile(&fresh, &services, REQUEUE).await);
    assert_eq!(action, Action::requeue(REQUEUE));

    assert!(cluster.secrets().object("tenant-c", "registry").is_some());
    assert!(cluster.config_maps().object("tenant-c", "nodejs20").is_some());
    assert!(cluster
        .service_accounts()
        .object("tenant-c", "function-controller")
        .is_some());
    // Only the reconciled namespace is touched
    assert!(cluster.secrets().object("tenant-a", "registry").is_none());
}

#[tokio::test]
async fn excluded_namespaces_never_receive_copies() {
    let cluster = cluster();
    let services = Services::new(cluster.clone(), &test_config());
    cluster.secrets().insert(base_secret("registry"));

    for name in ["kube-system", BASE_NS] {
        let ns = cluster.namespaces().object("", name).unwrap();
        let action = assert_ok!(namespace::reconcile(&ns, &services, REQUEUE).await);
        assert_eq!(action, Action::await_change());
    }
    let mut terminating = namespace_object("leaving");
    terminating.metadata.deletion_timestamp =
        Some(k8s_openapi::apimachinery::pkg::apis::meta::v1::Time(Utc::now()));
    let action = assert_ok!(namespace::reconcile(&terminating, &services, REQUEUE).await);
    assert_eq!(action, Action::await_change());

    assert_eq!(cluster.secrets().objects().len(), 1);
}

// ============================================================================
// Failure Handling
// ============================================================================

#[tokio::test]
async fn failing_namespace_does_not_block_the_others() {
    let cluster = cluster();
    let services = Services::new(cluster.clone(), &test_config());
    let secret = cluster.secrets().insert(base_secret("registry"));
    cluster.secrets().fail_writes_in("tenant-b");

    let err = assert_err!(base::apply(&secret, &services, REQUEUE).await);
    match err {
        Error::Propagation { failed, total, .. } => {
            assert_eq!(failed, 1);
            assert_eq!(total, 2);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(cluster.secrets().object("tenant-a", "registry").is_some());
    assert!(cluster.secrets().object("tenant-b", "registry").is_none());
}

// ============================================================================
// Change Detection
// ============================================================================

#[tokio::test]
async fn change_detection_uses_cache_and_creation_time() {
    let cluster = cluster();
    let started = Utc::now();
    let service = CredentialsService::new(cluster.clone(), &test_config()).with_start_time(started);

    let fresh = cluster.secrets().insert(base_secret("fresh"));
    assert_eq!(service.observe(&fresh), Change::Created);
    assert_eq!(service.observe(&fresh), Change::Unchanged);

    let updated = assert_ok!(cluster.secrets().replace(&fresh).await);
    assert_eq!(service.observe(&updated), Change::Updated);

    let mut old = base_secret("old");
    old.metadata.creation_timestamp = Some(k8s_openapi::apimachinery::pkg::apis::meta::v1::Time(
        started - ChronoDuration::hours(1),
    ));
    let old = cluster.secrets().insert(old);
    assert_eq!(service.observe(&old), Change::Updated);

    let listed = assert_ok!(service.list_base().await);
    assert_eq!(listed.len(), 2);
    assert_eq!(service.observe(&old), Change::Unchanged);
}
