//! Service account propagation
//!
//! Kubernetes generates a `<name>-token-*` secret for every service account
//! and lists it in `.secrets`. Those references are namespace-local, so the
//! base's tokens are never copied and a copy keeps its own on refresh.

use k8s_openapi::api::core::v1::{ObjectReference, ServiceAccount};
use kube::ResourceExt;

use crate::labels::Role;

use super::base::{copy_meta, refresh_meta, BaseResourceService, Replica};

/// Propagates the function ServiceAccount
pub type ServiceAccountService<S> = BaseResourceService<ServiceAccount, S>;

fn token_prefix(sa: &ServiceAccount) -> String {
    format!("{}-token-", sa.name_any())
}

/// Secret references that are tokens generated for `sa`
pub fn extract_secret_tokens(sa: &ServiceAccount) -> Vec<ObjectReference> {
    let prefix = token_prefix(sa);
    sa.secrets
        .iter()
        .flatten()
        .filter(|s| s.name.as_deref().is_some_and(|n| n.starts_with(&prefix)))
        .cloned()
        .collect()
}

/// Secret references of `sa` with its generated tokens removed
pub fn shift_secret_tokens(sa: &ServiceAccount) -> Vec<ObjectReference> {
    let prefix = token_prefix(sa);
    sa.secrets
        .iter()
        .flatten()
        .filter(|s| !s.name.as_deref().is_some_and(|n| n.starts_with(&prefix)))
        .cloned()
        .collect()
}

fn non_empty(refs: Vec<ObjectReference>) -> Option<Vec<ObjectReference>> {
    if refs.is_empty() {
        None
    } else {
        Some(refs)
    }
}

impl Replica for ServiceAccount {
    const ROLE: Role = Role::ServiceAccount;

    fn replicate(base: &Self, namespace: &str) -> Self {
        ServiceAccount {
            metadata: copy_meta(&base.metadata, namespace),
            secrets: non_empty(shift_secret_tokens(base)),
            image_pull_secrets: base.image_pull_secrets.clone(),
            automount_service_account_token: base.automount_service_account_token,
            ..ServiceAccount::default()
        }
    }

    fn refresh(existing: &Self, base: &Self) -> Self {
        let mut secrets = shift_secret_tokens(base);
        secrets.extend(extract_secret_tokens(existing));
        ServiceAccount {
            metadata: refresh_meta(&existing.metadata, &base.metadata),
            secrets: non_empty(secrets),
            image_pull_secrets: base.image_pull_secrets.clone(),
            automount_service_account_token: base.automount_service_account_token,
            ..existing.clone()
        }
    }
}
