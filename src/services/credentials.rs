//! Credentials propagation (Secrets)

use k8s_openapi::api::core::v1::Secret;

use crate::labels::Role;

use super::base::{copy_meta, refresh_meta, BaseResourceService, Replica};

/// Propagates credential Secrets
pub type CredentialsService<S> = BaseResourceService<Secret, S>;

impl Replica for Secret {
    const ROLE: Role = Role::Credentials;

    fn replicate(base: &Self, namespace: &str) -> Self {
        Secret {
            metadata: copy_meta(&base.metadata, namespace),
            data: base.data.clone(),
            string_data: base.string_data.clone(),
            type_: base.type_.clone(),
            ..Secret::default()
        }
    }

    fn refresh(existing: &Self, base: &Self) -> Self {
        Secret {
            metadata: refresh_meta(&existing.metadata, &base.metadata),
            data: base.data.clone(),
            string_data: base.string_data.clone(),
            ..existing.clone()
        }
    }
}
