//! Runtime propagation (ConfigMaps)

use k8s_openapi::api::core::v1::ConfigMap;

use crate::labels::Role;

use super::base::{copy_meta, refresh_meta, BaseResourceService, Replica};

/// Propagates runtime ConfigMaps
pub type RuntimesService<S> = BaseResourceService<ConfigMap, S>;

impl Replica for ConfigMap {
    const ROLE: Role = Role::Runtime;

    fn replicate(base: &Self, namespace: &str) -> Self {
        ConfigMap {
            metadata: copy_meta(&base.metadata, namespace),
            data: base.data.clone(),
            binary_data: base.binary_data.clone(),
            ..ConfigMap::default()
        }
    }

    fn refresh(existing: &Self, base: &Self) -> Self {
        ConfigMap {
            metadata: refresh_meta(&existing.metadata, &base.metadata),
            data: base.data.clone(),
            binary_data: base.binary_data.clone(),
            ..existing.clone()
        }
    }
}
