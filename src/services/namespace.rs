//! Target namespace selection

use std::collections::BTreeSet;

use k8s_openapi::api::core::v1::Namespace;
use kube::ResourceExt;

use crate::config::Config;
use crate::error::Result;
use crate::store::NamespaceLister;

/// Decides which namespaces receive copies of the base resources
pub struct NamespaceService<S> {
    store: S,
    base_namespace: String,
    excluded: BTreeSet<String>,
}

fn is_terminating(ns: &Namespace) -> bool {
    ns.metadata.deletion_timestamp.is_some()
        || ns
            .status
            .as_ref()
            .and_then(|s| s.phase.as_deref())
            == Some("Terminating")
}

impl<S: NamespaceLister> NamespaceService<S> {
    pub fn new(store: S, config: &Config) -> Self {
        Self {
            store,
            base_namespace: config.base_namespace.clone(),
            excluded: config
                .excluded_namespaces
                .iter()
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty())
                .collect(),
        }
    }

    /// The base namespace and every configured exclusion
    pub fn is_excluded(&self, name: &str) -> bool {
        name == self.base_namespace || self.excluded.contains(name)
    }

    /// Whether `ns` should hold copies right now
    pub fn is_target(&self, ns: &Namespace) -> bool {
        !self.is_excluded(&ns.name_any()) && !is_terminating(ns)
    }

    /// Names of all namespaces that should hold copies, sorted
    pub async fn list_targets(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self
            .store
            .list_namespaces()
            .await?
            .iter()
            .filter(|ns| self.is_target(ns))
            .map(|ns| ns.name_any())
            .collect();
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;
    use k8s_openapi::api::core::v1::NamespaceStatus;
    use kube::api::ObjectMeta;

    use super::*;
    use crate::store::MemoryStore;

    fn namespace(name: &str) -> Namespace {
        Namespace {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn service(store: MemoryStore<Namespace>) -> NamespaceService<MemoryStore<Namespace>> {
        let config = Config::parse_from([
            "config-propagation-controller",
            "--base-namespace",
            "base",
            "--excluded-namespaces",
            "kube-system, istio-system",
        ]);
        NamespaceService::new(store, &config)
    }

    #[test]
    fn test_is_excluded() {
        let svc = service(MemoryStore::new());
        assert!(svc.is_excluded("base"));
        assert!(svc.is_excluded("kube-system"));
        assert!(svc.is_excluded("istio-system"));
        assert!(!svc.is_excluded("default"));
    }

    #[tokio::test]
    async fn test_list_targets_skips_excluded_and_terminating() {
        let store = MemoryStore::new();
        for name in ["zeta", "base", "kube-system", "alpha"] {
            store.insert(namespace(name));
        }
        let mut dying = namespace("dying");
        dying.status = Some(NamespaceStatus {
            phase: Some("Terminating".to_string()),
            ..Default::default()
        });
        store.insert(dying);

        let svc = service(store);
        assert_eq!(svc.list_targets().await.unwrap(), vec!["alpha", "zeta"]);
    }
}
