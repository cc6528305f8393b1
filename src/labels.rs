//! Labels, roles and finalizers shared by every propagated kind

use std::collections::BTreeMap;
use std::fmt;

/// Label selecting the role of a base resource
pub const CONFIG_LABEL: &str = "serverless.kyma-project.io/config";

/// Label marking who manages the copies of a base resource
pub const MANAGED_BY_LABEL: &str = "serverless.kyma-project.io/managed-by";

/// `MANAGED_BY_LABEL` value for user-managed copies
pub const USER_LABEL_VALUE: &str = "user";

/// Finalizer placed on base resources so copies can be removed on deletion
pub const FINALIZER: &str = "serverless.kyma-project.io/deletion-hook";

/// Role of a base resource, taken from the `CONFIG_LABEL` value
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Role {
    /// Registry and other credentials (Secrets)
    Credentials,
    /// Function runtimes (ConfigMaps)
    Runtime,
    /// Service account used by function workloads
    ServiceAccount,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Credentials, Role::Runtime, Role::ServiceAccount];

    pub fn label_value(self) -> &'static str {
        match self {
            Role::Credentials => "credentials",
            Role::Runtime => "runtime",
            Role::ServiceAccount => "service-account",
        }
    }

    /// Label selector matching base resources of this role
    pub fn selector(self) -> String {
        format!("{}={}", CONFIG_LABEL, self.label_value())
    }

    pub fn from_labels(labels: &BTreeMap<String, String>) -> Option<Role> {
        let value = labels.get(CONFIG_LABEL)?;
        Role::ALL.into_iter().find(|r| r.label_value() == value.as_str())
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label_value())
    }
}

/// Whether the copies of a resource with these labels are managed by the user
pub fn is_user_managed(labels: &BTreeMap<String, String>) -> bool {
    labels.get(MANAGED_BY_LABEL).map(String::as_str) == Some(USER_LABEL_VALUE)
}
