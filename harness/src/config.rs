// SPDX-FileCopyrightText: OLM e2e harness contributors
//
// SPDX-License-Identifier: MIT

use envconfig::Envconfig;

/// Where the cluster CLI lives and which credentials it runs with.
#[derive(Envconfig, Clone, Debug)]
pub struct CliConfig {
    /// CLI binary, `oc` or `kubectl`.
    #[envconfig(from = "OLM_E2E_CLI", default = "oc")]
    pub binary: String,

    /// Kubeconfig used for admin calls. Unset means the CLI's current context.
    #[envconfig(from = "KUBECONFIG")]
    pub admin_kubeconfig: Option<String>,

    /// Kubeconfig used for user calls. Unset means the CLI's current context.
    #[envconfig(from = "OLM_E2E_USER_KUBECONFIG")]
    pub user_kubeconfig: Option<String>,

    /// Namespace of the test project. A fresh `test-xxxxxxxx` name is generated when unset.
    #[envconfig(from = "OLM_E2E_NAMESPACE")]
    pub namespace: Option<String>,

    /// Directory rendered manifests are written to.
    #[envconfig(from = "OLM_E2E_OUTPUT_DIR")]
    pub output_dir: Option<String>,

    #[envconfig(from = "OLM_E2E_CATALOG_NAMESPACE", default = "openshift-marketplace")]
    pub catalog_namespace: String,

    /// Namespace AllNamespaces operators are installed into.
    #[envconfig(from = "OLM_E2E_GLOBAL_NAMESPACE", default = "openshift-operators")]
    pub global_namespace: String,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            binary: "oc".to_string(),
            admin_kubeconfig: None,
            user_kubeconfig: None,
            namespace: None,
            output_dir: None,
            catalog_namespace: "openshift-marketplace".to_string(),
            global_namespace: "openshift-operators".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_apply_when_variables_are_unset() {
        let config = CliConfig::init_from_hashmap(&HashMap::new()).unwrap();
        assert_eq!(config.binary, "oc");
        assert_eq!(config.catalog_namespace, "openshift-marketplace");
        assert_eq!(config.global_namespace, "openshift-operators");
        assert!(config.admin_kubeconfig.is_none());
        assert!(config.namespace.is_none());
    }

    #[test]
    fn variables_override_defaults() {
        let env = HashMap::from([
            ("OLM_E2E_CLI".to_string(), "kubectl".to_string()),
            ("KUBECONFIG".to_string(), "/tmp/admin".to_string()),
            ("OLM_E2E_USER_KUBECONFIG".to_string(), "/tmp/user".to_string()),
            ("OLM_E2E_NAMESPACE".to_string(), "olm-test".to_string()),
        ]);
        let config = CliConfig::init_from_hashmap(&env).unwrap();
        assert_eq!(config.binary, "kubectl");
        assert_eq!(config.admin_kubeconfig.as_deref(), Some("/tmp/admin"));
        assert_eq!(config.user_kubeconfig.as_deref(), Some("/tmp/user"));
        assert_eq!(config.namespace.as_deref(), Some("olm-test"));
    }
}
