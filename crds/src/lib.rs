// SPDX-FileCopyrightText: OLM e2e harness contributors
//
// SPDX-License-Identifier: MIT

//! Typed views of the OLM objects the harness reads back from the cluster.
//!
//! Only the fields the harness inspects are modelled; everything else in the
//! cluster's JSON is ignored on deserialization.

pub mod phases;

use std::fmt;
use std::str::FromStr;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// How the InstallPlans of a Subscription get approved.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum Approval {
    #[default]
    Automatic,
    Manual,
}

impl fmt::Display for Approval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Approval::Automatic => f.write_str("Automatic"),
            Approval::Manual => f.write_str("Manual"),
        }
    }
}

impl FromStr for Approval {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "automatic" => Ok(Approval::Automatic),
            "manual" => Ok(Approval::Manual),
            other => Err(format!("unknown install plan approval {other:?}")),
        }
    }
}

#[derive(CustomResource, Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "operators.coreos.com",
    version = "v1alpha1",
    kind = "Subscription",
    namespaced,
    status = "SubscriptionStatus",
    plural = "subscriptions"
)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionSpec {
    /// Package name.
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    pub source: String,
    pub source_namespace: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub install_plan_approval: Option<Approval>,
    #[serde(rename = "startingCSV", skip_serializing_if = "Option::is_none")]
    pub starting_csv: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionStatus {
    pub state: Option<String>,
    #[serde(rename = "installedCSV")]
    pub installed_csv: Option<String>,
    #[serde(rename = "currentCSV")]
    pub current_csv: Option<String>,
    pub installplan: Option<InstallPlanReference>,
}

impl SubscriptionStatus {
    pub fn is_at_latest_known(&self) -> bool {
        self.state.as_deref() == Some(phases::SUBSCRIPTION_AT_LATEST_KNOWN)
    }

    pub fn is_upgrade_pending(&self) -> bool {
        self.state.as_deref() == Some(phases::SUBSCRIPTION_UPGRADE_PENDING)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct InstallPlanReference {
    pub name: String,
    pub namespace: Option<String>,
}

#[derive(CustomResource, Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "operators.coreos.com",
    version = "v1alpha1",
    kind = "InstallPlan",
    namespaced,
    status = "InstallPlanStatus",
    plural = "installplans"
)]
#[serde(rename_all = "camelCase")]
pub struct InstallPlanSpec {
    pub approval: Approval,
    pub approved: bool,
    #[serde(default)]
    pub cluster_service_version_names: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
pub struct InstallPlanStatus {
    pub phase: Option<String>,
}

impl InstallPlan {
    /// Whether this plan installs the given CSV.
    pub fn installs(&self, csv: &str) -> bool {
        self.spec
            .cluster_service_version_names
            .iter()
            .any(|name| name == csv)
    }
}

#[derive(CustomResource, Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "operators.coreos.com",
    version = "v1alpha1",
    kind = "ClusterServiceVersion",
    namespaced,
    status = "ClusterServiceVersionStatus",
    plural = "clusterserviceversions"
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterServiceVersionSpec {
    pub display_name: Option<String>,
    pub version: Option<String>,
    #[serde(default)]
    pub install_modes: Vec<InstallMode>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
pub struct ClusterServiceVersionStatus {
    pub phase: Option<String>,
    pub reason: Option<String>,
    pub message: Option<String>,
}

/// Selects the namespaces the operators installed next to it watch.
/// Without target namespaces the group selects every namespace.
#[derive(CustomResource, Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "operators.coreos.com",
    version = "v1",
    kind = "OperatorGroup",
    namespaced,
    plural = "operatorgroups"
)]
#[serde(rename_all = "camelCase")]
pub struct OperatorGroupSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_namespaces: Option<Vec<String>>,
}

#[derive(CustomResource, Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "operators.coreos.com",
    version = "v1alpha1",
    kind = "CatalogSource",
    namespaced,
    plural = "catalogsources"
)]
#[serde(rename_all = "camelCase")]
pub struct CatalogSourceSpec {
    /// `grpc` for index images.
    pub source_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
}

/// The namespace scopes an operator release supports.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize, JsonSchema)]
pub enum InstallModeType {
    OwnNamespace,
    SingleNamespace,
    MultiNamespace,
    AllNamespaces,
}

impl fmt::Display for InstallModeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InstallModeType::OwnNamespace => "OwnNamespace",
            InstallModeType::SingleNamespace => "SingleNamespace",
            InstallModeType::MultiNamespace => "MultiNamespace",
            InstallModeType::AllNamespaces => "AllNamespaces",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct InstallMode {
    #[serde(rename = "type")]
    pub mode: InstallModeType,
    pub supported: bool,
}
