use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{Condition, LabelSelector, Time};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single entry in `spec.scopes` / `scopeSelector.matchExpressions[].scopeName`.
///
/// Carried on the type for forward compatibility with the platform's scope
/// vocabulary. Not consulted by usage computation — see `ClusterQuotaSpec`
/// doc comment.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
pub enum QuotaScope {
    Terminating,
    NotTerminating,
    BestEffort,
    NotBestEffort,
    PriorityClass,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
pub enum ScopeSelectorOperator {
    In,
    NotIn,
    Exists,
    DoesNotExist,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
pub struct ScopedResourceSelectorRequirement {
    pub scope_name: QuotaScope,
    pub operator: ScopeSelectorOperator,
    #[serde(default)]
    pub values: Vec<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
pub struct ScopeSelector {
    #[serde(default)]
    pub match_expressions: Vec<ScopedResourceSelectorRequirement>,
}

/// The `ClusterQuota` custom resource: a hard-limit envelope that spans every
/// namespace selected by `namespace_selector`.
///
/// `scope_selector` / `scopes` are carried on this type as a known
/// limitation: usage computation does not filter workloads by scope.
/// Left unimplemented rather than guessed at (see DESIGN.md).
#[derive(CustomResource, Serialize, Deserialize, Default, Debug, PartialEq, Clone, JsonSchema)]
#[kube(
    group = "quota.fleetquota.io",
    version = "v1",
    kind = "ClusterQuota",
    plural = "clusterquotas",
    derive = "PartialEq",
    status = "ClusterQuotaStatus"
)]
#[kube(derive = "Default")]
#[kube(
    printcolumn = "{\"jsonPath\": \".status.total.hard\", \"name\": \"HARD\", \"type\": \"string\" }"
)]
#[kube(
    printcolumn = "{\"jsonPath\": \".status.total.used\", \"name\": \"USED\", \"type\": \"string\" }"
)]
pub struct ClusterQuotaSpec {
    /// Hard limits, keyed by resource identifier (e.g. `requests.cpu`,
    /// `requests.storage`, or `<storage-class>.storageclass.storage.k8s.io/requests.storage`).
    #[serde(default)]
    pub hard: BTreeMap<String, Quantity>,

    /// Selects the namespaces this quota spans. A `None` selector matches no
    /// namespaces (explicit policy, avoids accidental cluster-wide quotas).
    pub namespace_selector: Option<LabelSelector>,

    #[serde(default)]
    pub scope_selector: Option<ScopeSelector>,

    #[serde(default)]
    pub scopes: Option<Vec<QuotaScope>>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct QuotaTotals {
    #[serde(default)]
    pub hard: BTreeMap<String, Quantity>,
    #[serde(default)]
    pub used: BTreeMap<String, Quantity>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct NamespaceUsage {
    pub namespace: String,
    #[serde(default)]
    pub used: BTreeMap<String, Quantity>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct ClusterQuotaStatus {
    #[serde(default)]
    pub total: QuotaTotals,
    #[serde(default)]
    pub namespaces: Vec<NamespaceUsage>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(rename = "lastUpdated")]
    pub last_updated: Option<Time>,
}
