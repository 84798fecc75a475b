use super::workload::Decision;
use crate::clusterquota::{quota_client, selector};
use crate::util::Error;
use fleetquota_types::ClusterQuota;
use k8s_openapi::api::core::v1::Namespace;
use kube::ResourceExt;
use std::collections::BTreeMap;

/// Validates that a new or updated `ClusterQuota`'s selector would not
/// cause any namespace to be owned by more than one quota.
pub async fn validate(
    new_quota: &ClusterQuota,
    all_namespaces: &[Namespace],
    other_quotas: &[ClusterQuota],
) -> Result<Decision, Error> {
    let intended: Vec<&Namespace> = all_namespaces
        .iter()
        .filter(|ns| selector::matches(new_quota.spec.namespace_selector.as_ref(), &labels_of(ns)))
        .collect();

    for ns in &intended {
        let name = ns.name_any();
        for other in other_quotas {
            if other.meta().name.as_deref() == new_quota.meta().name.as_deref() {
                continue;
            }
            let owned_by_other = quota_client::namespaces_from_status(other).iter().any(|n| n == &name)
                || selector::matches(other.spec.namespace_selector.as_ref(), &labels_of(ns));
            if owned_by_other {
                return Ok(Decision::deny(format!(
                    "namespace {name} would be selected by multiple cluster quotas ({} and {})",
                    new_quota.name_any(),
                    other.name_any()
                )));
            }
        }
    }
    Ok(Decision::allow())
}

fn labels_of(ns: &Namespace) -> BTreeMap<String, String> {
    ns.meta().labels.clone().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetquota_types::{ClusterQuotaStatus, NamespaceUsage};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
    use kube::api::ObjectMeta;

    fn quota(name: &str, match_labels: &[(&str, &str)]) -> ClusterQuota {
        let mut q = ClusterQuota::new(name, Default::default());
        q.spec.namespace_selector = Some(LabelSelector {
            match_labels: Some(match_labels.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()),
            ..Default::default()
        });
        q
    }

    fn namespace(name: &str, labels: &[(&str, &str)]) -> Namespace {
        Namespace {
            metadata: ObjectMeta {
                name: Some(name.to_owned()),
                labels: Some(labels.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn new_quota_overlapping_existing_quota_is_denied() {
        let existing = quota("quota-existing", &[("env", "prod")]);
        let incoming = quota("quota-new", &[("env", "prod")]);
        let namespaces = [namespace("svc-1", &[("env", "prod")])];
        let decision = validate(&incoming, &namespaces, &[existing]).await.unwrap();
        assert!(!decision.allowed);
        assert!(decision.reason.unwrap().contains("multiple cluster quotas"));
    }

    #[tokio::test]
    async fn new_quota_with_disjoint_selector_is_allowed() {
        let existing = quota("quota-existing", &[("env", "prod")]);
        let incoming = quota("quota-new", &[("tier", "backend")]);
        let namespaces = [namespace("svc-1", &[("env", "prod")]), namespace("svc-2", &[("tier", "backend")])];
        let decision = validate(&incoming, &namespaces, &[existing]).await.unwrap();
        assert!(decision.allowed);
    }

    #[tokio::test]
    async fn update_of_its_own_quota_is_not_treated_as_a_conflict_with_itself() {
        let mine = quota("quota-a", &[("env", "prod")]);
        let namespaces = [namespace("svc-1", &[("env", "prod")])];
        let decision = validate(&mine, &namespaces, &[mine.clone()]).await.unwrap();
        assert!(decision.allowed);
    }

    #[tokio::test]
    async fn overlap_via_status_owned_namespace_is_denied_even_without_selector_overlap() {
        let mut existing = quota("quota-existing", &[("unrelated", "label")]);
        existing.status = Some(ClusterQuotaStatus {
            namespaces: vec![NamespaceUsage { namespace: "svc-1".to_owned(), used: Default::default() }],
            ..Default::default()
        });
        let incoming = quota("quota-new", &[("env", "prod")]);
        let namespaces = [namespace("svc-1", &[("env", "prod")])];
        let decision = validate(&incoming, &namespaces, &[existing]).await.unwrap();
        assert!(!decision.allowed);
    }
}
