use super::workload::Decision;
use crate::clusterquota::selector;
use fleetquota_types::ClusterQuota;
use k8s_openapi::api::core::v1::Namespace;
use kube::ResourceExt;
use std::collections::BTreeMap;

/// Validates a namespace relabel: admits unconditionally if labels did
/// not change, otherwise denies if the new label set would be selected
/// by more than one cluster quota.
pub fn validate(old: &Namespace, new: &Namespace, all_quotas: &[ClusterQuota]) -> Decision {
    let old_labels = labels_of(old);
    let new_labels = labels_of(new);
    if old_labels == new_labels {
        return Decision::allow();
    }

    let selecting: Vec<&str> = all_quotas
        .iter()
        .filter(|q| selector::matches(q.spec.namespace_selector.as_ref(), &new_labels))
        .map(|q| q.meta().name.as_deref().unwrap_or_default())
        .collect();

    if selecting.len() > 1 {
        return Decision::deny(format!("namespace {} would be selected by multiple cluster quotas", new.name_any()));
    }
    Decision::allow()
}

fn labels_of(ns: &Namespace) -> BTreeMap<String, String> {
    ns.meta().labels.clone().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
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

    #[test]
    fn relabel_into_two_selectors_is_denied() {
        let quotas = [quota("quota-a", &[("env", "prod")]), quota("quota-b", &[("tier", "backend")])];
        let old = namespace("svc-1", &[("env", "stage")]);
        let new = namespace("svc-1", &[("env", "prod"), ("tier", "backend")]);
        let decision = validate(&old, &new, &quotas);
        assert!(!decision.allowed);
        assert!(decision.reason.unwrap().contains("multiple cluster quotas"));
    }

    #[test]
    fn relabel_into_single_selector_is_allowed() {
        let quotas = [quota("quota-a", &[("env", "prod")]), quota("quota-b", &[("tier", "backend")])];
        let old = namespace("svc-1", &[("env", "stage")]);
        let new = namespace("svc-1", &[("env", "prod")]);
        let decision = validate(&old, &new, &quotas);
        assert!(decision.allowed);
    }

    #[test]
    fn unchanged_labels_are_always_allowed() {
        let quotas = [quota("quota-a", &[("env", "prod")]), quota("quota-b", &[("env", "prod")])];
        let ns = namespace("svc-1", &[("env", "prod")]);
        let decision = validate(&ns, &ns, &quotas);
        assert!(decision.allowed);
    }
}
