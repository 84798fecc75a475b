use super::usage::is_pod_terminal;
use k8s_openapi::api::core::v1::{Namespace, PersistentVolumeClaim, Pod};
use kube::Resource;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Fingerprint functions for use with `kube::runtime::WatchStreamExt::predicate_filter`.
///
/// A predicate_filter only enqueues a reconcile when the fingerprint
/// differs from the last one observed for that object, which is how the
/// generation-only filter (`kube::runtime::predicates::generation`)
/// avoids loops against the controller's own status writes. These add
/// the extra bits the generic generation predicate can't see: a pod's
/// terminal-state transition, and a namespace's label set (which can
/// change without bumping `metadata.generation`).
fn combine(generation: Option<i64>, extra: impl Hash) -> u64 {
    let mut hasher = DefaultHasher::new();
    generation.hash(&mut hasher);
    extra.hash(&mut hasher);
    hasher.finish()
}

pub fn pod_fingerprint(pod: &Pod) -> Option<u64> {
    Some(combine(pod.meta().generation, is_pod_terminal(pod)))
}

pub fn claim_fingerprint(claim: &PersistentVolumeClaim) -> Option<u64> {
    Some(combine(claim.meta().generation, ()))
}

pub fn namespace_fingerprint(ns: &Namespace) -> Option<u64> {
    let mut labels: Vec<(&String, &String)> = ns.meta().labels.iter().flatten().collect();
    labels.sort();
    Some(combine(ns.meta().generation, labels))
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{NamespaceSpec, PodSpec, PodStatus};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn pod(generation: Option<i64>, phase: Option<&str>) -> Pod {
        Pod {
            metadata: ObjectMeta { generation, ..Default::default() },
            spec: Some(PodSpec::default()),
            status: phase.map(|p| PodStatus { phase: Some(p.to_owned()), ..Default::default() }),
        }
    }

    fn namespace(generation: Option<i64>, labels: &[(&str, &str)]) -> Namespace {
        Namespace {
            metadata: ObjectMeta {
                generation,
                labels: Some(labels.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()),
                ..Default::default()
            },
            spec: Some(NamespaceSpec::default()),
            status: None,
        }
    }

    #[test]
    fn status_only_pod_update_has_same_fingerprint() {
        let before = pod(Some(1), Some("Running"));
        let after = pod(Some(1), Some("Running"));
        assert_eq!(pod_fingerprint(&before), pod_fingerprint(&after));
    }

    #[test]
    fn terminal_transition_changes_fingerprint() {
        let before = pod(Some(1), Some("Running"));
        let after = pod(Some(1), Some("Succeeded"));
        assert_ne!(pod_fingerprint(&before), pod_fingerprint(&after));
    }

    #[test]
    fn generation_bump_changes_fingerprint() {
        let before = pod(Some(1), Some("Running"));
        let after = pod(Some(2), Some("Running"));
        assert_ne!(pod_fingerprint(&before), pod_fingerprint(&after));
    }

    #[test]
    fn namespace_relabel_changes_fingerprint_without_generation_bump() {
        let before = namespace(Some(1), &[("team", "alpha")]);
        let after = namespace(Some(1), &[("team", "beta")]);
        assert_ne!(namespace_fingerprint(&before), namespace_fingerprint(&after));
    }
}
