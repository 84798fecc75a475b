use super::classifier::Category;
use super::quantity::{self, Amount};
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Pod};

/// A workload is terminal iff its phase is `Succeeded` or `Failed`; such
/// workloads never contribute to usage regardless of what their spec
/// still asks for.
pub fn is_pod_terminal(pod: &Pod) -> bool {
    matches!(pod.status.as_ref().and_then(|s| s.phase.as_deref()), Some("Succeeded") | Some("Failed"))
}

enum Field {
    Requests,
    Limits,
}

/// Resolves a resource identifier plus its classifier category into the
/// container-spec field (requests/limits) and the key within it, for the
/// categories that are computed per-container.
fn container_field(resource: &str, category: &Category) -> Option<(Field, &str)> {
    match category {
        Category::ComputeAggregate => {
            if let Some(key) = resource.strip_prefix("requests.") {
                Some((Field::Requests, key))
            } else {
                resource.strip_prefix("limits.").map(|key| (Field::Limits, key))
            }
        }
        Category::ExtendedDevice => Some((Field::Requests, resource)),
        _ => None,
    }
}

/// A containerized workload's contribution to a tracked resource.
///
/// Sums the named field over non-terminated regular containers. Init
/// containers do not accumulate into the sum; per platform convention
/// their maximum is taken as a lower bound, since only one init
/// container runs at a time.
pub fn pod_contribution(pod: &Pod, resource: &str, category: &Category) -> Amount {
    if is_pod_terminal(pod) {
        return Amount::zero();
    }
    let Some((field, key)) = container_field(resource, category) else {
        return Amount::zero();
    };
    let Some(spec) = &pod.spec else {
        return Amount::zero();
    };

    let mut total = Amount::zero();
    for container in &spec.containers {
        if let Some(amount) = container_amount(&field, key, container) {
            total = total.add(&amount);
        }
    }

    let init_floor = spec
        .init_containers
        .iter()
        .flatten()
        .filter_map(|c| container_amount(&field, key, c))
        .fold(Amount::zero(), |acc, a| if a.gt(&acc) { a } else { acc });

    if init_floor.gt(&total) { init_floor } else { total }
}

fn container_amount(field: &Field, key: &str, container: &k8s_openapi::api::core::v1::Container) -> Option<Amount> {
    let resources = container.resources.as_ref()?;
    let map = match field {
        Field::Requests => resources.requests.as_ref()?,
        Field::Limits => resources.limits.as_ref()?,
    };
    let qty = map.get(key)?;
    let amount = quantity::parse(qty).ok()?;
    if amount.is_zero() { None } else { Some(amount) }
}

fn claim_storage_class(claim: &PersistentVolumeClaim) -> String {
    claim.spec.as_ref().and_then(|s| s.storage_class_name.clone()).unwrap_or_default()
}

fn claim_requests_storage(claim: &PersistentVolumeClaim) -> Amount {
    claim
        .spec
        .as_ref()
        .and_then(|s| s.resources.as_ref())
        .and_then(|r| r.requests.as_ref())
        .and_then(|r| r.get("storage"))
        .and_then(|q| quantity::parse(q).ok())
        .unwrap_or_else(Amount::zero)
}

/// A storage claim's contribution to a tracked resource. `requests.storage`
/// counts every claim; the storage-class-scoped variants count only
/// claims whose class matches (an unset class name matches the empty
/// string, i.e. the platform's default-class bucket).
pub fn claim_contribution(claim: &PersistentVolumeClaim, category: &Category) -> Amount {
    match category {
        Category::StorageAggregate => claim_requests_storage(claim),
        Category::StorageClassScopedSize(class) => {
            if &claim_storage_class(claim) == class { claim_requests_storage(claim) } else { Amount::zero() }
        }
        Category::StorageClassScopedCount(class) => {
            if &claim_storage_class(claim) == class {
                Amount { value: num_rational::BigRational::from_integer(1.into()), format: quantity::Format::DecimalSI }
            } else {
                Amount::zero()
            }
        }
        _ => Amount::zero(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{Container, PersistentVolumeClaimSpec, PodSpec, PodStatus, ResourceRequirements};
    use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
    use std::collections::BTreeMap;

    fn pod_with(phase: Option<&str>, cpu_request: Option<&str>) -> Pod {
        let mut requests = BTreeMap::new();
        if let Some(cpu) = cpu_request {
            requests.insert("cpu".to_owned(), Quantity(cpu.to_owned()));
        }
        Pod {
            spec: Some(PodSpec {
                containers: vec![Container {
                    name: "main".into(),
                    resources: Some(ResourceRequirements { requests: Some(requests), ..Default::default() }),
                    ..Default::default()
                }],
                ..Default::default()
            }),
            status: phase.map(|p| PodStatus { phase: Some(p.to_owned()), ..Default::default() }),
            ..Default::default()
        }
    }

    #[test]
    fn terminal_pod_contributes_zero() {
        let pod = pod_with(Some("Succeeded"), Some("4"));
        assert!(pod_contribution(&pod, "requests.cpu", &Category::ComputeAggregate).is_zero());
    }

    #[test]
    fn running_pod_sums_container_requests() {
        let pod = pod_with(Some("Running"), Some("1.5"));
        let amount = pod_contribution(&pod, "requests.cpu", &Category::ComputeAggregate);
        assert_eq!(amount.value, num_rational::BigRational::new(3.into(), 2.into()));
    }

    #[test]
    fn claim_matches_default_class_when_unset() {
        let claim = PersistentVolumeClaim {
            spec: Some(PersistentVolumeClaimSpec { storage_class_name: None, ..Default::default() }),
            ..Default::default()
        };
        let contribution = claim_contribution(&claim, &Category::StorageClassScopedCount("".to_owned()));
        assert!(contribution.is_positive());
    }

    #[test]
    fn claim_storage_class_mismatch_contributes_zero() {
        let claim = PersistentVolumeClaim {
            spec: Some(PersistentVolumeClaimSpec { storage_class_name: Some("fast".to_owned()), ..Default::default() }),
            ..Default::default()
        };
        let contribution = claim_contribution(&claim, &Category::StorageClassScopedSize("slow".to_owned()));
        assert!(contribution.is_zero());
    }

    fn claim_on_class(class: &str, requested: &str) -> PersistentVolumeClaim {
        let mut requests = BTreeMap::new();
        requests.insert("storage".to_owned(), Quantity(requested.to_owned()));
        PersistentVolumeClaim {
            spec: Some(PersistentVolumeClaimSpec {
                storage_class_name: Some(class.to_owned()),
                resources: Some(k8s_openapi::api::core::v1::VolumeResourceRequirements { requests: Some(requests), ..Default::default() }),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn per_storage_class_limit_blocks_only_once_existing_usage_plus_request_exceeds_hard() {
        use crate::clusterquota::classifier::{self, Category};
        let category = classifier::classify("fast.storageclass.storage.k8s.io/requests.storage");
        assert_eq!(category, Category::StorageClassScopedSize("fast".to_owned()));

        let existing = claim_on_class("fast", "4Gi");
        let existing_total = claim_contribution(&existing, &category);

        let hard = quantity::parse(&Quantity("5Gi".to_owned())).unwrap();

        let too_much = claim_on_class("fast", "2Gi");
        let would_be_total = existing_total.add(&claim_contribution(&too_much, &category));
        assert!(would_be_total.gt(&hard));

        let fits = claim_on_class("fast", "1Gi");
        let would_be_total = existing_total.add(&claim_contribution(&fits, &category));
        assert!(!would_be_total.gt(&hard));
    }
}
