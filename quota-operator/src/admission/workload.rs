use crate::clusterquota::{namespace_calc::NamespaceUsageCalculator, quantity, quota_client::QuotaClient, usage};
use crate::util::Error;
use fleetquota_types::ClusterQuota;
use k8s_openapi::api::core::v1::Pod;
use std::collections::BTreeMap;

/// The outcome of an admission check: either allowed, or denied with a
/// human-readable message naming the offending resource.
pub struct Decision {
    pub allowed: bool,
    pub reason: Option<String>,
}

impl Decision {
    pub fn allow() -> Self {
        Decision { allowed: true, reason: None }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Decision { allowed: false, reason: Some(reason.into()) }
    }
}

/// Checks each resource contribution (full contribution on create, the
/// non-negative delta on update) against the owning quota's live usage.
/// Shared by workload create/update and the storage-claim validators.
async fn check_against_quota(
    calculator: &NamespaceUsageCalculator,
    namespace: &str,
    quota: &ClusterQuota,
    contributions: &BTreeMap<String, quantity::Amount>,
) -> Result<Decision, Error> {
    for (resource, contribution) in contributions {
        if !contribution.is_positive() {
            continue;
        }
        let Some(hard_qty) = quota.spec.hard.get(resource) else { continue };
        let hard = quantity::parse(hard_qty)?;
        if hard.is_zero() {
            continue;
        }
        let current = calculator.usage(namespace, resource).await?;
        let new_total = current.add(contribution);
        if new_total.gt(&hard) {
            return Ok(Decision::deny(format!(
                "{resource}: current usage {} plus requested {} would exceed hard limit {}",
                quantity::format(&current).0,
                quantity::format(contribution).0,
                hard_qty.0,
            )));
        }
    }
    Ok(Decision::allow())
}

pub async fn validate_create(
    calculator: &NamespaceUsageCalculator,
    quota_client: &QuotaClient,
    namespace: &str,
    namespace_labels: &BTreeMap<String, String>,
    pod: &Pod,
) -> Result<Decision, Error> {
    if usage::is_pod_terminal(pod) {
        return Ok(Decision::allow());
    }
    let Some(quota) = quota_client.find_owner(namespace_labels).await? else {
        return Ok(Decision::allow());
    };
    let contributions = pod_contributions(pod, &quota);
    check_against_quota(calculator, namespace, &quota, &contributions).await
}

pub async fn validate_update(
    calculator: &NamespaceUsageCalculator,
    quota_client: &QuotaClient,
    namespace: &str,
    namespace_labels: &BTreeMap<String, String>,
    old: &Pod,
    new: &Pod,
) -> Result<Decision, Error> {
    if old.spec == new.spec {
        return Ok(Decision::allow());
    }
    let Some(quota) = quota_client.find_owner(namespace_labels).await? else {
        return Ok(Decision::allow());
    };
    let old_contrib = pod_contributions(old, &quota);
    let new_contrib = pod_contributions(new, &quota);
    let mut deltas = BTreeMap::new();
    for (resource, new_amount) in &new_contrib {
        let old_amount = old_contrib.get(resource).cloned().unwrap_or_else(quantity::Amount::zero);
        deltas.insert(resource.clone(), new_amount.sub(&old_amount));
    }
    check_against_quota(calculator, namespace, &quota, &deltas).await
}

fn pod_contributions(pod: &Pod, quota: &ClusterQuota) -> BTreeMap<String, quantity::Amount> {
    quota
        .spec
        .hard
        .keys()
        .map(|resource| {
            let category = crate::clusterquota::classifier::classify(resource);
            (resource.clone(), usage::pod_contribution(pod, resource, &category))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_workload_contributes_zero_for_every_tracked_resource() {
        use k8s_openapi::api::core::v1::PodStatus;
        let pod = Pod { status: Some(PodStatus { phase: Some("Succeeded".to_owned()), ..Default::default() }), ..Default::default() };
        let mut quota = ClusterQuota::new("q1", Default::default());
        quota.spec.hard.insert("requests.cpu".to_owned(), k8s_openapi::apimachinery::pkg::api::resource::Quantity("1".to_owned()));
        let contributions = pod_contributions(&pod, &quota);
        assert!(contributions.get("requests.cpu").unwrap().is_zero());
    }
}
