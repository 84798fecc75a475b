use super::workload::Decision;
use crate::clusterquota::{classifier, namespace_calc::NamespaceUsageCalculator, quantity, quota_client::QuotaClient, usage};
use crate::util::Error;
use fleetquota_types::ClusterQuota;
use k8s_openapi::api::core::v1::PersistentVolumeClaim;
use std::collections::BTreeMap;

/// Analogous to the workload validators, using the storage variant of
/// the usage functions; covers `requests.storage` as well as the
/// per-storage-class size and count limits.
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

fn claim_contributions(claim: &PersistentVolumeClaim, quota: &ClusterQuota) -> BTreeMap<String, quantity::Amount> {
    quota
        .spec
        .hard
        .keys()
        .map(|resource| {
            let category = classifier::classify(resource);
            (resource.clone(), usage::claim_contribution(claim, &category))
        })
        .collect()
}

pub async fn validate_create(
    calculator: &NamespaceUsageCalculator,
    quota_client: &QuotaClient,
    namespace: &str,
    namespace_labels: &BTreeMap<String, String>,
    claim: &PersistentVolumeClaim,
) -> Result<Decision, Error> {
    let Some(quota) = quota_client.find_owner(namespace_labels).await? else {
        return Ok(Decision::allow());
    };
    let contributions = claim_contributions(claim, &quota);
    check_against_quota(calculator, namespace, &quota, &contributions).await
}

pub async fn validate_update(
    calculator: &NamespaceUsageCalculator,
    quota_client: &QuotaClient,
    namespace: &str,
    namespace_labels: &BTreeMap<String, String>,
    old: &PersistentVolumeClaim,
    new: &PersistentVolumeClaim,
) -> Result<Decision, Error> {
    if old.spec == new.spec {
        return Ok(Decision::allow());
    }
    let Some(quota) = quota_client.find_owner(namespace_labels).await? else {
        return Ok(Decision::allow());
    };
    let old_contrib = claim_contributions(old, &quota);
    let new_contrib = claim_contributions(new, &quota);
    let mut deltas = BTreeMap::new();
    for (resource, new_amount) in &new_contrib {
        let old_amount = old_contrib.get(resource).cloned().unwrap_or_else(quantity::Amount::zero);
        deltas.insert(resource.clone(), new_amount.sub(&old_amount));
    }
    check_against_quota(calculator, namespace, &quota, &deltas).await
}
