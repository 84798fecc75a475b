use super::selector;
use crate::util::{Error, recorder::EventRecorder};
use fleetquota_types::ClusterQuota;
use kube::{Api, Client, Resource};

/// Thin wrapper over the platform API client for the ClusterQuota kind.
/// Owns its own event recorder so ambiguous-ownership conflicts can be
/// reported independently of whichever caller (reconciler or admission
/// handler) is asking for an owner.
pub struct QuotaClient {
    api: Api<ClusterQuota>,
    recorder: EventRecorder,
}

impl QuotaClient {
    pub fn new(client: Client) -> Self {
        Self { api: Api::all(client.clone()), recorder: EventRecorder::new(client) }
    }

    pub async fn list_all(&self) -> Result<Vec<ClusterQuota>, Error> {
        Ok(self.api.list(&Default::default()).await?.items)
    }

    /// Returns the quota whose selector matches the given namespace's
    /// labels. If more than one matches, the ambiguity is reported as an
    /// event on every conflicting quota, and the lexicographically
    /// smallest by name is returned — ownership enforcement happens
    /// preventatively at admission; this is a defensive fallback for the
    /// reconciler only.
    pub async fn find_owner(&self, namespace_labels: &std::collections::BTreeMap<String, String>) -> Result<Option<ClusterQuota>, Error> {
        let mut matching: Vec<ClusterQuota> = self
            .list_all()
            .await?
            .into_iter()
            .filter(|q| matches(namespace_labels, q))
            .collect();

        if matching.len() > 1 {
            let names: Vec<String> = matching.iter().filter_map(|q| q.meta().name.clone()).collect();
            for quota in &matching {
                let others: Vec<String> = names.iter().filter(|n| Some(*n) != quota.meta().name.as_ref()).cloned().collect();
                self.recorder.ownership_conflict(quota, &others).await?;
            }
        }

        matching.sort_by(|a, b| a.meta().name.cmp(&b.meta().name));
        Ok(matching.into_iter().next())
    }
}

pub fn matches(namespace_labels: &std::collections::BTreeMap<String, String>, quota: &ClusterQuota) -> bool {
    selector::matches(quota.spec.namespace_selector.as_ref(), namespace_labels)
}

/// Extracts the last-known selected-namespace set recorded in the
/// quota's status, used by the reconciler to diff against the freshly
/// computed set and emit `NamespaceAdded`/`NamespaceRemoved` events.
pub fn namespaces_from_status(quota: &ClusterQuota) -> Vec<String> {
    quota.status.as_ref().map(|s| s.namespaces.iter().map(|n| n.namespace.clone()).collect()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;

    fn quota_with_selector(name: &str, match_labels: &[(&str, &str)]) -> ClusterQuota {
        let mut q = ClusterQuota::new(name, Default::default());
        q.spec.namespace_selector = Some(LabelSelector {
            match_labels: Some(match_labels.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()),
            ..Default::default()
        });
        q
    }

    #[test]
    fn matches_delegates_to_selector() {
        let quota = quota_with_selector("q1", &[("team", "alpha")]);
        let labels = [("team".to_owned(), "alpha".to_owned())].into();
        assert!(matches(&labels, &quota));
    }

    #[test]
    fn namespaces_from_status_defaults_empty_without_status() {
        let quota = ClusterQuota::new("q1", Default::default());
        assert!(namespaces_from_status(&quota).is_empty());
    }
}
