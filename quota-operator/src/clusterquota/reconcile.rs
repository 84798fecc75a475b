use fleetquota_types::*;
use futures::stream::StreamExt;
use k8s_openapi::api::core::v1::{Namespace, PersistentVolumeClaim, Pod};
use k8s_openapi::{apimachinery::pkg::apis::meta::v1::{Condition, Time}, jiff::Timestamp};
use kube::{
    Api, Client, Resource, ResourceExt,
    runtime::{
        Controller, WatchStreamExt,
        controller::Action,
        reflector::{ObjectRef, Store},
        watcher,
    },
};
use kube_leader_election::{LeaseLock, LeaseLockParams, LeaseLockResult};
use owo_colors::OwoColorize;
use std::{collections::BTreeMap, sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;

use super::{predicate, quantity, quota_client, selector};
use crate::config::Config;
use crate::util::{
    Error, PROBE_INTERVAL,
    colors::{FG1, FG2},
    patch::patch_status,
    recorder::EventRecorder,
};

/// Entrypoint for the ClusterQuota controller. Runs leader-elected, the
/// same way as every other collaborator in this operator: only the
/// acquiring replica drives reconciliation, the rest stand by and retry
/// acquisition on a short tick.
pub async fn run(client: Client, config: Arc<Config>, shutdown: CancellationToken) -> Result<(), Error> {
    println!("{}", "starting ClusterQuota controller".green());

    let context = Arc::new(ContextData::new(client.clone(), config.clone()));
    let quota_api: Api<ClusterQuota> = Api::all(client.clone());

    let holder_id = std::env::var("POD_NAME")
        .or_else(|_| std::env::var("HOSTNAME"))
        .unwrap_or_else(|_| format!("fleetquota-operator-{}", uuid::Uuid::new_v4()));
    let lease_namespace = config.own_namespace.clone();
    let leadership = LeaseLock::new(
        client.clone(),
        &lease_namespace,
        LeaseLockParams { holder_id, lease_name: "fleetquota-operator-lock".to_owned(), lease_ttl: Duration::from_secs(15) },
    );

    if !config.enable_leader_election {
        println!("{}", "leader election disabled; running unconditionally".yellow());
        run_controller(quota_api, client, context).await;
        return Ok(());
    }

    let renew_every = Duration::from_secs(5);
    let mut controller_task: Option<tokio::task::JoinHandle<()>> = None;
    let mut tick = tokio::time::interval(renew_every);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                if let Some(task) = controller_task.take() {
                    task.abort();
                    task.await.ok();
                }
                return Ok(());
            }
            _ = tick.tick() => {}
        }
        let lease = match leadership.try_acquire_or_renew().await {
            Ok(l) => l,
            Err(e) => {
                eprintln!("leader election renew/acquire failed: {e}");
                if let Some(task) = controller_task.take() {
                    task.abort();
                }
                continue;
            }
        };
        if matches!(lease, LeaseLockResult::Acquired(_)) {
            if controller_task.is_none() {
                println!("{}", "acquired leadership; starting controller".green());
                let quota_api = quota_api.clone();
                let client = client.clone();
                let context = context.clone();
                controller_task = Some(tokio::spawn(async move {
                    run_controller(quota_api, client, context).await;
                }));
            }
        } else if let Some(task) = controller_task.take() {
            eprintln!("lost leadership; stopping controller");
            task.abort();
        }
    }
}

async fn run_controller(quota_api: Api<ClusterQuota>, client: Client, context: Arc<ContextData>) {
    let controller = Controller::new(quota_api, watcher::Config::default());
    let store = controller.store();

    let ns_store = store.clone();
    let pod_store = store.clone();
    let claim_store = store.clone();

    let namespace_watch = watcher(Api::<Namespace>::all(client.clone()), watcher::Config::default())
        .default_backoff()
        .applied_objects()
        .predicate_filter(predicate::namespace_fingerprint);
    let pod_watch = watcher(Api::<Pod>::all(client.clone()), watcher::Config::default())
        .default_backoff()
        .applied_objects()
        .predicate_filter(predicate::pod_fingerprint);
    let claim_watch = watcher(Api::<PersistentVolumeClaim>::all(client.clone()), watcher::Config::default())
        .default_backoff()
        .applied_objects()
        .predicate_filter(predicate::claim_fingerprint);

    controller
        .watches_stream(namespace_watch, move |ns| namespace_trigger(&ns, &ns_store))
        .watches_stream(pod_watch, move |pod| workload_trigger(&pod, &pod_store))
        .watches_stream(claim_watch, move |claim| workload_trigger(&claim, &claim_store))
        .run(reconcile, on_error, context)
        .for_each(|_res| async move {})
        .await;
}

/// True if `quota` either already lists `ns_name` in its last-persisted
/// status or its selector now matches `ns_labels`. The former catches a
/// namespace leaving a quota's selection (status still names it, the live
/// selector no longer matches); the latter catches one joining.
fn owns_or_would_select(quota: &ClusterQuota, ns_name: &str, ns_labels: &BTreeMap<String, String>) -> bool {
    quota_client::namespaces_from_status(quota).iter().any(|n| n == ns_name)
        || selector::matches(quota.spec.namespace_selector.as_ref(), ns_labels)
}

/// Namespace events trigger every quota that either already owns the
/// namespace (per its last-persisted status) or whose selector would now
/// match it — the former catches removals, the latter catches additions.
fn namespace_trigger(ns: &Namespace, store: &Store<ClusterQuota>) -> impl Iterator<Item = ObjectRef<ClusterQuota>> {
    let name = ns.name_any();
    let labels: BTreeMap<String, String> = ns.meta().labels.clone().unwrap_or_default();
    store
        .state()
        .into_iter()
        .filter(move |quota| owns_or_would_select(quota, &name, &labels))
        .map(|quota| ObjectRef::from_obj(&*quota))
        .collect::<Vec<_>>()
        .into_iter()
}

/// Pod/PVC events trigger the quota that owns their namespace, per the
/// last-persisted status — the reconciler's own cache of ownership.
fn workload_trigger<K: Resource>(obj: &K, store: &Store<ClusterQuota>) -> impl Iterator<Item = ObjectRef<ClusterQuota>> {
    let namespace = obj.meta().namespace.clone().unwrap_or_default();
    store
        .state()
        .into_iter()
        .filter(move |quota| quota_client::namespaces_from_status(quota).iter().any(|n| n == &namespace))
        .map(|quota| ObjectRef::from_obj(&*quota))
        .collect::<Vec<_>>()
        .into_iter()
}

struct ContextData {
    client: Client,
    config: Arc<Config>,
    recorder: EventRecorder,
}

impl ContextData {
    fn new(client: Client, config: Arc<Config>) -> Self {
        let eviction_age = config.event_cleanup_ttl().unwrap_or(Duration::from_secs(60 * 60));
        let recorder = EventRecorder::with_backoff_limits(client.clone(), eviction_age, config.event_cleanup_max_per_quota);
        ContextData { client, config, recorder }
    }
}

fn is_excluded(ns: &Namespace, config: &Config) -> bool {
    let name = ns.name_any();
    if name == config.own_namespace || config.excluded_namespaces.contains(&name) {
        return true;
    }
    if let Some(key) = &config.exclude_namespace_label_key {
        if ns.meta().labels.as_ref().is_some_and(|l| l.contains_key(key)) {
            return true;
        }
    }
    false
}

fn is_active(ns: &Namespace) -> bool {
    ns.status.as_ref().and_then(|s| s.phase.as_deref()).unwrap_or("Active") == "Active"
}

/// Inserts or updates the condition of the given `type_`, the way a
/// standard Kubernetes status conditions list is maintained.
fn set_condition(status: &mut ClusterQuotaStatus, type_: &str, is_true: bool, reason: &str, message: String) {
    let now = Time::from(Timestamp::now());
    let status_str = if is_true { "True" } else { "False" }.to_owned();
    if let Some(existing) = status.conditions.iter_mut().find(|c| c.type_ == type_) {
        if existing.status != status_str {
            existing.last_transition_time = now;
        }
        existing.status = status_str;
        existing.reason = reason.to_owned();
        existing.message = message;
    } else {
        status.conditions.push(Condition {
            type_: type_.to_owned(),
            status: status_str,
            reason: reason.to_owned(),
            message,
            last_transition_time: now,
            observed_generation: None,
        });
    }
}

async fn reconcile(quota: Arc<ClusterQuota>, context: Arc<ContextData>) -> Result<Action, Error> {
    let client = context.client.clone();
    let name = quota.name_any();

    if quota.meta().deletion_timestamp.is_some() {
        return Ok(Action::await_change());
    }

    let ns_selector = quota.spec.namespace_selector.as_ref();
    // Compiling the selector can't actually fail for a `LabelSelector`
    // (it's already structured data, not a string expression to parse),
    // but a future extension point (e.g. a custom expression language)
    // would fail here; the error path and the `InvalidSelector` event
    // exist so that path is already wired.
    let namespaces_api: Api<Namespace> = Api::all(client.clone());
    let all_namespaces = match namespaces_api.list(&Default::default()).await {
        Ok(list) => list,
        Err(e) => {
            let _ = patch_status(client.clone(), &*quota, |status: &mut ClusterQuotaStatus| {
                set_condition(status, "Ready", false, "ListNamespacesFailed", e.to_string());
            })
            .await;
            return Err(e.into());
        }
    };

    let mut selected: Vec<Namespace> = all_namespaces
        .items
        .into_iter()
        .filter(|ns| is_active(ns) && !is_excluded(ns, &context.config))
        .filter(|ns| selector::matches(ns_selector, &ns.meta().labels.clone().unwrap_or_default()))
        .collect();
    selected.sort_by(|a, b| a.name_any().cmp(&b.name_any()));

    let previous: Vec<String> = quota_client::namespaces_from_status(&quota);
    let current: Vec<String> = selected.iter().map(|ns| ns.name_any()).collect();

    for added in current.iter().filter(|n| !previous.contains(n)) {
        context.recorder.namespace_added(&quota, added).await?;
    }
    for removed in previous.iter().filter(|n| !current.contains(n)) {
        context.recorder.namespace_removed(&quota, removed).await?;
    }

    let calculator = super::namespace_calc::NamespaceUsageCalculator::new(client.clone());
    let resources: Vec<String> = quota.spec.hard.keys().cloned().collect();

    let mut namespace_usages = Vec::with_capacity(selected.len());
    let mut totals: BTreeMap<String, quantity::Amount> = BTreeMap::new();

    for ns in &selected {
        let ns_name = ns.name_any();
        let mut used = BTreeMap::new();
        for (resource, result) in calculator.total_usage(&ns_name, &resources).await {
            let amount = match result {
                Ok(amount) => amount,
                Err(e) => {
                    context.recorder.calculation_failed(&quota, &ns_name, &resource, &e.to_string()).await?;
                    quantity::Amount::zero()
                }
            };
            totals.entry(resource.clone()).and_modify(|t| *t = t.add(&amount)).or_insert_with(|| amount.clone());
            used.insert(resource, quantity::format(&amount));
        }
        namespace_usages.push(NamespaceUsage { namespace: ns_name, used });
    }

    for (resource, hard_qty) in &quota.spec.hard {
        let hard = quantity::parse(hard_qty)?;
        if hard.is_zero() {
            continue;
        }
        if let Some(used) = totals.get(resource) {
            if used.gt(&hard) {
                context
                    .recorder
                    .quota_exceeded(&quota, resource, &quantity::format(used).0, &hard_qty.0)
                    .await?;
            }
        }
    }

    let total_used: BTreeMap<String, k8s_openapi::apimachinery::pkg::api::resource::Quantity> =
        totals.iter().map(|(k, v)| (k.clone(), quantity::format(v))).collect();

    let fresh: ClusterQuota = Api::<ClusterQuota>::all(client.clone()).get(&name).await?;
    match patch_status(client, &fresh, |status: &mut ClusterQuotaStatus| {
        status.total = QuotaTotals { hard: quota.spec.hard.clone(), used: total_used };
        status.namespaces = namespace_usages;
        set_condition(status, "Ready", true, "ReconcileSucceeded", format!("{} namespaces selected", current.len()));
    })
    .await
    {
        Ok(_) => {}
        Err(kube::Error::Api(e)) if e.code == 409 => return Err(Error::Conflict(e.message)),
        Err(e) => return Err(e.into()),
    }

    println!("{}{}{}", name.color(FG2), " reconciled, ".color(FG1), format!("{} namespaces", current.len()).color(FG2));

    Ok(Action::requeue(PROBE_INTERVAL))
}

/// Requeue policy: a status-patch conflict retries immediately (the next
/// attempt just refetches and re-diffs), other retriable errors (API
/// failures, per-namespace calculation failures) get a short delay, and
/// errors needing a human to fix the object back off further.
fn requeue_delay_for(error: &Error) -> Duration {
    if matches!(error, Error::Conflict(_)) {
        return Duration::ZERO;
    }
    if error.is_retriable() {
        return Duration::from_secs(5);
    }
    Duration::from_secs(60)
}

fn on_error(quota: Arc<ClusterQuota>, error: &Error, _context: Arc<ContextData>) -> Action {
    eprintln!("{}", format!("reconcile error on {}: {error}", quota.name_any()).red());
    Action::requeue(requeue_delay_for(error))
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;

    fn quota_selecting(match_labels: &[(&str, &str)], previously_owned: &[&str]) -> ClusterQuota {
        let mut q = ClusterQuota::new("team-alpha-quota", Default::default());
        q.spec.namespace_selector = Some(LabelSelector {
            match_labels: Some(match_labels.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()),
            ..Default::default()
        });
        q.status = Some(ClusterQuotaStatus {
            namespaces: previously_owned
                .iter()
                .map(|n| NamespaceUsage { namespace: (*n).to_owned(), used: BTreeMap::new() })
                .collect(),
            ..Default::default()
        });
        q
    }

    #[test]
    fn set_condition_inserts_new_condition_type() {
        let mut status = ClusterQuotaStatus::default();
        set_condition(&mut status, "Ready", true, "ReconcileSucceeded", "3 namespaces selected".to_owned());
        assert_eq!(status.conditions.len(), 1);
        assert_eq!(status.conditions[0].status, "True");
        assert_eq!(status.conditions[0].reason, "ReconcileSucceeded");
    }

    #[test]
    fn set_condition_updates_existing_condition_in_place() {
        let mut status = ClusterQuotaStatus::default();
        set_condition(&mut status, "Ready", false, "ListNamespacesFailed", "boom".to_owned());
        set_condition(&mut status, "Ready", true, "ReconcileSucceeded", "ok".to_owned());
        assert_eq!(status.conditions.len(), 1);
        assert_eq!(status.conditions[0].status, "True");
        assert_eq!(status.conditions[0].reason, "ReconcileSucceeded");
    }

    #[test]
    fn requeue_delay_for_conflict_is_immediate() {
        assert_eq!(requeue_delay_for(&Error::Conflict("stale".to_owned())), Duration::ZERO);
    }

    #[test]
    fn requeue_delay_for_retriable_api_error_is_short() {
        let error = Error::CalculationFailed {
            namespace: "ns".to_owned(),
            resource: "requests.cpu".to_owned(),
            reason: "boom".to_owned(),
        };
        assert_eq!(requeue_delay_for(&error), Duration::from_secs(5));
    }

    #[test]
    fn requeue_delay_for_non_retriable_error_backs_off_further() {
        let error = Error::InvalidSelector("bad selector".to_owned());
        assert_eq!(requeue_delay_for(&error), Duration::from_secs(60));
    }

    #[test]
    fn relabeled_namespace_still_triggers_its_former_owner() {
        let quota = quota_selecting(&[("team", "alpha")], &["alpha-1", "alpha-3"]);
        let new_labels: BTreeMap<String, String> = [("team".to_owned(), "beta".to_owned())].into();
        assert!(owns_or_would_select(&quota, "alpha-3", &new_labels));
    }

    #[test]
    fn namespace_not_previously_owned_and_not_matching_does_not_trigger() {
        let quota = quota_selecting(&[("team", "alpha")], &["alpha-1"]);
        let labels: BTreeMap<String, String> = [("team".to_owned(), "beta".to_owned())].into();
        assert!(!owns_or_would_select(&quota, "beta-1", &labels));
    }

    #[test]
    fn newly_matching_namespace_triggers_even_without_prior_ownership() {
        let quota = quota_selecting(&[("team", "alpha")], &["alpha-1"]);
        let labels: BTreeMap<String, String> = [("team".to_owned(), "alpha".to_owned())].into();
        assert!(owns_or_would_select(&quota, "alpha-2", &labels));
    }
}
