use fleetquota_types::ClusterQuota;
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::runtime::reflector::ObjectRef;
use kube::Client;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

use super::MANAGER_NAME;

const INITIAL_INTERVAL: Duration = Duration::from_secs(30);
const MAX_INTERVAL: Duration = Duration::from_secs(15 * 60);
const DEFAULT_EVICTION_AGE: Duration = Duration::from_secs(60 * 60);
const DEFAULT_MAX_ENTRIES: usize = 1000;

/// Tracks the next-allowed-emission time for a single `(quota, resource)`
/// pair, doubling its interval every time it actually fires.
struct Entry {
    next_allowed: Instant,
    interval: Duration,
    last_touched: Instant,
}

/// Suppresses repeated identical `QuotaExceeded` events. Keyed by the
/// owning quota name and the resource identifier that tripped over hard.
///
/// Holders of the inner lock must never suspend while holding it —
/// `should_emit` is a plain synchronous critical section.
pub struct Backoff {
    table: Mutex<HashMap<(String, String), Entry>>,
    eviction_age: Duration,
    max_entries: usize,
}

impl Backoff {
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_EVICTION_AGE, DEFAULT_MAX_ENTRIES)
    }

    pub fn with_limits(eviction_age: Duration, max_entries: usize) -> Self {
        Self { table: Mutex::new(HashMap::new()), eviction_age, max_entries }
    }

    /// Returns `true` if a `QuotaExceeded` event for this `(quota,
    /// resource)` pair should actually be emitted now.
    pub fn should_emit(&self, quota: &str, resource: &str) -> bool {
        let now = Instant::now();
        let mut table = self.table.lock();
        table.retain(|_, e| now.duration_since(e.last_touched) < self.eviction_age);

        let key = (quota.to_string(), resource.to_string());
        match table.get_mut(&key) {
            None => {
                if table.iter().filter(|((q, _), _)| q == quota).count() >= self.max_entries {
                    // Per-quota tracker cap reached; drop the oldest entry for
                    // this quota to make room rather than grow unbounded.
                    if let Some(oldest) = table
                        .iter()
                        .filter(|((q, _), _)| q == quota)
                        .min_by_key(|(_, e)| e.last_touched)
                        .map(|(k, _)| k.clone())
                    {
                        table.remove(&oldest);
                    }
                }
                table.insert(
                    key,
                    Entry { next_allowed: now + INITIAL_INTERVAL, interval: INITIAL_INTERVAL, last_touched: now },
                );
                true
            }
            Some(entry) => {
                if now < entry.next_allowed {
                    return false;
                }
                entry.interval = (entry.interval * 2).min(MAX_INTERVAL);
                entry.next_allowed = now + entry.interval;
                entry.last_touched = now;
                true
            }
        }
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new()
    }
}

/// Wraps the platform event sink (`kube::runtime::events::Recorder`) and
/// applies the back-off policy to `QuotaExceeded` events only; the other
/// reasons (`NamespaceAdded`, `NamespaceRemoved`, `CalculationFailed`,
/// `InvalidSelector`) are always emitted.
pub struct EventRecorder {
    recorder: Recorder,
    backoff: Backoff,
}

impl EventRecorder {
    pub fn new(client: Client) -> Self {
        let reporter = Reporter::from(MANAGER_NAME.to_owned());
        Self { recorder: Recorder::new(client, reporter), backoff: Backoff::new() }
    }

    pub fn with_backoff_limits(client: Client, eviction_age: Duration, max_entries_per_quota: usize) -> Self {
        let reporter = Reporter::from(MANAGER_NAME.to_owned());
        Self { recorder: Recorder::new(client, reporter), backoff: Backoff::with_limits(eviction_age, max_entries_per_quota) }
    }

    pub async fn namespace_added(&self, quota: &ClusterQuota, namespace: &str) -> Result<(), kube::Error> {
        self.publish(
            quota,
            EventType::Normal,
            "NamespaceAdded",
            format!("namespace {namespace} now selected by this quota"),
        )
        .await
    }

    pub async fn namespace_removed(&self, quota: &ClusterQuota, namespace: &str) -> Result<(), kube::Error> {
        self.publish(
            quota,
            EventType::Normal,
            "NamespaceRemoved",
            format!("namespace {namespace} no longer selected by this quota"),
        )
        .await
    }

    pub async fn quota_exceeded(
        &self,
        quota: &ClusterQuota,
        resource: &str,
        used: &str,
        hard: &str,
    ) -> Result<(), kube::Error> {
        let name = quota.metadata.name.as_deref().unwrap_or_default();
        if !self.backoff.should_emit(name, resource) {
            return Ok(());
        }
        self.publish(
            quota,
            EventType::Warning,
            "QuotaExceeded",
            format!("{resource}: used {used} exceeds hard {hard}"),
        )
        .await
    }

    pub async fn calculation_failed(&self, quota: &ClusterQuota, namespace: &str, resource: &str, reason: &str) -> Result<(), kube::Error> {
        self.publish(
            quota,
            EventType::Warning,
            "CalculationFailed",
            format!("{namespace}/{resource}: {reason}"),
        )
        .await
    }

    pub async fn invalid_selector(&self, quota: &ClusterQuota, reason: &str) -> Result<(), kube::Error> {
        self.publish(quota, EventType::Warning, "InvalidSelector", reason.to_owned()).await
    }

    /// Reports that `quota`'s namespace selector overlaps with one or more
    /// other quotas also matching the same namespace. Emitted once per
    /// conflicting quota, so every party to the ambiguity gets an event.
    pub async fn ownership_conflict(&self, quota: &ClusterQuota, conflicting_with: &[String]) -> Result<(), kube::Error> {
        self.publish(
            quota,
            EventType::Warning,
            "OwnershipConflict",
            format!("namespace selector overlaps with: {}", conflicting_with.join(", ")),
        )
        .await
    }

    async fn publish(
        &self,
        quota: &ClusterQuota,
        type_: EventType,
        reason: &str,
        note: String,
    ) -> Result<(), kube::Error> {
        let reference = ObjectRef::from_obj(quota).into();
        self.recorder
            .publish(
                &Event {
                    type_,
                    reason: reason.to_owned(),
                    note: Some(note),
                    action: reason.to_owned(),
                    secondary: None,
                },
                &reference,
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_emission_always_allowed() {
        let backoff = Backoff::new();
        assert!(backoff.should_emit("q1", "requests.cpu"));
    }

    #[test]
    fn suppresses_within_interval() {
        let backoff = Backoff::new();
        assert!(backoff.should_emit("q1", "requests.cpu"));
        assert!(!backoff.should_emit("q1", "requests.cpu"));
    }

    #[test]
    fn distinct_resources_tracked_independently() {
        let backoff = Backoff::new();
        assert!(backoff.should_emit("q1", "requests.cpu"));
        assert!(backoff.should_emit("q1", "requests.memory"));
    }

    #[test]
    fn distinct_quotas_tracked_independently() {
        let backoff = Backoff::new();
        assert!(backoff.should_emit("q1", "requests.cpu"));
        assert!(backoff.should_emit("q2", "requests.cpu"));
    }
}
