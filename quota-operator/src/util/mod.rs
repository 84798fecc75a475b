use std::time::Duration;

pub mod patch;
pub mod recorder;

pub(crate) mod colors;

mod error;

pub use error::*;

/// The default interval for requeuing a managed `ClusterQuota`.
pub(crate) const PROBE_INTERVAL: Duration = Duration::from_secs(30);

/// Name of the kubernetes resource manager, used as the field-manager for
/// server-side apply and as the event-reporter's controller name.
pub(crate) const MANAGER_NAME: &str = "fleetquota-operator";
