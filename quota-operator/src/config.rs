use clap::Parser;

/// Process-wide configuration, read once at startup.
#[derive(Parser, Debug, Clone)]
pub struct Config {
    /// Namespace excluded unconditionally from every quota's selected set.
    #[arg(long, env = "OWN_NAMESPACE", default_value = "fleetquota-system")]
    pub own_namespace: String,

    /// Comma-delimited list of additional namespace names to exclude unconditionally.
    #[arg(long, env = "EXCLUDED_NAMESPACES", value_delimiter = ',', default_value = "kube-system,kube-public,kube-node-lease")]
    pub excluded_namespaces: Vec<String>,

    /// A namespace carrying this label key is excluded regardless of selector match.
    #[arg(long, env = "EXCLUDE_NAMESPACE_LABEL_KEY")]
    pub exclude_namespace_label_key: Option<String>,

    /// Cooperate with leader election; only the leader drives reconciliation.
    #[arg(long, env = "ENABLE_LEADER_ELECTION", default_value_t = true)]
    pub enable_leader_election: bool,

    /// Eviction window for the event back-off tracker.
    #[arg(long, env = "EVENT_CLEANUP_TTL", default_value = "1h")]
    pub event_cleanup_ttl: String,

    /// Cap on in-memory back-off tracker entries per quota.
    #[arg(long, env = "EVENT_CLEANUP_MAX_PER_QUOTA", default_value_t = 1000)]
    pub event_cleanup_max_per_quota: usize,

    /// Port the admission webhook's TLS listener binds.
    #[arg(long, env = "WEBHOOK_PORT", default_value_t = 8443)]
    pub webhook_port: u16,

    /// Path to the webhook's TLS certificate (PEM).
    #[arg(long, env = "WEBHOOK_CERT_PATH", default_value = "/etc/fleetquota/tls/tls.crt")]
    pub webhook_cert_path: String,

    /// Path to the webhook's TLS private key (PEM).
    #[arg(long, env = "WEBHOOK_KEY_PATH", default_value = "/etc/fleetquota/tls/tls.key")]
    pub webhook_key_path: String,

    /// Port the Prometheus `/metrics` endpoint binds.
    #[arg(long, env = "METRICS_PORT", default_value_t = 9090)]
    pub metrics_port: u16,
}

impl Config {
    pub fn event_cleanup_ttl(&self) -> Result<std::time::Duration, crate::util::Error> {
        Ok(parse_duration::parse(&self.event_cleanup_ttl)?)
    }
}
