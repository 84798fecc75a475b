pub mod metrics;
pub mod shutdown;

/// Writes the readiness file the platform's startup probe polls for.
/// The probe itself is an external collaborator; this just leaves the
/// minimal signal a probe script can watch for.
pub fn signal_ready() {
    std::fs::write("/tmp/fleetquota-ready", "ready").expect("failed to write readiness file");
}

/// Installs the process-wide rustls crypto provider.
///
/// Needed once, before any TLS listener (the admission webhook server) or
/// TLS client is constructed. Certificate acquisition/rotation happens
/// outside this process; this only wires the crypto backend.
pub fn install_rustls_provider() {
    rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .expect("install aws-lc-rs provider");
}

pub fn init() {
    let disable_colors = ["1", "true"].contains(
        &std::env::var("DISABLE_COLORS")
            .unwrap_or_else(|_| String::new())
            .to_lowercase()
            .as_str(),
    );
    owo_colors::set_override(!disable_colors);
    install_rustls_provider();
}

pub mod response {
    use std::fmt::{Debug, Display};

    use owo_colors::OwoColorize;

    pub fn print_error<T: Display + Debug>(e: T) {
        eprintln!(
            "❌ {}",
            format!("{:?}", e)
                .split('\n')
                .map(|s| s.red().to_string())
                .collect::<Vec<_>>()
                .join("\n"),
        );
    }

    pub fn print_warning<T: Display + Debug>(e: T) {
        eprintln!(
            "⚠️ {}",
            format!("{:?}", e)
                .split('\n')
                .map(|s| s.yellow().to_string())
                .collect::<Vec<_>>()
                .join("\n"),
        );
    }
}
