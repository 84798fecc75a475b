/// The error taxonomy used throughout the reconciler and admission engine.
///
/// Classifies by kind, not by call site: `NotFound` is handled inline
/// (reconcile returns success, admission denies nothing) rather than
/// surfaced as a variant here; `QuotaExceeded` is the admission-denial
/// carrier, not an internal error, and lives in `crate::admission` instead.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Kubernetes reported error: {source}")]
    Kube {
        #[from]
        source: kube::Error,
    },

    #[error("invalid user input: {0}")]
    UserInput(String),

    /// `spec.namespaceSelector` could not be compiled into a matcher.
    #[error("invalid selector: {0}")]
    InvalidSelector(String),

    /// Usage could not be computed for one (namespace, resource) pair.
    /// Local to the reconciler; recorded as zero and logged, never
    /// propagated past the call site that caught it.
    #[error("calculation failed for {namespace}/{resource}: {reason}")]
    CalculationFailed {
        namespace: String,
        resource: String,
        reason: String,
    },

    /// Optimistic-concurrency failure on a status patch.
    #[error("status patch conflict: {0}")]
    Conflict(String),

    #[error("json error: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },

    #[error("parse duration: {source}")]
    ParseDuration {
        #[from]
        source: parse_duration::parse::Error,
    },
}

impl Error {
    /// `true` for errors the work-queue mechanism should requeue (transient
    /// API failures, optimistic-concurrency conflicts). `false` for errors
    /// that need a human to fix the object (bad selector, bad user input).
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            Error::Kube { .. } | Error::Conflict(_) | Error::CalculationFailed { .. }
        )
    }
}
