//! Error types for the challenge operator

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Kubernetes API error (reads and writes)
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    /// A cluster read failed for reasons other than "not found"
    #[error("failed to read {kind} {namespace}/{name}: {source}")]
    ClusterReadFailure {
        kind: &'static str,
        namespace: String,
        name: String,
        #[source]
        source: kube::Error,
    },

    /// A cluster mutation (create, update, or delete) failed
    #[error("failed to {verb} {kind} {namespace}/{name}: {source}")]
    ClusterWriteFailure {
        verb: &'static str,
        kind: &'static str,
        namespace: String,
        name: String,
        #[source]
        source: kube::Error,
    },

    /// Two port mappings claim the same external port with different targets
    #[error("conflicting port mapping {external_port}->{existing_target} and {external_port}->{new_target}")]
    ConflictingPortMapping {
        external_port: i32,
        existing_target: i32,
        new_target: i32,
    },

    /// More than one HTTPS port in a single challenge
    #[error("only one HTTPS port is supported")]
    MultipleHttpsPorts,

    /// The pod template has no "challenge" container to attach probes to
    #[error("challenge {0} has no container named \"challenge\"")]
    MissingChallengeContainer(String),

    /// Operator misconfiguration (missing CRD, bad startup state)
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl Error {
    /// Cluster I/O failures are transient; spec errors need a user fix
    /// and get the long requeue.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            Error::KubeError(_)
                | Error::ClusterReadFailure { .. }
                | Error::ClusterWriteFailure { .. }
        )
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
