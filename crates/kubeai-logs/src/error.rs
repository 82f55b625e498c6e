use thiserror::Error;

use kubeai_types::{ResourceKind, UnsupportedKind};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Failures while resolving a workload or reading its logs
#[derive(Debug, Error)]
pub enum CollectError {
    #[error("unsupported resource kind: {0} (expected pod, deployment or statefulset)")]
    UnsupportedResourceKind(String),

    #[error("{kind} '{name}' not found in namespace '{namespace}': {reason}")]
    NotFound {
        kind: ResourceKind,
        name: String,
        namespace: String,
        reason: String,
    },

    #[error("failed to resolve pods for {kind} '{name}' in namespace '{namespace}'")]
    Resolution {
        kind: ResourceKind,
        name: String,
        namespace: String,
        #[source]
        source: BoxError,
    },

    #[error("failed to read logs from pod '{pod}' in namespace '{namespace}'")]
    Transport {
        pod: String,
        namespace: String,
        #[source]
        source: BoxError,
    },

    #[error(
        "log output from pod '{pod}' in namespace '{namespace}' exceeded {limit} lines, narrow it with a tail or since limit"
    )]
    LogVolumeExceeded {
        pod: String,
        namespace: String,
        limit: usize,
    },

    #[error("no logs found for {kind} '{name}' in namespace '{namespace}'")]
    NoLogsFound {
        kind: ResourceKind,
        name: String,
        namespace: String,
    },
}

impl CollectError {
    pub fn transport(pod: &str, namespace: &str, source: impl Into<BoxError>) -> Self {
        Self::Transport {
            pod: pod.to_string(),
            namespace: namespace.to_string(),
            source: source.into(),
        }
    }
}

impl From<UnsupportedKind> for CollectError {
    fn from(err: UnsupportedKind) -> Self {
        Self::UnsupportedResourceKind(err.0)
    }
}
