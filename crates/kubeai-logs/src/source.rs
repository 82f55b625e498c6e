use async_trait::async_trait;
use futures::stream::BoxStream;
use kube::api::LogParams;
use tracing::debug;

use crate::error::CollectError;
use kubeai_k8s::KubeClient;
use kubeai_types::{PodInfo, ResourceKind, SourceRef};

/// Raw log bytes from one source, in arrival order
pub type LogByteStream = BoxStream<'static, std::io::Result<Vec<u8>>>;

/// Server-side options for a single log stream
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StreamOptions {
    pub previous: bool,
    pub since_seconds: Option<i64>,
    pub tail_lines: Option<i64>,
    pub follow: bool,
}

/// Where log bytes come from
#[async_trait]
pub trait LogSource: Send + Sync {
    /// Pods backing a workload. An empty list means the selector matched nothing;
    /// a missing workload is [`CollectError::NotFound`].
    async fn resolve_sources(
        &self,
        kind: ResourceKind,
        name: &str,
        namespace: &str,
    ) -> Result<Vec<SourceRef>, CollectError>;

    /// Open the log of one pod. An empty `source.container` selects the pod's
    /// default container.
    async fn open_log_stream(
        &self,
        source: &SourceRef,
        namespace: &str,
        options: &StreamOptions,
    ) -> Result<LogByteStream, CollectError>;
}

/// [`LogSource`] backed by the Kubernetes API
#[derive(Clone)]
pub struct KubeLogSource {
    client: KubeClient,
}

impl KubeLogSource {
    pub fn new(client: KubeClient) -> Self {
        Self { client }
    }

    fn log_params(source: &SourceRef, options: &StreamOptions) -> LogParams {
        LogParams {
            container: source.container_param(),
            follow: options.follow,
            previous: options.previous,
            since_seconds: options.since_seconds,
            tail_lines: options.tail_lines,
            // Lets the parser recover real timestamps for every line
            timestamps: true,
            ..Default::default()
        }
    }
}

#[async_trait]
impl LogSource for KubeLogSource {
    async fn resolve_sources(
        &self,
        kind: ResourceKind,
        name: &str,
        namespace: &str,
    ) -> Result<Vec<SourceRef>, CollectError> {
        if kind == ResourceKind::Pod {
            return Ok(vec![SourceRef::new(name, "")]);
        }

        let resolution_error = |source: anyhow::Error| CollectError::Resolution {
            kind,
            name: name.to_string(),
            namespace: namespace.to_string(),
            source: source.into(),
        };

        let selector = self
            .client
            .workload_selector(kind, namespace, name)
            .await
            .map_err(resolution_error)?
            .ok_or_else(|| CollectError::NotFound {
                kind,
                name: name.to_string(),
                namespace: namespace.to_string(),
                reason: "no such workload".to_string(),
            })?;

        let pods = self
            .client
            .pods_matching(namespace, &selector)
            .await
            .map_err(resolution_error)?;

        debug!(%kind, name, namespace, pods = pods.len(), "listed workload pods");
        Ok(pods.into_iter().map(pod_source).collect())
    }

    async fn open_log_stream(
        &self,
        source: &SourceRef,
        namespace: &str,
        options: &StreamOptions,
    ) -> Result<LogByteStream, CollectError> {
        self.client
            .pod_log_stream(namespace, &source.pod, &Self::log_params(source, options))
            .await
            .map_err(|e| CollectError::transport(&source.pod, namespace, e))
    }
}

/// Pods with sidecars reject log requests that name no container, so the
/// first declared one is read
fn pod_source(pod: PodInfo) -> SourceRef {
    let container = pod.default_container().unwrap_or_default().to_string();
    SourceRef::new(pod.name, container)
}
