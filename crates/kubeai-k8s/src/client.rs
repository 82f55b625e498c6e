use anyhow::{Context, Result, bail};
use futures::AsyncReadExt;
use futures::StreamExt;
use futures::stream::{self, BoxStream};
use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::Api;
use kube::api::{ListParams, LogParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::selector::format_label_selector;
use kubeai_types::{PodInfo, ResourceKind};

/// Chunks buffered between the HTTP log body and its reader
const LOG_CHUNK_BUFFER: usize = 32;

/// Size of a single read from the log body
const LOG_READ_SIZE: usize = 8 * 1024;

/// Raw bytes of a pod's log, in arrival order
pub type LogBytes = BoxStream<'static, std::io::Result<Vec<u8>>>;

/// Kubernetes client wrapper
#[derive(Clone)]
pub struct KubeClient {
    client: kube::Client,
}

impl KubeClient {
    /// Connect using the kubeconfig, or the in-cluster service account when no
    /// context is requested and no kubeconfig is available
    pub async fn connect(context: Option<&str>) -> Result<Self> {
        let config = match context {
            Some(context_name) => {
                let kubeconfig = Kubeconfig::read()
                    .context("Failed to read kubeconfig. Is kubectl configured?")?;
                kube::Config::from_custom_kubeconfig(
                    kubeconfig,
                    &KubeConfigOptions {
                        context: Some(context_name.to_string()),
                        ..Default::default()
                    },
                )
                .await
                .context(format!(
                    "Failed to create config for context: {}",
                    context_name
                ))?
            }
            None => kube::Config::infer()
                .await
                .context("Failed to infer Kubernetes config from kubeconfig or cluster environment")?,
        };

        let client = kube::Client::try_from(config).context("Failed to create Kubernetes client")?;
        Ok(Self { client })
    }

    /// Wrap an already configured client
    pub fn from_client(client: kube::Client) -> Self {
        Self { client }
    }

    /// Namespace of the active context
    pub fn default_namespace(&self) -> &str {
        self.client.default_namespace()
    }

    /// Look up a workload's pod selector.
    ///
    /// Returns `Ok(None)` when the workload does not exist.
    pub async fn workload_selector(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
    ) -> Result<Option<String>> {
        let selector: Option<LabelSelector> = match kind {
            ResourceKind::Deployment => {
                let deployments: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
                let Some(deploy) = deployments.get_opt(name).await.context(format!(
                    "Failed to get deployment '{}' in namespace '{}'",
                    name, namespace
                ))?
                else {
                    return Ok(None);
                };
                deploy.spec.map(|spec| spec.selector)
            }
            ResourceKind::StatefulSet => {
                let statefulsets: Api<StatefulSet> =
                    Api::namespaced(self.client.clone(), namespace);
                let Some(sts) = statefulsets.get_opt(name).await.context(format!(
                    "Failed to get statefulset '{}' in namespace '{}'",
                    name, namespace
                ))?
                else {
                    return Ok(None);
                };
                sts.spec.map(|spec| spec.selector)
            }
            ResourceKind::Pod => bail!("pods are addressed directly and have no selector"),
        };

        let selector = selector.map(|s| format_label_selector(&s)).unwrap_or_default();
        if selector.is_empty() {
            bail!("{} '{}' in namespace '{}' has an empty pod selector", kind, name, namespace);
        }

        debug!(%kind, name, namespace, %selector, "resolved workload selector");
        Ok(Some(selector))
    }

    /// Fetch pods matching a label selector
    pub async fn pods_matching(&self, namespace: &str, label_selector: &str) -> Result<Vec<PodInfo>> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);

        let list = pods
            .list(&ListParams::default().labels(label_selector))
            .await
            .context(format!(
                "Failed to list pods matching '{}' in namespace '{}'",
                label_selector, namespace
            ))?;

        Ok(list
            .items
            .into_iter()
            .map(|pod| Self::pod_to_info(pod, namespace))
            .collect())
    }

    /// Convert a k8s Pod to PodInfo
    fn pod_to_info(pod: Pod, namespace: &str) -> PodInfo {
        let name = pod.metadata.name.unwrap_or_default();
        let mut info = PodInfo::new(name, namespace.to_string());

        if let Some(spec) = pod.spec {
            // Spec order keeps the first declared container first
            info.containers = spec.containers.into_iter().map(|c| c.name).collect();
        }

        info
    }

    /// Open a pod's log and hand back its bytes as an owned stream.
    ///
    /// The request is made before returning, so connection and API errors
    /// surface here rather than on the first read.
    pub async fn pod_log_stream(
        &self,
        namespace: &str,
        pod_name: &str,
        params: &LogParams,
    ) -> Result<LogBytes> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let pod = pod_name.to_string();
        let params = params.clone();

        let (opened_tx, opened_rx) = oneshot::channel();
        let (chunk_tx, chunk_rx) = mpsc::channel::<std::io::Result<Vec<u8>>>(LOG_CHUNK_BUFFER);

        tokio::spawn(async move {
            let reader = match api.log_stream(&pod, &params).await {
                Ok(reader) => {
                    let _ = opened_tx.send(Ok(()));
                    reader
                }
                Err(e) => {
                    let _ = opened_tx.send(Err(e));
                    return;
                }
            };
            let mut reader = Box::pin(reader);
            let mut buf = vec![0u8; LOG_READ_SIZE];

            loop {
                tokio::select! {
                    // Reader side went away
                    _ = chunk_tx.closed() => break,

                    read = reader.read(&mut buf) => {
                        match read {
                            Ok(0) => break,
                            Ok(n) => {
                                if chunk_tx.send(Ok(buf[..n].to_vec())).await.is_err() {
                                    break;
                                }
                            }
                            Err(e) => {
                                let _ = chunk_tx.send(Err(e)).await;
                                break;
                            }
                        }
                    }
                }
            }
            debug!(pod = %pod, "log body closed");
        });

        match opened_rx.await {
            Ok(Ok(())) => Ok(stream::unfold(chunk_rx, |mut rx| async move {
                rx.recv().await.map(|chunk| (chunk, rx))
            })
            .boxed()),
            Ok(Err(e)) => Err(e).context(format!(
                "Failed to open log stream for pod '{}' in namespace '{}'",
                pod_name, namespace
            )),
            Err(_) => bail!(
                "Log stream task for pod '{}' in namespace '{}' exited before opening",
                pod_name,
                namespace
            ),
        }
    }
}
