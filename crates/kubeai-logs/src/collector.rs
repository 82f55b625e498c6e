use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, BoxStream, SelectAll};
use futures::{AsyncBufRead, AsyncBufReadExt, StreamExt, TryStreamExt};
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::CollectError;
use crate::parser::LogParser;
use crate::source::{LogSource, StreamOptions};
use kubeai_types::{CollectionRequest, LogRecord, SourceRef};

/// Tunables for log collection
#[derive(Clone, Debug)]
pub struct CollectorConfig {
    /// Most records a single source may yield in a batch read
    pub max_batch_records: usize,

    /// Pause before polling a stream again after it ran dry
    pub retry_interval: Duration,

    /// Capacity of every record/error channel
    pub channel_capacity: usize,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            max_batch_records: 10_000,
            retry_interval: Duration::from_secs(1),
            channel_capacity: 256,
        }
    }
}

/// A source that was skipped during a multi-pod batch
#[derive(Debug)]
pub struct SourceFailure {
    pub source: SourceRef,
    pub error: CollectError,
}

/// Result of a batch collection
#[derive(Debug)]
pub struct CollectedLogs {
    /// Records from every successful source, grouped by source in resolution order
    pub records: Vec<LogRecord>,

    /// Sources that failed without aborting the batch
    pub failures: Vec<SourceFailure>,
}

/// Handles to a running log stream
pub struct LogStream {
    pub records: mpsc::Receiver<LogRecord>,
    pub errors: mpsc::Receiver<CollectError>,

    /// Sources being streamed
    pub sources: Vec<SourceRef>,

    /// Completes once every per-source reader has exited and both channels are closed
    pub readers: JoinHandle<()>,
}

/// Resolves workloads to pods and reads their logs
pub struct LogCollector<S> {
    source: Arc<S>,
    config: CollectorConfig,
}

impl<S: LogSource + 'static> LogCollector<S> {
    pub fn new(source: S, config: CollectorConfig) -> Self {
        Self {
            source: Arc::new(source),
            config,
        }
    }

    pub fn config(&self) -> &CollectorConfig {
        &self.config
    }

    /// Resolve a request to the concrete pods/containers to read
    pub async fn resolve(&self, request: &CollectionRequest) -> Result<Vec<SourceRef>, CollectError> {
        let mut sources = if request.kind.is_workload() {
            self.source
                .resolve_sources(request.kind, &request.name, &request.namespace)
                .await?
        } else {
            vec![SourceRef::new(&request.name, "")]
        };

        if sources.is_empty() {
            return Err(CollectError::NotFound {
                kind: request.kind,
                name: request.name.clone(),
                namespace: request.namespace.clone(),
                reason: "no pods match its selector".to_string(),
            });
        }

        if let Some(container) = &request.container {
            for source in &mut sources {
                source.container = container.clone();
            }
        }

        debug!(target_ref = %request.target(), sources = sources.len(), "resolved log sources");
        Ok(sources)
    }

    fn stream_options(request: &CollectionRequest) -> StreamOptions {
        StreamOptions {
            previous: request.previous,
            since_seconds: request.since_seconds,
            tail_lines: request.tail_lines,
            follow: request.follow,
        }
    }

    /// Read the existing logs of every source once.
    ///
    /// Sources are read one after another. For deployments and statefulsets a
    /// failing pod is recorded in [`CollectedLogs::failures`] and skipped; the
    /// call only fails when nothing at all was collected, or when a pod exceeds
    /// the batch record limit. `request.follow` is ignored, a batch never
    /// waits for new lines.
    pub async fn collect_batch(&self, request: &CollectionRequest) -> Result<CollectedLogs, CollectError> {
        let sources = self.resolve(request).await?;
        let options = StreamOptions {
            follow: false,
            ..Self::stream_options(request)
        };

        let mut records = Vec::new();
        let mut failures = Vec::new();

        for source in sources {
            match self.read_source(&source, &request.namespace, &options).await {
                Ok(mut batch) => {
                    debug!(pod = %source, lines = batch.len(), "collected pod logs");
                    records.append(&mut batch);
                }
                Err(e @ CollectError::LogVolumeExceeded { .. }) => return Err(e),
                Err(e) if !request.kind.is_workload() => return Err(e),
                Err(e) => {
                    warn!(pod = %source, error = %e, "skipping pod");
                    failures.push(SourceFailure { source, error: e });
                }
            }
        }

        if records.is_empty() {
            return Err(CollectError::NoLogsFound {
                kind: request.kind,
                name: request.name.clone(),
                namespace: request.namespace.clone(),
            });
        }

        info!(
            target_ref = %request.target(),
            records = records.len(),
            failed_sources = failures.len(),
            "batch collection finished"
        );
        Ok(CollectedLogs { records, failures })
    }

    async fn read_source(
        &self,
        source: &SourceRef,
        namespace: &str,
        options: &StreamOptions,
    ) -> Result<Vec<LogRecord>, CollectError> {
        let stream = self.source.open_log_stream(source, namespace, options).await?;
        let mut reader = stream.into_async_read();
        let mut buf = Vec::new();
        let mut records = Vec::new();

        while let Some(line) = next_line(&mut reader, &mut buf)
            .await
            .map_err(|e| CollectError::transport(&source.pod, namespace, e))?
        {
            records.push(LogParser::parse(&line, &source.pod, &source.container));

            if records.len() > self.config.max_batch_records {
                return Err(CollectError::LogVolumeExceeded {
                    pod: source.pod.clone(),
                    namespace: namespace.to_string(),
                    limit: self.config.max_batch_records,
                });
            }
        }

        Ok(records)
    }

    /// Stream the logs of every source through channels.
    ///
    /// With `request.follow` each source is followed until `cancel` fires;
    /// without it a source's reader stops at the end of its current log.
    /// Resolution errors are returned immediately. Once streaming, a failing
    /// source reports on the error channel and stops without affecting the
    /// others. Records from different sources interleave in arrival order.
    pub async fn stream_logs(
        &self,
        request: &CollectionRequest,
        cancel: CancellationToken,
    ) -> Result<LogStream, CollectError> {
        let sources = self.resolve(request).await?;
        let options = Self::stream_options(request);
        let capacity = self.config.channel_capacity;

        let (record_tx, records) = mpsc::channel(capacity);
        let (error_tx, errors) = mpsc::channel(capacity);

        // Also stopped when the consumer goes away
        let stop = cancel.child_token();

        let mut readers: Vec<SourceReader<S>> = sources
            .iter()
            .map(|source| SourceReader {
                source: Arc::clone(&self.source),
                target: source.clone(),
                namespace: request.namespace.clone(),
                options: options.clone(),
                retry_interval: self.config.retry_interval,
                cancel: stop.clone(),
            })
            .collect();

        let readers = if readers.len() == 1 {
            let reader = readers.swap_remove(0);
            tokio::spawn(reader.run(record_tx, error_tx))
        } else {
            tokio::spawn(fan_in(readers, record_tx, error_tx, stop, capacity))
        };

        info!(target_ref = %request.target(), sources = sources.len(), "streaming logs");
        Ok(LogStream {
            records,
            errors,
            sources,
            readers,
        })
    }
}

/// Follows the log of a single source
struct SourceReader<S> {
    source: Arc<S>,
    target: SourceRef,
    namespace: String,
    options: StreamOptions,
    retry_interval: Duration,
    cancel: CancellationToken,
}

impl<S: LogSource + 'static> SourceReader<S> {
    async fn run(self, record_tx: mpsc::Sender<LogRecord>, error_tx: mpsc::Sender<CollectError>) {
        let opened = tokio::select! {
            _ = self.cancel.cancelled() => return,
            opened = self.source.open_log_stream(&self.target, &self.namespace, &self.options) => opened,
        };
        let stream = match opened {
            Ok(stream) => stream,
            Err(e) => {
                self.report(&error_tx, e).await;
                return;
            }
        };
        debug!(pod = %self.target, "log stream opened");

        let mut reader = stream.into_async_read();
        let mut buf = Vec::new();

        loop {
            let line = tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = record_tx.closed() => {
                    self.cancel.cancel();
                    break;
                }
                line = next_line(&mut reader, &mut buf) => line,
            };

            match line {
                Ok(Some(line)) => {
                    let record = LogParser::parse(&line, &self.target.pod, &self.target.container);
                    tokio::select! {
                        _ = self.cancel.cancelled() => break,
                        sent = record_tx.send(record) => {
                            if sent.is_err() {
                                // Consumer closed the channel
                                self.cancel.cancel();
                                break;
                            }
                        }
                    }
                }
                Ok(None) if !self.options.follow => break,
                Ok(None) => {
                    // Nothing new yet, the container may still be writing
                    tokio::select! {
                        _ = self.cancel.cancelled() => break,
                        _ = record_tx.closed() => {
                            self.cancel.cancel();
                            break;
                        }
                        _ = tokio::time::sleep(self.retry_interval) => {}
                    }
                }
                Err(e) => {
                    if !self.cancel.is_cancelled() {
                        let err = CollectError::transport(&self.target.pod, &self.namespace, e);
                        self.report(&error_tx, err).await;
                    }
                    break;
                }
            }
        }

        debug!(pod = %self.target, "log stream stopped");
    }

    async fn report(&self, error_tx: &mpsc::Sender<CollectError>, err: CollectError) {
        warn!(pod = %self.target, error = %err, "log stream failed");
        tokio::select! {
            _ = self.cancel.cancelled() => {}
            _ = error_tx.send(err) => {}
        }
    }
}

enum Fanned {
    Record(LogRecord),
    Error(CollectError),
}

/// Run one reader per source, each with its own channel pair, and multiplex
/// them onto the caller's channels. Returns after every reader has exited.
async fn fan_in<S: LogSource + 'static>(
    readers: Vec<SourceReader<S>>,
    record_tx: mpsc::Sender<LogRecord>,
    error_tx: mpsc::Sender<CollectError>,
    stop: CancellationToken,
    capacity: usize,
) {
    // Dropped once the consumer stops listening for errors
    let mut error_tx = Some(error_tx);
    let mut tasks = JoinSet::new();
    let mut merged: SelectAll<BoxStream<'static, Fanned>> = SelectAll::new();

    for reader in readers {
        let (pod_record_tx, pod_records) = mpsc::channel(capacity);
        let (pod_error_tx, pod_errors) = mpsc::channel(capacity);

        merged.push(
            stream::select(
                receiver_stream(pod_records).map(Fanned::Record),
                receiver_stream(pod_errors).map(Fanned::Error),
            )
            .boxed(),
        );
        tasks.spawn(reader.run(pod_record_tx, pod_error_tx));
    }

    loop {
        let item = tokio::select! {
            _ = stop.cancelled() => break,
            _ = record_tx.closed() => {
                stop.cancel();
                break;
            }
            item = merged.next() => item,
        };

        match item {
            Some(Fanned::Record(record)) => {
                let delivered = tokio::select! {
                    _ = stop.cancelled() => break,
                    sent = record_tx.send(record) => sent.is_ok(),
                };
                if !delivered {
                    stop.cancel();
                    break;
                }
            }
            Some(Fanned::Error(err)) => {
                let delivered = match &error_tx {
                    Some(tx) => tokio::select! {
                        _ = stop.cancelled() => break,
                        sent = tx.send(err) => sent.is_ok(),
                    },
                    None => continue,
                };
                if !delivered {
                    debug!("error receiver dropped, discarding further source errors");
                    error_tx = None;
                }
            }
            // Every per-source channel is closed
            None => break,
        }
    }

    // Readers blocked on a full channel see it close and exit
    drop(merged);
    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            warn!(error = %e, "log reader task failed");
        }
    }
    debug!("all log readers exited");
}

fn receiver_stream<T: Send + 'static>(rx: mpsc::Receiver<T>) -> BoxStream<'static, T> {
    stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|item| (item, rx)) }).boxed()
}

/// Read one line, decoding invalid UTF-8 lossily. `None` at end of stream.
async fn next_line<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    buf: &mut Vec<u8>,
) -> std::io::Result<Option<String>> {
    buf.clear();
    if reader.read_until(b'\n', buf).await? == 0 {
        return Ok(None);
    }
    Ok(Some(String::from_utf8_lossy(buf).into_owned()))
}
