use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::info;

use kubeai_ai::{LogAdvisor, ProviderKind, create_provider};
use kubeai_k8s::KubeClient;
use kubeai_logs::{
    CollectError, CollectionRequest, KubeLogSource, LogBuffer, LogCollector, ResourceKind, analyze,
};
use kubeai_types::parse_since_seconds;

mod config;
mod output;

use config::AppConfig;

/// kubeai - AI-assisted troubleshooting for Kubernetes workload logs
#[derive(Parser, Debug)]
#[command(name = "kubeai")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file (defaults to <config dir>/kubeai/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Show debug logging on stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Collect logs from a pod, deployment or statefulset and analyze them
    AnalyzeLogs(AnalyzeLogsArgs),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(clap::Args, Debug)]
struct AnalyzeLogsArgs {
    /// Resource kind: pod, deployment (deploy) or statefulset (sts)
    kind: String,

    /// Resource name
    name: String,

    /// Namespace (defaults to the context's namespace)
    #[arg(short, long)]
    namespace: Option<String>,

    /// Container for pods with multiple containers
    #[arg(short, long)]
    container: Option<String>,

    /// Lines to read from the end of each log; 0 reads everything
    #[arg(short, long)]
    tail: Option<i64>,

    /// Only logs newer than this, e.g. 90, 30s, 15m, 2h, 1d; 0 disables
    #[arg(short, long)]
    since: Option<String>,

    /// Read logs of the previous container instance
    #[arg(short, long)]
    previous: bool,

    /// Only send error and fatal records to the AI
    #[arg(short, long)]
    errors_only: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    output: OutputFormat,

    /// Print the collected records before the analysis
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    show_logs: bool,

    /// Records printed when showing logs; 0 prints all
    #[arg(long, default_value_t = 20)]
    max_logs: usize,

    /// Follow the logs until interrupted
    #[arg(long)]
    live: bool,

    /// Print the local summary without asking an AI provider
    #[arg(long)]
    no_ai: bool,

    /// Kubeconfig context
    #[arg(long)]
    context: Option<String>,

    /// AI provider: ollama, openai, anthropic, gemini or anythingllm
    #[arg(long)]
    provider: Option<String>,

    /// Model for the AI provider
    #[arg(long)]
    model: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let result = run(args).await;

    if let Err(e) = &result {
        eprintln!("Error: {:#}", e);
    }

    result
}

async fn run(args: Args) -> Result<()> {
    let mut config = AppConfig::load(args.config.as_deref())?;
    config.apply_env()?;

    match args.command {
        Command::AnalyzeLogs(cmd) => analyze_logs(cmd, config).await,
    }
}

async fn analyze_logs(args: AnalyzeLogsArgs, mut config: AppConfig) -> Result<()> {
    let kind: ResourceKind = args.kind.parse().map_err(CollectError::from)?;

    if let Some(provider) = &args.provider {
        config.provider.kind = provider.parse::<ProviderKind>()?;
        config.apply_env()?;
    }
    if let Some(model) = &args.model {
        config.provider.model = Some(model.clone());
    }

    let tail = args.tail.unwrap_or(config.logs.tail);
    let since = args.since.as_deref().unwrap_or(&config.logs.since);
    let since_seconds = parse_since_seconds(since).map_err(anyhow::Error::msg)?;

    // Fail on a missing API key before touching the cluster
    let advisor = if args.no_ai || args.live {
        None
    } else {
        Some(LogAdvisor::new(create_provider(&config.provider_config())?))
    };

    let context = args.context.as_deref().or(config.kube_context.as_deref());
    let client = KubeClient::connect(context).await?;
    let namespace = args
        .namespace
        .clone()
        .unwrap_or_else(|| client.default_namespace().to_string());

    let mut request = CollectionRequest::new(kind, &args.name, namespace)
        .with_previous(args.previous)
        .with_tail_lines((tail > 0).then_some(tail))
        .with_since_seconds(since_seconds);
    if let Some(container) = &args.container {
        request = request.with_container(container);
    }

    let collector = LogCollector::new(KubeLogSource::new(client), config.collector_config());

    if args.live {
        let buffer_size = config.logs.live_buffer_size;
        return stream_live(&collector, request.following(), &args, buffer_size).await;
    }

    let text = args.output == OutputFormat::Text;
    if text {
        println!("Collecting logs from {}...", request.target());
    }

    let collected = collector.collect_batch(&request).await?;
    let records = collected.records;
    eprint!("{}", output::render_failures(&collected.failures));

    if text {
        println!("Collected {} log entries", records.len());
        if args.show_logs {
            print!("{}", output::render_records(&records, args.max_logs));
        }
    }

    let summary = analyze(&records);

    let analysis = match &advisor {
        Some(advisor) => {
            if text {
                println!(
                    "\nAnalyzing logs with {} ({})...",
                    advisor.provider().name(),
                    advisor.provider().model()
                );
            }
            let analysis = if args.errors_only {
                advisor.analyze_errors(&records, analyze).await
            } else {
                advisor.analyze_logs(&records, &summary).await
            };
            Some(analysis.context("AI analysis failed")?)
        }
        None => None,
    };

    match args.output {
        OutputFormat::Json => println!("{}", output::render_json(&summary, analysis.as_ref())?),
        OutputFormat::Text => {
            print!("{}", output::render_summary(&summary));
            if let Some(analysis) = &analysis {
                print!("{}", output::render_analysis(analysis));
            }
        }
    }

    Ok(())
}

async fn stream_live<S>(
    collector: &LogCollector<S>,
    request: CollectionRequest,
    args: &AnalyzeLogsArgs,
    buffer_size: usize,
) -> Result<()>
where
    S: kubeai_logs::LogSource + 'static,
{
    let cancel = CancellationToken::new();
    let mut stream = collector.stream_logs(&request, cancel.clone()).await?;

    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupt.cancel();
        }
    });

    let text = args.output == OutputFormat::Text;
    let multi_pod = stream.sources.len() > 1;
    if text {
        println!(
            "Streaming logs from {} ({} pods, press Ctrl+C to stop)...",
            request.target(),
            stream.sources.len()
        );
    }

    let buffer = LogBuffer::new(buffer_size);
    loop {
        tokio::select! {
            Some(record) = stream.records.recv() => {
                if text && args.show_logs {
                    let line = if multi_pod {
                        output::live_record_line(&record)
                    } else {
                        output::record_line(&record)
                    };
                    println!("{}", line);
                }
                buffer.push(record);
            }
            Some(err) = stream.errors.recv() => {
                eprintln!("{}", output::render_stream_error(&err));
            }
            else => break,
        }
    }

    stream.readers.await.context("Log stream task failed")?;
    info!(buffered = buffer.len(), "live stream stopped");

    let summary = analyze(&buffer.snapshot());
    match args.output {
        OutputFormat::Json => println!("{}", output::render_json(&summary, None)?),
        OutputFormat::Text => {
            println!("\n{}", output::render_level_counts(&buffer.level_counts()));
            print!("{}", output::render_summary(&summary));
        }
    }

    Ok(())
}
