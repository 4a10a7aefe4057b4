use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use ci_mender::config::AppConfig;
use ci_mender::pipeline::close::ClosedPullRequest;
use ci_mender::pipeline::context::WorkflowRunContext;
use ci_mender::server::{create_router, AppState};
use ci_mender::shutdown::{graceful_shutdown, wait_for_shutdown};
use ci_mender::webhook::events::{PullRequestEvent, WorkflowRunEvent};

#[derive(Parser)]
#[command(
    name = "ci-mender",
    version,
    about = "Proposes fixes for pull requests whose CI runs fail"
)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve GitHub webhooks
    Serve,
    /// Repair one failed workflow run from a `workflow_run` event payload
    Repair {
        /// Event payload file, e.g. `$GITHUB_EVENT_PATH`
        #[arg(long)]
        event: PathBuf,
        /// GitHub App installation to mint a token for
        #[arg(long)]
        installation_id: Option<u64>,
    },
    /// Report the outcome of a closed follow-up PR from a `pull_request` event payload
    Close {
        #[arg(long)]
        event: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}

fn read_event<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let raw = std::fs::read(path)
        .with_context(|| format!("Failed to read event payload {}", path.display()))?;
    serde_json::from_slice(&raw)
        .with_context(|| format!("Failed to parse event payload {}", path.display()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let config = AppConfig::load(cli.config.as_deref())?;

    match cli.command {
        Command::Serve => serve(config).await,
        Command::Repair {
            event,
            installation_id,
        } => {
            let event: WorkflowRunEvent = read_event(&event)?;
            let mut context = WorkflowRunContext::from(&event);
            if installation_id.is_some() {
                context.installation_id = installation_id;
            }

            let state = AppState::new(config)?;
            let outcome = state.repair(&context).await?;
            tracing::info!(outcome = ?outcome, "Repair finished");
            Ok(())
        }
        Command::Close { event } => {
            let event: PullRequestEvent = read_event(&event)?;
            if event.action != "closed" {
                tracing::info!(action = %event.action, "Pull request is not closed; nothing to report");
                return Ok(());
            }

            let state = AppState::new(config)?;
            let summary = state
                .close_feedback(&ClosedPullRequest::from(&event))
                .await?;
            tracing::info!(sent = summary.sent, failed = summary.failed, "Feedback finished");
            Ok(())
        }
    }
}

async fn serve(config: AppConfig) -> anyhow::Result<()> {
    config.webhook_secret()?;

    tracing::info!(
        host = %config.server.host,
        port = %config.server.port,
        "Starting ci-mender server"
    );

    let listener =
        tokio::net::TcpListener::bind(format!("{}:{}", config.server.host, config.server.port))
            .await?;

    let state = Arc::new(AppState::new(config)?);

    // Start the task queue processor
    let queue_state = Arc::clone(&state);
    tokio::spawn(async move {
        ci_mender::queue::run_queue_processor(queue_state).await;
    });

    let app = create_router(Arc::clone(&state));

    tracing::info!("Listening on {}", listener.local_addr()?);

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(wait_for_shutdown())
        .await?;

    graceful_shutdown(&state).await;

    Ok(())
}
