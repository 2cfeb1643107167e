use clap::{Args, Parser, Subcommand};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use verify_center::config::AppConfig;
use verify_center::models::report::OverallStatus;
use verify_center::models::verification::{BearerToken, DocumentSource, UploadFile};
use verify_center::services::backend::{ReqwestBackend, VerificationBackend};
use verify_center::{Outcome, WorkflowController, WorkflowOptions, WorkflowPhase};

#[derive(Parser)]
#[command(name = "verify-center", version, about = "Submit and track batch document verification jobs")]
struct Cli {
    /// Bearer token; overrides API_TOKEN.
    #[arg(long, global = true)]
    token: Option<String>,

    /// Seconds between status requests; overrides POLL_INTERVAL_SECS.
    #[arg(long, global = true)]
    poll_interval_secs: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Submit a verification job and follow it until it settles.
    Run(RunArgs),
    /// Manage grouping contexts.
    #[command(subcommand)]
    Contexts(ContextCommand),
}

#[derive(Args)]
struct RunArgs {
    /// Structured source (master CSV).
    #[arg(long)]
    csv: PathBuf,

    /// Source documents to upload.
    #[arg(long, num_args = 1.., conflicts_with = "folder", required_unless_present = "folder")]
    docs: Vec<PathBuf>,

    /// Folder on the backend host holding the source documents.
    #[arg(long)]
    folder: Option<String>,

    /// Context name; created if it does not exist.
    #[arg(long)]
    context: Option<String>,
}

#[derive(Subcommand)]
enum ContextCommand {
    /// List existing contexts.
    List,
    /// Register a new context.
    Create { name: String },
}

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let cli = Cli::parse();

    // Load configuration from environment
    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    if let Some(addr) = config.metrics_addr {
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .expect("Failed to install Prometheus metrics exporter");
        tracing::info!(%addr, "Prometheus exporter listening");
    }
    describe_metrics();

    let backend: Arc<dyn VerificationBackend> = Arc::new(
        ReqwestBackend::new(&config.api_base_url, config.request_timeout())
            .expect("Failed to initialize API client"),
    );

    let token = cli
        .token
        .and_then(BearerToken::new)
        .or_else(|| config.bearer_token());

    let options = WorkflowOptions {
        poll_interval: cli
            .poll_interval_secs
            .map(|s| Duration::from_secs(s.max(1)))
            .unwrap_or_else(|| config.poll_interval()),
        ..WorkflowOptions::default()
    };

    let mut controller = WorkflowController::new(backend, token, options);

    let result = match cli.command {
        Command::Run(args) => run(&mut controller, args).await,
        Command::Contexts(ContextCommand::List) => list_contexts(&controller).await,
        Command::Contexts(ContextCommand::Create { name }) => {
            create_context(&mut controller, &name).await
        }
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            ExitCode::FAILURE
        }
    }
}

fn describe_metrics() {
    metrics::describe_counter!(
        "verification_jobs_submitted_total",
        "Verification jobs sent to the backend"
    );
    metrics::describe_counter!(
        "verification_submissions_failed_total",
        "Submit requests rejected by the backend or transport"
    );
    metrics::describe_counter!(
        "verification_poll_ticks_total",
        "Status requests issued"
    );
    metrics::describe_counter!(
        "verification_poll_failures_total",
        "Status requests that ended a polling session"
    );
    metrics::describe_counter!(
        "verification_jobs_settled_total",
        "Jobs that reached a terminal state, by outcome"
    );
    metrics::describe_counter!(
        "verification_records_failed_total",
        "Records reported as failed in completed jobs"
    );
}

async fn run(
    controller: &mut WorkflowController,
    args: RunArgs,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    match args.context.as_deref() {
        Some(name) => {
            let existing = controller
                .list_contexts()
                .await?
                .into_iter()
                .find(|c| c.name == name.trim());
            let context = match existing {
                Some(context) => {
                    controller.select_context(Some(context.clone()))?;
                    context
                }
                None => controller.create_context(name).await?,
            };
            tracing::info!(context_id = %context.id, name = %context.name, "Using context");
        }
        None => controller.select_context(None)?,
    }

    controller.set_structured_source(Some(UploadFile::from_path(&args.csv).await?))?;

    let documents = match args.folder {
        Some(folder) => DocumentSource::FolderPath(folder),
        None => {
            let mut files = Vec::with_capacity(args.docs.len());
            for path in &args.docs {
                files.push(UploadFile::from_path(path).await?);
            }
            DocumentSource::Files(files)
        }
    };
    controller.set_documents(Some(documents))?;

    let job_id = controller.run().await?;
    tracing::info!(job_id = %job_id, "Following verification job");

    while let Some(phase) = controller.pump().await {
        tracing::info!(
            progress = %controller.progress(),
            status = controller.status_message(),
            "Job progress"
        );
        if phase.is_settled() {
            break;
        }
    }

    for report in controller.reports() {
        let marker = match report.overall_status {
            OverallStatus::Complete => "ok",
            OverallStatus::Failed => "FAILED",
        };
        println!(
            "{}\t{}\t{}/{} fields matched\t{}",
            report.record_id, report.source_label, report.matched_count, report.total_fields, marker
        );
    }
    println!("{}", controller.status_message());

    Ok(match controller.phase() {
        WorkflowPhase::Settled(Outcome::Complete) => ExitCode::SUCCESS,
        _ => ExitCode::FAILURE,
    })
}

async fn list_contexts(
    controller: &WorkflowController,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    for context in controller.list_contexts().await? {
        println!("{}\t{}", context.id, context.name);
    }
    Ok(ExitCode::SUCCESS)
}

async fn create_context(
    controller: &mut WorkflowController,
    name: &str,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let context = controller.create_context(name).await?;
    println!("{}\t{}", context.id, context.name);
    Ok(ExitCode::SUCCESS)
}
