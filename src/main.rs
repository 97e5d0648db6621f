use anyhow::{Context, Result};
use deploy_pipeline::adapters::{
    CommandRunner, HelmInstaller, InMemoryCluster, InMemoryControlPlane, InMemoryInstaller,
    KubectlCluster, MutationLog, WorkflowCli,
};
use deploy_pipeline::cli::commands::{
    HistoryCommand, RenderCommand, ResolveArgs, RunCommand, ValidateCommand,
};
use deploy_pipeline::cli::output::*;
use deploy_pipeline::cli::{Cli, Command};
use deploy_pipeline::core::resolver::EnvSnapshot;
use deploy_pipeline::execution::watch_interrupts;
use deploy_pipeline::persistence::{PersistenceBackend, RunSummary};
use deploy_pipeline::{
    deploy, standard_pipeline, Adapters, DeployConfig, ExecutionEngine, PipelineContext,
    StageOptions,
};
use std::sync::Arc;
use tracing::error;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Binary of the workflow control plane CLI
const WORKFLOW_CLI: &str = "osmo";

/// Conventional exit status for termination by SIGINT
const INTERRUPTED_EXIT_CODE: i32 = 130;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // Initialize logging; RUST_LOG wins over -v
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set logging subscriber")?;

    match &cli.command {
        Command::Run(cmd) => run_deployment(cmd).await?,
        Command::Validate(cmd) => validate_deployment(cmd)?,
        Command::Render(cmd) => render_documents(cmd)?,
        Command::History(cmd) => show_history(cmd).await?,
    }

    Ok(())
}

/// Load the deploy file and resolve everything a run needs
fn load(args: &ResolveArgs) -> Result<(DeployConfig, PipelineContext)> {
    let config = DeployConfig::from_file(&args.file)
        .with_context(|| format!("Failed to load deploy file {}", args.file.display()))?;
    let state_path = args.state_path(config.state_file.as_deref());

    let overrides = args.overrides();
    let ctx = deploy::prepare(&config, &overrides, EnvSnapshot::capture(), state_path.as_deref())
        .context("Failed to resolve configuration")?;
    Ok((config, ctx))
}

async fn run_deployment(cmd: &RunCommand) -> Result<()> {
    let (config, mut ctx) = load(&cmd.resolve)?;

    println!("{} Loaded deployment: {}", INFO, style(&config.name).bold());
    println!("{} Modes: {}", INFO, style(ctx.modes).cyan());

    let log = MutationLog::new();
    let adapters = if cmd.dry_run {
        println!("{} Dry run: nothing will be changed", WARN);
        Adapters {
            cluster: Arc::new(InMemoryCluster::new(log.clone())),
            installer: Arc::new(InMemoryInstaller::new(log.clone())),
            control_plane: Arc::new(InMemoryControlPlane::new(log.clone())),
        }
    } else {
        let stage_secs = config.timeouts.stage_secs;
        let mut cluster = KubectlCluster::new(CommandRunner::new("kubectl", stage_secs));
        if let Some(context) = &cmd.kube_context {
            cluster = cluster.with_context(context.clone());
        }
        let helm = CommandRunner::new("helm", config.timeouts.install_secs);
        Adapters {
            cluster: Arc::new(cluster),
            installer: Arc::new(HelmInstaller::new(helm)),
            control_plane: Arc::new(WorkflowCli::new(CommandRunner::new(WORKFLOW_CLI, stage_secs))),
        }
    };

    let options = StageOptions {
        force_rotate: cmd.force_rotate,
        today: None,
    };
    let mut pipeline = standard_pipeline(&config, &adapters, &options);

    let engine = ExecutionEngine::new();
    let interrupted = engine.interrupt_flag();
    tokio::spawn(async move {
        let ctrl_c = || async { tokio::signal::ctrl_c().await.is_ok() };
        // the handler stays installed, so the hard stop has to exit by hand
        if watch_interrupts(ctrl_c, interrupted).await {
            std::process::exit(INTERRUPTED_EXIT_CODE);
        }
    });

    let reporter = Arc::new(ConsoleReporter::new());
    engine.add_event_handler(move |event| reporter.handle(&event));

    println!();
    let outcome = engine.run(&mut pipeline, &mut ctx).await;

    println!("{}", separator());
    println!("{}", format_report(&outcome.report));

    if cmd.dry_run {
        print_dry_run(&log, &ctx)?;
    } else if !cmd.no_history {
        let store = open_store().await?;
        let summary = RunSummary::from_report(&config.name, &ctx.modes, &outcome.report);
        store.save_run(&summary).await?;
        println!(
            "\n{} Run saved to history (ID: {})",
            INFO,
            style(&summary.run_id.to_string()[..8]).dim()
        );
    }

    match outcome.error {
        None => {
            println!(
                "\n{} {} deployed {}",
                CHECK,
                style(&config.name).bold(),
                style("successfully").green()
            );
            Ok(())
        }
        Some(cause) => {
            println!("\n{} {} {}", CROSS, style(&config.name).bold(), style("failed").red());
            error!("{}", cause);
            Err(cause).context("Deployment aborted")
        }
    }
}

fn print_dry_run(log: &MutationLog, ctx: &PipelineContext) -> Result<()> {
    let mutations = log.entries();
    println!("\n{} {} mutations would be made:", INFO, style(mutations.len()).cyan());
    for (index, mutation) in mutations.iter().enumerate() {
        println!("{}", format_mutation(index, mutation));
    }

    for document in &ctx.documents {
        println!("{}", separator());
        println!("# {}", style(document.kind).bold());
        print!("{}", serde_yaml::to_string(&document.body)?);
    }
    Ok(())
}

fn validate_deployment(cmd: &ValidateCommand) -> Result<()> {
    println!("{} Validating deployment...", INFO);

    let (config, ctx) = match load(&cmd.resolve) {
        Ok(loaded) => loaded,
        Err(e) => {
            println!("{} Validation failed:", CROSS);
            println!("  {}", style(format!("{:#}", e)).red());
            std::process::exit(1);
        }
    };

    let values = ctx.describe_config();
    if cmd.json {
        let json_values: Vec<_> = values
            .iter()
            .map(|(key, value, source)| {
                serde_json::json!({ "key": key, "value": value, "source": source })
            })
            .collect();
        let data = serde_json::json!({
            "deployment": config.name,
            "modes": ctx.modes.to_string(),
            "values": json_values,
        });
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(());
    }

    println!("{} Deployment configuration is valid!", CHECK);
    println!("  Name: {}", style(&config.name).bold());
    println!("  Modes: {}", style(ctx.modes).cyan());
    println!("  Releases: {}", style(config.releases.len()).cyan());
    println!("  Resolved values:");
    let width = values.iter().map(|(key, _, _)| key.len()).max().unwrap_or(0);
    for (key, value, source) in &values {
        println!("    {:width$}  {}  ({})", key, value, format_source(*source), width = width);
    }
    Ok(())
}

fn render_documents(cmd: &RenderCommand) -> Result<()> {
    let (config, mut ctx) = load(&cmd.resolve)?;
    let documents: Vec<_> = deploy::render_documents(&mut ctx, &config.token)
        .context("Failed to render documents")?
        .into_iter()
        .filter(|document| cmd.kind.map_or(true, |kind| document.kind == kind))
        .collect();

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&documents)?);
        return Ok(());
    }

    for document in &documents {
        println!("# {}", document.kind);
        print!("{}", serde_yaml::to_string(&document.body)?);
        println!("---");
    }
    Ok(())
}

#[cfg(feature = "sqlite")]
async fn open_store() -> Result<Arc<dyn PersistenceBackend>> {
    let store = deploy_pipeline::persistence::SqliteRunStore::with_default_path().await?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "sqlite"))]
async fn open_store() -> Result<Arc<dyn PersistenceBackend>> {
    tracing::warn!("Built without sqlite; run history is not kept");
    Ok(Arc::new(deploy_pipeline::persistence::InMemoryPersistence::new()))
}

async fn show_history(cmd: &HistoryCommand) -> Result<()> {
    let store = open_store().await?;

    if let Some(run_id) = &cmd.run_id {
        let run_id = uuid::Uuid::parse_str(run_id).context("Invalid run ID format")?;
        match store.load_run(run_id).await? {
            Some(summary) => print_run_details(&summary, cmd.json)?,
            None => println!("{} Run not found", WARN),
        }
        return Ok(());
    }

    let mut runs = match &cmd.deployment {
        Some(deployment) => store.list_runs(deployment).await?,
        None => {
            let mut all_runs = Vec::new();
            for deployment in store.list_deployments().await? {
                all_runs.extend(store.list_runs(&deployment).await?);
            }
            all_runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
            all_runs
        }
    };
    runs.truncate(cmd.limit);

    if runs.is_empty() {
        println!("{} No runs found", INFO);
        return Ok(());
    }

    if cmd.json {
        let data = serde_json::json!({ "runs": runs });
        println!("{}", serde_json::to_string_pretty(&data)?);
    } else {
        println!("{} Run history (showing latest {}):", INFO, runs.len());
        for summary in &runs {
            println!("  {}", format_run_summary(summary));
        }
    }

    Ok(())
}

fn print_run_details(summary: &RunSummary, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
        return Ok(());
    }

    println!("{} Run Details", INFO);
    println!("  ID: {}", style(summary.run_id).cyan());
    println!("  Deployment: {}", style(&summary.deployment).bold());
    println!("  Modes: {}", summary.modes);
    println!("  Status: {}", format_status(summary.status));
    println!("  Started: {}", style(summary.started_at.to_rfc3339()).dim());
    println!("  Completed: {}", style(summary.completed_at.to_rfc3339()).dim());
    if let Ok(duration) = summary.completed_at.signed_duration_since(summary.started_at).to_std() {
        println!("  Duration: {}", style(format_duration(duration)).dim());
    }
    println!("  Applied: {}", summary.applied.join(", "));
    println!("  Already satisfied: {}", summary.skipped.join(", "));
    if let (Some(stage), Some(failure)) = (&summary.aborted_stage, &summary.failure) {
        println!("  Aborted at: {} ({})", style(stage).red(), failure);
    }
    Ok(())
}
