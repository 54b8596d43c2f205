use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio::time::{Duration, sleep};
use tracing::info;
use tracing_subscriber::EnvFilter;

use pursuit::cli::{Cli, Command};
use pursuit::collaborators::Collaborators;
use pursuit::config::PursuitConfig;
use pursuit::opportunity::Opportunity;
use pursuit::store::{MemoryApplicationStore, MemoryWorkflowStore};
use pursuit::tracker::{BackgroundScheduler, StatusTracker, TransitionRules};
use pursuit::ui::WorkflowProgress;
use pursuit::workflow::model::{AutomationLevel, WorkflowStatus, WorkflowTrigger};
use pursuit::workflow::WorkflowEngine;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let config = PursuitConfig::load_from(Path::new(&cli.config))?;

    let services = Services::new(&config);
    match cli.command {
        Command::Demo { auto } => run_demo(&services, &config, auto).await?,
        Command::Status => show_status(&services).await?,
        Command::FollowUps { user } => show_follow_ups(&services, user.as_deref()).await?,
    }
    Ok(())
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "pursuit=debug" } else { "pursuit=info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .init();
}

struct Services {
    engine: WorkflowEngine,
    tracker: Arc<StatusTracker>,
    scheduler: BackgroundScheduler,
}

impl Services {
    /// Wire the engine and tracker over in-memory stores and the stub
    /// collaborators.
    fn new(config: &PursuitConfig) -> Self {
        let workflow_store = Arc::new(MemoryWorkflowStore::default());
        let application_store = Arc::new(MemoryApplicationStore::default());
        let tracker = Arc::new(StatusTracker::new(
            application_store,
            TransitionRules,
            config.stale_after_days,
        ));
        let engine = WorkflowEngine::new(Collaborators::stubs(), workflow_store, tracker.clone());
        let scheduler = BackgroundScheduler::new(
            tracker.clone(),
            Duration::from_secs(config.sweep_interval_secs),
            Duration::from_secs(config.sweep_error_backoff_secs),
        );
        Self {
            engine,
            tracker,
            scheduler,
        }
    }
}

/// Drive one sample opportunity end to end, approving the review step on
/// the user's behalf when the pipeline parks there.
async fn run_demo(services: &Services, config: &PursuitConfig, auto: bool) -> Result<()> {
    let opportunity = Opportunity {
        id: "demo-opp-1".into(),
        title: "Senior Platform Engineer".into(),
        organization: "Acme Systems".into(),
        description: "Distributed systems role. Send applications to careers@acme.example.com"
            .into(),
        apply_url: Some("https://acme.example.com/careers/platform".into()),
        url: None,
    };

    let mut workflow_config = config.workflow_config();
    if auto {
        workflow_config.automation_level = AutomationLevel::FullyAutomated;
        workflow_config.auto_submit = true;
    }

    let progress = WorkflowProgress::start(&opportunity.title, &opportunity.organization);
    let workflow_id = services.engine.create_workflow(
        "demo-user",
        opportunity,
        WorkflowTrigger::UserRequest,
        workflow_config,
    )?;

    let workflow = loop {
        let Some(workflow) = services.engine.get_workflow_status(&workflow_id).await? else {
            anyhow::bail!("workflow {workflow_id} disappeared");
        };
        if workflow.overall_status.is_terminal() {
            break workflow;
        }
        progress.update(&workflow);
        if workflow.overall_status == WorkflowStatus::WaitingForApproval {
            let step_id = format!("{workflow_id}-review");
            info!(%step_id, "approving review step on the demo user's behalf");
            services.engine.approve_step(&workflow_id, &step_id).await;
        }
        sleep(Duration::from_millis(100)).await;
    };

    progress.complete(&workflow);
    progress.print_results(&workflow);

    // One sweep pass so the demo shows tracker output immediately.
    let (advanced, flagged) = services.scheduler.tick().await?;
    info!(advanced, flagged, "initial status sweep");

    for application in services.tracker.get_user_applications("demo-user").await? {
        println!(
            "tracked application {} at {} ({}), {} follow-up(s) scheduled",
            application.application_id,
            application.organization,
            application.current_stage,
            application.follow_ups.len()
        );
    }
    Ok(())
}

async fn show_status(services: &Services) -> Result<()> {
    let system = services.engine.get_system_status().await?;
    let statistics = services.tracker.get_application_statistics(None).await?;
    println!("{}", serde_json::to_string_pretty(&system)?);
    println!("{}", serde_json::to_string_pretty(&statistics)?);
    Ok(())
}

async fn show_follow_ups(services: &Services, user: Option<&str>) -> Result<()> {
    let pending = services.tracker.get_pending_follow_ups(user).await?;
    if pending.is_empty() {
        println!("No follow-ups due.");
        return Ok(());
    }
    for item in pending {
        println!(
            "{} — {} at {}: {} (due {})",
            item.action.kind,
            item.opportunity_title,
            item.organization,
            item.action.description,
            item.action.due_date.format("%Y-%m-%d")
        );
    }
    Ok(())
}
