//! The workflow engine: owns active instances and drives their pipelines.
//!
//! Each created workflow gets a dedicated task that walks the step sequence
//! in order. Approval gates park the task on a watch channel and resume the
//! moment [`WorkflowEngine::approve_step`] or
//! [`WorkflowEngine::cancel_workflow`] signals it, so a granted approval is
//! picked up immediately rather than on some polling tick.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use anyhow::{Result, bail};
use chrono::Utc;
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::{Duration, sleep};
use tracing::{error, info, warn};

use crate::collaborators::Collaborators;
use crate::error::StepError;
use crate::opportunity::Opportunity;
use crate::store::WorkflowStore;
use crate::tracker::StatusTracker;
use crate::tracker::model::ApplicationPriority;
use crate::workflow::executor::{StageExecutor, StepContext, StepOutcome, manual_submission_fallback};
use crate::workflow::model::{
    WorkflowConfig, WorkflowInstance, WorkflowStage, WorkflowStatus, WorkflowTrigger,
};

/// Shared state for one in-flight workflow. The watch sender is bumped on
/// every approval or cancellation so a parked driver task re-checks state.
pub(crate) struct WorkflowHandle {
    user_id: String,
    instance: tokio::sync::Mutex<WorkflowInstance>,
    signal: watch::Sender<()>,
}

/// How a driven step ended, from the driver task's point of view.
enum StepEnd {
    Completed,
    Failed,
    Cancelled,
}

/// Aggregate counts across active and persisted workflows.
#[derive(Debug, Serialize)]
pub struct SystemStatus {
    pub total_active: usize,
    pub total_completed: usize,
    pub status_distribution: BTreeMap<String, usize>,
    pub current_stage_distribution: BTreeMap<String, usize>,
}

/// Orchestrates application workflows end to end.
///
/// Cheap to clone; all clones share the same active set, stores and
/// collaborators.
#[derive(Clone)]
pub struct WorkflowEngine {
    collaborators: Collaborators,
    store: Arc<dyn WorkflowStore>,
    tracker: Arc<StatusTracker>,
    active: Arc<std::sync::Mutex<HashMap<String, Arc<WorkflowHandle>>>>,
}

impl WorkflowEngine {
    pub fn new(
        collaborators: Collaborators,
        store: Arc<dyn WorkflowStore>,
        tracker: Arc<StatusTracker>,
    ) -> Self {
        Self {
            collaborators,
            store,
            tracker,
            active: Arc::new(std::sync::Mutex::new(HashMap::new())),
        }
    }

    /// Create a workflow and start driving it on a background task.
    ///
    /// Rejects the request when the user already has the configured maximum
    /// of concurrent workflows in flight.
    pub fn create_workflow(
        &self,
        user_id: &str,
        opportunity: Opportunity,
        trigger: WorkflowTrigger,
        config: WorkflowConfig,
    ) -> Result<String> {
        let max_concurrent = config.max_concurrent_applications as usize;
        let instance = WorkflowInstance::new(user_id, opportunity, trigger, config);
        let workflow_id = instance.workflow_id.clone();
        let (signal, rx) = watch::channel(());
        let handle = Arc::new(WorkflowHandle {
            user_id: user_id.to_string(),
            instance: tokio::sync::Mutex::new(instance),
            signal,
        });

        {
            let mut active = self.active.lock().unwrap();
            let in_flight = active.values().filter(|h| h.user_id == user_id).count();
            if in_flight >= max_concurrent {
                bail!("user {user_id} already has {in_flight} active workflows");
            }
            active.insert(workflow_id.clone(), handle.clone());
        }

        let engine = self.clone();
        tokio::spawn(async move {
            engine.run(handle, rx).await;
        });

        info!(%workflow_id, user_id, "workflow created");
        Ok(workflow_id)
    }

    /// Grant approval for a waiting step. Returns false when the workflow is
    /// not active or the step is not awaiting approval.
    pub async fn approve_step(&self, workflow_id: &str, step_id: &str) -> bool {
        let handle = self.active.lock().unwrap().get(workflow_id).cloned();
        let Some(handle) = handle else {
            return false;
        };

        {
            let mut wf = handle.instance.lock().await;
            let Some(step) = wf
                .steps
                .iter_mut()
                .find(|s| s.step_id == step_id && s.requires_approval && !s.approved)
            else {
                return false;
            };
            step.approved = true;
        }
        handle.signal.send_replace(());
        info!(workflow_id, step_id, "step approved");
        true
    }

    /// Cancel an active workflow. The driver task observes the status flip
    /// before starting its next step.
    pub async fn cancel_workflow(&self, workflow_id: &str) -> bool {
        let handle = self.active.lock().unwrap().get(workflow_id).cloned();
        let Some(handle) = handle else {
            return false;
        };

        {
            let mut wf = handle.instance.lock().await;
            if wf.overall_status.is_terminal() {
                return false;
            }
            wf.overall_status = WorkflowStatus::Cancelled;
            wf.completed_at = Some(Utc::now());
        }
        handle.signal.send_replace(());
        info!(workflow_id, "workflow cancelled");
        true
    }

    /// Current snapshot of a workflow, active or persisted.
    pub async fn get_workflow_status(&self, workflow_id: &str) -> Result<Option<WorkflowInstance>> {
        let handle = self.active.lock().unwrap().get(workflow_id).cloned();
        if let Some(handle) = handle {
            return Ok(Some(handle.instance.lock().await.clone()));
        }
        self.store.load_workflow(workflow_id).await
    }

    /// All workflows for a user, newest first. Active instances shadow
    /// whatever the store holds for the same id.
    pub async fn get_user_workflows(&self, user_id: &str) -> Result<Vec<WorkflowInstance>> {
        let handles: Vec<Arc<WorkflowHandle>> = self
            .active
            .lock()
            .unwrap()
            .values()
            .filter(|h| h.user_id == user_id)
            .cloned()
            .collect();

        let mut workflows = Vec::new();
        for handle in handles {
            workflows.push(handle.instance.lock().await.clone());
        }
        let active_ids: Vec<String> = workflows.iter().map(|w| w.workflow_id.clone()).collect();

        for wf in self.store.list_for_user(user_id).await? {
            if !active_ids.contains(&wf.workflow_id) {
                workflows.push(wf);
            }
        }
        workflows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(workflows)
    }

    pub async fn get_system_status(&self) -> Result<SystemStatus> {
        let handles: Vec<Arc<WorkflowHandle>> =
            self.active.lock().unwrap().values().cloned().collect();

        let mut status_distribution: BTreeMap<String, usize> = BTreeMap::new();
        let mut current_stage_distribution: BTreeMap<String, usize> = BTreeMap::new();
        for handle in &handles {
            let wf = handle.instance.lock().await;
            *status_distribution
                .entry(wf.overall_status.to_string())
                .or_default() += 1;
            if let Some(stage) = wf.current_stage() {
                *current_stage_distribution.entry(stage.to_string()).or_default() += 1;
            }
        }

        Ok(SystemStatus {
            total_active: handles.len(),
            total_completed: self.store.count().await?,
            status_distribution,
            current_stage_distribution,
        })
    }

    async fn run(self, handle: Arc<WorkflowHandle>, mut rx: watch::Receiver<()>) {
        let (workflow_id, step_count) = {
            let mut wf = handle.instance.lock().await;
            wf.overall_status = WorkflowStatus::InProgress;
            wf.started_at = Some(Utc::now());
            (wf.workflow_id.clone(), wf.steps.len())
        };
        info!(%workflow_id, "workflow started");

        for idx in 0..step_count {
            match self.drive_step(&handle, &mut rx, idx).await {
                StepEnd::Completed => {}
                StepEnd::Failed | StepEnd::Cancelled => break,
            }
        }

        self.finalize(&handle, &workflow_id).await;
    }

    /// Drive one step to a terminal state: gate on approval, execute with
    /// the configured retry policy, park again if the executor itself asks
    /// for approval.
    async fn drive_step(
        &self,
        handle: &Arc<WorkflowHandle>,
        rx: &mut watch::Receiver<()>,
        idx: usize,
    ) -> StepEnd {
        // Set once an execution has run and parked on NeedsApproval; the
        // eventual approval then completes the step without re-running it.
        let mut executed_pending_approval = false;

        'gate: loop {
            let parked = {
                let mut wf = handle.instance.lock().await;
                if wf.overall_status == WorkflowStatus::Cancelled {
                    return StepEnd::Cancelled;
                }
                let step = &mut wf.steps[idx];
                if step.requires_approval && !step.approved {
                    if step.status != WorkflowStatus::WaitingForApproval {
                        step.status = WorkflowStatus::WaitingForApproval;
                        let step_id = step.step_id.clone();
                        wf.overall_status = WorkflowStatus::WaitingForApproval;
                        info!(
                            workflow_id = %wf.workflow_id,
                            %step_id,
                            "waiting for approval"
                        );
                    }
                    true
                } else {
                    false
                }
            };
            if parked {
                if rx.changed().await.is_err() {
                    return StepEnd::Cancelled;
                }
                continue 'gate;
            }

            // Approval granted after the executor already ran: complete the
            // step with the result it produced back then.
            if executed_pending_approval {
                let mut wf = handle.instance.lock().await;
                let step = &mut wf.steps[idx];
                step.status = WorkflowStatus::Completed;
                step.completed_at = Some(Utc::now());
                let result = step.result.clone();
                let stage = step.stage;
                wf.final_results.insert(stage.to_string(), result);
                wf.overall_status = WorkflowStatus::InProgress;
                return StepEnd::Completed;
            }

            let mut attempt: u32 = 0;
            loop {
                let (ctx, stage) = {
                    let mut wf = handle.instance.lock().await;
                    if wf.overall_status == WorkflowStatus::Cancelled {
                        return StepEnd::Cancelled;
                    }
                    wf.overall_status = WorkflowStatus::InProgress;
                    let package = wf.package.clone();
                    let ctx = StepContext {
                        workflow_id: wf.workflow_id.clone(),
                        user_id: wf.user_id.clone(),
                        opportunity: wf.opportunity.clone(),
                        trigger: wf.trigger,
                        config: wf.config.clone(),
                        package,
                        approved: wf.steps[idx].approved,
                    };
                    let step = &mut wf.steps[idx];
                    step.status = WorkflowStatus::InProgress;
                    step.started_at.get_or_insert(Utc::now());
                    step.retry_count = attempt;
                    (ctx, step.stage)
                };
                let retry_enabled = ctx.config.retry_failed_stages;
                let max_retries = ctx.config.max_retries_per_stage;
                let retry_delay_ms = ctx.config.retry_delay_ms;

                let executor = StageExecutor::for_stage(stage);
                match executor.execute(&self.collaborators, &ctx).await {
                    Ok(StepOutcome::Completed { result, package }) => {
                        let submission_id = {
                            let mut wf = handle.instance.lock().await;
                            if let Some(package) = package {
                                wf.package = Some(package);
                            }
                            let step = &mut wf.steps[idx];
                            step.result = result.clone();
                            step.status = WorkflowStatus::Completed;
                            step.completed_at = Some(Utc::now());
                            wf.final_results.insert(stage.to_string(), result.clone());
                            info!(workflow_id = %wf.workflow_id, %stage, "step completed");
                            result["submission_id"].as_str().map(String::from)
                        };
                        if stage == WorkflowStage::Submission {
                            if let Some(submission_id) = submission_id {
                                self.start_tracking(handle, &submission_id).await;
                            }
                        }
                        return StepEnd::Completed;
                    }
                    Ok(StepOutcome::NeedsApproval { result }) => {
                        let mut wf = handle.instance.lock().await;
                        let step = &mut wf.steps[idx];
                        step.result = result;
                        step.requires_approval = true;
                        step.status = WorkflowStatus::WaitingForApproval;
                        wf.overall_status = WorkflowStatus::WaitingForApproval;
                        executed_pending_approval = true;
                        continue 'gate;
                    }
                    Err(StepError::Validation(message)) => {
                        // Business failures never retry.
                        self.fail_step(handle, idx, stage, &message).await;
                        return StepEnd::Failed;
                    }
                    Err(StepError::Collaborator(e)) => {
                        if retry_enabled && attempt < max_retries {
                            attempt += 1;
                            warn!(
                                workflow_id = %ctx.workflow_id,
                                %stage,
                                attempt,
                                error = %e,
                                "step failed, retrying"
                            );
                            sleep(Duration::from_millis(retry_delay_ms)).await;
                            continue;
                        }
                        self.fail_step(handle, idx, stage, &e.to_string()).await;
                        return StepEnd::Failed;
                    }
                }
            }
        }
    }

    async fn fail_step(
        &self,
        handle: &Arc<WorkflowHandle>,
        idx: usize,
        stage: WorkflowStage,
        message: &str,
    ) {
        let mut wf = handle.instance.lock().await;
        let step = &mut wf.steps[idx];
        step.status = WorkflowStatus::Failed;
        step.error_message = Some(message.to_string());
        step.completed_at = Some(Utc::now());
        wf.overall_status = WorkflowStatus::Failed;
        if stage == WorkflowStage::Submission {
            let fallback = manual_submission_fallback(&wf.opportunity);
            wf.final_results.insert("manual_submission".into(), fallback);
        }
        error!(workflow_id = %wf.workflow_id, %stage, message, "step failed");
    }

    /// Hand a successfully submitted application over to the status tracker.
    /// Tracking failures are logged, never propagated: the submission itself
    /// already happened.
    async fn start_tracking(&self, handle: &Arc<WorkflowHandle>, submission_id: &str) {
        let (user_id, opportunity) = {
            let wf = handle.instance.lock().await;
            (wf.user_id.clone(), wf.opportunity.clone())
        };
        if let Err(e) = self
            .tracker
            .create_application_tracking(
                submission_id,
                &user_id,
                &opportunity,
                ApplicationPriority::Medium,
            )
            .await
        {
            warn!(submission_id, error = %e, "failed to start application tracking");
        }
    }

    async fn finalize(&self, handle: &Arc<WorkflowHandle>, workflow_id: &str) {
        let snapshot = {
            let mut wf = handle.instance.lock().await;
            if !wf.overall_status.is_terminal()
                && wf
                    .steps
                    .iter()
                    .all(|s| s.status == WorkflowStatus::Completed)
            {
                wf.overall_status = WorkflowStatus::Completed;
            }
            wf.completed_at.get_or_insert(Utc::now());
            wf.clone()
        };

        if let Err(e) = self.store.save_workflow(&snapshot).await {
            error!(workflow_id, error = %e, "failed to persist workflow");
        }
        self.active.lock().unwrap().remove(workflow_id);
        info!(
            workflow_id,
            status = %snapshot.overall_status,
            completed_steps = snapshot.completed_steps(),
            "workflow finished"
        );
    }
}
