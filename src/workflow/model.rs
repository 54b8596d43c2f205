//! Data model for workflow instances and their pipeline steps.
//!
//! A [`WorkflowInstance`] is one end-to-end automation run for a
//! (user, opportunity) pair, driving the application through
//! discovery → analysis → generation → review → submission. The step
//! sequence is fixed at creation and never changes afterwards.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

use crate::collaborators::ApplicationPackage;
use crate::opportunity::Opportunity;

/// The five pipeline stages. Executor dispatch matches exhaustively over
/// this enum, so there is no such thing as a stage without an executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStage {
    Discovery,
    Analysis,
    Generation,
    Review,
    Submission,
}

impl fmt::Display for WorkflowStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkflowStage::Discovery => "discovery",
            WorkflowStage::Analysis => "analysis",
            WorkflowStage::Generation => "generation",
            WorkflowStage::Review => "review",
            WorkflowStage::Submission => "submission",
        };
        write!(f, "{s}")
    }
}

/// Execution status shared by workflows and their steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Pending,
    InProgress,
    WaitingForApproval,
    Completed,
    Failed,
    Cancelled,
}

impl WorkflowStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkflowStatus::Completed | WorkflowStatus::Failed | WorkflowStatus::Cancelled
        )
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkflowStatus::Pending => "pending",
            WorkflowStatus::InProgress => "in_progress",
            WorkflowStatus::WaitingForApproval => "waiting_for_approval",
            WorkflowStatus::Completed => "completed",
            WorkflowStatus::Failed => "failed",
            WorkflowStatus::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

/// How much of the pipeline runs without a human in the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutomationLevel {
    FullyAutomated,
    SemiAutomated,
    Assisted,
    Manual,
}

/// What caused a workflow to be created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowTrigger {
    UserRequest,
    Scheduled,
    OpportunityMatch,
    DeadlineApproaching,
    SuccessPredictionHigh,
}

impl fmt::Display for WorkflowTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkflowTrigger::UserRequest => "user_request",
            WorkflowTrigger::Scheduled => "scheduled",
            WorkflowTrigger::OpportunityMatch => "opportunity_match",
            WorkflowTrigger::DeadlineApproaching => "deadline_approaching",
            WorkflowTrigger::SuccessPredictionHigh => "success_prediction_high",
        };
        write!(f, "{s}")
    }
}

/// Relative weights used when ranking concurrent applications.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriorityWeights {
    pub deadline_urgency: f64,
    pub success_probability: f64,
    pub user_interest: f64,
}

impl Default for PriorityWeights {
    fn default() -> Self {
        Self {
            deadline_urgency: 0.3,
            success_probability: 0.4,
            user_interest: 0.3,
        }
    }
}

/// Which lifecycle moments generate a user notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationPreferences {
    pub stage_completion: bool,
    pub approval_needed: bool,
    pub errors: bool,
    pub final_results: bool,
}

impl Default for NotificationPreferences {
    fn default() -> Self {
        Self {
            stage_completion: true,
            approval_needed: true,
            errors: true,
            final_results: true,
        }
    }
}

/// Immutable configuration snapshot taken when a workflow is created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    pub automation_level: AutomationLevel,
    pub require_review: bool,
    pub auto_submit: bool,
    pub max_concurrent_applications: u32,
    pub success_probability_threshold: f64,
    /// Review auto-approves above this package quality on fully automated runs.
    pub quality_auto_approve_threshold: f64,
    pub priority_weights: PriorityWeights,
    pub retry_failed_stages: bool,
    pub max_retries_per_stage: u32,
    /// Fixed delay between retry attempts of a failed step.
    pub retry_delay_ms: u64,
    pub notifications: NotificationPreferences,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            automation_level: AutomationLevel::SemiAutomated,
            require_review: true,
            auto_submit: false,
            max_concurrent_applications: 3,
            success_probability_threshold: 0.6,
            quality_auto_approve_threshold: 0.7,
            priority_weights: PriorityWeights::default(),
            retry_failed_stages: true,
            max_retries_per_stage: 2,
            retry_delay_ms: 30_000,
            notifications: NotificationPreferences::default(),
        }
    }
}

/// One stage-scoped unit of work within a workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub step_id: String,
    pub stage: WorkflowStage,
    pub name: String,
    pub description: String,
    pub status: WorkflowStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Executor result payload, set on completion.
    pub result: Value,
    pub error_message: Option<String>,
    pub requires_approval: bool,
    pub approved: bool,
    /// Retries consumed so far (0 on the first attempt).
    pub retry_count: u32,
}

impl WorkflowStep {
    fn new(
        workflow_id: &str,
        stage: WorkflowStage,
        name: &str,
        description: &str,
        requires_approval: bool,
    ) -> Self {
        Self {
            step_id: format!("{workflow_id}-{stage}"),
            stage,
            name: name.to_string(),
            description: description.to_string(),
            status: WorkflowStatus::Pending,
            started_at: None,
            completed_at: None,
            result: Value::Null,
            error_message: None,
            requires_approval,
            approved: false,
            retry_count: 0,
        }
    }

    pub fn duration(&self) -> Option<Duration> {
        Some(self.completed_at? - self.started_at?)
    }
}

/// One automation run for a (user, opportunity) pair.
///
/// Owned exclusively by the workflow engine for its lifetime. The step
/// sequence is immutable after creation; the engine and approval API are
/// the only writers of step state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowInstance {
    pub workflow_id: String,
    pub user_id: String,
    pub opportunity: Opportunity,
    pub trigger: WorkflowTrigger,
    pub config: WorkflowConfig,
    pub steps: Vec<WorkflowStep>,
    pub overall_status: WorkflowStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Generated materials, populated by the generation step and consumed
    /// by review and submission.
    pub package: Option<ApplicationPackage>,
    /// Final result bag: summary values accumulated across steps.
    pub final_results: serde_json::Map<String, Value>,
}

impl WorkflowInstance {
    pub fn new(
        user_id: &str,
        opportunity: Opportunity,
        trigger: WorkflowTrigger,
        config: WorkflowConfig,
    ) -> Self {
        let workflow_id = Uuid::new_v4().to_string();
        let steps = Self::build_steps(&workflow_id, &config);
        Self {
            workflow_id,
            user_id: user_id.to_string(),
            opportunity,
            trigger,
            config,
            steps,
            overall_status: WorkflowStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            package: None,
            final_results: serde_json::Map::new(),
        }
    }

    /// The fixed step sequence for a new workflow. Review is only present
    /// when the config demands it, and requires explicit approval unless
    /// the run is fully automated.
    fn build_steps(workflow_id: &str, config: &WorkflowConfig) -> Vec<WorkflowStep> {
        let mut steps = vec![
            WorkflowStep::new(
                workflow_id,
                WorkflowStage::Discovery,
                "Opportunity Discovery",
                "Initial opportunity analysis and data collection",
                false,
            ),
            WorkflowStep::new(
                workflow_id,
                WorkflowStage::Analysis,
                "Success Analysis",
                "Predict success probability and analyze fit",
                false,
            ),
            WorkflowStep::new(
                workflow_id,
                WorkflowStage::Generation,
                "Document Generation",
                "Generate application documents and materials",
                false,
            ),
        ];
        if config.require_review {
            steps.push(WorkflowStep::new(
                workflow_id,
                WorkflowStage::Review,
                "Application Review",
                "Review generated materials for quality and accuracy",
                config.automation_level != AutomationLevel::FullyAutomated,
            ));
        }
        steps.push(WorkflowStep::new(
            workflow_id,
            WorkflowStage::Submission,
            "Application Submission",
            "Submit application to target platform",
            false,
        ));
        steps
    }

    pub fn completed_steps(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| s.status == WorkflowStatus::Completed)
            .count()
    }

    pub fn failed_steps(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| s.status == WorkflowStatus::Failed)
            .count()
    }

    /// The stage of the step currently in progress, if any.
    pub fn current_stage(&self) -> Option<WorkflowStage> {
        self.steps
            .iter()
            .find(|s| s.status == WorkflowStatus::InProgress)
            .map(|s| s.stage)
    }

    pub fn step(&self, step_id: &str) -> Option<&WorkflowStep> {
        self.steps.iter().find(|s| s.step_id == step_id)
    }

    pub fn duration(&self) -> Option<Duration> {
        Some(self.completed_at? - self.started_at?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opportunity() -> Opportunity {
        Opportunity {
            id: "opp-1".into(),
            title: "Platform Engineer".into(),
            organization: "Acme".into(),
            description: String::new(),
            apply_url: None,
            url: None,
        }
    }

    #[test]
    fn new_workflow_has_full_pipeline() {
        let wf = WorkflowInstance::new(
            "u1",
            opportunity(),
            WorkflowTrigger::UserRequest,
            WorkflowConfig::default(),
        );

        let stages: Vec<_> = wf.steps.iter().map(|s| s.stage).collect();
        assert_eq!(
            stages,
            vec![
                WorkflowStage::Discovery,
                WorkflowStage::Analysis,
                WorkflowStage::Generation,
                WorkflowStage::Review,
                WorkflowStage::Submission,
            ]
        );
        assert_eq!(wf.overall_status, WorkflowStatus::Pending);
        assert_eq!(wf.completed_steps(), 0);
    }

    #[test]
    fn review_step_omitted_when_not_required() {
        let config = WorkflowConfig {
            require_review: false,
            ..Default::default()
        };
        let wf = WorkflowInstance::new("u1", opportunity(), WorkflowTrigger::Scheduled, config);
        assert!(wf.steps.iter().all(|s| s.stage != WorkflowStage::Review));
        assert_eq!(wf.steps.len(), 4);
    }

    #[test]
    fn review_approval_depends_on_automation_level() {
        let semi = WorkflowInstance::new(
            "u1",
            opportunity(),
            WorkflowTrigger::UserRequest,
            WorkflowConfig::default(),
        );
        let review = semi
            .steps
            .iter()
            .find(|s| s.stage == WorkflowStage::Review)
            .unwrap();
        assert!(review.requires_approval);

        let auto = WorkflowInstance::new(
            "u1",
            opportunity(),
            WorkflowTrigger::UserRequest,
            WorkflowConfig {
                automation_level: AutomationLevel::FullyAutomated,
                ..Default::default()
            },
        );
        let review = auto
            .steps
            .iter()
            .find(|s| s.stage == WorkflowStage::Review)
            .unwrap();
        assert!(!review.requires_approval);
    }

    #[test]
    fn step_ids_are_deterministic() {
        let wf = WorkflowInstance::new(
            "u1",
            opportunity(),
            WorkflowTrigger::UserRequest,
            WorkflowConfig::default(),
        );
        assert_eq!(
            wf.steps[0].step_id,
            format!("{}-discovery", wf.workflow_id)
        );
        assert!(wf.step(&format!("{}-submission", wf.workflow_id)).is_some());
    }

    #[test]
    fn workflow_serialization_roundtrip() {
        let wf = WorkflowInstance::new(
            "u1",
            opportunity(),
            WorkflowTrigger::OpportunityMatch,
            WorkflowConfig::default(),
        );
        let json = serde_json::to_string(&wf).unwrap();
        let back: WorkflowInstance = serde_json::from_str(&json).unwrap();
        assert_eq!(back.workflow_id, wf.workflow_id);
        assert_eq!(back.steps.len(), wf.steps.len());
        assert_eq!(back.trigger, WorkflowTrigger::OpportunityMatch);
    }

    #[test]
    fn status_terminality() {
        assert!(WorkflowStatus::Completed.is_terminal());
        assert!(WorkflowStatus::Failed.is_terminal());
        assert!(WorkflowStatus::Cancelled.is_terminal());
        assert!(!WorkflowStatus::WaitingForApproval.is_terminal());
        assert!(!WorkflowStatus::InProgress.is_terminal());
    }
}
