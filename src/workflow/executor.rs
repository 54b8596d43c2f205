//! Stage executors — the closed set of work units the engine dispatches.
//!
//! Each pipeline stage maps to exactly one [`StageExecutor`] variant through
//! an exhaustive match, and every variant speaks the same contract: take a
//! [`StepContext`] snapshot, call out to the relevant collaborator, and
//! return a [`StepOutcome`] or a classified [`StepError`].

use serde_json::{Value, json};
use tracing::warn;

use crate::collaborators::{
    ApplicationPackage, Collaborators, GenerationMode, GenerationRequest, InteractionKind,
    SubmissionConfig, SubmissionMethod, SubmissionPlatform,
};
use crate::error::StepError;
use crate::opportunity::{ApplicationType, Opportunity, find_email};
use crate::workflow::model::{AutomationLevel, WorkflowConfig, WorkflowStage, WorkflowTrigger};

/// Snapshot of the workflow state a step execution needs. Built by the
/// engine under the instance lock, then used without holding it.
#[derive(Debug, Clone)]
pub struct StepContext {
    pub workflow_id: String,
    pub user_id: String,
    pub opportunity: Opportunity,
    pub trigger: WorkflowTrigger,
    pub config: WorkflowConfig,
    /// Package produced by the generation step, when one exists yet.
    pub package: Option<ApplicationPackage>,
    /// Whether the step being executed has already been approved.
    pub approved: bool,
}

/// What a successful executor run produced.
#[derive(Debug)]
pub enum StepOutcome {
    Completed {
        result: Value,
        /// Set by the generation executor; the engine stores it on the instance.
        package: Option<ApplicationPackage>,
    },
    /// The step ran but cannot complete without explicit approval.
    NeedsApproval { result: Value },
}

/// One executor per pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageExecutor {
    Discovery,
    Analysis,
    Generation,
    Review,
    Submission,
}

impl StageExecutor {
    pub fn for_stage(stage: WorkflowStage) -> Self {
        match stage {
            WorkflowStage::Discovery => StageExecutor::Discovery,
            WorkflowStage::Analysis => StageExecutor::Analysis,
            WorkflowStage::Generation => StageExecutor::Generation,
            WorkflowStage::Review => StageExecutor::Review,
            WorkflowStage::Submission => StageExecutor::Submission,
        }
    }

    pub async fn execute(
        &self,
        collaborators: &Collaborators,
        ctx: &StepContext,
    ) -> Result<StepOutcome, StepError> {
        match self {
            StageExecutor::Discovery => execute_discovery(collaborators, ctx).await,
            StageExecutor::Analysis => execute_analysis(collaborators, ctx).await,
            StageExecutor::Generation => execute_generation(collaborators, ctx).await,
            StageExecutor::Review => execute_review(ctx).await,
            StageExecutor::Submission => execute_submission(collaborators, ctx).await,
        }
    }
}

/// Record a view-style interaction with the opportunity.
async fn execute_discovery(
    collaborators: &Collaborators,
    ctx: &StepContext,
) -> Result<StepOutcome, StepError> {
    collaborators
        .interactions
        .track_interaction(
            &ctx.user_id,
            &ctx.opportunity.id,
            InteractionKind::View,
            json!({ "workflow_discovery": true, "trigger": ctx.trigger.to_string() }),
        )
        .await
        .map_err(StepError::Collaborator)?;

    Ok(StepOutcome::Completed {
        result: json!({
            "opportunity_discovered": true,
            "initial_analysis_completed": true,
            "discovery_method": ctx.trigger.to_string(),
        }),
        package: None,
    })
}

/// Ask the success predictor whether this opportunity clears the configured
/// threshold. A low score on a fully automated run is annotated, never a
/// hard stop.
async fn execute_analysis(
    collaborators: &Collaborators,
    ctx: &StepContext,
) -> Result<StepOutcome, StepError> {
    let prediction = collaborators
        .predictor
        .predict_success(&ctx.user_id, &ctx.opportunity)
        .await
        .map_err(StepError::Collaborator)?;

    let threshold = ctx.config.success_probability_threshold;
    let meets_threshold = prediction.overall_score >= threshold;

    let mut result = json!({
        "success_score": prediction.overall_score,
        "success_threshold": threshold,
        "meets_threshold": meets_threshold,
        "recommendation": if meets_threshold { "proceed" } else { "review_carefully" },
        "factors": prediction.factors,
    });
    if ctx.config.automation_level == AutomationLevel::FullyAutomated && !meets_threshold {
        result["auto_stop_recommended"] = json!(true);
    }

    Ok(StepOutcome::Completed {
        result,
        package: None,
    })
}

/// Classify the opportunity, derive the document set and call the generator.
async fn execute_generation(
    collaborators: &Collaborators,
    ctx: &StepContext,
) -> Result<StepOutcome, StepError> {
    let application_type = ApplicationType::classify(&ctx.opportunity);
    let documents_needed = application_type.documents_needed();
    let mode = if ctx.config.automation_level == AutomationLevel::FullyAutomated {
        GenerationMode::Automated
    } else {
        GenerationMode::Assisted
    };

    let request = GenerationRequest {
        user_id: ctx.user_id.clone(),
        opportunity: ctx.opportunity.clone(),
        application_type,
        documents_needed,
        mode,
    };
    let package = collaborators
        .generator
        .generate_application_package(&request)
        .await
        .map_err(StepError::Collaborator)?;

    Ok(StepOutcome::Completed {
        result: json!({
            "application_type": application_type.to_string(),
            "documents_generated": package.documents.len(),
            "overall_quality": package.overall_quality_score,
        }),
        package: Some(package),
    })
}

/// Review gate. Auto-approves fully automated runs whose package quality
/// clears the configured threshold; everything else waits for a human.
async fn execute_review(ctx: &StepContext) -> Result<StepOutcome, StepError> {
    if !ctx.config.require_review {
        return Ok(StepOutcome::Completed {
            result: json!({ "review_skipped": true, "auto_approved": true }),
            package: None,
        });
    }

    // A granted approval completes the review without re-judging quality.
    if ctx.approved {
        return Ok(StepOutcome::Completed {
            result: json!({ "manually_approved": true }),
            package: None,
        });
    }

    if ctx.config.automation_level == AutomationLevel::FullyAutomated {
        let package = ctx
            .package
            .as_ref()
            .ok_or_else(|| StepError::Validation("no application package to review".into()))?;
        if package.overall_quality_score > ctx.config.quality_auto_approve_threshold {
            return Ok(StepOutcome::Completed {
                result: json!({ "auto_approved": true, "quality_check_passed": true }),
                package: None,
            });
        }
        return Ok(StepOutcome::NeedsApproval {
            result: json!({ "manual_review_required": true, "quality_concerns": true }),
        });
    }

    Ok(StepOutcome::NeedsApproval {
        result: json!({ "awaiting_user_approval": true }),
    })
}

/// Route the package to a delivery channel and hand it to the submitter.
async fn execute_submission(
    collaborators: &Collaborators,
    ctx: &StepContext,
) -> Result<StepOutcome, StepError> {
    let package = ctx
        .package
        .as_ref()
        .ok_or_else(|| StepError::Validation("no application package available for submission".into()))?;

    let (platform, method) = submission_route(&ctx.opportunity);
    let config = SubmissionConfig {
        platform,
        method,
        auto_submit: ctx.config.auto_submit,
        require_confirmation: !ctx.config.auto_submit
            || ctx.config.automation_level != AutomationLevel::FullyAutomated,
        custom_fields: submission_fields(&ctx.opportunity),
    };

    let submission_id = collaborators
        .submitter
        .submit_application(&ctx.user_id, &ctx.opportunity, package, &config)
        .await
        .map_err(StepError::Collaborator)?;

    // The application is already delivered; a tracking hiccup must not fail
    // the step and provoke a duplicate submission on retry.
    if let Err(e) = collaborators
        .interactions
        .track_interaction(
            &ctx.user_id,
            &ctx.opportunity.id,
            InteractionKind::Apply,
            json!({ "workflow_submission": true, "submission_id": submission_id }),
        )
        .await
    {
        warn!(workflow_id = %ctx.workflow_id, error = %e, "failed to record apply interaction");
    }

    Ok(StepOutcome::Completed {
        result: json!({
            "submission_id": submission_id,
            "platform": platform,
            "method": method,
            "submission_initiated": true,
        }),
        package: None,
    })
}

/// Pick the delivery channel from what the posting exposes: an email
/// address beats a known platform beats a bare application URL; anything
/// else goes to manual review.
pub fn submission_route(opportunity: &Opportunity) -> (SubmissionPlatform, SubmissionMethod) {
    let description = opportunity.description.to_lowercase();
    if find_email(&opportunity.description).is_some() {
        (SubmissionPlatform::Email, SubmissionMethod::Automatic)
    } else if description.contains("linkedin") {
        (SubmissionPlatform::Linkedin, SubmissionMethod::SemiAutomated)
    } else if opportunity.apply_url.is_some() || opportunity.url.is_some() {
        (SubmissionPlatform::CompanyWebsite, SubmissionMethod::Manual)
    } else {
        (SubmissionPlatform::ManualReview, SubmissionMethod::Manual)
    }
}

/// Channel-specific fields extracted from the posting.
fn submission_fields(opportunity: &Opportunity) -> serde_json::Map<String, Value> {
    let mut fields = serde_json::Map::new();
    if let Some(email) = find_email(&opportunity.description) {
        fields.insert("recipient_email".into(), json!(email));
    }
    if let Some(url) = &opportunity.apply_url {
        fields.insert("application_url".into(), json!(url));
    } else if let Some(url) = &opportunity.url {
        fields.insert("job_url".into(), json!(url));
    }
    fields.insert(
        "subject".into(),
        json!(format!(
            "Application for {} at {}",
            opportunity.title, opportunity.organization
        )),
    );
    fields
}

/// Instruction payload recorded when submission fails for good: the user
/// still has the generated package and needs to know where to send it.
pub fn manual_submission_fallback(opportunity: &Opportunity) -> Value {
    let mut fallback = json!({
        "instructions": "Automated submission failed; submit the generated documents manually.",
        "subject": format!(
            "Application for {} at {}",
            opportunity.title, opportunity.organization
        ),
    });
    if let Some(email) = find_email(&opportunity.description) {
        fallback["recipient_email"] = json!(email);
    }
    if let Some(url) = opportunity.apply_url.as_ref().or(opportunity.url.as_ref()) {
        fallback["application_url"] = json!(url);
    }
    fallback
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::stub::{
        FixedPredictor, RecordingInteractions, RecordingSubmitter, TemplateGenerator,
    };
    use std::sync::Arc;

    fn opportunity() -> Opportunity {
        Opportunity {
            id: "opp-1".into(),
            title: "Platform Engineer".into(),
            organization: "Acme".into(),
            description: "Build infrastructure. Apply via careers portal.".into(),
            apply_url: Some("https://acme.example.com/jobs/42".into()),
            url: None,
        }
    }

    fn context(config: WorkflowConfig) -> StepContext {
        StepContext {
            workflow_id: "wf-test".into(),
            user_id: "u1".into(),
            opportunity: opportunity(),
            trigger: WorkflowTrigger::UserRequest,
            config,
            package: None,
            approved: false,
        }
    }

    fn collaborators() -> Collaborators {
        Collaborators {
            predictor: Arc::new(FixedPredictor::new(0.8)),
            generator: Arc::new(TemplateGenerator::new(0.9)),
            submitter: Arc::new(RecordingSubmitter::default()),
            interactions: Arc::new(RecordingInteractions::default()),
        }
    }

    fn package(quality: f64) -> ApplicationPackage {
        ApplicationPackage {
            documents: vec![],
            overall_quality_score: quality,
        }
    }

    #[tokio::test]
    async fn analysis_flags_low_score_on_fully_automated_run() {
        let collab = Collaborators {
            predictor: Arc::new(FixedPredictor::new(0.3)),
            ..collaborators()
        };
        let ctx = context(WorkflowConfig {
            automation_level: AutomationLevel::FullyAutomated,
            ..Default::default()
        });

        let outcome = StageExecutor::Analysis.execute(&collab, &ctx).await.unwrap();
        let StepOutcome::Completed { result, .. } = outcome else {
            panic!("expected completion");
        };
        assert_eq!(result["meets_threshold"], json!(false));
        assert_eq!(result["auto_stop_recommended"], json!(true));
        assert_eq!(result["recommendation"], json!("review_carefully"));
    }

    #[tokio::test]
    async fn analysis_proceeds_above_threshold() {
        let ctx = context(WorkflowConfig::default());
        let outcome = StageExecutor::Analysis
            .execute(&collaborators(), &ctx)
            .await
            .unwrap();
        let StepOutcome::Completed { result, .. } = outcome else {
            panic!("expected completion");
        };
        assert_eq!(result["meets_threshold"], json!(true));
        assert_eq!(result["recommendation"], json!("proceed"));
        assert!(result.get("auto_stop_recommended").is_none());
    }

    #[tokio::test]
    async fn generation_returns_package() {
        let ctx = context(WorkflowConfig::default());
        let outcome = StageExecutor::Generation
            .execute(&collaborators(), &ctx)
            .await
            .unwrap();
        let StepOutcome::Completed { result, package } = outcome else {
            panic!("expected completion");
        };
        let package = package.expect("generation must yield a package");
        assert_eq!(package.documents.len(), 2);
        assert_eq!(result["documents_generated"], json!(2));
    }

    #[tokio::test]
    async fn review_auto_approves_high_quality_automated_run() {
        let mut ctx = context(WorkflowConfig {
            automation_level: AutomationLevel::FullyAutomated,
            ..Default::default()
        });
        ctx.package = Some(package(0.9));

        let outcome = StageExecutor::Review
            .execute(&collaborators(), &ctx)
            .await
            .unwrap();
        let StepOutcome::Completed { result, .. } = outcome else {
            panic!("expected completion");
        };
        assert_eq!(result["auto_approved"], json!(true));
    }

    #[tokio::test]
    async fn review_escalates_low_quality_automated_run() {
        let mut ctx = context(WorkflowConfig {
            automation_level: AutomationLevel::FullyAutomated,
            ..Default::default()
        });
        ctx.package = Some(package(0.5));

        let outcome = StageExecutor::Review
            .execute(&collaborators(), &ctx)
            .await
            .unwrap();
        assert!(matches!(outcome, StepOutcome::NeedsApproval { .. }));
    }

    #[tokio::test]
    async fn review_completes_once_approved() {
        let mut ctx = context(WorkflowConfig::default());
        ctx.package = Some(package(0.5));
        ctx.approved = true;

        let outcome = StageExecutor::Review
            .execute(&collaborators(), &ctx)
            .await
            .unwrap();
        let StepOutcome::Completed { result, .. } = outcome else {
            panic!("expected completion");
        };
        assert_eq!(result["manually_approved"], json!(true));
    }

    #[tokio::test]
    async fn submission_requires_a_package() {
        let ctx = context(WorkflowConfig::default());
        let err = StageExecutor::Submission
            .execute(&collaborators(), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, StepError::Validation(_)));
    }

    #[tokio::test]
    async fn submission_delivers_and_records_apply() {
        let submitter = Arc::new(RecordingSubmitter::default());
        let interactions = Arc::new(RecordingInteractions::default());
        let collab = Collaborators {
            submitter: submitter.clone(),
            interactions: interactions.clone(),
            ..collaborators()
        };
        let mut ctx = context(WorkflowConfig::default());
        ctx.package = Some(package(0.9));

        let outcome = StageExecutor::Submission.execute(&collab, &ctx).await.unwrap();
        let StepOutcome::Completed { result, .. } = outcome else {
            panic!("expected completion");
        };
        assert!(result["submission_id"].as_str().is_some());
        assert_eq!(submitter.submissions().len(), 1);
        assert!(
            interactions
                .interactions()
                .iter()
                .any(|(_, _, kind)| *kind == InteractionKind::Apply)
        );
    }

    #[test]
    fn routing_prefers_email_over_url() {
        let mut opp = opportunity();
        opp.description = "Send applications to jobs@acme.example.com".into();
        assert_eq!(
            submission_route(&opp),
            (SubmissionPlatform::Email, SubmissionMethod::Automatic)
        );
    }

    #[test]
    fn routing_linkedin_then_website_then_manual() {
        let mut opp = opportunity();
        opp.description = "Apply through our LinkedIn page".into();
        opp.apply_url = None;
        assert_eq!(
            submission_route(&opp),
            (SubmissionPlatform::Linkedin, SubmissionMethod::SemiAutomated)
        );

        opp.description = "Great role".into();
        opp.apply_url = Some("https://acme.example.com/apply".into());
        assert_eq!(
            submission_route(&opp),
            (SubmissionPlatform::CompanyWebsite, SubmissionMethod::Manual)
        );

        opp.apply_url = None;
        assert_eq!(
            submission_route(&opp),
            (SubmissionPlatform::ManualReview, SubmissionMethod::Manual)
        );
    }

    #[test]
    fn manual_fallback_carries_contact_details() {
        let mut opp = opportunity();
        opp.description = "Contact hiring@acme.example.com with questions".into();
        let fallback = manual_submission_fallback(&opp);
        assert_eq!(fallback["recipient_email"], json!("hiring@acme.example.com"));
        assert_eq!(
            fallback["application_url"],
            json!("https://acme.example.com/jobs/42")
        );
    }
}
