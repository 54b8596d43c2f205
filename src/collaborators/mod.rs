//! Contracts for the external collaborators the orchestration core calls.
//!
//! Success prediction, document generation, submission delivery and
//! interaction tracking are implemented elsewhere; the engine and tracker
//! only depend on the traits here and run against any conforming
//! implementation, including the test doubles in [`stub`].

pub mod stub;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::opportunity::{ApplicationType, DocumentType, Opportunity};

/// Outcome of the success-prediction collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessPrediction {
    /// Overall probability-of-success estimate in `[0, 1]`.
    pub overall_score: f64,
    /// Collaborator-specific breakdown; opaque to the orchestration core.
    #[serde(default)]
    pub factors: Value,
}

/// How the generator should produce documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationMode {
    /// No human in the loop; the generator makes all content decisions.
    Automated,
    /// Drafts are produced for a human to refine.
    Assisted,
}

/// Request handed to the document-generation collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub user_id: String,
    pub opportunity: Opportunity,
    pub application_type: ApplicationType,
    pub documents_needed: Vec<DocumentType>,
    pub mode: GenerationMode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedDocument {
    pub document_type: DocumentType,
    pub content: String,
    pub quality_score: f64,
}

/// The complete set of generated materials for one application.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationPackage {
    pub documents: Vec<GeneratedDocument>,
    pub overall_quality_score: f64,
}

/// Where a finished application gets delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionPlatform {
    Email,
    Linkedin,
    CompanyWebsite,
    /// No delivery channel could be determined; a human takes over.
    ManualReview,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionMethod {
    Automatic,
    SemiAutomated,
    Manual,
}

/// Delivery parameters handed to the submission collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionConfig {
    pub platform: SubmissionPlatform,
    pub method: SubmissionMethod,
    pub auto_submit: bool,
    pub require_confirmation: bool,
    /// Channel-specific fields (recipient address, URLs, subject line).
    #[serde(default)]
    pub custom_fields: serde_json::Map<String, Value>,
}

/// User interactions recorded against an opportunity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    View,
    Save,
    Apply,
    Dismiss,
}

#[async_trait]
pub trait SuccessPredictor: Send + Sync {
    async fn predict_success(
        &self,
        user_id: &str,
        opportunity: &Opportunity,
    ) -> Result<SuccessPrediction>;
}

#[async_trait]
pub trait DocumentGenerator: Send + Sync {
    async fn generate_application_package(
        &self,
        request: &GenerationRequest,
    ) -> Result<ApplicationPackage>;
}

#[async_trait]
pub trait SubmissionHandler: Send + Sync {
    /// Deliver the package. Returns the collaborator-assigned submission id.
    async fn submit_application(
        &self,
        user_id: &str,
        opportunity: &Opportunity,
        package: &ApplicationPackage,
        config: &SubmissionConfig,
    ) -> Result<String>;
}

#[async_trait]
pub trait InteractionTracker: Send + Sync {
    async fn track_interaction(
        &self,
        user_id: &str,
        opportunity_id: &str,
        kind: InteractionKind,
        context: Value,
    ) -> Result<()>;
}

/// The bundle of collaborator handles injected into the engine and tracker.
#[derive(Clone)]
pub struct Collaborators {
    pub predictor: Arc<dyn SuccessPredictor>,
    pub generator: Arc<dyn DocumentGenerator>,
    pub submitter: Arc<dyn SubmissionHandler>,
    pub interactions: Arc<dyn InteractionTracker>,
}

impl Collaborators {
    /// A fully stubbed bundle, good enough for the demo CLI and tests.
    pub fn stubs() -> Self {
        Self {
            predictor: Arc::new(stub::FixedPredictor::new(0.75)),
            generator: Arc::new(stub::TemplateGenerator::new(0.82)),
            submitter: Arc::new(stub::RecordingSubmitter::default()),
            interactions: Arc::new(stub::RecordingInteractions::default()),
        }
    }
}
