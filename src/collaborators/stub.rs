//! Conforming in-process collaborator implementations.
//!
//! Used by the demo CLI and by engine/tracker tests. The recording variants
//! remember every call so tests can assert on what the orchestration core
//! actually asked for.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

use anyhow::{Result, bail};
use async_trait::async_trait;
use serde_json::{Value, json};
use uuid::Uuid;

use super::{
    ApplicationPackage, DocumentGenerator, GeneratedDocument, GenerationRequest, InteractionKind,
    InteractionTracker, SubmissionConfig, SubmissionHandler, SuccessPrediction, SuccessPredictor,
};
use crate::opportunity::Opportunity;

/// Predictor that always returns the same overall score.
pub struct FixedPredictor {
    score: f64,
}

impl FixedPredictor {
    pub fn new(score: f64) -> Self {
        Self { score }
    }
}

#[async_trait]
impl SuccessPredictor for FixedPredictor {
    async fn predict_success(
        &self,
        _user_id: &str,
        opportunity: &Opportunity,
    ) -> Result<SuccessPrediction> {
        Ok(SuccessPrediction {
            overall_score: self.score,
            factors: json!({ "opportunity_id": opportunity.id }),
        })
    }
}

/// Generator that fills each requested document from a one-line template.
pub struct TemplateGenerator {
    quality: f64,
}

impl TemplateGenerator {
    pub fn new(quality: f64) -> Self {
        Self { quality }
    }
}

#[async_trait]
impl DocumentGenerator for TemplateGenerator {
    async fn generate_application_package(
        &self,
        request: &GenerationRequest,
    ) -> Result<ApplicationPackage> {
        let documents = request
            .documents_needed
            .iter()
            .map(|doc| GeneratedDocument {
                document_type: *doc,
                content: format!(
                    "[draft] {:?} for {} at {}",
                    doc, request.opportunity.title, request.opportunity.organization
                ),
                quality_score: self.quality,
            })
            .collect();
        Ok(ApplicationPackage {
            documents,
            overall_quality_score: self.quality,
        })
    }
}

/// Generator that fails every call. Exercises the retry policy.
#[derive(Default)]
pub struct FailingGenerator {
    calls: AtomicU32,
}

impl FailingGenerator {
    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentGenerator for FailingGenerator {
    async fn generate_application_package(
        &self,
        _request: &GenerationRequest,
    ) -> Result<ApplicationPackage> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        bail!("generation backend unavailable")
    }
}

/// Submitter that hands out fresh submission ids and records each call.
#[derive(Default)]
pub struct RecordingSubmitter {
    submissions: Mutex<Vec<(String, String, SubmissionConfig)>>,
}

impl RecordingSubmitter {
    /// `(user_id, opportunity_id, config)` for every accepted submission.
    pub fn submissions(&self) -> Vec<(String, String, SubmissionConfig)> {
        self.submissions.lock().unwrap().clone()
    }
}

#[async_trait]
impl SubmissionHandler for RecordingSubmitter {
    async fn submit_application(
        &self,
        user_id: &str,
        opportunity: &Opportunity,
        _package: &ApplicationPackage,
        config: &SubmissionConfig,
    ) -> Result<String> {
        self.submissions.lock().unwrap().push((
            user_id.to_string(),
            opportunity.id.clone(),
            config.clone(),
        ));
        Ok(Uuid::new_v4().to_string())
    }
}

/// Submitter that rejects every call. Exercises the manual fallback path.
#[derive(Default)]
pub struct FailingSubmitter;

#[async_trait]
impl SubmissionHandler for FailingSubmitter {
    async fn submit_application(
        &self,
        _user_id: &str,
        _opportunity: &Opportunity,
        _package: &ApplicationPackage,
        _config: &SubmissionConfig,
    ) -> Result<String> {
        bail!("submission endpoint rejected the request")
    }
}

/// Interaction tracker that records calls in memory.
#[derive(Default)]
pub struct RecordingInteractions {
    interactions: Mutex<Vec<(String, String, InteractionKind)>>,
}

impl RecordingInteractions {
    pub fn interactions(&self) -> Vec<(String, String, InteractionKind)> {
        self.interactions.lock().unwrap().clone()
    }
}

#[async_trait]
impl InteractionTracker for RecordingInteractions {
    async fn track_interaction(
        &self,
        user_id: &str,
        opportunity_id: &str,
        kind: InteractionKind,
        _context: Value,
    ) -> Result<()> {
        self.interactions.lock().unwrap().push((
            user_id.to_string(),
            opportunity_id.to_string(),
            kind,
        ));
        Ok(())
    }
}
