use thiserror::Error;

use crate::tracker::model::ApplicationStage;

/// Classifies a step failure for the workflow retry policy.
///
/// Validation failures are terminal for the step; collaborator failures are
/// retried up to the configured bound before the step is marked failed.
#[derive(Debug, Error)]
pub enum StepError {
    /// Invalid input or missing prerequisite (e.g., no package to submit).
    #[error("validation failure: {0}")]
    Validation(String),

    /// An external collaborator call failed (prediction, generation, submission).
    #[error("collaborator failure: {0}")]
    Collaborator(#[source] anyhow::Error),
}

#[derive(Debug, Error)]
pub enum TrackerError {
    /// The requested stage change is not allowed from the current stage.
    #[error("invalid stage transition: {from} -> {to}")]
    InvalidTransition {
        from: ApplicationStage,
        to: ApplicationStage,
    },

    #[error("store error: {0}")]
    Store(#[from] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_error_display() {
        let e = StepError::Validation("no application package".into());
        assert_eq!(e.to_string(), "validation failure: no application package");

        let e = StepError::Collaborator(anyhow::anyhow!("generator timed out"));
        assert_eq!(e.to_string(), "collaborator failure: generator timed out");
    }

    #[test]
    fn tracker_error_display() {
        let e = TrackerError::InvalidTransition {
            from: ApplicationStage::Rejected,
            to: ApplicationStage::Screening,
        };
        assert_eq!(e.to_string(), "invalid stage transition: rejected -> screening");
    }
}
