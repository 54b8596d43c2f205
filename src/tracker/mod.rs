//! Post-submission status tracking: lifecycle records, transition rules,
//! the tracker service and its background sweep.

pub mod model;
pub mod rules;
pub mod status;
pub mod sweep;

pub use model::{ApplicationPriority, ApplicationStage, EventKind, EventSource, TrackedApplication};
pub use rules::TransitionRules;
pub use status::{ApplicationStatistics, PendingFollowUp, StatusTracker};
pub use sweep::BackgroundScheduler;
