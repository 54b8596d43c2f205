//! pursuit — application lifecycle orchestration.
//!
//! Two cooperating services automate the pursuit of jobs, grants and
//! scholarships:
//!
//! - the [`workflow`] engine drives a submission pipeline
//!   (discovery → analysis → generation → review → submission) for each
//!   application, with approval gates and per-stage retries;
//! - the [`tracker`] owns the canonical post-submission record, advancing
//!   stages by rule, scheduling follow-ups and flagging stale applications.
//!
//! External capabilities (success prediction, document generation,
//! submission delivery, interaction logging) enter through the
//! [`collaborators`] traits; persistence enters through the [`store`]
//! traits. Everything in between is deterministic orchestration.

pub mod cli;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod opportunity;
pub mod store;
pub mod tracker;
pub mod ui;
pub mod workflow;

pub use collaborators::Collaborators;
pub use config::PursuitConfig;
pub use error::{StepError, TrackerError};
pub use opportunity::Opportunity;
pub use store::{ApplicationStore, MemoryApplicationStore, MemoryWorkflowStore, WorkflowStore};
pub use tracker::{BackgroundScheduler, StatusTracker, TransitionRules};
pub use workflow::{WorkflowConfig, WorkflowEngine, WorkflowTrigger};
