//! Automated application pipelines: instance model, stage executors and the
//! engine that drives them.

pub mod engine;
pub mod executor;
pub mod model;

pub use engine::{SystemStatus, WorkflowEngine};
pub use model::{
    AutomationLevel, WorkflowConfig, WorkflowInstance, WorkflowStage, WorkflowStatus,
    WorkflowTrigger,
};
