//! Repository traits for workflow and application state.
//!
//! The engine and tracker operate exclusively through these traits so the
//! in-memory backends here can be swapped for a durable store without
//! touching orchestration logic. Event logs inside the stored records are
//! append-only; stores persist whole records keyed by their ids.

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;

use crate::tracker::model::TrackedApplication;
use crate::workflow::model::WorkflowInstance;

/// Persistence for finished (and recoverable) workflow instances.
#[async_trait]
pub trait WorkflowStore: Send + Sync {
    async fn save_workflow(&self, workflow: &WorkflowInstance) -> Result<()>;
    async fn load_workflow(&self, workflow_id: &str) -> Result<Option<WorkflowInstance>>;
    async fn list_for_user(&self, user_id: &str) -> Result<Vec<WorkflowInstance>>;
    async fn count(&self) -> Result<usize>;
}

/// Persistence for canonical application lifecycle records.
#[async_trait]
pub trait ApplicationStore: Send + Sync {
    async fn save_application(&self, application: &TrackedApplication) -> Result<()>;
    async fn load_application(&self, application_id: &str) -> Result<Option<TrackedApplication>>;
    async fn list_applications(&self) -> Result<Vec<TrackedApplication>>;
    async fn list_for_user(&self, user_id: &str) -> Result<Vec<TrackedApplication>>;
}

/// In-memory workflow store.
#[derive(Default)]
pub struct MemoryWorkflowStore {
    workflows: Mutex<HashMap<String, WorkflowInstance>>,
}

#[async_trait]
impl WorkflowStore for MemoryWorkflowStore {
    async fn save_workflow(&self, workflow: &WorkflowInstance) -> Result<()> {
        self.workflows
            .lock()
            .unwrap()
            .insert(workflow.workflow_id.clone(), workflow.clone());
        Ok(())
    }

    async fn load_workflow(&self, workflow_id: &str) -> Result<Option<WorkflowInstance>> {
        Ok(self.workflows.lock().unwrap().get(workflow_id).cloned())
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<WorkflowInstance>> {
        Ok(self
            .workflows
            .lock()
            .unwrap()
            .values()
            .filter(|w| w.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.workflows.lock().unwrap().len())
    }
}

/// In-memory application store.
#[derive(Default)]
pub struct MemoryApplicationStore {
    applications: Mutex<HashMap<String, TrackedApplication>>,
}

#[async_trait]
impl ApplicationStore for MemoryApplicationStore {
    async fn save_application(&self, application: &TrackedApplication) -> Result<()> {
        self.applications
            .lock()
            .unwrap()
            .insert(application.application_id.clone(), application.clone());
        Ok(())
    }

    async fn load_application(&self, application_id: &str) -> Result<Option<TrackedApplication>> {
        Ok(self.applications.lock().unwrap().get(application_id).cloned())
    }

    async fn list_applications(&self) -> Result<Vec<TrackedApplication>> {
        Ok(self.applications.lock().unwrap().values().cloned().collect())
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<TrackedApplication>> {
        Ok(self
            .applications
            .lock()
            .unwrap()
            .values()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opportunity::Opportunity;
    use crate::tracker::model::ApplicationPriority;
    use crate::workflow::model::{WorkflowConfig, WorkflowTrigger};

    fn opportunity() -> Opportunity {
        Opportunity {
            id: "opp-1".into(),
            title: "Data Engineer".into(),
            organization: "Initech".into(),
            description: String::new(),
            apply_url: None,
            url: None,
        }
    }

    #[tokio::test]
    async fn workflow_store_roundtrip() {
        let store = MemoryWorkflowStore::default();
        let wf = WorkflowInstance::new(
            "u1",
            opportunity(),
            WorkflowTrigger::UserRequest,
            WorkflowConfig::default(),
        );

        store.save_workflow(&wf).await.unwrap();
        let loaded = store.load_workflow(&wf.workflow_id).await.unwrap().unwrap();
        assert_eq!(loaded.workflow_id, wf.workflow_id);
        assert_eq!(store.count().await.unwrap(), 1);
        assert!(store.load_workflow("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn workflow_store_filters_by_user() {
        let store = MemoryWorkflowStore::default();
        for user in ["u1", "u1", "u2"] {
            let wf = WorkflowInstance::new(
                user,
                opportunity(),
                WorkflowTrigger::Scheduled,
                WorkflowConfig::default(),
            );
            store.save_workflow(&wf).await.unwrap();
        }
        assert_eq!(store.list_for_user("u1").await.unwrap().len(), 2);
        assert_eq!(store.list_for_user("u3").await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn application_store_roundtrip() {
        let store = MemoryApplicationStore::default();
        let app = TrackedApplication::new(
            "app-1",
            "u1",
            &opportunity(),
            ApplicationPriority::Medium,
        );

        store.save_application(&app).await.unwrap();
        let loaded = store.load_application("app-1").await.unwrap().unwrap();
        assert_eq!(loaded.user_id, "u1");
        assert_eq!(store.list_applications().await.unwrap().len(), 1);
        assert!(store.load_application("missing").await.unwrap().is_none());
    }
}
