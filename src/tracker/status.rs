//! The status tracker: canonical post-submission lifecycle management.
//!
//! All state lives behind the injected [`ApplicationStore`]; the tracker
//! itself is stateless and safe to share. Every mutation appends a timeline
//! event, reschedules follow-ups for the resulting stage and recomputes the
//! derived metrics before saving.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::error::TrackerError;
use crate::opportunity::Opportunity;
use crate::store::ApplicationStore;
use crate::tracker::model::{
    ApplicationPriority, ApplicationStage, EventKind, EventSource, FollowUpAction,
    TrackedApplication, new_event,
};
use crate::tracker::rules::TransitionRules;

/// A due, uncompleted follow-up joined with its application context.
#[derive(Debug, Clone, Serialize)]
pub struct PendingFollowUp {
    pub application_id: String,
    pub user_id: String,
    pub opportunity_title: String,
    pub organization: String,
    pub stage: ApplicationStage,
    pub action: FollowUpAction,
}

/// Aggregate view over tracked applications.
#[derive(Debug, Serialize)]
pub struct ApplicationStatistics {
    pub total_applications: usize,
    pub active_applications: usize,
    pub stage_distribution: BTreeMap<String, usize>,
    /// Applications with an offer on the table or accepted. A declined
    /// offer is not a success and does not count here.
    pub offers: usize,
    pub rejections: usize,
    pub offer_rate: f64,
    /// Mean days from submission to now over decided (terminal)
    /// applications; 0 when nothing has been decided yet.
    pub average_process_time_days: f64,
    pub pending_follow_ups: usize,
}

pub struct StatusTracker {
    store: Arc<dyn ApplicationStore>,
    rules: TransitionRules,
    stale_after_days: i64,
}

impl StatusTracker {
    pub fn new(
        store: Arc<dyn ApplicationStore>,
        rules: TransitionRules,
        stale_after_days: i64,
    ) -> Self {
        Self {
            store,
            rules,
            stale_after_days,
        }
    }

    /// Start tracking a freshly submitted application.
    pub async fn create_application_tracking(
        &self,
        application_id: &str,
        user_id: &str,
        opportunity: &Opportunity,
        priority: ApplicationPriority,
    ) -> Result<TrackedApplication, TrackerError> {
        let now = Utc::now();
        let mut application = TrackedApplication::new(application_id, user_id, opportunity, priority);
        application.submitted_at = now;
        application.last_updated = now;
        let event = new_event(
            &application,
            EventKind::Submitted,
            &format!("Application submitted to {}", opportunity.organization),
            json!({ "opportunity_id": opportunity.id }),
            EventSource::System,
            now,
        );
        application.events.push(event);
        application
            .follow_ups
            .extend(self.rules.schedule_follow_ups(&application, now));
        application.metrics = application.compute_metrics(now);

        self.store.save_application(&application).await?;
        info!(application_id, user_id, "application tracking started");
        Ok(application)
    }

    /// Explicitly move an application to a new stage.
    ///
    /// Returns `Ok(false)` for an unknown application. Moving out of a
    /// terminal stage, or to the stage it is already in, is an invalid
    /// transition. Unlike the automatic rules, explicit updates may move
    /// backwards, e.g. to correct a mistaken entry.
    pub async fn update_application_stage(
        &self,
        application_id: &str,
        new_stage: ApplicationStage,
        description: Option<&str>,
        metadata: Value,
        source: EventSource,
    ) -> Result<bool, TrackerError> {
        let Some(mut application) = self.store.load_application(application_id).await? else {
            return Ok(false);
        };
        if application.current_stage.is_terminal() || application.current_stage == new_stage {
            return Err(TrackerError::InvalidTransition {
                from: application.current_stage,
                to: new_stage,
            });
        }

        let now = Utc::now();
        let from = application.current_stage;
        // The record moves first so the transition event carries the stage
        // being entered.
        application.current_stage = new_stage;
        application.last_updated = now;
        let mut event_metadata = serde_json::Map::new();
        event_metadata.insert("from".into(), json!(from));
        event_metadata.insert("to".into(), json!(new_stage));
        if let Value::Object(extra) = metadata {
            event_metadata.extend(extra);
        }
        let event = new_event(
            &application,
            EventKind::StageTransition,
            description.unwrap_or(&format!("Stage changed from {from} to {new_stage}")),
            Value::Object(event_metadata),
            source,
            now,
        );
        application.events.push(event);
        let scheduled = self.rules.schedule_follow_ups(&application, now);
        application.follow_ups.extend(scheduled);
        application.metrics = application.compute_metrics(now);

        self.store.save_application(&application).await?;
        info!(application_id, %from, stage = %new_stage, "application stage updated");
        Ok(true)
    }

    /// Append a timeline event. Returns `Ok(false)` for an unknown
    /// application.
    pub async fn add_event(
        &self,
        application_id: &str,
        kind: EventKind,
        description: &str,
        metadata: Value,
        source: EventSource,
    ) -> Result<bool, TrackerError> {
        let Some(mut application) = self.store.load_application(application_id).await? else {
            return Ok(false);
        };

        let now = Utc::now();
        let event = new_event(&application, kind, description, metadata, source, now);
        application.events.push(event);
        application.last_updated = now;
        application.metrics = application.compute_metrics(now);

        self.store.save_application(&application).await?;
        Ok(true)
    }

    /// Mark a follow-up action completed. Unknown application or action ids
    /// leave everything unchanged and return `Ok(false)`.
    pub async fn complete_follow_up(
        &self,
        application_id: &str,
        action_id: &str,
        notes: Option<&str>,
    ) -> Result<bool, TrackerError> {
        let Some(mut application) = self.store.load_application(application_id).await? else {
            return Ok(false);
        };
        let now = Utc::now();
        let Some(action) = application
            .follow_ups
            .iter_mut()
            .find(|a| a.action_id == action_id && !a.completed)
        else {
            return Ok(false);
        };

        action.completed = true;
        action.completed_at = Some(now);
        if let Some(notes) = notes {
            action.notes = notes.to_string();
        }
        let description = format!("Completed follow-up: {}", action.description);
        let kind = action.kind;
        let event = new_event(
            &application,
            EventKind::FollowUpCompleted,
            &description,
            json!({ "action_id": action_id, "kind": kind }),
            EventSource::User,
            now,
        );
        application.events.push(event);
        application.last_updated = now;
        application.metrics = application.compute_metrics(now);

        self.store.save_application(&application).await?;
        Ok(true)
    }

    /// Current record with freshly computed metrics.
    pub async fn get_application_status(
        &self,
        application_id: &str,
    ) -> Result<Option<TrackedApplication>, TrackerError> {
        let Some(mut application) = self.store.load_application(application_id).await? else {
            return Ok(None);
        };
        application.metrics = application.compute_metrics(Utc::now());
        Ok(Some(application))
    }

    /// All applications for a user, most recently updated first.
    pub async fn get_user_applications(
        &self,
        user_id: &str,
    ) -> Result<Vec<TrackedApplication>, TrackerError> {
        let mut applications = self.store.list_for_user(user_id).await?;
        let now = Utc::now();
        for application in &mut applications {
            application.metrics = application.compute_metrics(now);
        }
        applications.sort_by(|a, b| b.last_updated.cmp(&a.last_updated));
        Ok(applications)
    }

    /// Follow-ups that are due now, oldest due date first, optionally
    /// restricted to one user.
    pub async fn get_pending_follow_ups(
        &self,
        user_id: Option<&str>,
    ) -> Result<Vec<PendingFollowUp>, TrackerError> {
        let applications = match user_id {
            Some(user_id) => self.store.list_for_user(user_id).await?,
            None => self.store.list_applications().await?,
        };

        let now = Utc::now();
        let mut pending = Vec::new();
        for application in &applications {
            for action in application.open_follow_ups() {
                if action.due_date <= now {
                    pending.push(PendingFollowUp {
                        application_id: application.application_id.clone(),
                        user_id: application.user_id.clone(),
                        opportunity_title: application.opportunity_title.clone(),
                        organization: application.organization.clone(),
                        stage: application.current_stage,
                        action: action.clone(),
                    });
                }
            }
        }
        pending.sort_by(|a, b| a.action.due_date.cmp(&b.action.due_date));
        Ok(pending)
    }

    pub async fn get_application_statistics(
        &self,
        user_id: Option<&str>,
    ) -> Result<ApplicationStatistics, TrackerError> {
        let applications = match user_id {
            Some(user_id) => self.store.list_for_user(user_id).await?,
            None => self.store.list_applications().await?,
        };

        let now = Utc::now();
        let mut stage_distribution: BTreeMap<String, usize> = BTreeMap::new();
        let mut active = 0;
        let mut offers = 0;
        let mut rejections = 0;
        let mut decided = 0;
        let mut decided_days = 0.0;
        for application in &applications {
            *stage_distribution
                .entry(application.current_stage.to_string())
                .or_default() += 1;
            if application.current_stage.is_terminal() {
                decided += 1;
                decided_days += (now - application.submitted_at).num_days() as f64;
            } else {
                active += 1;
            }
            match application.current_stage {
                ApplicationStage::OfferExtended | ApplicationStage::OfferAccepted => offers += 1,
                ApplicationStage::Rejected => rejections += 1,
                _ => {}
            }
        }

        let total = applications.len();
        Ok(ApplicationStatistics {
            total_applications: total,
            active_applications: active,
            stage_distribution,
            offers,
            rejections,
            offer_rate: offers as f64 / total.max(1) as f64,
            average_process_time_days: if decided > 0 {
                decided_days / decided as f64
            } else {
                0.0
            },
            pending_follow_ups: self.get_pending_follow_ups(user_id).await?.len(),
        })
    }

    /// Apply the automatic transition rules to every tracked application.
    /// A failure on one application is logged and does not stop the rest.
    /// Returns the number of applications advanced.
    pub async fn run_auto_transitions(&self, now: DateTime<Utc>) -> Result<usize, TrackerError> {
        let applications = self.store.list_applications().await?;
        let mut advanced = 0;
        for application in &applications {
            let Some(next) = self.rules.should_auto_transition(application, now) else {
                continue;
            };
            let result = self
                .update_application_stage(
                    &application.application_id,
                    next,
                    Some(&format!(
                        "Assumed {next} after {} days without updates",
                        (now - application.last_updated).num_days()
                    )),
                    json!({ "auto_transition": true }),
                    EventSource::System,
                )
                .await;
            match result {
                Ok(true) => advanced += 1,
                Ok(false) => {}
                Err(e) => warn!(
                    application_id = %application.application_id,
                    error = %e,
                    "auto transition failed"
                ),
            }
        }
        Ok(advanced)
    }

    /// Flag non-terminal applications without activity for the configured
    /// number of days. Returns the number newly flagged.
    pub async fn run_staleness_check(&self, now: DateTime<Utc>) -> Result<usize, TrackerError> {
        let applications = self.store.list_applications().await?;
        let mut flagged = 0;
        for application in applications {
            if application.current_stage.is_terminal() {
                continue;
            }
            let idle_days = (now - application.last_updated).num_days();
            if idle_days < self.stale_after_days {
                continue;
            }
            // Already flagged since the last activity.
            if application
                .events
                .last()
                .is_some_and(|e| e.kind == EventKind::StaleApplicationDetected)
            {
                continue;
            }

            let mut application = application;
            let event = new_event(
                &application,
                EventKind::StaleApplicationDetected,
                &format!("No activity for {idle_days} days"),
                json!({ "idle_days": idle_days }),
                EventSource::System,
                now,
            );
            application.events.push(event);
            // last_updated stays put so the idle clock keeps running.
            application.metrics = application.compute_metrics(now);
            if let Err(e) = self.store.save_application(&application).await {
                warn!(
                    application_id = %application.application_id,
                    error = %e,
                    "staleness flag failed"
                );
                continue;
            }
            info!(
                application_id = %application.application_id,
                idle_days,
                "stale application detected"
            );
            flagged += 1;
        }
        Ok(flagged)
    }
}
