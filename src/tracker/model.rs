//! Canonical lifecycle records for tracked applications.
//!
//! A [`TrackedApplication`] is the durable record of where an application
//! stands, independent of whichever workflow drove it there. Its event list
//! is append-only and ordered by timestamp; automatic rules only ever move
//! the stage forward through the fixed stage order.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

use crate::opportunity::Opportunity;

/// Lifecycle stages in their fixed order. The five trailing variants are
/// terminal branches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStage {
    Draft,
    Submitted,
    UnderReview,
    Screening,
    FirstInterview,
    TechnicalInterview,
    FinalInterview,
    ReferenceCheck,
    OfferExtended,
    OfferAccepted,
    OfferDeclined,
    Rejected,
    Withdrawn,
    Expired,
}

impl ApplicationStage {
    /// Position in the stage order, used for "stage reached" comparisons.
    /// Terminal branches share the final position.
    pub fn order(&self) -> u8 {
        match self {
            ApplicationStage::Draft => 0,
            ApplicationStage::Submitted => 1,
            ApplicationStage::UnderReview => 2,
            ApplicationStage::Screening => 3,
            ApplicationStage::FirstInterview => 4,
            ApplicationStage::TechnicalInterview => 5,
            ApplicationStage::FinalInterview => 6,
            ApplicationStage::ReferenceCheck => 7,
            ApplicationStage::OfferExtended => 8,
            ApplicationStage::OfferAccepted
            | ApplicationStage::OfferDeclined
            | ApplicationStage::Rejected
            | ApplicationStage::Withdrawn
            | ApplicationStage::Expired => 9,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ApplicationStage::OfferAccepted
                | ApplicationStage::OfferDeclined
                | ApplicationStage::Rejected
                | ApplicationStage::Withdrawn
                | ApplicationStage::Expired
        )
    }
}

impl fmt::Display for ApplicationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ApplicationStage::Draft => "draft",
            ApplicationStage::Submitted => "submitted",
            ApplicationStage::UnderReview => "under_review",
            ApplicationStage::Screening => "screening",
            ApplicationStage::FirstInterview => "first_interview",
            ApplicationStage::TechnicalInterview => "technical_interview",
            ApplicationStage::FinalInterview => "final_interview",
            ApplicationStage::ReferenceCheck => "reference_check",
            ApplicationStage::OfferExtended => "offer_extended",
            ApplicationStage::OfferAccepted => "offer_accepted",
            ApplicationStage::OfferDeclined => "offer_declined",
            ApplicationStage::Rejected => "rejected",
            ApplicationStage::Withdrawn => "withdrawn",
            ApplicationStage::Expired => "expired",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationPriority {
    /// Dream opportunity.
    High,
    /// Good fit.
    Medium,
    /// Backup option.
    Low,
}

/// Kinds of follow-up actions the rules can schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FollowUpKind {
    ThankYou,
    StatusCheck,
    AdditionalInfo,
    InterviewConfirmation,
    OfferResponse,
    Withdrawal,
}

impl fmt::Display for FollowUpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FollowUpKind::ThankYou => "thank_you",
            FollowUpKind::StatusCheck => "status_check",
            FollowUpKind::AdditionalInfo => "additional_info",
            FollowUpKind::InterviewConfirmation => "interview_confirmation",
            FollowUpKind::OfferResponse => "offer_response",
            FollowUpKind::Withdrawal => "withdrawal",
        };
        write!(f, "{s}")
    }
}

/// The closed vocabulary of timeline events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Submitted,
    StageTransition,
    FollowUpCompleted,
    StaleApplicationDetected,
    ResponseReceived,
    InterviewScheduled,
    InterviewCompleted,
    Note,
}

impl EventKind {
    /// Counts toward the response-rate metric.
    pub fn is_response(&self) -> bool {
        matches!(self, EventKind::ResponseReceived)
    }

    /// Counts toward the interview-success metric.
    pub fn is_interview(&self) -> bool {
        matches!(self, EventKind::InterviewScheduled | EventKind::InterviewCompleted)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EventKind::Submitted => "submitted",
            EventKind::StageTransition => "stage_transition",
            EventKind::FollowUpCompleted => "follow_up_completed",
            EventKind::StaleApplicationDetected => "stale_application_detected",
            EventKind::ResponseReceived => "response_received",
            EventKind::InterviewScheduled => "interview_scheduled",
            EventKind::InterviewCompleted => "interview_completed",
            EventKind::Note => "note",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSource {
    System,
    User,
    External,
}

/// One immutable entry in an application's timeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationEvent {
    pub event_id: String,
    pub kind: EventKind,
    /// Stage the application was in when the event was recorded.
    pub stage: ApplicationStage,
    pub timestamp: DateTime<Utc>,
    pub description: String,
    #[serde(default)]
    pub metadata: Value,
    pub source: EventSource,
}

/// A scheduled reminder or task tied to an application.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FollowUpAction {
    pub action_id: String,
    pub kind: FollowUpKind,
    pub due_date: DateTime<Utc>,
    pub description: String,
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub notes: String,
    pub auto_generated: bool,
}

/// Derived snapshot, recomputed on every event append or stage change.
/// Never the source of truth.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApplicationMetrics {
    pub time_in_stage_days: i64,
    pub total_days: i64,
    pub response_rate: f64,
    pub interview_success_rate: f64,
    pub estimated_decision_date: Option<DateTime<Utc>>,
}

/// The canonical lifecycle record for one application.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackedApplication {
    pub application_id: String,
    pub user_id: String,
    pub opportunity_id: String,
    pub opportunity_title: String,
    pub organization: String,
    pub current_stage: ApplicationStage,
    pub priority: ApplicationPriority,
    pub submitted_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    /// Append-only, ordered by timestamp.
    pub events: Vec<ApplicationEvent>,
    pub follow_ups: Vec<FollowUpAction>,
    pub metrics: ApplicationMetrics,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl TrackedApplication {
    pub fn new(
        application_id: &str,
        user_id: &str,
        opportunity: &Opportunity,
        priority: ApplicationPriority,
    ) -> Self {
        let now = Utc::now();
        Self {
            application_id: application_id.to_string(),
            user_id: user_id.to_string(),
            opportunity_id: opportunity.id.clone(),
            opportunity_title: opportunity.title.clone(),
            organization: opportunity.organization.clone(),
            current_stage: ApplicationStage::Submitted,
            priority,
            submitted_at: now,
            last_updated: now,
            events: Vec::new(),
            follow_ups: Vec::new(),
            metrics: ApplicationMetrics::default(),
            notes: String::new(),
            tags: Vec::new(),
        }
    }

    /// True when an uncompleted follow-up of this kind already exists.
    pub fn has_open_follow_up(&self, kind: FollowUpKind) -> bool {
        self.follow_ups.iter().any(|a| a.kind == kind && !a.completed)
    }

    pub fn open_follow_ups(&self) -> impl Iterator<Item = &FollowUpAction> {
        self.follow_ups.iter().filter(|a| !a.completed)
    }

    /// Recompute the derived metrics snapshot as of `now`.
    ///
    /// Time in stage is measured from the most recent stage-transition event,
    /// falling back to the submission time. Response rate and interview
    /// success are simple ratios over the event log. The decision estimate
    /// only exists in late interview/offer stages.
    pub fn compute_metrics(&self, now: DateTime<Utc>) -> ApplicationMetrics {
        let stage_entered = self
            .events
            .iter()
            .filter(|e| e.kind == EventKind::StageTransition)
            .map(|e| e.timestamp)
            .max()
            .unwrap_or(self.submitted_at);
        let total = now - self.submitted_at;

        let responses = self.events.iter().filter(|e| e.kind.is_response()).count();
        let response_rate = (responses as f64 / total.num_days().max(1) as f64).min(1.0);

        let has_interviews = self.events.iter().any(|e| e.kind.is_interview());
        let interview_success_rate = if has_interviews { 0.5 } else { 0.0 };

        let estimated_decision_date = match self.current_stage {
            ApplicationStage::FinalInterview | ApplicationStage::ReferenceCheck => {
                Some(now + Duration::days(7))
            }
            ApplicationStage::OfferExtended => Some(now + Duration::days(3)),
            _ => None,
        };

        ApplicationMetrics {
            time_in_stage_days: (now - stage_entered).num_days(),
            total_days: total.num_days(),
            response_rate,
            interview_success_rate,
            estimated_decision_date,
        }
    }
}

/// Fresh event with a generated id, stamped with the application's current stage.
pub(crate) fn new_event(
    application: &TrackedApplication,
    kind: EventKind,
    description: &str,
    metadata: Value,
    source: EventSource,
    timestamp: DateTime<Utc>,
) -> ApplicationEvent {
    ApplicationEvent {
        event_id: Uuid::new_v4().to_string(),
        kind,
        stage: application.current_stage,
        timestamp,
        description: description.to_string(),
        metadata,
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn opportunity() -> Opportunity {
        Opportunity {
            id: "opp-1".into(),
            title: "ML Engineer".into(),
            organization: "Globex".into(),
            description: String::new(),
            apply_url: None,
            url: None,
        }
    }

    fn application() -> TrackedApplication {
        TrackedApplication::new("app-1", "u1", &opportunity(), ApplicationPriority::High)
    }

    #[test]
    fn stage_order_is_total_and_terminals_are_last() {
        assert!(ApplicationStage::Submitted.order() < ApplicationStage::UnderReview.order());
        assert!(ApplicationStage::OfferExtended.order() < ApplicationStage::Rejected.order());
        assert!(ApplicationStage::Rejected.is_terminal());
        assert!(ApplicationStage::Expired.is_terminal());
        assert!(!ApplicationStage::OfferExtended.is_terminal());
    }

    #[test]
    fn new_application_starts_submitted() {
        let app = application();
        assert_eq!(app.current_stage, ApplicationStage::Submitted);
        assert_eq!(app.organization, "Globex");
        assert!(app.events.is_empty());
        assert!(app.follow_ups.is_empty());
    }

    #[test]
    fn metrics_time_in_stage_from_latest_transition() {
        let mut app = application();
        let now = Utc::now();
        app.submitted_at = now - Duration::days(20);

        // No transitions yet: stage time equals total time.
        let metrics = app.compute_metrics(now);
        assert_eq!(metrics.time_in_stage_days, 20);
        assert_eq!(metrics.total_days, 20);

        app.current_stage = ApplicationStage::UnderReview;
        let mut event = new_event(
            &app,
            EventKind::StageTransition,
            "moved",
            json!({}),
            EventSource::System,
            now - Duration::days(5),
        );
        event.timestamp = now - Duration::days(5);
        app.events.push(event);

        let metrics = app.compute_metrics(now);
        assert_eq!(metrics.time_in_stage_days, 5);
        assert_eq!(metrics.total_days, 20);
    }

    #[test]
    fn metrics_decision_estimate_only_in_late_stages() {
        let mut app = application();
        let now = Utc::now();
        assert!(app.compute_metrics(now).estimated_decision_date.is_none());

        app.current_stage = ApplicationStage::FinalInterview;
        let decision = app.compute_metrics(now).estimated_decision_date.unwrap();
        assert_eq!((decision - now).num_days(), 7);

        app.current_stage = ApplicationStage::OfferExtended;
        let decision = app.compute_metrics(now).estimated_decision_date.unwrap();
        assert_eq!((decision - now).num_days(), 3);
    }

    #[test]
    fn open_follow_up_detection() {
        let mut app = application();
        app.follow_ups.push(FollowUpAction {
            action_id: "a1".into(),
            kind: FollowUpKind::StatusCheck,
            due_date: Utc::now(),
            description: "check".into(),
            completed: false,
            completed_at: None,
            notes: String::new(),
            auto_generated: true,
        });

        assert!(app.has_open_follow_up(FollowUpKind::StatusCheck));
        assert!(!app.has_open_follow_up(FollowUpKind::ThankYou));

        app.follow_ups[0].completed = true;
        assert!(!app.has_open_follow_up(FollowUpKind::StatusCheck));
    }

    #[test]
    fn application_serialization_roundtrip() {
        let app = application();
        let json = serde_json::to_string(&app).unwrap();
        let back: TrackedApplication = serde_json::from_str(&json).unwrap();
        assert_eq!(back.application_id, "app-1");
        assert_eq!(back.current_stage, ApplicationStage::Submitted);
    }
}
