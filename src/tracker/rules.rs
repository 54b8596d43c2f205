//! Declarative transition and follow-up rules.
//!
//! The rule tables answer two questions about an application given the
//! current time: which stage should it auto-advance to, and which follow-up
//! actions should be on the books. Automatic transitions only ever move
//! forward through the stage order; explicit user updates are handled by the
//! tracker, not here.

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::tracker::model::{
    ApplicationStage, FollowUpAction, FollowUpKind, TrackedApplication,
};

/// Auto-advance: after `after_days` without movement in `from`, assume `to`.
#[derive(Debug, Clone, Copy)]
struct AutoTransition {
    from: ApplicationStage,
    to: ApplicationStage,
    after_days: i64,
}

/// Schedule a follow-up of `kind` `due_days` after entering `stage`.
#[derive(Debug, Clone, Copy)]
struct FollowUpRule {
    stage: ApplicationStage,
    kind: FollowUpKind,
    due_days: i64,
    description: &'static str,
}

const AUTO_TRANSITIONS: &[AutoTransition] = &[
    AutoTransition {
        from: ApplicationStage::Submitted,
        to: ApplicationStage::UnderReview,
        after_days: 7,
    },
    AutoTransition {
        from: ApplicationStage::UnderReview,
        to: ApplicationStage::Screening,
        after_days: 14,
    },
    AutoTransition {
        from: ApplicationStage::FirstInterview,
        to: ApplicationStage::TechnicalInterview,
        after_days: 3,
    },
];

const FOLLOW_UP_RULES: &[FollowUpRule] = &[
    FollowUpRule {
        stage: ApplicationStage::Submitted,
        kind: FollowUpKind::StatusCheck,
        due_days: 7,
        description: "Check on application status",
    },
    FollowUpRule {
        stage: ApplicationStage::UnderReview,
        kind: FollowUpKind::StatusCheck,
        due_days: 14,
        description: "Follow up on review progress",
    },
    FollowUpRule {
        stage: ApplicationStage::FirstInterview,
        kind: FollowUpKind::ThankYou,
        due_days: 1,
        description: "Send thank-you note after interview",
    },
    FollowUpRule {
        stage: ApplicationStage::FirstInterview,
        kind: FollowUpKind::StatusCheck,
        due_days: 7,
        description: "Ask about next steps after interview",
    },
    FollowUpRule {
        stage: ApplicationStage::OfferExtended,
        kind: FollowUpKind::OfferResponse,
        due_days: 3,
        description: "Respond to the offer",
    },
];

/// The rule set the tracker consults. A unit struct today; holding the
/// tables behind a value keeps the tracker testable with custom rules later.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransitionRules;

impl TransitionRules {
    /// Stage this application should auto-advance to, if any. Only fires
    /// when the application has sat in the rule's `from` stage for the
    /// configured number of days, and never moves backwards.
    pub fn should_auto_transition(
        &self,
        application: &TrackedApplication,
        now: DateTime<Utc>,
    ) -> Option<ApplicationStage> {
        if application.current_stage.is_terminal() {
            return None;
        }
        AUTO_TRANSITIONS
            .iter()
            .find(|rule| {
                rule.from == application.current_stage
                    && (now - application.last_updated).num_days() >= rule.after_days
                    && rule.to.order() > rule.from.order()
            })
            .map(|rule| rule.to)
    }

    /// Follow-up actions the current stage calls for, skipping kinds that
    /// already have an open action on this application.
    pub fn schedule_follow_ups(
        &self,
        application: &TrackedApplication,
        now: DateTime<Utc>,
    ) -> Vec<FollowUpAction> {
        FOLLOW_UP_RULES
            .iter()
            .filter(|rule| {
                rule.stage == application.current_stage
                    && !application.has_open_follow_up(rule.kind)
            })
            .map(|rule| FollowUpAction {
                action_id: Uuid::new_v4().to_string(),
                kind: rule.kind,
                due_date: now + Duration::days(rule.due_days),
                description: rule.description.to_string(),
                completed: false,
                completed_at: None,
                notes: String::new(),
                auto_generated: true,
            })
            .collect()
    }
}
