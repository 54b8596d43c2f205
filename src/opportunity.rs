//! Opportunity records and the keyword heuristics that classify them.
//!
//! An [`Opportunity`] is the unit the whole pipeline revolves around: a job
//! posting, grant call, scholarship, internship or conference CFP discovered
//! elsewhere and handed to the orchestration core. Classification drives
//! which documents the generation step requests and how the submission step
//! routes the finished package.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A discovered opportunity the user may apply to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Opportunity {
    pub id: String,
    pub title: String,
    /// Company, funding body or institution behind the opportunity.
    pub organization: String,
    #[serde(default)]
    pub description: String,
    /// Direct application URL, when the posting provides one.
    #[serde(default)]
    pub apply_url: Option<String>,
    /// URL of the posting itself.
    #[serde(default)]
    pub url: Option<String>,
}

/// The kind of application an opportunity calls for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationType {
    JobApplication,
    GrantApplication,
    ScholarshipApplication,
    InternshipApplication,
    ConferenceSubmission,
}

impl fmt::Display for ApplicationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ApplicationType::JobApplication => "job_application",
            ApplicationType::GrantApplication => "grant_application",
            ApplicationType::ScholarshipApplication => "scholarship_application",
            ApplicationType::InternshipApplication => "internship_application",
            ApplicationType::ConferenceSubmission => "conference_submission",
        };
        write!(f, "{s}")
    }
}

/// Documents the generation collaborator can be asked to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    CoverLetter,
    ResumeSummary,
    ResearchProposal,
    ProjectDescription,
    PersonalStatement,
    MotivationLetter,
}

impl ApplicationType {
    /// Classify an opportunity by scanning its title and description.
    ///
    /// Checks run in priority order: grant keywords win over scholarship
    /// keywords, and anything unmatched falls back to a job application.
    pub fn classify(opportunity: &Opportunity) -> Self {
        let text = format!(
            "{} {}",
            opportunity.title.to_lowercase(),
            opportunity.description.to_lowercase()
        );
        let has = |words: &[&str]| words.iter().any(|w| text.contains(w));

        if has(&["grant", "funding", "research"]) {
            ApplicationType::GrantApplication
        } else if has(&["scholarship", "fellowship"]) {
            ApplicationType::ScholarshipApplication
        } else if has(&["intern", "internship"]) {
            ApplicationType::InternshipApplication
        } else if has(&["conference", "paper", "submission"]) {
            ApplicationType::ConferenceSubmission
        } else {
            ApplicationType::JobApplication
        }
    }

    /// The document set required for this application type.
    pub fn documents_needed(&self) -> Vec<DocumentType> {
        match self {
            ApplicationType::JobApplication => {
                vec![DocumentType::CoverLetter, DocumentType::ResumeSummary]
            }
            ApplicationType::GrantApplication => {
                vec![DocumentType::ResearchProposal, DocumentType::ProjectDescription]
            }
            ApplicationType::ScholarshipApplication => {
                vec![DocumentType::PersonalStatement, DocumentType::MotivationLetter]
            }
            ApplicationType::InternshipApplication => {
                vec![DocumentType::CoverLetter, DocumentType::MotivationLetter]
            }
            ApplicationType::ConferenceSubmission => vec![DocumentType::ResearchProposal],
        }
    }
}

/// Scan free text for the first thing that looks like an email address.
///
/// Deliberately loose: one `@` with a dotted domain after it. Postings embed
/// addresses in prose, so tokens are trimmed of surrounding punctuation first.
pub fn find_email(text: &str) -> Option<String> {
    for token in text.split_whitespace() {
        let token = token.trim_matches(|c: char| !c.is_alphanumeric() && c != '@' && c != '.');
        let Some((local, domain)) = token.split_once('@') else {
            continue;
        };
        if local.is_empty() || domain.contains('@') {
            continue;
        }
        let Some((host, tld)) = domain.rsplit_once('.') else {
            continue;
        };
        if !host.is_empty() && tld.len() >= 2 && tld.chars().all(|c| c.is_ascii_alphabetic()) {
            return Some(token.to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opportunity(title: &str, description: &str) -> Opportunity {
        Opportunity {
            id: "opp-1".into(),
            title: title.into(),
            organization: "Acme".into(),
            description: description.into(),
            apply_url: None,
            url: None,
        }
    }

    #[test]
    fn classifies_grants_before_anything_else() {
        let opp = opportunity("Research Funding Call", "grant for climate research");
        assert_eq!(ApplicationType::classify(&opp), ApplicationType::GrantApplication);
    }

    #[test]
    fn classifies_scholarships_and_internships() {
        let opp = opportunity("Undergraduate Scholarship", "full tuition fellowship");
        assert_eq!(
            ApplicationType::classify(&opp),
            ApplicationType::ScholarshipApplication
        );

        let opp = opportunity("Summer Intern", "software engineering internship");
        assert_eq!(
            ApplicationType::classify(&opp),
            ApplicationType::InternshipApplication
        );
    }

    #[test]
    fn classifies_conference_submissions() {
        let opp = opportunity("Call for Papers", "submit your paper to the conference");
        assert_eq!(
            ApplicationType::classify(&opp),
            ApplicationType::ConferenceSubmission
        );
    }

    #[test]
    fn defaults_to_job_application() {
        let opp = opportunity("Senior Rust Engineer", "build distributed systems");
        assert_eq!(ApplicationType::classify(&opp), ApplicationType::JobApplication);
    }

    #[test]
    fn document_sets_per_type() {
        assert_eq!(
            ApplicationType::JobApplication.documents_needed(),
            vec![DocumentType::CoverLetter, DocumentType::ResumeSummary]
        );
        assert_eq!(
            ApplicationType::ConferenceSubmission.documents_needed(),
            vec![DocumentType::ResearchProposal]
        );
    }

    #[test]
    fn finds_embedded_email() {
        let text = "Send your CV to hiring@acme.example.com before Friday.";
        assert_eq!(find_email(text), Some("hiring@acme.example.com".into()));
    }

    #[test]
    fn ignores_non_addresses() {
        assert_eq!(find_email("follow us @acme on social media"), None);
        assert_eq!(find_email("no contact information here"), None);
    }
}
