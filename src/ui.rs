//! Terminal output: spinners and colored status lines.
//!
//! Uses `indicatif` for progress spinners and `console` for styling. A
//! [`WorkflowProgress`] visually tracks one workflow run in the terminal.

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::workflow::model::{WorkflowInstance, WorkflowStatus};

/// Visual progress indicator for a running workflow.
pub struct WorkflowProgress {
    pb: ProgressBar,
    green: Style,
    red: Style,
    yellow: Style,
}

impl WorkflowProgress {
    /// Start the spinner labeled with the opportunity being pursued.
    pub fn start(title: &str, organization: &str) -> Self {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg}")
                .expect("invalid template"),
        );
        pb.set_message(format!("{title} at {organization}"));
        pb.enable_steady_tick(std::time::Duration::from_millis(100));

        Self {
            pb,
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            yellow: Style::new().yellow(),
        }
    }

    /// Refresh the spinner from the workflow's current state.
    pub fn update(&self, workflow: &WorkflowInstance) {
        let message = match workflow.current_stage() {
            Some(stage) => format!("{stage} ({}/{})", workflow.completed_steps(), workflow.steps.len()),
            None => workflow.overall_status.to_string(),
        };
        self.pb.set_message(message);
        if workflow.overall_status == WorkflowStatus::WaitingForApproval {
            self.pb.println(format!(
                "  {} Waiting for approval",
                self.yellow.apply_to("⏸")
            ));
        }
    }

    /// Finish the spinner and print the final outcome.
    pub fn complete(&self, workflow: &WorkflowInstance) {
        self.pb.finish_and_clear();
        match workflow.overall_status {
            WorkflowStatus::Completed => {
                println!(
                    "  {} Application submitted ({} steps)",
                    self.green.apply_to("✓"),
                    workflow.completed_steps()
                );
            }
            WorkflowStatus::Cancelled => {
                println!("  {} Workflow cancelled", self.yellow.apply_to("∅"));
            }
            status => {
                let error = workflow
                    .steps
                    .iter()
                    .find_map(|s| s.error_message.as_deref())
                    .unwrap_or("unknown error");
                println!("  {} Workflow {status}: {error}", self.red.apply_to("✗"));
            }
        }
    }

    /// Print the accumulated results as pretty JSON.
    pub fn print_results(&self, workflow: &WorkflowInstance) {
        println!();
        println!("{}", self.green.apply_to("─── Final Results ───"));
        println!(
            "{}",
            serde_json::to_string_pretty(&workflow.final_results).unwrap_or_default()
        );
    }
}
