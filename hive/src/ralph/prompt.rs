//! Work-prompt assembly: task, accumulated learnings, verification
//! command, and domain guidelines.

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    Coding,
    Research,
    Ops,
    #[default]
    General,
}

const CODING_GUIDELINES: &str = "\
- Make the smallest change that completes the task.\n\
- Keep the build green: run the project's checks before declaring done.\n\
- Match the style of the surrounding code.\n\
- Leave notes about surprises in progress.md.";

const RESEARCH_GUIDELINES: &str = "\
- Prefer primary sources; record where every claim came from.\n\
- Summarize findings as short factual statements.\n\
- Flag open questions explicitly instead of guessing.";

const OPS_GUIDELINES: &str = "\
- Check current state before changing anything.\n\
- Prefer reversible actions; note how to roll back.\n\
- Record every command you ran and its outcome.";

const GENERAL_GUIDELINES: &str = "\
- Work on exactly one task at a time.\n\
- Record what you learned, even on failure.\n\
- Stop when the task is done; do not start the next one.";

/// Plain-text guidelines per domain, with general as the fallback.
pub fn guidelines(domain: Domain) -> &'static str {
    match domain {
        Domain::Coding => CODING_GUIDELINES,
        Domain::Research => RESEARCH_GUIDELINES,
        Domain::Ops => OPS_GUIDELINES,
        Domain::General => GENERAL_GUIDELINES,
    }
}

/// Builds the prompt for one iteration.
pub fn build_work_prompt(
    task_text: &str,
    learnings: &str,
    verify_command: Option<&str>,
    domain: Domain,
) -> String {
    let mut prompt = format!("Your current task:\n\n{}\n", task_text);
    if !learnings.trim().is_empty() {
        prompt.push_str("\nLearnings from previous iterations:\n\n");
        prompt.push_str(learnings.trim());
        prompt.push('\n');
    }
    if let Some(cmd) = verify_command {
        prompt.push_str(&format!(
            "\nYour work will be verified with: `{}`. Make sure it passes.\n",
            cmd
        ));
    }
    prompt.push_str("\nGuidelines:\n");
    prompt.push_str(guidelines(domain));
    prompt
}
