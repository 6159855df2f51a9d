//! `progress.md`: the append-only learnings log the work loop reads back
//! into every prompt.

use std::path::Path;

use crate::fsutil::iso_now;

/// Max characters of one iteration's output kept in the log.
pub const MAX_OUTPUT_CHARS: usize = 2000;

/// How much of the tail of `progress.md` is fed back into prompts.
const LEARNINGS_TAIL_CHARS: usize = 3000;

/// Appends one iteration section.
pub fn append_progress(
    path: &Path,
    iteration: usize,
    task_text: &str,
    status: &str,
    duration_ms: u128,
    output: &str,
) -> std::io::Result<()> {
    let mut block = output.chars().take(MAX_OUTPUT_CHARS).collect::<String>();
    if output.chars().count() > MAX_OUTPUT_CHARS {
        block.push_str("...(truncated)");
    }
    let section = format!(
        "## Iteration {} – Task: \"{}\"\n\n- Status: {}\n- Duration: {} ms\n- Timestamp: {}\n\n```\n{}\n```\n\n",
        iteration,
        task_text,
        status,
        duration_ms,
        iso_now(),
        block,
    );
    use std::io::Write;
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    file.write_all(section.as_bytes())
}

/// The trimmed tail of the progress log, for the work prompt. Missing file
/// reads as empty.
pub fn read_learnings(path: &Path) -> String {
    let Ok(content) = std::fs::read_to_string(path) else {
        return String::new();
    };
    if content.len() <= LEARNINGS_TAIL_CHARS {
        return content;
    }
    let mut cut = content.len() - LEARNINGS_TAIL_CHARS;
    while cut < content.len() && !content.is_char_boundary(cut) {
        cut += 1;
    }
    content[cut..].to_string()
}
