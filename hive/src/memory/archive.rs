//! Size-triggered archival of `MEMORY.md` middle sections.
//!
//! When the file outgrows the threshold, the preamble, the first section,
//! and as many trailing sections as fit are kept; the middle moves to
//! `memory/archive/<today>.md` with a note left in its place.

use std::path::Path;

use chrono::NaiveDate;

use crate::memory::MemoryError;

/// Default archival threshold in bytes.
pub const DEFAULT_ARCHIVE_THRESHOLD: usize = 32 * 1024;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ArchiveReport {
    pub archived: bool,
    pub sections_archived: usize,
    pub new_size: usize,
}

/// Splits markdown into the preamble (before any `## `) and `## ` sections,
/// each section including its heading line.
fn split_sections(content: &str) -> (String, Vec<String>) {
    let mut preamble = String::new();
    let mut sections: Vec<String> = Vec::new();
    for line in content.split_inclusive('\n') {
        if line.starts_with("## ") {
            sections.push(line.to_string());
        } else if let Some(last) = sections.last_mut() {
            last.push_str(line);
        } else {
            preamble.push_str(line);
        }
    }
    // A final line without a trailing newline is handled by split_inclusive.
    (preamble, sections)
}

/// Archives middle sections of `MEMORY.md` when it exceeds `threshold`
/// bytes. With two or fewer sections there is no safe middle to move and
/// the file is left alone.
pub fn archive_memory(
    agent_root: &Path,
    threshold: usize,
    today: NaiveDate,
) -> Result<ArchiveReport, MemoryError> {
    let memory_path = agent_root.join("MEMORY.md");
    let content = match std::fs::read_to_string(&memory_path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(ArchiveReport::default())
        }
        Err(e) => return Err(e.into()),
    };
    if content.len() <= threshold {
        return Ok(ArchiveReport {
            archived: false,
            sections_archived: 0,
            new_size: content.len(),
        });
    }

    let (preamble, sections) = split_sections(&content);
    if sections.len() <= 2 {
        return Ok(ArchiveReport {
            archived: false,
            sections_archived: 0,
            new_size: content.len(),
        });
    }

    let archive_rel = format!("memory/archive/{}.md", today.format("%Y-%m-%d"));
    let note = format!("*Sections archived to {}*\n\n", archive_rel);
    let fixed = preamble.len() + sections[0].len() + note.len();

    // Keep the longest tail that still fits under the threshold. The middle
    // must move at least one section, so the tail can cover at most
    // sections[2..].
    let max_tail = sections.len() - 2;
    let mut tail_len = 0usize;
    let mut tail_bytes = 0usize;
    for section in sections.iter().rev().take(max_tail) {
        if fixed + tail_bytes + section.len() > threshold {
            break;
        }
        tail_bytes += section.len();
        tail_len += 1;
    }

    let middle = &sections[1..sections.len() - tail_len];

    crate::memory::snapshot_history(agent_root, "MEMORY.md")?;

    let archive_path = agent_root.join(&archive_rel);
    if let Some(parent) = archive_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut archived_out = std::fs::read_to_string(&archive_path).unwrap_or_default();
    if !archived_out.is_empty() && !archived_out.ends_with('\n') {
        archived_out.push('\n');
    }
    for section in middle {
        archived_out.push_str(section);
    }
    std::fs::write(&archive_path, archived_out)?;

    let mut kept = String::with_capacity(fixed + tail_bytes);
    kept.push_str(&preamble);
    kept.push_str(&sections[0]);
    kept.push_str(&note);
    for section in &sections[sections.len() - tail_len..] {
        kept.push_str(section);
    }
    std::fs::write(&memory_path, &kept)?;

    Ok(ArchiveReport {
        archived: true,
        sections_archived: middle.len(),
        new_size: kept.len(),
    })
}
