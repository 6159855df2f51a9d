//! Daily consolidation: pull durable facts out of recent daily logs into
//! `MEMORY.md`.

use std::path::Path;
use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;

use crate::memory::MemoryError;

/// Default look-back window in days.
pub const DEFAULT_LOOKBACK_DAYS: i64 = 7;

const MEMORY_HEADER: &str = "# Memory\n";

/// Section-heading words whose content counts as facts.
const FACT_HEADINGS: &[&str] = &["key", "finding", "decision", "action", "insight"];

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ConsolidationReport {
    pub facts_extracted: usize,
    pub facts_added: usize,
    pub days_processed: usize,
}

fn bold_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*-\s*\*\*(.+?)\*\*").expect("bold fact regex"))
}

fn keyword_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*(Decision|Important|TODO|Note|Learned|Remember):\s*(.+)$")
            .expect("keyword fact regex")
    })
}

/// Case-insensitive, whitespace-normalized form used for dedup.
fn normalize(text: &str) -> String {
    text.to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Extracts facts from one daily log, applying the rules in order per line:
/// bolded bullet, keyword prefix, then any non-empty line under a `## `
/// heading naming key findings/decisions/actions/insights.
pub fn extract_facts(content: &str) -> Vec<String> {
    let mut facts = Vec::new();
    let mut under_fact_heading = false;

    for line in content.lines() {
        if let Some(heading) = line.strip_prefix("## ") {
            let lowered = heading.to_lowercase();
            under_fact_heading = FACT_HEADINGS.iter().any(|word| lowered.contains(word));
            continue;
        }
        if let Some(caps) = bold_re().captures(line) {
            facts.push(caps[1].trim().to_string());
            continue;
        }
        if let Some(caps) = keyword_re().captures(line) {
            facts.push(caps[2].trim().to_string());
            continue;
        }
        if under_fact_heading && !line.trim().is_empty() {
            facts.push(line.trim().to_string());
        }
    }
    facts
}

/// Consolidates daily logs newer than `today - lookback_days` into
/// `MEMORY.md`, deduplicating against what the file already contains.
/// Appends surviving facts under a `## Consolidated YYYY-MM-DD` section;
/// creates the file with a header if absent.
pub fn consolidate(
    agent_root: &Path,
    lookback_days: i64,
    today: NaiveDate,
) -> Result<ConsolidationReport, MemoryError> {
    let cutoff = today - chrono::Duration::days(lookback_days);
    let memory_dir = agent_root.join("memory");

    let mut daily: Vec<(NaiveDate, std::path::PathBuf)> = Vec::new();
    if memory_dir.is_dir() {
        for entry in std::fs::read_dir(&memory_dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("md") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if let Ok(date) = NaiveDate::parse_from_str(stem, "%Y-%m-%d") {
                if date > cutoff {
                    daily.push((date, path));
                }
            }
        }
    }
    daily.sort();

    let mut report = ConsolidationReport {
        days_processed: daily.len(),
        ..Default::default()
    };

    let memory_path = agent_root.join("MEMORY.md");
    let existing = std::fs::read_to_string(&memory_path).unwrap_or_default();
    let existing_norm = normalize(&existing);

    let mut fresh: Vec<String> = Vec::new();
    for (_, path) in &daily {
        let content = std::fs::read_to_string(path)?;
        for fact in extract_facts(&content) {
            report.facts_extracted += 1;
            let norm = normalize(&fact);
            if norm.is_empty() || existing_norm.contains(&norm) {
                continue;
            }
            if fresh.iter().any(|f| normalize(f) == norm) {
                continue;
            }
            fresh.push(fact);
        }
    }

    if fresh.is_empty() {
        return Ok(report);
    }
    report.facts_added = fresh.len();

    crate::memory::snapshot_history(agent_root, "MEMORY.md")?;

    let mut updated = if existing.is_empty() {
        MEMORY_HEADER.to_string()
    } else {
        existing
    };
    if !updated.ends_with('\n') {
        updated.push('\n');
    }
    updated.push_str(&format!("\n## Consolidated {}\n\n", today.format("%Y-%m-%d")));
    for fact in &fresh {
        updated.push_str(&format!("- {}\n", fact));
    }
    std::fs::write(&memory_path, updated)?;

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bold_bullets_and_keywords_extract() {
        let facts = extract_facts(
            "Some chatter\n\
             - **User prefers dark mode**\n\
             Decision: ship on Friday\n\
             TODO: rotate the token\n\
             - plain bullet is not a fact\n",
        );
        assert_eq!(
            facts,
            vec![
                "User prefers dark mode",
                "ship on Friday",
                "rotate the token"
            ]
        );
    }

    #[test]
    fn lines_under_fact_headings_extract() {
        let facts = extract_facts(
            "## Key Findings\n\
             latency regression is in the router\n\
             \n\
             ## Random notes\n\
             this line is ignored\n",
        );
        assert_eq!(facts, vec!["latency regression is in the router"]);
    }

    #[test]
    fn heading_match_is_case_insensitive() {
        let facts = extract_facts("## ACTION ITEMS\ncall the vendor\n");
        assert_eq!(facts, vec!["call the vendor"]);
    }

    #[test]
    fn normalize_collapses_whitespace_and_case() {
        assert_eq!(normalize("  User   Prefers\tDark Mode "), "user prefers dark mode");
    }
}
