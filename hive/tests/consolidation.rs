//! Consolidation and archival over a real agent directory.

use chrono::NaiveDate;
use hive::memory::{archive_memory, consolidate, DEFAULT_LOOKBACK_DAYS};

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 7).unwrap()
}

fn write_daily(root: &std::path::Path, date: &str, content: &str) {
    let dir = root.join("memory");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join(format!("{}.md", date)), content).unwrap();
}

#[test]
fn consolidation_deduplicates_against_memory() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("MEMORY.md"),
        "# Memory\n\n- **User prefers dark mode**\n",
    )
    .unwrap();
    write_daily(
        dir.path(),
        "2024-06-06",
        "- **User prefers dark mode**\n- **New fact**\n",
    );

    let report = consolidate(dir.path(), DEFAULT_LOOKBACK_DAYS, today()).unwrap();
    assert_eq!(report.facts_extracted, 2);
    assert_eq!(report.facts_added, 1);
    assert_eq!(report.days_processed, 1);

    let memory = std::fs::read_to_string(dir.path().join("MEMORY.md")).unwrap();
    assert!(memory.contains("New fact"));
    assert!(memory.contains("## Consolidated 2024-06-07"));
    // The duplicate was not appended a second time.
    assert_eq!(memory.matches("User prefers dark mode").count(), 1);
}

#[test]
fn consolidation_ignores_logs_outside_the_window() {
    let dir = tempfile::tempdir().unwrap();
    write_daily(dir.path(), "2024-05-01", "- **Ancient fact**\n");
    write_daily(dir.path(), "2024-06-05", "- **Recent fact**\n");

    let report = consolidate(dir.path(), 7, today()).unwrap();
    assert_eq!(report.days_processed, 1);
    assert_eq!(report.facts_added, 1);

    let memory = std::fs::read_to_string(dir.path().join("MEMORY.md")).unwrap();
    assert!(memory.contains("Recent fact"));
    assert!(!memory.contains("Ancient fact"));
}

#[test]
fn consolidation_creates_memory_with_header() {
    let dir = tempfile::tempdir().unwrap();
    write_daily(dir.path(), "2024-06-06", "Decision: adopt the new queue\n");

    let report = consolidate(dir.path(), 7, today()).unwrap();
    assert_eq!(report.facts_added, 1);

    let memory = std::fs::read_to_string(dir.path().join("MEMORY.md")).unwrap();
    assert!(memory.starts_with("# Memory\n"));
    assert!(memory.contains("- adopt the new queue"));
}

#[test]
fn consolidation_with_no_new_facts_leaves_memory_alone() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("MEMORY.md"), "# Memory\n\n- **Known**\n").unwrap();
    write_daily(dir.path(), "2024-06-06", "- **Known**\n");

    let before = std::fs::read_to_string(dir.path().join("MEMORY.md")).unwrap();
    let report = consolidate(dir.path(), 7, today()).unwrap();
    assert_eq!(report.facts_added, 0);
    let after = std::fs::read_to_string(dir.path().join("MEMORY.md")).unwrap();
    assert_eq!(before, after);
}

#[test]
fn archival_then_consolidation_keep_working_together() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("memory/archive")).unwrap();

    let mut memory = String::from("# Memory\n");
    for i in 0..6 {
        memory.push_str(&format!("## Section {}\n{}\n", i, "data ".repeat(60)));
    }
    std::fs::write(dir.path().join("MEMORY.md"), &memory).unwrap();

    let report = archive_memory(dir.path(), 900, today()).unwrap();
    assert!(report.archived);
    assert!(report.sections_archived >= 1);
    assert!(report.new_size <= 900);

    let kept = std::fs::read_to_string(dir.path().join("MEMORY.md")).unwrap();
    assert!(kept.contains("## Section 0"));
    assert!(kept.contains("Sections archived to memory/archive/2024-06-07.md"));

    // Consolidation still appends to the trimmed file.
    write_daily(dir.path(), "2024-06-06", "- **Fact after archive**\n");
    consolidate(dir.path(), 7, today()).unwrap();
    let kept = std::fs::read_to_string(dir.path().join("MEMORY.md")).unwrap();
    assert!(kept.contains("Fact after archive"));
}

#[test]
fn memory_history_snapshot_is_taken_before_rewrite() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("MEMORY.md"), "# Memory\n\n- **Original**\n").unwrap();
    write_daily(dir.path(), "2024-06-06", "- **Addition**\n");

    consolidate(dir.path(), 7, today()).unwrap();

    let history = dir.path().join("history/MEMORY");
    let snapshots: Vec<_> = std::fs::read_dir(&history).unwrap().collect();
    assert_eq!(snapshots.len(), 1);
    let snapshot =
        std::fs::read_to_string(snapshots[0].as_ref().unwrap().path()).unwrap();
    assert!(snapshot.contains("Original"));
    assert!(!snapshot.contains("Addition"));
}
