//! PLAN.md grammar: markdown checkbox tasks.
//!
//! A task is any line matching `- [<marker>] <text>`; everything else is
//! ignored. Markers: space = open, `x` = done, `!` = blocked,
//! `~` = in progress. Task index is the 0-based sequence number of
//! matching lines. Updates rewrite exactly the marker character, leaving
//! every other byte intact.

use std::sync::OnceLock;

use regex::Regex;

use super::RalphError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlanStatus {
    Open,
    Done,
    Blocked,
    InProgress,
}

impl PlanStatus {
    pub fn marker(self) -> char {
        match self {
            PlanStatus::Open => ' ',
            PlanStatus::Done => 'x',
            PlanStatus::Blocked => '!',
            PlanStatus::InProgress => '~',
        }
    }

    fn from_marker(c: char) -> Self {
        match c {
            'x' => PlanStatus::Done,
            '!' => PlanStatus::Blocked,
            '~' => PlanStatus::InProgress,
            _ => PlanStatus::Open,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct PlanTask {
    pub index: usize,
    pub status: PlanStatus,
    pub text: String,
}

fn task_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^\s*-\s*\[([x !~])\]\s+(.+)$").expect("plan task regex"))
}

/// Parses every task line in order.
pub fn parse_plan(content: &str) -> Vec<PlanTask> {
    task_re()
        .captures_iter(content)
        .enumerate()
        .map(|(index, caps)| PlanTask {
            index,
            status: PlanStatus::from_marker(
                caps.get(1).map(|m| m.as_str().chars().next().unwrap_or(' ')).unwrap_or(' '),
            ),
            text: caps.get(2).map(|m| m.as_str().to_string()).unwrap_or_default(),
        })
        .collect()
}

/// Rewrites the marker of the task at `index`, leaving all surrounding
/// bytes untouched.
pub fn update_task_status(
    content: &str,
    index: usize,
    status: PlanStatus,
) -> Result<String, RalphError> {
    let marker_range = task_re()
        .captures_iter(content)
        .nth(index)
        .and_then(|caps| caps.get(1).map(|m| m.range()))
        .ok_or(RalphError::TaskIndex(index))?;

    let mut updated = String::with_capacity(content.len());
    updated.push_str(&content[..marker_range.start]);
    updated.push(status.marker());
    updated.push_str(&content[marker_range.end..]);
    Ok(updated)
}
