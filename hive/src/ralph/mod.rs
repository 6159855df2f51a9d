//! RALPH loop: read plan, act, learn, progress, halt.
//!
//! Drives a single LLM subprocess through the checkbox tasks of `PLAN.md`:
//! take the first open task, mark it in progress, run the work prompt,
//! verify, then mark done / retry / block. Abort is checked at task
//! boundaries and between the LLM call and the verify step.

mod plan;
mod progress;
mod prompt;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

pub use plan::{parse_plan, update_task_status, PlanStatus, PlanTask};
pub use progress::{append_progress, read_learnings, MAX_OUTPUT_CHARS};
pub use prompt::{build_work_prompt, guidelines, Domain};

use crate::session::{AgentRunner, RunRequest, SessionError, DEFAULT_RUN_TIMEOUT};

#[derive(Debug, thiserror::Error)]
pub enum RalphError {
    #[error("no task at index {0}")]
    TaskIndex(usize),
    #[error("plan file: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Default wall-clock budget for the verification command.
pub const DEFAULT_VERIFY_TIMEOUT: Duration = Duration::from_secs(5 * 60);

#[derive(Clone, Debug)]
pub struct RalphConfig {
    pub agent_id: String,
    pub plan_path: PathBuf,
    pub progress_path: PathBuf,
    pub working_dir: PathBuf,
    pub domain: Domain,
    pub max_iterations: usize,
    pub max_retries: u32,
    /// Shell command whose exit status verifies a completed task.
    pub verify_command: Option<String>,
    pub verify_timeout: Duration,
    /// `None` defaults to `true` exactly when the domain is coding.
    pub auto_commit: Option<bool>,
}

impl RalphConfig {
    pub fn new(agent_id: impl Into<String>, working_dir: impl Into<PathBuf>) -> Self {
        let working_dir = working_dir.into();
        Self {
            agent_id: agent_id.into(),
            plan_path: working_dir.join("PLAN.md"),
            progress_path: working_dir.join("progress.md"),
            working_dir,
            domain: Domain::General,
            max_iterations: 10,
            max_retries: 3,
            verify_command: None,
            verify_timeout: DEFAULT_VERIFY_TIMEOUT,
            auto_commit: None,
        }
    }

    fn auto_commit_enabled(&self) -> bool {
        self.auto_commit.unwrap_or(self.domain == Domain::Coding)
    }
}

/// Outcome of one loop run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RalphSummary {
    pub total_iterations: usize,
    pub tasks_completed: usize,
    pub tasks_blocked: usize,
    pub tasks_remaining: usize,
    pub duration_ms: u128,
    pub aborted: bool,
}

pub struct RalphLoop {
    runner: Arc<dyn AgentRunner>,
    config: RalphConfig,
    abort: CancellationToken,
}

impl RalphLoop {
    pub fn new(runner: Arc<dyn AgentRunner>, config: RalphConfig) -> Self {
        Self {
            runner,
            config,
            abort: CancellationToken::new(),
        }
    }

    /// Token that aborts the loop at the next checkpoint.
    pub fn abort_handle(&self) -> CancellationToken {
        self.abort.clone()
    }

    fn read_plan(&self) -> Result<String, RalphError> {
        Ok(std::fs::read_to_string(&self.config.plan_path)?)
    }

    fn set_status(&self, index: usize, status: PlanStatus) -> Result<(), RalphError> {
        let content = self.read_plan()?;
        let updated = update_task_status(&content, index, status)?;
        std::fs::write(&self.config.plan_path, updated)?;
        Ok(())
    }

    /// Runs until the plan is exhausted, the iteration budget is spent, or
    /// the loop is aborted.
    pub async fn run(&self) -> Result<RalphSummary, RalphError> {
        let started = Instant::now();
        let mut summary = RalphSummary::default();
        let mut retries: HashMap<usize, u32> = HashMap::new();
        let mut stale_reset_done = false;

        while summary.total_iterations < self.config.max_iterations && !self.abort.is_cancelled() {
            summary.total_iterations += 1;

            let tasks = parse_plan(&self.read_plan()?);
            let next = tasks.iter().find(|t| t.status == PlanStatus::Open).cloned();
            let task = match next {
                Some(task) => task,
                None => {
                    // Stale in-progress markers (a previous crash) get one
                    // reset-and-retry; otherwise the plan is exhausted.
                    let stale: Vec<usize> = tasks
                        .iter()
                        .filter(|t| t.status == PlanStatus::InProgress)
                        .map(|t| t.index)
                        .collect();
                    if !stale.is_empty() && !stale_reset_done {
                        stale_reset_done = true;
                        for index in stale {
                            self.set_status(index, PlanStatus::Open)?;
                        }
                        continue;
                    }
                    break;
                }
            };

            self.set_status(task.index, PlanStatus::InProgress)?;

            let learnings = read_learnings(&self.config.progress_path);
            let work_prompt = build_work_prompt(
                &task.text,
                &learnings,
                self.config.verify_command.as_deref(),
                self.config.domain,
            );
            let iteration_start = Instant::now();

            let mut request = RunRequest::new(&self.config.agent_id, work_prompt);
            request.working_dir = self.config.working_dir.clone();
            request.timeout = DEFAULT_RUN_TIMEOUT;

            let outcome = match self.runner.run(request).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    // Mid-task failure reverts the task and costs a retry.
                    tracing::warn!(task = %task.text, error = %e, "iteration failed");
                    let total_iterations = summary.total_iterations;
                    self.note_failure(
                        &mut summary,
                        &mut retries,
                        &task,
                        total_iterations,
                        iteration_start.elapsed().as_millis(),
                        &e.to_string(),
                    )?;
                    continue;
                }
            };

            if self.abort.is_cancelled() {
                self.set_status(task.index, PlanStatus::Open)?;
                break;
            }

            let success = match &self.config.verify_command {
                Some(cmd) => self.run_verify(cmd).await,
                None => true,
            };

            if self.abort.is_cancelled() {
                self.set_status(task.index, PlanStatus::Open)?;
                break;
            }

            if success {
                self.set_status(task.index, PlanStatus::Done)?;
                summary.tasks_completed += 1;
                append_progress(
                    &self.config.progress_path,
                    summary.total_iterations,
                    &task.text,
                    "completed",
                    iteration_start.elapsed().as_millis(),
                    &outcome.text,
                )?;
                if self.config.auto_commit_enabled() {
                    self.commit_task(&task.text).await;
                }
            } else {
                let total_iterations = summary.total_iterations;
                self.note_failure(
                    &mut summary,
                    &mut retries,
                    &task,
                    total_iterations,
                    iteration_start.elapsed().as_millis(),
                    "verification failed",
                )?;
            }
        }

        summary.aborted = self.abort.is_cancelled();
        summary.tasks_remaining = parse_plan(&self.read_plan()?)
            .iter()
            .filter(|t| matches!(t.status, PlanStatus::Open | PlanStatus::InProgress))
            .count();
        summary.duration_ms = started.elapsed().as_millis();
        Ok(summary)
    }

    /// Books a failed attempt: back to open while retries remain, blocked
    /// once the budget is spent. Always logged to the progress file.
    fn note_failure(
        &self,
        summary: &mut RalphSummary,
        retries: &mut HashMap<usize, u32>,
        task: &PlanTask,
        iteration: usize,
        duration_ms: u128,
        reason: &str,
    ) -> Result<(), RalphError> {
        let attempts = retries.entry(task.index).or_insert(0);
        *attempts += 1;
        if *attempts >= self.config.max_retries {
            self.set_status(task.index, PlanStatus::Blocked)?;
            summary.tasks_blocked += 1;
            append_progress(
                &self.config.progress_path,
                iteration,
                &task.text,
                "blocked",
                duration_ms,
                reason,
            )?;
        } else {
            self.set_status(task.index, PlanStatus::Open)?;
            append_progress(
                &self.config.progress_path,
                iteration,
                &task.text,
                "failed",
                duration_ms,
                reason,
            )?;
        }
        Ok(())
    }

    /// Runs the verification command in the working directory; success is
    /// exit status zero within the time budget.
    async fn run_verify(&self, command: &str) -> bool {
        let result = tokio::time::timeout(
            self.config.verify_timeout,
            tokio::process::Command::new("sh")
                .arg("-c")
                .arg(command)
                .current_dir(&self.config.working_dir)
                .kill_on_drop(true)
                .status(),
        )
        .await;
        match result {
            Ok(Ok(status)) => status.success(),
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "verification command failed to run");
                false
            }
            Err(_) => {
                tracing::warn!(command, "verification timed out");
                false
            }
        }
    }

    /// Best-effort `git add`/`git commit` of the finished task.
    async fn commit_task(&self, task_text: &str) {
        let add = tokio::process::Command::new("git")
            .args(["add", "-A"])
            .current_dir(&self.config.working_dir)
            .status()
            .await;
        if !matches!(add, Ok(status) if status.success()) {
            tracing::warn!("git add failed, skipping commit");
            return;
        }
        let commit = tokio::process::Command::new("git")
            .args(["commit", "-m", &format!("Complete task: {}", task_text)])
            .current_dir(&self.config.working_dir)
            .status()
            .await;
        if !matches!(commit, Ok(status) if status.success()) {
            tracing::warn!("git commit failed");
        }
    }
}
