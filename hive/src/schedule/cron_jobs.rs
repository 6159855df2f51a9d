//! Cron jobs: recurring prompts on cron expressions, one timer task per
//! enabled job.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use cron::Schedule;
use tokio_util::sync::CancellationToken;

use super::ScheduleError;
use crate::channel::Channels;
use crate::session::{SendOptions, SessionManager};
use crate::store::{CronJob, Store};

pub struct CronScheduler {
    store: Arc<Store>,
    sessions: Arc<SessionManager>,
    channels: Arc<Channels>,
    timers: Mutex<HashMap<String, CancellationToken>>,
    cancel: CancellationToken,
}

impl CronScheduler {
    pub fn new(
        store: Arc<Store>,
        sessions: Arc<SessionManager>,
        channels: Arc<Channels>,
        cancel: CancellationToken,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            sessions,
            channels,
            timers: Mutex::new(HashMap::new()),
            cancel,
        })
    }

    /// Loads all enabled jobs and starts one timer per job.
    pub async fn start(self: &Arc<Self>) -> Result<(), ScheduleError> {
        let jobs = self.store.list_cron_jobs(true).await?;
        for job in jobs {
            if let Err(e) = self.start_timer(job.clone()) {
                tracing::error!(job = %job.name, error = %e, "cron timer not started");
            }
        }
        Ok(())
    }

    /// Adds a job; its timer starts immediately when enabled. The
    /// expression is validated before anything is stored.
    pub async fn add_job(self: &Arc<Self>, job: CronJob) -> Result<(), ScheduleError> {
        Schedule::from_str(&job.expression)
            .map_err(|e| ScheduleError::BadExpression(e.to_string()))?;
        self.store.add_cron_job(job.clone()).await?;
        if job.enabled {
            self.start_timer(job)?;
        }
        Ok(())
    }

    /// Removes a job by name, stopping its timer.
    pub async fn remove_job(&self, name: &str) -> Result<(), ScheduleError> {
        self.stop_timer(name);
        self.store.remove_cron_job(name).await?;
        Ok(())
    }

    /// Enables a job, starting its timer if not already running.
    pub async fn enable(self: &Arc<Self>, name: &str) -> Result<(), ScheduleError> {
        self.store.set_cron_enabled(name, true).await?;
        let running = self.timers.lock().expect("cron lock").contains_key(name);
        if !running {
            if let Some(job) = self.store.get_cron_job_by_name(name).await? {
                self.start_timer(job)?;
            }
        }
        Ok(())
    }

    /// Disables a job, stopping and dropping its timer.
    pub async fn disable(&self, name: &str) -> Result<(), ScheduleError> {
        self.store.set_cron_enabled(name, false).await?;
        self.stop_timer(name);
        Ok(())
    }

    /// Stops every timer. Used at shutdown.
    pub fn stop_all(&self) {
        let mut timers = self.timers.lock().expect("cron lock");
        for (_, token) in timers.drain() {
            token.cancel();
        }
    }

    fn start_timer(self: &Arc<Self>, job: CronJob) -> Result<(), ScheduleError> {
        let schedule = Schedule::from_str(&job.expression)
            .map_err(|e| ScheduleError::BadExpression(e.to_string()))?;
        let token = self.cancel.child_token();
        self.timers
            .lock()
            .expect("cron lock")
            .insert(job.name.clone(), token.clone());

        let this = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                let Some(next) = schedule.upcoming(Utc).next() else {
                    break;
                };
                let delay = (next - Utc::now())
                    .to_std()
                    .unwrap_or_default();
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {
                        this.execute_job(&job).await;
                    }
                }
            }
        });
        Ok(())
    }

    fn stop_timer(&self, name: &str) {
        if let Some(token) = self.timers.lock().expect("cron lock").remove(name) {
            token.cancel();
        }
    }

    /// Runs one job: dispatch the prompt, stamp `last_run_at` regardless of
    /// delivery, then post the result to the job's target if it has one.
    pub async fn execute_job(&self, job: &CronJob) {
        let outcome = self
            .sessions
            .send_message(
                &job.agent_id,
                &job.prompt,
                SendOptions {
                    conversation_id: Some(format!("cron:{}", job.name)),
                    ..Default::default()
                },
            )
            .await;

        if let Err(e) = self.store.update_cron_last_run(&job.name).await {
            tracing::error!(job = %job.name, error = %e, "last_run_at update failed");
        }

        match outcome {
            Ok(outcome) => {
                if let Some(target) = &job.deliver_to {
                    if let Err(e) = self.channels.deliver(target, &outcome.text).await {
                        tracing::warn!(job = %job.name, target = %target, error = %e, "cron delivery failed");
                    }
                }
            }
            Err(e) => {
                tracing::error!(job = %job.name, error = %e, "cron job dispatch failed");
            }
        }
    }
}
