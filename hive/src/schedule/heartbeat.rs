//! Per-agent heartbeats: a recurring self-prompted review of
//! `HEARTBEAT.md`, gated by configured active hours.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use config::{ActiveHours, HeartbeatConfig, HeartbeatMode};
use tokio_util::sync::CancellationToken;

use crate::activity::ActivityLog;
use crate::channel::Channels;
use crate::registry::AgentRegistry;
use crate::session::{SendOptions, SessionManager};

/// The exact wire sentinel for "nothing to report".
pub const HEARTBEAT_OK: &str = "HEARTBEAT_OK";

/// Fallback when the configured interval is unparseable.
const DEFAULT_INTERVAL: Duration = Duration::from_secs(30 * 60);

/// Parses a heartbeat interval: the named presets `5m`, `15m`, `30m`,
/// `1h`, `4h`, `daily`, or free-form `Nm`/`Nh`. Anything else falls back
/// to 30 minutes; the function is total.
pub fn parse_interval(raw: &str) -> Duration {
    match raw.trim() {
        "5m" => Duration::from_secs(5 * 60),
        "15m" => Duration::from_secs(15 * 60),
        "30m" => Duration::from_secs(30 * 60),
        "1h" => Duration::from_secs(60 * 60),
        "4h" => Duration::from_secs(4 * 60 * 60),
        "daily" => Duration::from_secs(24 * 60 * 60),
        other => {
            if let Some(minutes) = other.strip_suffix('m').and_then(|n| n.parse::<u64>().ok()) {
                Duration::from_secs(minutes * 60)
            } else if let Some(hours) = other.strip_suffix('h').and_then(|n| n.parse::<u64>().ok())
            {
                Duration::from_secs(hours * 60 * 60)
            } else {
                DEFAULT_INTERVAL
            }
        }
    }
}

/// Whether `now` falls inside the window, evaluated in the window's IANA
/// timezone on a 24-hour clock. `HH:MM` strings compare lexicographically,
/// so windows spanning midnight (`start > end`) never match; this is a
/// known limitation. Unknown timezones log and allow the tick.
pub fn is_within_active_hours(hours: &ActiveHours, now: DateTime<Utc>) -> bool {
    let tz = match Tz::from_str(&hours.timezone) {
        Ok(tz) => tz,
        Err(_) => {
            tracing::warn!(timezone = %hours.timezone, "unknown timezone, allowing tick");
            return true;
        }
    };
    let local = now.with_timezone(&tz).format("%H:%M").to_string();
    hours.start.as_str() <= local.as_str() && local.as_str() <= hours.end.as_str()
}

/// Builds the heartbeat prompt from the checklist and the mode.
pub fn compose_heartbeat_prompt(mode: HeartbeatMode, checklist: &str) -> String {
    let instruction = match mode {
        HeartbeatMode::Check => {
            "Review your heartbeat checklist below and report anything that needs attention."
        }
        HeartbeatMode::Work => {
            "Review your heartbeat checklist below and perform the work it calls for."
        }
    };
    format!(
        "{}\n\n{}\n\nIf nothing needs attention, respond with exactly: {}",
        instruction,
        checklist.trim(),
        HEARTBEAT_OK
    )
}

pub struct HeartbeatScheduler {
    registry: Arc<AgentRegistry>,
    sessions: Arc<SessionManager>,
    channels: Arc<Channels>,
    activity: Arc<ActivityLog>,
    timers: Mutex<HashMap<String, CancellationToken>>,
    cancel: CancellationToken,
}

impl HeartbeatScheduler {
    pub fn new(
        registry: Arc<AgentRegistry>,
        sessions: Arc<SessionManager>,
        channels: Arc<Channels>,
        activity: Arc<ActivityLog>,
        cancel: CancellationToken,
    ) -> Arc<Self> {
        Arc::new(Self {
            registry,
            sessions,
            channels,
            activity,
            timers: Mutex::new(HashMap::new()),
            cancel,
        })
    }

    /// Starts a timer for every registered agent with heartbeats enabled.
    pub fn start(self: &Arc<Self>) {
        for slug in self.registry.list() {
            if let Ok(agent) = self.registry.get(&slug) {
                if let Some(hb) = agent.heartbeat {
                    if hb.enabled {
                        self.start_agent(&slug, hb);
                    }
                }
            }
        }
    }

    /// Starts (or restarts) one agent's heartbeat timer.
    pub fn start_agent(self: &Arc<Self>, slug: &str, cfg: HeartbeatConfig) {
        self.stop_agent(slug);
        let token = self.cancel.child_token();
        self.timers
            .lock()
            .expect("heartbeat lock")
            .insert(slug.to_string(), token.clone());

        let interval = parse_interval(&cfg.interval);
        let this = Arc::clone(self);
        let slug = slug.to_string();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {
                        this.tick(&slug, &cfg).await;
                    }
                }
            }
        });
    }

    pub fn stop_agent(&self, slug: &str) {
        if let Some(token) = self.timers.lock().expect("heartbeat lock").remove(slug) {
            token.cancel();
        }
    }

    pub fn stop_all(&self) {
        let mut timers = self.timers.lock().expect("heartbeat lock");
        for (_, token) in timers.drain() {
            token.cancel();
        }
    }

    /// One heartbeat: gate on active hours, prompt with the checklist,
    /// suppress or deliver the response, and always leave an activity
    /// entry.
    pub async fn tick(&self, slug: &str, cfg: &HeartbeatConfig) {
        if let Some(hours) = &cfg.active_hours {
            if !is_within_active_hours(hours, Utc::now()) {
                tracing::debug!(agent = %slug, "heartbeat outside active hours");
                return;
            }
        }

        let checklist =
            std::fs::read_to_string(self.registry.heartbeat_path(slug)).unwrap_or_default();
        let prompt = compose_heartbeat_prompt(cfg.mode, &checklist);

        let outcome = self
            .sessions
            .send_message(
                slug,
                &prompt,
                SendOptions {
                    conversation_id: Some(format!("heartbeat:{}", slug)),
                    ..Default::default()
                },
            )
            .await;

        match outcome {
            Ok(outcome) => {
                let all_ok = outcome.text.trim() == HEARTBEAT_OK
                    || outcome.text.contains(HEARTBEAT_OK);
                if all_ok && cfg.suppress_ok {
                    self.activity
                        .record(slug, "heartbeat.tick", "ok (suppressed)");
                    return;
                }
                // Fall back to the agent's notification target when the
                // heartbeat has no explicit one.
                let target = cfg.deliver_to.clone().or_else(|| {
                    self.registry.get(slug).ok().and_then(|agent| agent.notify)
                });
                if let Some(target) = target {
                    if let Err(e) = self.channels.deliver(&target, &outcome.text).await {
                        tracing::warn!(agent = %slug, target = %target, error = %e, "heartbeat delivery failed");
                    }
                }
                self.activity.record(
                    slug,
                    "heartbeat.tick",
                    if all_ok { "ok" } else { "attention needed" },
                );
            }
            Err(e) => {
                tracing::error!(agent = %slug, error = %e, "heartbeat dispatch failed");
                self.activity
                    .record(slug, "heartbeat.tick", format!("error: {}", e));
            }
        }
    }
}
