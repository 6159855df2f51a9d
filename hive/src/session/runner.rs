//! The `AgentRunner` seam: one trait for "run the LLM once with this
//! prompt", with the production CLI subprocess implementation and an
//! in-tree mock for tests.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};

use crate::session::transcript::{ToolStep, Transcript};
use crate::session::SessionError;

/// Default wall-clock budget for one subprocess invocation.
pub const DEFAULT_RUN_TIMEOUT: Duration = Duration::from_secs(600);

/// How much stderr to keep for error reports.
const STDERR_TAIL_BYTES: usize = 4096;

/// Everything one LLM invocation needs.
#[derive(Clone, Debug)]
pub struct RunRequest {
    pub agent_id: String,
    pub prompt: String,
    pub system_prompt: String,
    pub model: Option<String>,
    pub allowed_tools: Vec<String>,
    pub max_turns: Option<u32>,
    /// Tool-server manifest file for this invocation, if any.
    pub manifest_path: Option<PathBuf>,
    pub working_dir: PathBuf,
    /// External session id to resume; `None` starts fresh.
    pub resume_session_id: Option<String>,
    pub timeout: Duration,
}

impl RunRequest {
    pub fn new(agent_id: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            prompt: prompt.into(),
            system_prompt: String::new(),
            model: None,
            allowed_tools: Vec::new(),
            max_turns: None,
            manifest_path: None,
            working_dir: PathBuf::from("."),
            resume_session_id: None,
            timeout: DEFAULT_RUN_TIMEOUT,
        }
    }
}

/// What one invocation produced.
#[derive(Clone, Debug, Default)]
pub struct RunOutcome {
    /// External session id reported by the CLI (fresh or resumed).
    pub session_id: Option<String>,
    pub text: String,
    pub steps: Vec<ToolStep>,
}

/// Drives one LLM invocation. The session manager and the autonomous work
/// loop both run through this seam.
#[async_trait]
pub trait AgentRunner: Send + Sync {
    async fn run(&self, req: RunRequest) -> Result<RunOutcome, SessionError>;
}

/// Production runner: spawns the LLM CLI and parses its stream-JSON
/// transcript from stdout.
pub struct CliRunner {
    binary: PathBuf,
}

impl CliRunner {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn command(&self, req: &RunRequest) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(&self.binary);
        cmd.arg("--print")
            .arg(&req.prompt)
            .args(["--output-format", "stream-json"]);
        if !req.system_prompt.is_empty() {
            cmd.arg("--system-prompt").arg(&req.system_prompt);
        }
        if let Some(model) = &req.model {
            cmd.arg("--model").arg(model);
        }
        if let Some(max_turns) = req.max_turns {
            cmd.arg("--max-turns").arg(max_turns.to_string());
        }
        if !req.allowed_tools.is_empty() {
            cmd.arg("--allowed-tools").arg(req.allowed_tools.join(","));
        }
        if let Some(manifest) = &req.manifest_path {
            cmd.arg("--tool-servers").arg(manifest);
        }
        if let Some(resume) = &req.resume_session_id {
            cmd.arg("--resume").arg(resume);
        }
        cmd.current_dir(&req.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl AgentRunner for CliRunner {
    async fn run(&self, req: RunRequest) -> Result<RunOutcome, SessionError> {
        let mut child = self.command(&req).spawn().map_err(|e| SessionError::Spawn {
            message: format!("failed to spawn {}: {}", self.binary.display(), e),
            stderr: String::new(),
        })?;

        let stdout = child.stdout.take().ok_or_else(|| SessionError::Spawn {
            message: "subprocess stdout unavailable".into(),
            stderr: String::new(),
        })?;
        let stderr = child.stderr.take();

        let transcript_fut = async {
            let mut transcript = Transcript::default();
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                transcript.absorb(&line);
            }
            transcript
        };
        let stderr_fut = async {
            let mut tail = String::new();
            if let Some(stderr) = stderr {
                let mut reader = BufReader::new(stderr);
                let _ = reader.read_to_string(&mut tail).await;
            }
            if tail.len() > STDERR_TAIL_BYTES {
                let cut = tail.len() - STDERR_TAIL_BYTES;
                let cut = (cut..tail.len()).find(|i| tail.is_char_boundary(*i)).unwrap_or(cut);
                tail = tail[cut..].to_string();
            }
            tail
        };

        let joined = tokio::time::timeout(req.timeout, async {
            let (transcript, stderr_tail) = tokio::join!(transcript_fut, stderr_fut);
            let status = child.wait().await;
            (transcript, stderr_tail, status)
        })
        .await;

        let (transcript, stderr_tail, status) = match joined {
            Ok(parts) => parts,
            Err(_) => {
                let _ = child.start_kill();
                return Err(SessionError::Spawn {
                    message: format!("subprocess timed out after {:?}", req.timeout),
                    stderr: String::new(),
                });
            }
        };

        let status = status.map_err(|e| SessionError::Spawn {
            message: format!("wait on subprocess: {}", e),
            stderr: stderr_tail.clone(),
        })?;
        if !status.success() {
            return Err(SessionError::Spawn {
                message: format!("subprocess exited with {}", status),
                stderr: stderr_tail,
            });
        }

        Ok(RunOutcome {
            session_id: transcript.session_id.clone(),
            text: transcript.final_or_best_effort(),
            steps: transcript.steps,
        })
    }
}

/// Scripted runner for tests: pops queued outcomes, records every request,
/// and falls back to an echo response with a fresh mock session id.
#[derive(Default)]
pub struct MockRunner {
    responses: Mutex<VecDeque<Result<RunOutcome, String>>>,
    requests: Mutex<Vec<RunRequest>>,
    counter: AtomicU64,
}

impl MockRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues an outcome for the next call.
    pub fn push_outcome(&self, outcome: RunOutcome) {
        self.responses
            .lock()
            .expect("mock lock")
            .push_back(Ok(outcome));
    }

    /// Queues a reply with the given text on a fresh session id.
    pub fn push_text(&self, text: impl Into<String>) {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        self.push_outcome(RunOutcome {
            session_id: Some(format!("mock-session-{}", n)),
            text: text.into(),
            steps: Vec::new(),
        });
    }

    /// Queues a spawn failure for the next call.
    pub fn push_failure(&self, message: impl Into<String>) {
        self.responses
            .lock()
            .expect("mock lock")
            .push_back(Err(message.into()));
    }

    /// Every request seen so far, in order.
    pub fn requests(&self) -> Vec<RunRequest> {
        self.requests.lock().expect("mock lock").clone()
    }
}

#[async_trait]
impl AgentRunner for MockRunner {
    async fn run(&self, req: RunRequest) -> Result<RunOutcome, SessionError> {
        self.requests.lock().expect("mock lock").push(req.clone());
        let queued = self.responses.lock().expect("mock lock").pop_front();
        match queued {
            Some(Ok(outcome)) => Ok(outcome),
            Some(Err(message)) => Err(SessionError::Spawn {
                message,
                stderr: String::new(),
            }),
            None => {
                let n = self.counter.fetch_add(1, Ordering::SeqCst);
                Ok(RunOutcome {
                    session_id: Some(format!("mock-session-{}", n)),
                    text: format!("echo: {}", req.prompt),
                    steps: Vec::new(),
                })
            }
        }
    }
}
