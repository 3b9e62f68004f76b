//! Load-time measurement through a background worker.
//!
//! The worker reports over a channel: free-form log lines, an error, and a
//! start/end pair of millisecond timestamps. The host turns that into one
//! status line, or a timeout error once the deadline passes. A timed-out
//! worker is left running.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;

use crate::logging::{self, Domain, Level};
use crate::surface::Page;

pub const LOAD_TEST_TARGET: &str = "#localtime-test-now";

#[derive(Debug, Clone, PartialEq)]
pub enum WorkerMessage {
    Log(String),
    Error(String),
    /// Milliseconds.
    Start(f64),
    /// Milliseconds.
    End(f64),
}

impl WorkerMessage {
    /// Decodes one `{"log"|"error"|"t_start"|"t_end": ...}` line. Lines that
    /// are not JSON objects are treated as log output.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        let value: Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(_) => return Some(WorkerMessage::Log(line.to_string())),
        };
        let text = |v: &Value| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        if let Some(log) = value.get("log") {
            return Some(WorkerMessage::Log(text(log)));
        }
        if let Some(err) = value.get("error") {
            return Some(WorkerMessage::Error(text(err)));
        }
        if let Some(t) = value.get("t_start").and_then(Value::as_f64) {
            return Some(WorkerMessage::Start(t));
        }
        if let Some(t) = value.get("t_end").and_then(Value::as_f64) {
            return Some(WorkerMessage::End(t));
        }
        Some(WorkerMessage::Log(line.to_string()))
    }
}

/// Something that can be started in the background and report over `tx`.
/// Dropping every sender signals that the worker is gone.
#[async_trait]
pub trait LoadWorker: Send + Sync {
    async fn start(&self, tx: mpsc::Sender<WorkerMessage>) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoadStatus {
    Loaded { seconds: f64 },
    Failed(String),
    TimedOut(Duration),
}

impl LoadStatus {
    pub fn is_loaded(&self) -> bool {
        matches!(self, LoadStatus::Loaded { .. })
    }
}

impl fmt::Display for LoadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadStatus::Loaded { seconds } => write!(f, "Loaded in {} seconds", seconds),
            LoadStatus::Failed(msg) => write!(f, "ERROR: {}", msg),
            LoadStatus::TimedOut(after) => {
                write!(f, "ERROR: timeout after {} seconds", after.as_secs())
            }
        }
    }
}

/// Starts `worker` and waits for its verdict, at most `timeout`. The
/// deadline covers `start` itself, so a worker stuck while starting still
/// times out.
pub async fn measure_load_time(worker: &dyn LoadWorker, timeout: Duration) -> LoadStatus {
    let (tx, mut rx) = mpsc::channel(32);
    let deadline = tokio::time::sleep(timeout);
    tokio::pin!(deadline);
    let start = worker.start(tx);
    tokio::pin!(start);
    let mut starting = true;
    let mut started: Option<f64> = None;

    loop {
        tokio::select! {
            biased;
            _ = &mut deadline => return LoadStatus::TimedOut(timeout),
            res = &mut start, if starting => {
                starting = false;
                if let Err(err) = res {
                    return LoadStatus::Failed(format!("{:#}", err));
                }
            }
            msg = rx.recv() => match msg {
                None => {
                    return LoadStatus::Failed(
                        "worker exited without reporting a load time".to_string(),
                    )
                }
                Some(WorkerMessage::Log(line)) => {
                    logging::log(
                        Level::Debug,
                        Domain::Worker,
                        "worker_log",
                        logging::obj(&[("msg", logging::v_str(&line))]),
                    );
                }
                Some(WorkerMessage::Error(err)) => return LoadStatus::Failed(err),
                Some(WorkerMessage::Start(t)) => started = Some(t),
                Some(WorkerMessage::End(t)) => {
                    return match started {
                        Some(s) => LoadStatus::Loaded { seconds: (t - s) / 1000.0 },
                        None => LoadStatus::Failed("end reported before start".to_string()),
                    };
                }
            },
        }
    }
}

/// Runs an external command; each stdout line is one [`WorkerMessage`].
pub struct ProcessWorker {
    program: String,
    args: Vec<String>,
}

impl ProcessWorker {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Splits a whitespace-separated command line.
    pub fn from_command_line(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self::new(program, parts.collect()))
    }
}

#[async_trait]
impl LoadWorker for ProcessWorker {
    async fn start(&self, tx: mpsc::Sender<WorkerMessage>) -> Result<()> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .with_context(|| format!("failed to start {}", self.program))?;
        let stdout = child
            .stdout
            .take()
            .context("worker stdout was not captured")?;

        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if let Some(msg) = WorkerMessage::parse(&line) {
                    if tx.send(msg).await.is_err() {
                        break;
                    }
                }
            }
            drop(tx);
            let _ = child.wait().await;
        });
        Ok(())
    }
}

/// The startup page's "measure now" control. Fires at most once.
pub struct LoadTimer {
    page: Arc<dyn Page>,
    worker: Arc<dyn LoadWorker>,
    timeout: Duration,
    fired: AtomicBool,
}

impl LoadTimer {
    pub fn new(page: Arc<dyn Page>, worker: Arc<dyn LoadWorker>, timeout: Duration) -> Self {
        Self {
            page,
            worker,
            timeout,
            fired: AtomicBool::new(false),
        }
    }

    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    /// `None` when the test already ran.
    pub async fn trigger(&self) -> Option<LoadStatus> {
        if self.fired.swap(true, Ordering::SeqCst) {
            return None;
        }
        self.page.set_text(LOAD_TEST_TARGET, "Loading...");
        let status = measure_load_time(self.worker.as_ref(), self.timeout).await;
        let line = status.to_string();
        self.page.set_text(LOAD_TEST_TARGET, &line);
        logging::log_worker_status(&line);
        Some(status)
    }
}
