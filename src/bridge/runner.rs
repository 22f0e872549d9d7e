//! Process runner
//!
//! `ScriptRunner` is the seam between the bridge and the scripting host.
//! `OsascriptRunner` spawns the host, writes the script to stdin and drains
//! stdout/stderr; tests substitute a scripted fake.

use std::io;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

use crate::config::BridgeConfig;

/// Captured output of a finished process
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was killed by a signal
    pub exit_code: Option<i32>,
}

impl RawOutput {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            exit_code: Some(0),
        }
    }

    pub fn failure(stderr: impl Into<String>, exit_code: i32) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.into(),
            exit_code: Some(exit_code),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Terminal state of one run; a timeout is its own state, not an error
#[derive(Debug)]
pub enum RunOutcome {
    Completed(RawOutput),
    TimedOut { after: Duration },
    /// The process could not be started
    SpawnFailed(io::Error),
    /// Writing the script or draining output failed
    Io(io::Error),
}

#[async_trait]
pub trait ScriptRunner: Send + Sync {
    /// Run one complete script. Implementations must kill the process when
    /// `deadline` passes.
    async fn run(&self, script: &str, deadline: Duration) -> RunOutcome;
}

/// Runs scripts through `osascript -l JavaScript -`
#[derive(Debug, Clone)]
pub struct OsascriptRunner {
    program: String,
    args: Vec<String>,
}

impl OsascriptRunner {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn from_config(config: &BridgeConfig) -> Self {
        Self::new(config.program.clone(), config.args.clone())
    }
}

impl Default for OsascriptRunner {
    fn default() -> Self {
        Self::from_config(&BridgeConfig::default())
    }
}

#[async_trait]
impl ScriptRunner for OsascriptRunner {
    async fn run(&self, script: &str, deadline: Duration) -> RunOutcome {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        // Dropping the child on timeout terminates the host process
        cmd.kill_on_drop(true);
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => return RunOutcome::SpawnFailed(e),
        };
        debug!(pid = child.id(), bytes = script.len(), "Spawned script host");

        if let Some(mut stdin) = child.stdin.take() {
            if let Err(e) = stdin.write_all(script.as_bytes()).await {
                return RunOutcome::Io(e);
            }
            if let Err(e) = stdin.shutdown().await {
                return RunOutcome::Io(e);
            }
        }

        match timeout(deadline, child.wait_with_output()).await {
            Ok(Ok(output)) => RunOutcome::Completed(RawOutput {
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                exit_code: output.status.code(),
            }),
            Ok(Err(e)) => RunOutcome::Io(e),
            Err(_) => RunOutcome::TimedOut { after: deadline },
        }
    }
}
