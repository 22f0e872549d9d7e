//! Scripted stand-in for the scripting host
//!
//! Each test hands `ScriptedRunner` a responder that sees the script text and
//! the zero-based call index; every script is recorded for later inspection.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use focus_bridge::bridge::{RawOutput, RunOutcome, ScriptRunner};
use focus_bridge::{EngineConfig, FocusTools};

/// What the fake host does for one call
#[derive(Debug, Clone)]
pub enum Reply {
    Stdout(String),
    Stderr(String, i32),
    TimedOut,
}

impl Reply {
    pub fn json(value: Value) -> Self {
        Reply::Stdout(value.to_string())
    }
}

type Responder = dyn Fn(&str, usize) -> Reply + Send + Sync;

pub struct ScriptedRunner {
    responder: Box<Responder>,
    scripts: Mutex<Vec<String>>,
}

impl ScriptedRunner {
    pub fn new<F>(responder: F) -> Arc<Self>
    where
        F: Fn(&str, usize) -> Reply + Send + Sync + 'static,
    {
        Arc::new(Self {
            responder: Box::new(responder),
            scripts: Mutex::new(Vec::new()),
        })
    }

    /// Same reply for every call
    pub fn always(reply: Reply) -> Arc<Self> {
        Self::new(move |_, _| reply.clone())
    }

    pub fn calls(&self) -> usize {
        self.scripts.lock().unwrap().len()
    }

    pub fn scripts(&self) -> Vec<String> {
        self.scripts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ScriptRunner for ScriptedRunner {
    async fn run(&self, script: &str, deadline: Duration) -> RunOutcome {
        let index = {
            let mut scripts = self.scripts.lock().unwrap();
            scripts.push(script.to_string());
            scripts.len() - 1
        };
        match (self.responder)(script, index) {
            Reply::Stdout(out) => RunOutcome::Completed(RawOutput::success(out)),
            Reply::Stderr(err, code) => RunOutcome::Completed(RawOutput::failure(err, code)),
            Reply::TimedOut => RunOutcome::TimedOut { after: deadline },
        }
    }
}

/// Engine over `runner` with default limits
pub fn engine(runner: Arc<ScriptedRunner>) -> FocusTools {
    engine_with(EngineConfig::default(), runner)
}

pub fn engine_with(config: EngineConfig, runner: Arc<ScriptedRunner>) -> FocusTools {
    FocusTools::new(&config, runner)
}

/// Primary query output with the given task ids
pub fn task_page(ids: &[&str]) -> Value {
    let items: Vec<Value> = ids
        .iter()
        .map(|id| serde_json::json!({"id": id, "name": format!("Task {}", id)}))
        .collect();
    serde_json::json!({"count": items.len(), "truncated": false, "items": items})
}
