//! In-process [`ProgramRunner`] for execution tests.

use std::sync::{Arc, Mutex};

use interpreter_launch::{CapturedOutput, LaunchError, Program, ProgramRunner};
use tokio::sync::Notify;

#[derive(Debug, Clone)]
enum Reply {
    Output(CapturedOutput),
    NotFound,
    SpawnFailure(String),
}

/// Answers each program with the reply of the first rule whose pattern
/// occurs in the source, or an empty successful run. Clones share the
/// record of programs run.
#[derive(Debug, Clone, Default)]
pub struct FakeRunner {
    rules: Vec<(String, Reply)>,
    fallback: Option<Reply>,
    programs: Arc<Mutex<Vec<Program>>>,
    started: Option<Arc<Notify>>,
    gate: Option<Arc<Notify>>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ok(text: &str) -> CapturedOutput {
        Self::exit(text, 0)
    }

    pub fn exit(text: &str, code: i32) -> CapturedOutput {
        CapturedOutput {
            text: text.to_string(),
            exit_code: Some(code),
        }
    }

    pub fn on(mut self, pattern: &str, output: CapturedOutput) -> Self {
        self.rules.push((pattern.to_string(), Reply::Output(output)));
        self
    }

    /// Every program fails as if the interpreter were not installed.
    pub fn missing_interpreter(mut self) -> Self {
        self.fallback = Some(Reply::NotFound);
        self
    }

    pub fn failing_spawn(mut self, message: &str) -> Self {
        self.fallback = Some(Reply::SpawnFailure(message.to_string()));
        self
    }

    /// Signal `started` when a run begins and hold it until `gate` is
    /// notified.
    pub fn gated(mut self, started: Arc<Notify>, gate: Arc<Notify>) -> Self {
        self.started = Some(started);
        self.gate = Some(gate);
        self
    }

    pub fn programs(&self) -> Vec<Program> {
        self.programs.lock().unwrap().clone()
    }

    fn reply_for(&self, program: &Program) -> Reply {
        self.rules
            .iter()
            .find(|(pattern, _)| program.source.contains(pattern.as_str()))
            .map(|(_, reply)| reply.clone())
            .or_else(|| self.fallback.clone())
            .unwrap_or_else(|| Reply::Output(Self::ok("")))
    }
}

impl ProgramRunner for FakeRunner {
    async fn run(&self, program: &Program) -> Result<CapturedOutput, LaunchError> {
        self.programs.lock().unwrap().push(program.clone());
        let reply = self.reply_for(program);

        if let Some(started) = &self.started {
            started.notify_one();
        }
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }

        match reply {
            Reply::Output(output) => Ok(output),
            Reply::NotFound => Err(LaunchError::InterpreterNotFound {
                command: program.command.clone(),
            }),
            Reply::SpawnFailure(message) => Err(LaunchError::Spawn {
                command: program.command.clone(),
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, message),
            }),
        }
    }
}
