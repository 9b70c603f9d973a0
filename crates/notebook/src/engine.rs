//! Cell execution: run a code cell's source under the interpreter for the
//! document's runtime and turn what comes back into output records.
//!
//! Every failure mode of a run (no interpreter configured, interpreter
//! missing, spawn failure, non-zero exit) ends up as an `Error` output on
//! the cell. Only a bad cell index is reported as a Rust error.

use std::sync::OnceLock;

use interpreter_launch::{CapturedOutput, LaunchError, ProcessRunner, ProgramRunner};
use log::{debug, info, warn};
use notebook_doc::{NotebookDocument, OutputRecord, Result};
use regex::Regex;

use crate::runtime::Runtime;
use crate::settings::{settings_path, AppSettings};

/// Exit status shells use for "command not found".
const SHELL_NOT_FOUND_STATUS: i32 = 127;

/// Outputs of one run, ready to attach to a cell.
#[derive(Debug, Clone, PartialEq)]
pub struct Execution {
    pub outputs: Vec<OutputRecord>,
    /// Whether the program actually ran and the cell should take the next
    /// execution count.
    pub counted: bool,
}

impl Execution {
    fn empty() -> Self {
        Execution {
            outputs: Vec::new(),
            counted: false,
        }
    }

    fn failed(name: &str, message: impl Into<String>) -> Self {
        Execution {
            outputs: vec![OutputRecord::error(name, message, Vec::new())],
            counted: false,
        }
    }
}

/// What happened to one cell when it was asked to run.
#[derive(Debug, Clone, PartialEq)]
pub enum CellRun {
    /// Markdown or raw cell; nothing ran and nothing changed.
    Skipped,
    /// Outputs were attached to the cell.
    Completed {
        outputs: Vec<OutputRecord>,
        execution_count: Option<i64>,
    },
    /// The run finished after its session or cell went away; the outputs
    /// were dropped.
    Discarded,
}

impl CellRun {
    pub fn has_error(&self) -> bool {
        matches!(self, CellRun::Completed { outputs, .. } if outputs.iter().any(OutputRecord::is_error))
    }
}

pub struct ExecutionEngine<R = ProcessRunner> {
    runner: R,
    settings: AppSettings,
}

impl ExecutionEngine<ProcessRunner> {
    pub fn new(settings: AppSettings) -> Self {
        Self::with_runner(ProcessRunner::new(), settings)
    }
}

impl<R: ProgramRunner> ExecutionEngine<R> {
    pub fn with_runner(runner: R, settings: AppSettings) -> Self {
        ExecutionEngine { runner, settings }
    }

    pub fn settings(&self) -> &AppSettings {
        &self.settings
    }

    pub fn runtime_for(&self, doc: &NotebookDocument) -> Runtime {
        Runtime::for_document(doc, &self.settings.default_runtime)
    }

    /// Run `source` as a program for `runtime`.
    ///
    /// Source that is blank once trimmed does not start a process. The
    /// untrimmed source is what runs.
    pub async fn execute(&self, runtime: &Runtime, source: &str) -> Execution {
        if source.trim().is_empty() {
            debug!("[engine] Skipping blank cell");
            return Execution::empty();
        }

        let Some(interpreter) = self.settings.interpreter_for(runtime) else {
            warn!("[engine] No interpreter configured for {}", runtime);
            return Execution::failed(
                "UnsupportedLanguage",
                format!(
                    "No interpreter is configured for `{}`. Add an entry under \
                     `interpreters.{}` in {}.",
                    runtime,
                    runtime,
                    settings_path().display()
                ),
            );
        };

        let program = interpreter.program(source);
        debug!(
            "[engine] Running {} cell with `{}`",
            runtime, program.command
        );

        match self.runner.run(&program).await {
            Ok(captured) if reports_missing_interpreter(&captured) => {
                warn!("[engine] `{}` reported a missing command", program.command);
                Execution::failed(
                    "InterpreterNotFound",
                    missing_interpreter_message(runtime, &program.command),
                )
            }
            Ok(captured) => classify(captured),
            Err(LaunchError::InterpreterNotFound { command }) => {
                warn!("[engine] Interpreter `{}` not found", command);
                Execution::failed(
                    "InterpreterNotFound",
                    missing_interpreter_message(runtime, &command),
                )
            }
            Err(e) => {
                warn!("[engine] Launch failed: {}", e);
                Execution::failed("LaunchError", e.to_string())
            }
        }
    }

    /// Run one cell and attach the results to it, replacing whatever the
    /// previous run left there.
    pub async fn run_cell(&self, doc: &mut NotebookDocument, index: usize) -> Result<CellRun> {
        let cell = doc.cell(index)?;
        if !cell.is_code() {
            return Ok(CellRun::Skipped);
        }
        let source = cell.source.clone();
        let runtime = self.runtime_for(doc);

        let Execution { outputs, counted } = self.execute(&runtime, &source).await;
        let execution_count = doc.record_execution(index, outputs.clone(), counted)?;
        info!(
            "[engine] Cell {} finished with {} outputs (count {:?})",
            index,
            outputs.len(),
            execution_count
        );
        Ok(CellRun::Completed {
            outputs,
            execution_count,
        })
    }

    /// Run every code cell in document order, one at a time. A failing
    /// cell does not stop the ones after it.
    pub async fn run_all(&self, doc: &mut NotebookDocument) -> Vec<(usize, CellRun)> {
        let mut runs = Vec::new();
        for index in 0..doc.len() {
            if !doc.cells()[index].is_code() {
                continue;
            }
            match self.run_cell(doc, index).await {
                Ok(run) => runs.push((index, run)),
                Err(e) => warn!("[engine] Cell {} could not run: {}", index, e),
            }
        }
        runs
    }
}

/// Turn a finished process into outputs. A zero exit gives one stream
/// record and takes a count. A non-zero exit adds an error record parsed
/// from the last `Name: message` line and leaves the count unset.
fn classify(captured: CapturedOutput) -> Execution {
    if captured.success() {
        return Execution {
            outputs: vec![OutputRecord::stdout(captured.text)],
            counted: true,
        };
    }

    let (name, message) = last_error_line(&captured.text).unwrap_or_else(|| {
        let message = match captured.exit_code {
            Some(code) => format!("Process exited with status {}", code),
            None => "Process was terminated by a signal".to_string(),
        };
        ("ExitStatus".to_string(), message)
    });
    let traceback = captured.text.lines().map(str::to_string).collect();

    let mut outputs = Vec::new();
    if !captured.text.is_empty() {
        outputs.push(OutputRecord::stdout(captured.text));
    }
    outputs.push(OutputRecord::error(name, message, traceback));
    Execution {
        outputs,
        counted: false,
    }
}

fn last_error_line(text: &str) -> Option<(String, String)> {
    static ERROR_LINE: OnceLock<Option<Regex>> = OnceLock::new();
    let pattern = ERROR_LINE
        .get_or_init(|| Regex::new(r"^([A-Za-z_][\w.]*): ?(.*)$").ok())
        .as_ref()?;

    let line = text.lines().rev().find(|l| !l.trim().is_empty())?;
    let caps = pattern.captures(line.trim_end())?;
    Some((caps[1].to_string(), caps[2].to_string()))
}

/// A shell that could not find the interpreter exits with 127 and says so
/// on the first line. Any other status is the program's own failure.
fn reports_missing_interpreter(captured: &CapturedOutput) -> bool {
    static NOT_FOUND: OnceLock<Option<Regex>> = OnceLock::new();
    if captured.exit_code != Some(SHELL_NOT_FOUND_STATUS) {
        return false;
    }
    let Some(pattern) = NOT_FOUND
        .get_or_init(|| {
            Regex::new(
                r"(?i)(command not found|: not found$|is not recognized as an internal or external command)",
            )
            .ok()
        })
        .as_ref()
    else {
        return false;
    };

    match captured.text.lines().find(|l| !l.trim().is_empty()) {
        Some(line) => pattern.is_match(line.trim_end()),
        None => true,
    }
}

fn missing_interpreter_message(runtime: &Runtime, command: &str) -> String {
    format!(
        "Interpreter `{}` for {} cells was not found. Install it and make sure it is on \
         your PATH, or set `interpreters.{}.command` in {}.",
        command,
        runtime,
        runtime,
        settings_path().display()
    )
}
