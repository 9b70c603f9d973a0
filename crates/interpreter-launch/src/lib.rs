//! Running programs under an external interpreter.
//!
//! [`ProgramRunner`] is the seam between notebook execution and the
//! operating system: given a [`Program`] (interpreter command plus source
//! text) it produces the combined stdout/stderr text and exit status.
//! [`ProcessRunner`] is the real implementation; tests substitute their own.

use std::future::Future;
use std::io;
use std::sync::Arc;

mod process;

pub use process::ProcessRunner;

/// A program to run: the interpreter command line and the source it runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Program {
    /// Interpreter executable, resolved through `PATH`.
    pub command: String,
    /// Arguments placed before the staged source file.
    pub args: Vec<String>,
    /// Extension for the staged source file, without the dot.
    pub file_extension: String,
    pub source: String,
}

/// Output of a finished process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedOutput {
    /// Stdout and stderr, interleaved in the order the pipes delivered them.
    pub text: String,
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
}

impl CapturedOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("Interpreter `{command}` was not found")]
    InterpreterNotFound { command: String },

    #[error("Failed to launch `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to stage program: {0}")]
    Staging(#[source] io::Error),

    #[error("Failed to capture program output: {0}")]
    Capture(#[source] io::Error),
}

/// Run a program and capture merged stdout+stderr as text.
pub trait ProgramRunner: Send + Sync {
    fn run(
        &self,
        program: &Program,
    ) -> impl Future<Output = Result<CapturedOutput, LaunchError>> + Send;
}

impl<R: ProgramRunner> ProgramRunner for Arc<R> {
    fn run(
        &self,
        program: &Program,
    ) -> impl Future<Output = Result<CapturedOutput, LaunchError>> + Send {
        (**self).run(program)
    }
}
