//! Process-backed [`ProgramRunner`].
//!
//! The source is written to a uniquely named temporary file, the
//! interpreter is spawned with that file as its last argument, and both
//! output pipes are drained into one buffer as data arrives. The staged
//! file is a [`TempPath`], removed when it drops on every return path.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::Stdio;

use log::{debug, info};
use tempfile::TempPath;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

use crate::{CapturedOutput, LaunchError, Program, ProgramRunner};

const STAGED_PREFIX: &str = "notebook_cell_";
const READ_CHUNK: usize = 8 * 1024;

#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    staging_dir: Option<PathBuf>,
}

impl ProcessRunner {
    /// Stage programs in the system temporary directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage programs in `dir` instead of the system temporary directory.
    pub fn with_staging_dir(dir: impl Into<PathBuf>) -> Self {
        ProcessRunner {
            staging_dir: Some(dir.into()),
        }
    }

    fn stage(&self, program: &Program) -> Result<TempPath, LaunchError> {
        let suffix = if program.file_extension.is_empty() {
            String::new()
        } else {
            format!(".{}", program.file_extension)
        };
        let mut builder = tempfile::Builder::new();
        builder.prefix(STAGED_PREFIX).suffix(&suffix);

        let mut file = match &self.staging_dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        }
        .map_err(LaunchError::Staging)?;

        file.write_all(program.source.as_bytes())
            .map_err(LaunchError::Staging)?;
        file.flush().map_err(LaunchError::Staging)?;

        Ok(file.into_temp_path())
    }

    async fn run_staged(
        &self,
        program: &Program,
        staged: &Path,
    ) -> Result<CapturedOutput, LaunchError> {
        let mut child = Command::new(&program.command)
            .args(&program.args)
            .arg(staged)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| match source.kind() {
                io::ErrorKind::NotFound => LaunchError::InterpreterNotFound {
                    command: program.command.clone(),
                },
                _ => LaunchError::Spawn {
                    command: program.command.clone(),
                    source,
                },
            })?;

        let merged = capture_merged(child.stdout.take(), child.stderr.take())
            .await
            .map_err(LaunchError::Capture)?;
        let status = child.wait().await.map_err(LaunchError::Capture)?;

        info!(
            "[launch] `{}` exited with {} ({} bytes of output)",
            program.command,
            status,
            merged.len()
        );

        Ok(CapturedOutput {
            text: String::from_utf8_lossy(&merged).into_owned(),
            exit_code: status.code(),
        })
    }
}

impl ProgramRunner for ProcessRunner {
    async fn run(&self, program: &Program) -> Result<CapturedOutput, LaunchError> {
        let staged = self.stage(program)?;
        debug!("[launch] Staged program at {}", staged.display());
        self.run_staged(program, &staged).await
    }
}

/// Drain both pipes into one buffer, appending chunks in arrival order.
async fn capture_merged<O, E>(stdout: Option<O>, stderr: Option<E>) -> io::Result<Vec<u8>>
where
    O: AsyncRead + Unpin,
    E: AsyncRead + Unpin,
{
    let mut stdout = stdout;
    let mut stderr = stderr;
    let mut merged = Vec::new();
    let mut out_buf = vec![0u8; READ_CHUNK];
    let mut err_buf = vec![0u8; READ_CHUNK];

    while stdout.is_some() || stderr.is_some() {
        tokio::select! {
            read = read_chunk(&mut stdout, &mut out_buf) => match read? {
                0 => stdout = None,
                n => merged.extend_from_slice(&out_buf[..n]),
            },
            read = read_chunk(&mut stderr, &mut err_buf) => match read? {
                0 => stderr = None,
                n => merged.extend_from_slice(&err_buf[..n]),
            },
        }
    }

    Ok(merged)
}

/// Read from a pipe, or wait forever once it has been closed so the other
/// branch of the `select!` keeps running.
async fn read_chunk<R: AsyncRead + Unpin>(pipe: &mut Option<R>, buf: &mut [u8]) -> io::Result<usize> {
    match pipe {
        Some(reader) => reader.read(buf).await,
        None => std::future::pending().await,
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn shell_program(source: &str) -> Program {
        Program {
            command: "sh".to_string(),
            args: vec![],
            file_extension: "sh".to_string(),
            source: source.to_string(),
        }
    }

    #[tokio::test]
    async fn test_captures_stdout_and_stderr() {
        let runner = ProcessRunner::new();

        let output = runner
            .run(&shell_program("echo out\necho err 1>&2\n"))
            .await
            .unwrap();

        assert!(output.success());
        assert!(output.text.contains("out\n"));
        assert!(output.text.contains("err\n"));
    }

    #[tokio::test]
    async fn test_reports_exit_code() {
        let runner = ProcessRunner::new();

        let output = runner
            .run(&shell_program("echo partial\nexit 3\n"))
            .await
            .unwrap();

        assert_eq!(output.exit_code, Some(3));
        assert_eq!(output.text, "partial\n");
    }

    #[tokio::test]
    async fn test_staged_file_is_removed() {
        let dir = TempDir::new().unwrap();
        let runner = ProcessRunner::with_staging_dir(dir.path());

        runner.run(&shell_program("exit 0\n")).await.unwrap();
        runner.run(&shell_program("exit 1\n")).await.unwrap();

        let leftovers: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert!(leftovers.is_empty(), "staged files left behind: {leftovers:?}");
    }

    #[tokio::test]
    async fn test_staged_file_is_removed_when_launch_fails() {
        let dir = TempDir::new().unwrap();
        let runner = ProcessRunner::with_staging_dir(dir.path());
        let program = Program {
            command: "definitely-not-an-interpreter-4b1d".to_string(),
            ..shell_program("echo hi\n")
        };

        let result = runner.run(&program).await;

        assert!(matches!(
            result,
            Err(LaunchError::InterpreterNotFound { ref command })
                if command == "definitely-not-an-interpreter-4b1d"
        ));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_staged_file_has_extension() {
        let runner = ProcessRunner::new();

        let output = runner
            .run(&shell_program("case \"$0\" in *.sh) echo yes;; *) echo no;; esac\n"))
            .await
            .unwrap();

        assert_eq!(output.text, "yes\n");
    }

    #[tokio::test]
    async fn test_missing_staging_dir_is_staging_error() {
        let runner = ProcessRunner::with_staging_dir("/nonexistent/staging/dir");
        let result = runner.run(&shell_program("echo hi\n")).await;
        assert!(matches!(result, Err(LaunchError::Staging(_))));
    }
}
