//! End-to-end runs through the registry with real processes.
//!
//! Cells are shell scripts: the notebook declares `sh` as its language and
//! the settings map that runtime to `/bin/sh`, so these tests need nothing
//! beyond a POSIX shell.

#![cfg(unix)]

use notebook::settings::{AppSettings, InterpreterSettings};
use notebook::{CellRun, ExecutionEngine, NotebookSource, Runtime, SessionRegistry, TabId};
use notebook_doc::{load_notebook, OutputRecord};

const SHELL_NOTEBOOK: &str = r#"{
 "cells": [
  {"cell_type": "code", "id": "greet", "metadata": {}, "source": ["echo hello\n", "echo world"], "execution_count": null, "outputs": []},
  {"cell_type": "markdown", "id": "note", "metadata": {}, "source": "Between the runs"},
  {"cell_type": "code", "id": "fail", "metadata": {}, "source": "echo 'Oops: it broke' >&2\nexit 4\n", "execution_count": null, "outputs": []},
  {"cell_type": "code", "id": "after", "metadata": {}, "source": "echo still running", "execution_count": null, "outputs": []}
 ],
 "metadata": {"kernelspec": {"name": "sh", "language": "sh", "display_name": "Shell"}},
 "nbformat": 4,
 "nbformat_minor": 5
}"#;

fn shell_engine() -> ExecutionEngine {
    let mut settings = AppSettings::default();
    settings.interpreters.insert(
        "sh".to_string(),
        InterpreterSettings::new("sh", &[], "sh"),
    );
    ExecutionEngine::new(settings)
}

fn write_notebook(dir: &tempfile::TempDir) -> std::path::PathBuf {
    let path = dir.path().join("shell.ipynb");
    std::fs::write(&path, SHELL_NOTEBOOK).unwrap();
    path
}

#[tokio::test]
async fn test_run_all_and_save_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_notebook(&dir);
    let registry = SessionRegistry::new();
    let tab = TabId::from("tab-1");
    let engine = shell_engine();

    let session = registry
        .open_or_focus(NotebookSource::Path(path.clone()), tab.clone())
        .unwrap();
    let runs = registry.run_all(&engine, &tab).await.unwrap();

    let ids: Vec<&str> = runs.iter().map(|(id, _)| id.as_str()).collect();
    assert_eq!(ids, vec!["greet", "fail", "after"]);
    assert!(!runs[0].1.has_error());
    assert!(runs[1].1.has_error());
    assert!(!runs[2].1.has_error());

    session.lock().save().unwrap();
    assert!(!session.lock().dirty);

    let saved = load_notebook(&path).unwrap();
    let cells = saved.cells();
    assert_eq!(cells[0].outputs(), &[OutputRecord::stdout("hello\nworld\n")]);
    assert_eq!(cells[0].execution_count(), Some(1));
    assert_eq!(cells[1].source, "Between the runs");
    match cells[2].outputs() {
        [OutputRecord::Stream { text, .. }, OutputRecord::Error { name, message, .. }] => {
            assert_eq!(text, "Oops: it broke\n");
            assert_eq!(name, "Oops");
            assert_eq!(message, "it broke");
        }
        other => panic!("Expected stream then error, got {other:?}"),
    }
    assert_eq!(cells[2].execution_count(), None);
    assert_eq!(cells[3].outputs(), &[OutputRecord::stdout("still running\n")]);
    assert_eq!(cells[3].execution_count(), Some(2));
}

#[tokio::test]
async fn test_missing_interpreter_leaves_count_unset() {
    let mut settings = AppSettings::default();
    settings.interpreters.insert(
        "sh".to_string(),
        InterpreterSettings::new("no-such-shell-7c1e", &[], "sh"),
    );
    let engine = ExecutionEngine::new(settings);
    let registry = SessionRegistry::new();
    let tab = TabId::from("tab");
    registry
        .open_or_focus(NotebookSource::Json(SHELL_NOTEBOOK.to_string()), tab.clone())
        .unwrap();

    let run = registry.run_cell(&engine, &tab, 0).await.unwrap();

    match run {
        CellRun::Completed {
            outputs,
            execution_count,
        } => {
            assert_eq!(execution_count, None);
            assert!(matches!(
                &outputs[..],
                [OutputRecord::Error { name, message, .. }]
                    if name == "InterpreterNotFound" && message.contains("no-such-shell-7c1e")
            ));
        }
        other => panic!("Expected completed run, got {other:?}"),
    }
}

#[tokio::test]
async fn test_notebooks_in_separate_tabs_run_concurrently() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_notebook(&dir);
    let registry = SessionRegistry::new();
    let engine = shell_engine();
    let left = TabId::from("left");
    let right = TabId::from("right");
    for tab in [&left, &right] {
        registry
            .open_or_focus(NotebookSource::Path(path.clone()), tab.clone())
            .unwrap();
    }

    let (left_runs, right_runs) = tokio::join!(
        registry.run_all(&engine, &left),
        registry.run_all(&engine, &right)
    );

    assert_eq!(left_runs.unwrap().len(), 3);
    assert_eq!(right_runs.unwrap().len(), 3);
    for tab in [&left, &right] {
        let session = registry.get(tab).unwrap();
        let state = session.lock();
        // Each session counts its own runs.
        assert_eq!(state.document.cells()[3].execution_count(), Some(2));
    }
}

#[tokio::test]
async fn test_new_document_save_requires_path() {
    let dir = tempfile::tempdir().unwrap();
    let registry = SessionRegistry::new();
    let tab = TabId::from("untitled");
    let session = registry
        .open_or_focus(NotebookSource::Empty(Runtime::Python), tab.clone())
        .unwrap();

    assert!(session.lock().save().is_err());

    let target = dir.path().join("fresh.ipynb");
    session.lock().save_as(&target).unwrap();
    assert_eq!(session.lock().display_name(), "fresh.ipynb");

    let saved = load_notebook(&target).unwrap();
    assert!(saved.is_empty());
    assert_eq!(saved.language(), Some("python"));
}
