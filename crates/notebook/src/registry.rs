//! Open notebooks keyed by the host tab that shows them.
//!
//! Each tab identity owns at most one [`Session`]. Two tabs opened on the
//! same file get independent sessions; whichever saves last wins. Cell
//! runs release every lock while the interpreter is busy and re-check the
//! binding before attaching results, so a run that outlives its tab is
//! dropped instead of landing in whatever session holds that tab next.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use interpreter_launch::ProgramRunner;
use log::{debug, info, warn};
use notebook_doc::{load_notebook, parse_notebook, NotebookError};
use uuid::Uuid;

use crate::engine::{CellRun, Execution, ExecutionEngine};
use crate::notebook_state::NotebookState;
use crate::runtime::Runtime;

/// Opaque identity the host gives a tab.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TabId(String);

impl TabId {
    pub fn new(id: impl Into<String>) -> Self {
        TabId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TabId {
    fn from(id: &str) -> Self {
        TabId::new(id)
    }
}

impl From<String> for TabId {
    fn from(id: String) -> Self {
        TabId(id)
    }
}

/// Where a new session's document comes from.
#[derive(Debug, Clone)]
pub enum NotebookSource {
    /// Load from disk; the session is bound to this path.
    Path(PathBuf),
    /// Notebook JSON supplied by the host, not yet bound to a path.
    Json(String),
    /// A new, empty document for `runtime`.
    Empty(Runtime),
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("No session is open in tab {0}")]
    NotBound(TabId),

    #[error(transparent)]
    Document(#[from] NotebookError),
}

#[derive(Debug)]
pub struct Session {
    tab: TabId,
    id: Uuid,
    state: Mutex<NotebookState>,
}

impl Session {
    fn new(tab: TabId, state: NotebookState) -> Self {
        Session {
            tab,
            id: Uuid::new_v4(),
            state: Mutex::new(state),
        }
    }

    pub fn tab(&self) -> &TabId {
        &self.tab
    }

    /// Unique per session, even when a tab identity is reused.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Lock the session's state. Edits validate before mutating, so a
    /// poisoned lock still guards a consistent document.
    pub fn lock(&self) -> MutexGuard<'_, NotebookState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<TabId, Arc<Session>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<TabId, Arc<Session>>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Return the session bound to `tab`, or build one from `source` and
    /// bind it. An already-bound tab is returned as is, without reloading.
    pub fn open_or_focus(
        &self,
        source: NotebookSource,
        tab: impl Into<TabId>,
    ) -> Result<Arc<Session>, SessionError> {
        let tab = tab.into();
        if let Some(existing) = self.get(&tab) {
            debug!("[registry] Focusing existing session in tab {}", tab);
            return Ok(existing);
        }

        let state = match source {
            NotebookSource::Path(path) => {
                let document = load_notebook(&path)?;
                NotebookState::from_document(document, Some(path))
            }
            NotebookSource::Json(json) => NotebookState::from_document(parse_notebook(&json)?, None),
            NotebookSource::Empty(runtime) => NotebookState::new_empty_with_runtime(&runtime),
        };

        let mut sessions = self.sessions();
        // Another caller may have bound the tab while the file loaded.
        let session = sessions
            .entry(tab.clone())
            .or_insert_with(|| {
                let session = Session::new(tab.clone(), state);
                info!(
                    "[registry] Opened {} in tab {} (session {})",
                    session.lock().display_name(),
                    tab,
                    session.id
                );
                Arc::new(session)
            })
            .clone();
        Ok(session)
    }

    pub fn get(&self, tab: &TabId) -> Option<Arc<Session>> {
        self.sessions().get(tab).cloned()
    }

    /// Unbind and return the tab's session. Nothing is saved.
    pub fn close(&self, tab: &TabId) -> Option<Arc<Session>> {
        let closed = self.sessions().remove(tab);
        if let Some(session) = &closed {
            let dirty = session.lock().dirty;
            info!(
                "[registry] Closed tab {} (session {}{})",
                tab,
                session.id,
                if dirty { ", unsaved changes discarded" } else { "" }
            );
        }
        closed
    }

    pub fn tabs(&self) -> Vec<TabId> {
        self.sessions().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.sessions().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions().is_empty()
    }

    /// Whether `session` is still the one bound to its tab.
    pub fn is_bound(&self, session: &Arc<Session>) -> bool {
        self.sessions()
            .get(&session.tab)
            .is_some_and(|bound| Arc::ptr_eq(bound, session))
    }

    /// Apply `f` to the tab's state under its session lock.
    pub fn with_state<T>(
        &self,
        tab: &TabId,
        f: impl FnOnce(&mut NotebookState) -> T,
    ) -> Result<T, SessionError> {
        let session = self.bound(tab)?;
        let mut state = session.lock();
        Ok(f(&mut state))
    }

    pub fn mark_modified(&self, tab: &TabId, modified: bool) -> Result<(), SessionError> {
        self.with_state(tab, |state| state.dirty = modified)
    }

    /// Select a cell, or clear the selection with `None`.
    pub fn set_selected(&self, tab: &TabId, index: Option<usize>) -> Result<(), SessionError> {
        self.with_state(tab, |state| state.select(index))?
            .map_err(SessionError::from)
    }

    fn bound(&self, tab: &TabId) -> Result<Arc<Session>, SessionError> {
        self.get(tab).ok_or_else(|| SessionError::NotBound(tab.clone()))
    }

    /// Run one cell of the tab's document.
    ///
    /// The cell is identified by id once the run starts, so edits made
    /// while it runs (moves, inserts) do not misdirect its outputs. If the
    /// tab was closed, or the cell deleted or turned into a non-code cell
    /// in the meantime, the result is [`CellRun::Discarded`].
    pub async fn run_cell<R: ProgramRunner>(
        &self,
        engine: &ExecutionEngine<R>,
        tab: &TabId,
        index: usize,
    ) -> Result<CellRun, SessionError> {
        let session = self.bound(tab)?;
        let (cell_id, source, runtime) = {
            let state = session.lock();
            let cell = state.document.cell(index)?;
            if !cell.is_code() {
                return Ok(CellRun::Skipped);
            }
            (
                cell.id.clone(),
                cell.source.clone(),
                engine.runtime_for(&state.document),
            )
        };
        self.execute_and_attach(engine, &session, &cell_id, &source, &runtime)
            .await
    }

    async fn execute_and_attach<R: ProgramRunner>(
        &self,
        engine: &ExecutionEngine<R>,
        session: &Arc<Session>,
        cell_id: &str,
        source: &str,
        runtime: &Runtime,
    ) -> Result<CellRun, SessionError> {
        let Execution { outputs, counted } = engine.execute(runtime, source).await;

        // Hold the binding steady while attaching so a concurrent close
        // can't slip in between the check and the write.
        let sessions = self.sessions();
        let still_bound = sessions
            .get(&session.tab)
            .is_some_and(|bound| Arc::ptr_eq(bound, session));
        if !still_bound {
            warn!(
                "[registry] Dropping outputs for cell {}: tab {} was closed",
                cell_id, session.tab
            );
            return Ok(CellRun::Discarded);
        }

        let mut state = session.lock();
        match state.record_execution(cell_id, outputs.clone(), counted)? {
            Some(execution_count) => Ok(CellRun::Completed {
                outputs,
                execution_count,
            }),
            None => {
                warn!(
                    "[registry] Dropping outputs for cell {}: it was deleted or is no longer code",
                    cell_id
                );
                Ok(CellRun::Discarded)
            }
        }
    }

    /// Run the selected cell. `Ok(None)` when nothing is selected.
    pub async fn run_selected<R: ProgramRunner>(
        &self,
        engine: &ExecutionEngine<R>,
        tab: &TabId,
    ) -> Result<Option<CellRun>, SessionError> {
        let selected = self.bound(tab)?.lock().selected;
        match selected {
            Some(index) => self.run_cell(engine, tab, index).await.map(Some),
            None => Ok(None),
        }
    }

    /// Run every code cell of the tab's document in order, one at a time.
    ///
    /// The set of cells is fixed when the batch starts. A cell that fails
    /// does not stop the batch; a cell deleted or turned into markdown
    /// before its turn is skipped. Each cell runs in the session the batch
    /// started in, and closing the tab ends the batch.
    pub async fn run_all<R: ProgramRunner>(
        &self,
        engine: &ExecutionEngine<R>,
        tab: &TabId,
    ) -> Result<Vec<(String, CellRun)>, SessionError> {
        let session = self.bound(tab)?;
        let cell_ids = session.lock().document.code_cell_ids();
        info!(
            "[registry] Running {} code cells in tab {}",
            cell_ids.len(),
            tab
        );

        let mut runs = Vec::with_capacity(cell_ids.len());
        for cell_id in cell_ids {
            if !self.is_bound(&session) {
                warn!("[registry] Tab {} closed during run-all; stopping", tab);
                break;
            }
            let (source, runtime) = {
                let state = session.lock();
                let cell = state
                    .document
                    .find_cell(&cell_id)
                    .map(|index| &state.document.cells()[index]);
                match cell {
                    Some(cell) if cell.is_code() => {
                        (cell.source.clone(), engine.runtime_for(&state.document))
                    }
                    _ => {
                        debug!("[registry] Cell {} is gone or no longer code", cell_id);
                        continue;
                    }
                }
            };
            let run = self
                .execute_and_attach(engine, &session, &cell_id, &source, &runtime)
                .await?;
            runs.push((cell_id, run));
        }
        Ok(runs)
    }
}
