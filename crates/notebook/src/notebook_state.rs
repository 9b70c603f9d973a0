use crate::runtime::Runtime;
use log::info;
use notebook_doc::{
    save_notebook, CellKind, MoveDirection, NotebookDocument, NotebookError, OutputRecord, Result,
};
use std::path::{Path, PathBuf};

const UNTITLED: &str = "Untitled.ipynb";

/// One open document plus the editor state around it.
///
/// Every edit goes through here so the dirty flag and the selection stay
/// in step with the document.
#[derive(Debug)]
pub struct NotebookState {
    pub document: NotebookDocument,
    pub path: Option<PathBuf>,
    pub dirty: bool,
    /// Selected cell, `None` when nothing is selected.
    pub selected: Option<usize>,
}

impl NotebookState {
    /// A new, never-saved Python document with no cells.
    pub fn new_empty() -> Self {
        Self::from_document(NotebookDocument::new(), None)
    }

    /// A new, never-saved document declaring `runtime` as its language.
    pub fn new_empty_with_runtime(runtime: &Runtime) -> Self {
        let mut document = NotebookDocument::new();
        document.metadata = runtime.document_metadata();
        Self::from_document(document, None)
    }

    pub fn from_document(document: NotebookDocument, path: Option<PathBuf>) -> Self {
        NotebookState {
            document,
            path,
            dirty: false,
            selected: None,
        }
    }

    /// File name of the bound path, or `Untitled.ipynb`.
    pub fn display_name(&self) -> String {
        self.path
            .as_deref()
            .and_then(Path::file_name)
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| UNTITLED.to_string())
    }

    pub fn runtime(&self, default: &Runtime) -> Runtime {
        Runtime::for_document(&self.document, default)
    }

    pub fn select(&mut self, index: Option<usize>) -> Result<()> {
        if let Some(index) = index {
            self.document.cell(index)?;
        }
        self.selected = index;
        Ok(())
    }

    pub fn insert_cell(&mut self, after: Option<usize>, kind: CellKind) -> Result<usize> {
        let index = self.document.insert_cell(after, kind)?;
        self.dirty = true;
        Ok(index)
    }

    /// Insert after the selected cell (or append) and select the new cell.
    pub fn add_cell(&mut self, kind: CellKind) -> Result<usize> {
        let index = self.insert_cell(self.selected, kind)?;
        self.selected = Some(index);
        Ok(index)
    }

    /// Delete a cell and select its successor. Returns the new selection.
    pub fn delete_cell(&mut self, index: usize) -> Result<usize> {
        let next = self.document.delete_cell(index)?;
        self.selected = Some(next);
        self.dirty = true;
        Ok(next)
    }

    /// Delete the selected cell. `Ok(None)` when nothing is selected.
    pub fn delete_selected(&mut self) -> Result<Option<usize>> {
        match self.selected {
            Some(index) => self.delete_cell(index).map(Some),
            None => Ok(None),
        }
    }

    /// Swap a cell with its neighbour. The selection follows the moved
    /// cell; a move with no neighbour changes nothing.
    pub fn move_cell(&mut self, index: usize, direction: MoveDirection) -> Result<Option<usize>> {
        let moved = self.document.move_cell(index, direction)?;
        if let Some(target) = moved {
            if self.selected == Some(index) {
                self.selected = Some(target);
            } else if self.selected == Some(target) {
                self.selected = Some(index);
            }
            self.dirty = true;
        }
        Ok(moved)
    }

    pub fn move_selected(&mut self, direction: MoveDirection) -> Result<Option<usize>> {
        match self.selected {
            Some(index) => self.move_cell(index, direction),
            None => Ok(None),
        }
    }

    pub fn set_cell_kind(&mut self, index: usize, kind: CellKind) -> Result<()> {
        self.document.set_cell_kind(index, kind)?;
        self.dirty = true;
        Ok(())
    }

    pub fn toggle_cell_kind(&mut self, index: usize) -> Result<CellKind> {
        let kind = self.document.toggle_cell_kind(index)?;
        self.dirty = true;
        Ok(kind)
    }

    pub fn update_cell_source(&mut self, index: usize, source: &str) -> Result<()> {
        self.document.set_cell_source(index, source)?;
        self.dirty = true;
        Ok(())
    }

    pub fn clear_outputs(&mut self, index: usize) -> Result<()> {
        self.document.clear_outputs(index)?;
        self.dirty = true;
        Ok(())
    }

    /// Attach a finished run to the cell with `cell_id`, wherever it sits
    /// now. Returns `None`, leaving the state untouched, when the cell no
    /// longer exists or is no longer a code cell.
    pub fn record_execution(
        &mut self,
        cell_id: &str,
        outputs: Vec<OutputRecord>,
        counted: bool,
    ) -> Result<Option<Option<i64>>> {
        let Some(index) = self.document.find_cell(cell_id) else {
            return Ok(None);
        };
        if !self.document.cells()[index].is_code() {
            return Ok(None);
        }
        let count = self.document.record_execution(index, outputs, counted)?;
        self.dirty = true;
        Ok(Some(count))
    }

    /// Write to the bound path. A document that was never saved has no
    /// path and is rejected rather than written somewhere made up.
    pub fn save(&mut self) -> Result<()> {
        let Some(path) = self.path.clone() else {
            return Err(NotebookError::UnwritableTarget {
                target: self.display_name(),
                reason: "the notebook has never been saved; use save-as with a path".to_string(),
            });
        };
        save_notebook(&path, &self.document)?;
        self.dirty = false;
        info!("[persist] Saved {}", path.display());
        Ok(())
    }

    /// Bind `path` and write to it. The binding only changes once the
    /// write succeeds.
    pub fn save_as(&mut self, path: impl Into<PathBuf>) -> Result<()> {
        let path = path.into();
        save_notebook(&path, &self.document)?;
        info!("[persist] Saved {}", path.display());
        self.path = Some(path);
        self.dirty = false;
        Ok(())
    }
}
