//! In-memory notebook document and its structural edits.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::error::{NotebookError, Result};
use crate::output::OutputRecord;

/// Format version written for new documents.
pub const NBFORMAT_MAJOR: u32 = 4;
pub const NBFORMAT_MINOR: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CellKind {
    Code,
    Markdown,
    Raw,
}

impl fmt::Display for CellKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellKind::Code => write!(f, "code"),
            CellKind::Markdown => write!(f, "markdown"),
            CellKind::Raw => write!(f, "raw"),
        }
    }
}

impl FromStr for CellKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "code" => Ok(CellKind::Code),
            "markdown" => Ok(CellKind::Markdown),
            "raw" => Ok(CellKind::Raw),
            _ => Err(format!("Unknown cell type: {}", s)),
        }
    }
}

/// Kind-specific cell fields. Only code cells carry an execution count
/// and outputs.
#[derive(Debug, Clone, PartialEq)]
pub enum CellContent {
    Code {
        execution_count: Option<i64>,
        outputs: Vec<OutputRecord>,
    },
    Markdown {
        attachments: Option<Value>,
    },
    Raw {
        attachments: Option<Value>,
    },
}

impl CellContent {
    fn empty(kind: CellKind) -> Self {
        match kind {
            CellKind::Code => CellContent::Code {
                execution_count: None,
                outputs: Vec::new(),
            },
            CellKind::Markdown => CellContent::Markdown { attachments: None },
            CellKind::Raw => CellContent::Raw { attachments: None },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    /// Stable identity, independent of the cell's position.
    pub id: String,
    /// Logical source text.
    pub source: String,
    pub metadata: Map<String, Value>,
    pub content: CellContent,
}

impl Cell {
    pub fn new(kind: CellKind) -> Self {
        Cell {
            id: new_cell_id(),
            source: String::new(),
            metadata: Map::new(),
            content: CellContent::empty(kind),
        }
    }

    pub fn kind(&self) -> CellKind {
        match self.content {
            CellContent::Code { .. } => CellKind::Code,
            CellContent::Markdown { .. } => CellKind::Markdown,
            CellContent::Raw { .. } => CellKind::Raw,
        }
    }

    pub fn is_code(&self) -> bool {
        matches!(self.content, CellContent::Code { .. })
    }

    pub fn execution_count(&self) -> Option<i64> {
        match self.content {
            CellContent::Code {
                execution_count, ..
            } => execution_count,
            _ => None,
        }
    }

    /// Outputs of a code cell; empty for every other kind.
    pub fn outputs(&self) -> &[OutputRecord] {
        match &self.content {
            CellContent::Code { outputs, .. } => outputs,
            _ => &[],
        }
    }

    /// Re-tag the cell, adding or dropping kind-specific fields.
    ///
    /// Source and metadata are kept. A code cell's outputs and count do not
    /// survive a trip through another kind.
    fn set_kind(&mut self, kind: CellKind) {
        if self.kind() == kind {
            return;
        }
        let attachments = match &mut self.content {
            CellContent::Markdown { attachments } | CellContent::Raw { attachments } => {
                attachments.take()
            }
            CellContent::Code { .. } => None,
        };
        self.content = match kind {
            CellKind::Code => CellContent::empty(CellKind::Code),
            CellKind::Markdown => CellContent::Markdown { attachments },
            CellKind::Raw => CellContent::Raw { attachments },
        };
    }
}

pub(crate) fn new_cell_id() -> String {
    Uuid::new_v4().to_string()
}

/// `(major, minor)` version of the notebook format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FormatVersion {
    pub major: u32,
    pub minor: u32,
}

impl FormatVersion {
    pub const CURRENT: FormatVersion = FormatVersion {
        major: NBFORMAT_MAJOR,
        minor: NBFORMAT_MINOR,
    };

    /// Cell `id` fields were introduced in 4.5.
    pub fn has_cell_ids(&self) -> bool {
        *self >= FormatVersion { major: 4, minor: 5 }
    }
}

impl fmt::Display for FormatVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Direction for [`NotebookDocument::move_cell`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveDirection {
    Up,
    Down,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NotebookDocument {
    cells: Vec<Cell>,
    /// Notebook-level metadata, preserved verbatim.
    pub metadata: Map<String, Value>,
    pub format: FormatVersion,
    next_execution_count: i64,
}

impl Default for NotebookDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl NotebookDocument {
    /// A new document with no cells and Python kernel metadata.
    pub fn new() -> Self {
        let mut metadata = Map::new();
        metadata.insert(
            "kernelspec".to_string(),
            json!({
                "display_name": "Python 3",
                "language": "python",
                "name": "python3",
            }),
        );
        metadata.insert("language_info".to_string(), json!({ "name": "python" }));
        Self::from_parts(Vec::new(), metadata, FormatVersion::CURRENT)
    }

    /// Assemble a document from loaded parts.
    ///
    /// The execution counter resumes past the highest count already present,
    /// so a run never re-issues a persisted count.
    pub fn from_parts(cells: Vec<Cell>, metadata: Map<String, Value>, format: FormatVersion) -> Self {
        let next_execution_count = cells
            .iter()
            .filter_map(Cell::execution_count)
            .max()
            .map_or(1, |max| max.saturating_add(1));
        NotebookDocument {
            cells,
            metadata,
            format,
            next_execution_count,
        }
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn cell(&self, index: usize) -> Result<&Cell> {
        let len = self.cells.len();
        self.cells
            .get(index)
            .ok_or(NotebookError::CellIndexOutOfRange { index, len })
    }

    fn cell_mut(&mut self, index: usize) -> Result<&mut Cell> {
        let len = self.cells.len();
        self.cells
            .get_mut(index)
            .ok_or(NotebookError::CellIndexOutOfRange { index, len })
    }

    pub fn find_cell(&self, cell_id: &str) -> Option<usize> {
        self.cells.iter().position(|c| c.id == cell_id)
    }

    /// Declared language: `kernelspec.language`, else `language_info.name`.
    pub fn language(&self) -> Option<&str> {
        self.metadata
            .get("kernelspec")
            .and_then(|k| k.get("language"))
            .and_then(Value::as_str)
            .or_else(|| {
                self.metadata
                    .get("language_info")
                    .and_then(|l| l.get("name"))
                    .and_then(Value::as_str)
            })
    }

    /// Insert an empty cell right after `after`, or append when `after` is
    /// `None`. Returns the new cell's index.
    pub fn insert_cell(&mut self, after: Option<usize>, kind: CellKind) -> Result<usize> {
        let index = match after {
            Some(after) => {
                self.cell(after)?;
                after + 1
            }
            None => self.cells.len(),
        };
        self.cells.insert(index, Cell::new(kind));
        Ok(index)
    }

    /// Remove a cell and return the index to select next.
    ///
    /// The last remaining cell cannot be deleted; the document is left
    /// untouched in that case.
    pub fn delete_cell(&mut self, index: usize) -> Result<usize> {
        self.cell(index)?;
        if self.cells.len() <= 1 {
            return Err(NotebookError::InvariantViolation(
                "a notebook must keep at least one cell".to_string(),
            ));
        }
        self.cells.remove(index);
        Ok(index.min(self.cells.len() - 1))
    }

    /// Swap a cell with its neighbour. Returns the cell's new index, or
    /// `None` when there is no neighbour in that direction.
    pub fn move_cell(&mut self, index: usize, direction: MoveDirection) -> Result<Option<usize>> {
        self.cell(index)?;
        let target = match direction {
            MoveDirection::Up => index.checked_sub(1),
            MoveDirection::Down => Some(index + 1).filter(|&i| i < self.cells.len()),
        };
        if let Some(target) = target {
            self.cells.swap(index, target);
        }
        Ok(target)
    }

    pub fn set_cell_kind(&mut self, index: usize, kind: CellKind) -> Result<()> {
        self.cell_mut(index)?.set_kind(kind);
        Ok(())
    }

    /// Code becomes markdown, markdown becomes code, raw is left alone.
    pub fn toggle_cell_kind(&mut self, index: usize) -> Result<CellKind> {
        let cell = self.cell_mut(index)?;
        let kind = match cell.kind() {
            CellKind::Code => CellKind::Markdown,
            CellKind::Markdown => CellKind::Code,
            CellKind::Raw => CellKind::Raw,
        };
        cell.set_kind(kind);
        Ok(kind)
    }

    pub fn set_cell_source(&mut self, index: usize, text: &str) -> Result<()> {
        self.cell_mut(index)?.source = text.to_string();
        Ok(())
    }

    /// Replace a code cell's outputs wholesale.
    ///
    /// When `counted`, the cell is stamped with the next execution count;
    /// otherwise its count is cleared. Non-code cells are left alone and
    /// yield `None`.
    pub fn record_execution(
        &mut self,
        index: usize,
        new_outputs: Vec<OutputRecord>,
        counted: bool,
    ) -> Result<Option<i64>> {
        let len = self.cells.len();
        let count = counted.then_some(self.next_execution_count);
        let cell = self
            .cells
            .get_mut(index)
            .ok_or(NotebookError::CellIndexOutOfRange { index, len })?;
        let CellContent::Code {
            execution_count,
            outputs,
        } = &mut cell.content
        else {
            return Ok(None);
        };
        *outputs = new_outputs;
        *execution_count = count;
        if counted {
            self.next_execution_count = self.next_execution_count.saturating_add(1);
        }
        Ok(count)
    }

    pub fn clear_outputs(&mut self, index: usize) -> Result<()> {
        if let CellContent::Code {
            execution_count,
            outputs,
        } = &mut self.cell_mut(index)?.content
        {
            outputs.clear();
            *execution_count = None;
        }
        Ok(())
    }

    /// Ids of all code cells in document order.
    pub fn code_cell_ids(&self) -> Vec<String> {
        self.cells
            .iter()
            .filter(|c| c.is_code())
            .map(|c| c.id.clone())
            .collect()
    }
}
