//! Reading and writing `.ipynb` files.
//!
//! The on-disk shape is described by private serde types; loading converts
//! them into [`NotebookDocument`] right away, so the string-or-array source
//! form and the per-kind optional fields never leave this module.

use std::path::Path;

use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::document::{new_cell_id, Cell, CellContent, CellKind, FormatVersion, NotebookDocument};
use crate::error::{NotebookError, Result};
use crate::output::OutputRecord;
use crate::source::{self, PersistedSource};

#[derive(Serialize, Deserialize)]
struct RawNotebook {
    cells: Vec<RawCell>,
    #[serde(default)]
    metadata: Map<String, Value>,
    nbformat: u32,
    nbformat_minor: u32,
}

#[derive(Serialize, Deserialize)]
struct RawCell {
    cell_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(default)]
    metadata: Map<String, Value>,
    #[serde(default)]
    source: Option<PersistedSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    attachments: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    outputs: Option<Vec<OutputRecord>>,
    /// Outer `None` omits the key; `Some(None)` writes `null`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    execution_count: Option<Option<i64>>,
}

impl RawCell {
    fn into_cell(self) -> Result<Cell> {
        let kind: CellKind = self
            .cell_type
            .parse()
            .map_err(NotebookError::MalformedDocument)?;
        let content = match kind {
            CellKind::Code => CellContent::Code {
                execution_count: self.execution_count.flatten(),
                outputs: self.outputs.unwrap_or_default(),
            },
            CellKind::Markdown => CellContent::Markdown {
                attachments: self.attachments,
            },
            CellKind::Raw => CellContent::Raw {
                attachments: self.attachments,
            },
        };
        Ok(Cell {
            id: self.id.unwrap_or_else(new_cell_id),
            source: source::decode(self.source.as_ref()),
            metadata: self.metadata,
            content,
        })
    }

    fn from_cell(cell: &Cell, write_id: bool) -> Self {
        let (attachments, outputs, execution_count) = match &cell.content {
            CellContent::Code {
                execution_count,
                outputs,
            } => (None, Some(outputs.clone()), Some(*execution_count)),
            CellContent::Markdown { attachments } | CellContent::Raw { attachments } => {
                (attachments.clone(), None, None)
            }
        };
        RawCell {
            cell_type: cell.kind().to_string(),
            id: write_id.then(|| cell.id.clone()),
            metadata: cell.metadata.clone(),
            source: Some(source::encode(&cell.source)),
            attachments,
            outputs,
            execution_count,
        }
    }
}

/// Parse notebook JSON text.
///
/// A document without a top-level `cells` array is rejected. An empty
/// `cells` array is accepted.
pub fn parse_notebook(json: &str) -> Result<NotebookDocument> {
    let value: Value = serde_json::from_str(json)
        .map_err(|e| NotebookError::MalformedDocument(format!("invalid JSON: {}", e)))?;

    if !value.get("cells").is_some_and(Value::is_array) {
        return Err(NotebookError::MalformedDocument(
            "missing top-level `cells` array".to_string(),
        ));
    }

    let raw: RawNotebook = serde_json::from_value(value)
        .map_err(|e| NotebookError::MalformedDocument(e.to_string()))?;

    let cells = raw
        .cells
        .into_iter()
        .map(RawCell::into_cell)
        .collect::<Result<Vec<_>>>()?;

    Ok(NotebookDocument::from_parts(
        cells,
        raw.metadata,
        FormatVersion {
            major: raw.nbformat,
            minor: raw.nbformat_minor,
        },
    ))
}

/// Serialize a document with sorted keys and one-space indentation, the
/// layout Jupyter itself writes, so saved files diff cleanly.
pub fn serialize_notebook(doc: &NotebookDocument) -> Result<String> {
    let write_ids = doc.format.has_cell_ids();
    let raw = RawNotebook {
        cells: doc
            .cells()
            .iter()
            .map(|cell| RawCell::from_cell(cell, write_ids))
            .collect(),
        metadata: doc.metadata.clone(),
        nbformat: doc.format.major,
        nbformat_minor: doc.format.minor,
    };

    // Going through `Value` sorts every object's keys.
    let value = serde_json::to_value(&raw).map_err(|e| NotebookError::UnwritableTarget {
        target: "notebook JSON".to_string(),
        reason: e.to_string(),
    })?;

    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b" ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value
        .serialize(&mut serializer)
        .map_err(|e| NotebookError::UnwritableTarget {
            target: "notebook JSON".to_string(),
            reason: e.to_string(),
        })?;
    buf.push(b'\n');

    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Load a notebook from disk.
pub fn load_notebook(path: &Path) -> Result<NotebookDocument> {
    let content =
        std::fs::read_to_string(path).map_err(|source| NotebookError::UnreadableSource {
            path: path.to_path_buf(),
            source,
        })?;
    let doc = parse_notebook(&content)?;
    info!(
        "[persist] Loaded {} cells (nbformat {}) from {}",
        doc.len(),
        doc.format,
        path.display()
    );
    Ok(doc)
}

/// Write a notebook to disk.
pub fn save_notebook(path: &Path, doc: &NotebookDocument) -> Result<()> {
    let content = serialize_notebook(doc)?;
    std::fs::write(path, content).map_err(|e| NotebookError::UnwritableTarget {
        target: path.display().to_string(),
        reason: e.to_string(),
    })?;
    debug!("[persist] Saved {} cells to {}", doc.len(), path.display());
    Ok(())
}
