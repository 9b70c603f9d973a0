//! Notebook documents: the cell model, the source codec, and `.ipynb`
//! persistence.
//!
//! A [`NotebookDocument`] is an ordered list of [`Cell`]s plus opaque
//! metadata and a format version. Structural edits (`insert_cell`,
//! `delete_cell`, `move_cell`, `set_cell_kind`, ...) are synchronous and
//! never touch the filesystem; [`load_notebook`] and [`save_notebook`] are
//! the only I/O.

pub mod document;
pub mod error;
pub mod format;
pub mod output;
pub mod source;

pub use document::{
    Cell, CellContent, CellKind, FormatVersion, MoveDirection, NotebookDocument, NBFORMAT_MAJOR,
    NBFORMAT_MINOR,
};
pub use error::{NotebookError, Result};
pub use format::{load_notebook, parse_notebook, save_notebook, serialize_notebook};
pub use output::{MimeBundle, OutputRecord, OutputView};
pub use source::PersistedSource;
