//! Notebook sessions: open `.ipynb` documents per host tab, edit them, and
//! run their code cells under an external interpreter.
//!
//! [`SessionRegistry`] is the entry point for hosts. [`ExecutionEngine`]
//! can also be used directly on a [`notebook_doc::NotebookDocument`].

pub mod engine;
pub mod notebook_state;
pub mod registry;
pub mod runtime;
pub mod settings;

#[cfg(test)]
mod test_support;

pub use engine::{CellRun, Execution, ExecutionEngine};
pub use notebook_state::NotebookState;
pub use registry::{NotebookSource, Session, SessionError, SessionRegistry, TabId};
pub use runtime::Runtime;
pub use settings::{AppSettings, InterpreterSettings};
