//! Runtime type for notebooks: the language a document's code cells run as.

use notebook_doc::NotebookDocument;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Notebook runtime, resolved from document metadata or settings.
///
/// Anything that isn't a known alias is kept as `Other` so a document
/// written for an unconfigured language still round-trips and reports a
/// useful error when run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Runtime {
    #[default]
    Python,
    Deno,
    Other(String),
}

impl Runtime {
    /// Runtime declared by a document's `kernelspec.language` or
    /// `language_info.name`, falling back to `default`.
    pub fn for_document(doc: &NotebookDocument, default: &Runtime) -> Runtime {
        doc.language()
            .and_then(|lang| lang.parse().ok())
            .unwrap_or_else(|| default.clone())
    }

    /// Kernel metadata for a new document of this runtime.
    pub fn document_metadata(&self) -> Map<String, Value> {
        let (display_name, language, name) = match self {
            Runtime::Python => ("Python 3", "python", "python3"),
            Runtime::Deno => ("Deno", "typescript", "deno"),
            Runtime::Other(name) => (name.as_str(), name.as_str(), name.as_str()),
        };
        let mut metadata = Map::new();
        metadata.insert(
            "kernelspec".to_string(),
            json!({
                "display_name": display_name,
                "language": language,
                "name": name,
            }),
        );
        metadata.insert("language_info".to_string(), json!({ "name": language }));
        metadata
    }
}

impl std::fmt::Display for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Runtime::Python => write!(f, "python"),
            Runtime::Deno => write!(f, "deno"),
            Runtime::Other(name) => write!(f, "{}", name),
        }
    }
}

impl std::str::FromStr for Runtime {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        match lower.as_str() {
            "" => Err("Runtime name is empty".to_string()),
            "python" | "python3" | "py" => Ok(Runtime::Python),
            "deno" | "typescript" | "ts" | "javascript" | "js" => Ok(Runtime::Deno),
            _ => Ok(Runtime::Other(lower)),
        }
    }
}

impl From<String> for Runtime {
    fn from(s: String) -> Self {
        s.parse().unwrap_or_default()
    }
}

impl From<Runtime> for String {
    fn from(runtime: Runtime) -> Self {
        runtime.to_string()
    }
}
