//! Application settings persistence for notebook preferences.
//!
//! Settings are stored in a JSON file in the user's config directory:
//! - macOS: ~/Library/Application Support/notebook/settings.json
//! - Linux: ~/.config/notebook/settings.json
//! - Windows: C:\Users\<User>\AppData\Roaming\notebook\settings.json

use crate::runtime::Runtime;
use anyhow::{Context, Result};
use interpreter_launch::Program;
use log::{info, warn};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// How to run a program for one runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterpreterSettings {
    /// Executable, resolved through `PATH`.
    pub command: String,

    /// Arguments placed before the program file
    #[serde(default, deserialize_with = "deserialize_args")]
    pub args: Vec<String>,

    /// Extension for the staged program file, without the dot
    #[serde(default)]
    pub file_extension: String,
}

impl InterpreterSettings {
    pub fn new(command: &str, args: &[&str], file_extension: &str) -> Self {
        InterpreterSettings {
            command: command.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
            file_extension: file_extension.to_string(),
        }
    }

    pub fn program(&self, source: &str) -> Program {
        Program {
            command: self.command.clone(),
            args: self.args.clone(),
            file_extension: self.file_extension.clone(),
            source: source.to_string(),
        }
    }
}

/// Application settings for notebook preferences
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppSettings {
    /// Runtime for documents that declare no language
    #[serde(default)]
    pub default_runtime: Runtime,

    /// Interpreter per runtime name. Built-in entries are kept unless the
    /// file overrides them.
    #[serde(
        default = "builtin_interpreters",
        deserialize_with = "deserialize_interpreters"
    )]
    pub interpreters: BTreeMap<String, InterpreterSettings>,
}

impl AppSettings {
    pub fn interpreter_for(&self, runtime: &Runtime) -> Option<&InterpreterSettings> {
        self.interpreters.get(&runtime.to_string())
    }

    /// Replace the command used for `runtime`, keeping its arguments and
    /// extension when it is already configured.
    pub fn set_interpreter_command(&mut self, runtime: &Runtime, command: &str) {
        self.interpreters
            .entry(runtime.to_string())
            .and_modify(|interp| interp.command = command.to_string())
            .or_insert_with(|| InterpreterSettings::new(command, &[], ""));
    }
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            default_runtime: Runtime::Python,
            interpreters: builtin_interpreters(),
        }
    }
}

fn builtin_interpreters() -> BTreeMap<String, InterpreterSettings> {
    let python = if cfg!(windows) { "python" } else { "python3" };
    BTreeMap::from([
        (
            Runtime::Python.to_string(),
            InterpreterSettings::new(python, &[], "py"),
        ),
        (
            Runtime::Deno.to_string(),
            InterpreterSettings::new("deno", &["run", "--quiet"], "ts"),
        ),
    ])
}

fn deserialize_interpreters<'de, D>(
    deserializer: D,
) -> std::result::Result<BTreeMap<String, InterpreterSettings>, D::Error>
where
    D: Deserializer<'de>,
{
    let configured = BTreeMap::<String, InterpreterSettings>::deserialize(deserializer)?;
    let mut interpreters = builtin_interpreters();
    for (name, interp) in configured {
        let key = name.parse::<Runtime>().map_or(name, |r| r.to_string());
        interpreters.insert(key, interp);
    }
    Ok(interpreters)
}

/// Deserialize interpreter arguments that accept both:
/// - A single string: `"run --quiet"` (split on whitespace)
/// - A JSON array: `["run", "--quiet"]`
fn deserialize_args<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de;

    struct ArgsVisitor;

    impl<'de> de::Visitor<'de> for ArgsVisitor {
        type Value = Vec<String>;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("a string or array of strings")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<Vec<String>, E> {
            Ok(v.split_whitespace().map(str::to_string).collect())
        }

        fn visit_unit<E: de::Error>(self) -> std::result::Result<Vec<String>, E> {
            Ok(Vec::new())
        }

        fn visit_seq<A: de::SeqAccess<'de>>(
            self,
            mut seq: A,
        ) -> std::result::Result<Vec<String>, A::Error> {
            let mut items = Vec::new();
            while let Some(item) = seq.next_element::<String>()? {
                if !item.is_empty() {
                    items.push(item);
                }
            }
            Ok(items)
        }
    }

    deserializer.deserialize_any(ArgsVisitor)
}

/// Get the path to the settings file
pub fn settings_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("notebook")
        .join("settings.json")
}

/// Load settings from disk, returning defaults if the file doesn't exist
/// or can't be parsed
pub fn load_settings() -> AppSettings {
    let path = settings_path();
    if !path.exists() {
        return AppSettings::default();
    }
    match load_settings_from(&path) {
        Ok(settings) => settings,
        Err(e) => {
            warn!("[settings] Ignoring {}: {:#}", path.display(), e);
            AppSettings::default()
        }
    }
}

/// Load settings from an explicit file. Unlike [`load_settings`], a
/// missing or malformed file is an error.
pub fn load_settings_from(path: &Path) -> Result<AppSettings> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read settings from {}", path.display()))?;
    let settings = serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse settings in {}", path.display()))?;
    info!("[settings] Loaded {}", path.display());
    Ok(settings)
}

/// Save settings to disk
pub fn save_settings(settings: &AppSettings) -> Result<()> {
    save_settings_to(&settings_path(), settings)
}

pub fn save_settings_to(path: &Path, settings: &AppSettings) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(settings)?)?;
    Ok(())
}
