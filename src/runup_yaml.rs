use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};
use serde_yaml::Value;

use crate::error::RunupError;
use crate::events::{Event, EventSink};
use crate::interpreter::Interpreter;
use crate::version::resolve_yaml_version;

/// Names a configuration file may have, in lookup order.
pub const CONFIG_FILE_NAMES: [&str; 2] = ["runup.yaml", "runup.yml"];

/// A loaded `runup.yaml` whose version has been resolved.
#[derive(Debug, Clone)]
pub struct RunupYaml {
    path: PathBuf,
    context: PathBuf,
    document: Value,
    version: String,
}

impl RunupYaml {
    pub fn locate(context: &Path) -> Result<PathBuf, RunupError> {
        CONFIG_FILE_NAMES
            .iter()
            .map(|name| context.join(name))
            .find(|path| path.is_file())
            .ok_or_else(|| {
                RunupError::config(
                    context.display().to_string(),
                    "no runup.yaml or runup.yml file found in the given context",
                )
            })
    }

    /// Reads the configuration file in `context` and resolves its version.
    pub fn load(context: &Path) -> Result<Self, RunupError> {
        let path = Self::locate(context)?;
        let text = fs::read_to_string(&path)?;
        Self::parse_str(context, &path, &text)
    }

    pub fn parse_str(context: &Path, path: &Path, text: &str) -> Result<Self, RunupError> {
        let document: Value = serde_yaml::from_str(text).map_err(|e| {
            let location = e
                .location()
                .map(|l| format!(" (line {}, column {})", l.line(), l.column()))
                .unwrap_or_default();
            RunupError::config(path.display().to_string(), format!("{e}{location}"))
        })?;

        let version = resolve_yaml_version(document.get("version"))?;
        debug!("Configuration '{}' resolved to version {}", path.display(), version);

        Ok(RunupYaml {
            path: path.to_path_buf(),
            context: context.to_path_buf(),
            document,
            version,
        })
    }

    /// Picks the interpreter for the resolved version and validates the
    /// document against its schema.
    pub fn interpreter(&self, sink: &dyn EventSink) -> Result<Interpreter, RunupError> {
        let interpreter = Interpreter::for_version(&self.version, &self.context)?;
        interpreter.validate(&self.document)?;

        info!(
            "Loaded '{}' with interpreter version {}",
            self.path.display(),
            interpreter.version()
        );
        sink.emit(Event::ConfigLoaded {
            path: self.path.display().to_string(),
            version: self.version.clone(),
        });

        Ok(interpreter)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn document(&self) -> &Value {
        &self.document
    }

    pub fn version(&self) -> &str {
        &self.version
    }
}
