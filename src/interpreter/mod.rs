pub mod params;
pub mod v1;

use std::path::Path;

use serde_yaml::Value;

use crate::backup::BackupSummary;
use crate::environment::SetupOutcome;
use crate::error::RunupError;
use crate::events::EventSink;
use crate::restore::RestoreReport;
use v1::InterpreterV1;

/// One interpreter per supported configuration version.
#[derive(Debug, Clone)]
pub enum Interpreter {
    V1(InterpreterV1),
}

type Builder = fn(&Path) -> Interpreter;

// Resolved version -> interpreter. New versions are added here.
const DISPATCH: &[(&str, Builder)] = &[("1.0", build_v1)];

fn build_v1(context: &Path) -> Interpreter {
    Interpreter::V1(InterpreterV1::new(context))
}

impl Interpreter {
    pub fn for_version(version: &str, context: &Path) -> Result<Self, RunupError> {
        DISPATCH
            .iter()
            .find(|(v, _)| *v == version)
            .map(|(_, build)| build(context))
            .ok_or_else(|| {
                RunupError::config("version", format!("no interpreter for version '{version}'"))
            })
    }

    /// Interpreter major version, as stored in the environment marker.
    pub fn version(&self) -> &'static str {
        match self {
            Interpreter::V1(_) => InterpreterV1::VERSION,
        }
    }

    /// Schema check first, then required parameters.
    pub fn validate(&self, document: &Value) -> Result<(), RunupError> {
        let schema = match self {
            Interpreter::V1(v1) => v1.schema(),
        };
        schema.validate_parameters(document)?;
        match schema.missing_parameter(document) {
            Some(missing) => Err(missing.into()),
            None => Ok(()),
        }
    }

    pub fn set_environment(&self, sink: &dyn EventSink) -> Result<SetupOutcome, RunupError> {
        match self {
            Interpreter::V1(v1) => v1.set_environment(sink),
        }
    }

    pub fn create_backup(
        &self,
        document: &Value,
        project: Option<&str>,
        sink: &dyn EventSink,
    ) -> Result<BackupSummary, RunupError> {
        match self {
            Interpreter::V1(v1) => v1.create_backup(document, project, sink),
        }
    }

    pub fn restore_backup(
        &self,
        document: &Value,
        project: Option<&str>,
        location: Option<&Path>,
        job: Option<i64>,
        sink: &dyn EventSink,
    ) -> Result<Vec<(String, RestoreReport)>, RunupError> {
        match self {
            Interpreter::V1(v1) => v1.restore_backup(document, project, location, job, sink),
        }
    }
}
