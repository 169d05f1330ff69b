use serde_yaml::Value;

use crate::error::RunupError;

pub const RUNUP_VERSION: &str = env!("CARGO_PKG_VERSION");

// Versions accepted in the `version` key of runup.yaml. Two forms only: a
// major ("1") and a major.minor ("1.0"), never "1.0.0".
//
// The list is append-only, so the last "X." entry is always the newest minor
// of major X. On every major release add both "X" and "X.0".
pub const YAML_VERSIONS: &[&str] = &["1", "1.0"];

/// Resolves the declared `version` value to a concrete major.minor version.
pub fn resolve_yaml_version(declared: Option<&Value>) -> Result<String, RunupError> {
    resolve_version_in(declared, YAML_VERSIONS)
}

pub fn resolve_version_in(declared: Option<&Value>, supported: &[&str]) -> Result<String, RunupError> {
    let declared = match declared {
        None | Some(Value::Null) => {
            return Err(RunupError::config(
                "version",
                "the configuration file should contain a version",
            ))
        }
        Some(Value::String(s)) => s.as_str(),
        Some(_) => return Err(RunupError::config("version", "the version needs to be a string")),
    };

    if !supported.contains(&declared) {
        return Err(RunupError::config(
            "version",
            format!("the version '{declared}' is not supported"),
        ));
    }

    if declared.contains('.') {
        return Ok(declared.to_owned());
    }

    // A bare major resolves to the latest minor released under it
    let minor_prefix = format!("{declared}.");
    supported
        .iter()
        .rev()
        .find(|version| version.starts_with(&minor_prefix))
        .map(|version| (*version).to_owned())
        .ok_or_else(|| {
            RunupError::config(
                "version",
                format!("the version '{declared}' has no released minor version"),
            )
        })
}
