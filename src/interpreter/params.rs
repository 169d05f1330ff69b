use std::fmt;

use log::trace;
use serde_yaml::Value;
use strum::Display;

use crate::error::RunupError;

/// Container kinds a schema pattern can require.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum ValueKind {
    Mapping,
    Sequence,
    String,
}

impl ValueKind {
    pub fn matches(&self, value: &Value) -> bool {
        matches!(
            (self, value),
            (ValueKind::Mapping, Value::Mapping(_))
                | (ValueKind::Sequence, Value::Sequence(_))
                | (ValueKind::String, Value::String(_))
        )
    }
}

pub fn describe_value(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Sequence(_) => "sequence",
        Value::Mapping(_) => "mapping",
        Value::Tagged(_) => "tagged value",
    }
}

/// Mapping keys are matched against schema segments as text.
pub fn key_to_string(key: &Value) -> String {
    match key {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "~".to_string(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim().to_string())
            .unwrap_or_default(),
    }
}

/// Children of a container as (key, value) pairs. Sequence elements are
/// keyed by their index; scalars have no children.
pub fn children(area: &Value) -> Vec<(String, &Value)> {
    match area {
        Value::Mapping(map) => map.iter().map(|(k, v)| (key_to_string(k), v)).collect(),
        Value::Sequence(seq) => seq
            .iter()
            .enumerate()
            .map(|(i, v)| (i.to_string(), v))
            .collect(),
        _ => Vec::new(),
    }
}

fn join(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_owned()
    } else {
        format!("{prefix}.{key}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingKind {
    /// Nothing exists at the path.
    Absent,
    /// The container at the path exists but has no children where at least
    /// one is required.
    Empty,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingParameter {
    path: String,
    kind: MissingKind,
}

impl MissingParameter {
    fn absent(path: String) -> Self {
        MissingParameter {
            path,
            kind: MissingKind::Absent,
        }
    }

    fn empty(path: String) -> Self {
        MissingParameter {
            path,
            kind: MissingKind::Empty,
        }
    }

    #[cfg(test)]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[cfg(test)]
    pub fn kind(&self) -> MissingKind {
        self.kind
    }
}

impl fmt::Display for MissingParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            MissingKind::Absent => write!(f, "{}", self.path),
            MissingKind::Empty => write!(f, "*{}", self.path),
        }
    }
}

impl From<MissingParameter> for RunupError {
    fn from(missing: MissingParameter) -> Self {
        let message = match missing.kind {
            MissingKind::Absent => "required parameter is missing".to_string(),
            MissingKind::Empty => "must contain at least one entry".to_string(),
        };
        RunupError::config(missing.to_string(), message)
    }
}

/// Reports the first required dotted path that `config` does not satisfy.
///
/// A `*` segment means "at least one child must exist here" and every child
/// must satisfy the rest of the path.
pub fn find_missing_required(config: &Value, required: &[&str]) -> Option<MissingParameter> {
    required.iter().find_map(|parameter| {
        let segments: Vec<&str> = parameter.split('.').collect();
        let missing = missing_part(config, &segments, "");
        if let Some(ref m) = missing {
            trace!("Required parameter '{}' unsatisfied at '{}'", parameter, m);
        }
        missing
    })
}

fn missing_part(area: &Value, segments: &[&str], path: &str) -> Option<MissingParameter> {
    let (head, rest) = segments.split_first()?;

    if *head == "*" {
        let children = children(area);
        if children.is_empty() {
            return Some(MissingParameter::empty(path.to_owned()));
        }
        if rest.is_empty() {
            return None;
        }
        return children
            .into_iter()
            .find_map(|(key, child)| missing_part(child, rest, &join(path, &key)));
    }

    let child_path = join(path, head);
    match area.as_mapping().and_then(|map| map.get(*head)) {
        Some(child) => missing_part(child, rest, &child_path),
        None => Some(MissingParameter::absent(child_path)),
    }
}

/// The accepted shape of one configuration version.
#[derive(Debug)]
pub struct ParameterSchema {
    valid: &'static [(&'static str, ValueKind)],
    required: &'static [&'static str],
}

impl ParameterSchema {
    pub const fn new(
        valid: &'static [(&'static str, ValueKind)],
        required: &'static [&'static str],
    ) -> Self {
        ParameterSchema { valid, required }
    }

    pub fn kind_of(&self, pattern: &str) -> Option<ValueKind> {
        self.valid
            .iter()
            .find(|(p, _)| *p == pattern)
            .map(|(_, kind)| *kind)
    }

    /// Checks that every key in `config` is declared with the right kind.
    pub fn validate_parameters(&self, config: &Value) -> Result<(), RunupError> {
        if !config.is_mapping() {
            return Err(RunupError::config(
                "(document)",
                format!("expected a mapping but found {}", describe_value(config)),
            ));
        }
        self.validate_level(config, "", "")
    }

    pub fn missing_parameter(&self, config: &Value) -> Option<MissingParameter> {
        find_missing_required(config, self.required)
    }

    // `pattern_prefix` is the schema branch in use; `path_prefix` is where we
    // actually are in the document. They differ once a wildcard has matched.
    fn validate_level(
        &self,
        area: &Value,
        pattern_prefix: &str,
        path_prefix: &str,
    ) -> Result<(), RunupError> {
        for (key, value) in children(area) {
            let path = join(path_prefix, &key);
            let wildcard = join(pattern_prefix, "*");
            let exact = join(pattern_prefix, &key);

            // Wildcard first: a declared `prefix.*` means every child here
            // shares one schema, even when `prefix.key` is declared too.
            let (pattern, expected) = match self.kind_of(&wildcard) {
                Some(kind) => (wildcard, kind),
                None => match self.kind_of(&exact) {
                    Some(kind) => (exact, kind),
                    None => {
                        return Err(RunupError::config(path, "is not a valid parameter"));
                    }
                },
            };

            trace!("'{}' matched schema pattern '{}'", path, pattern);

            if !expected.matches(value) {
                return Err(RunupError::config(
                    path,
                    format!("expected {} but found {}", expected, describe_value(value)),
                ));
            }

            if value.is_mapping() || value.is_sequence() {
                self.validate_level(value, &pattern, &path)?;
            }
        }

        Ok(())
    }
}
