use std::path::Path;

use log::{info, warn};
use serde_yaml::Value;

use super::params::{children, ParameterSchema, ValueKind};
use crate::backup::{self, BackupSummary};
use crate::config::Config;
use crate::environment::{Environment, SetupOutcome};
use crate::error::RunupError;
use crate::events::{Event, EventSink};
use crate::jobs::JobScope;
use crate::manifest::Project;
use crate::restore::{self, RestoreReport};

pub static SCHEMA_V1: ParameterSchema = ParameterSchema::new(
    &[
        ("version", ValueKind::String),
        ("project", ValueKind::Mapping),
        ("project.*", ValueKind::Mapping),
        ("project.*.cron", ValueKind::String),
        ("project.*.encrypt", ValueKind::Sequence),
        ("project.*.encrypt.*", ValueKind::String),
        ("project.*.exclude", ValueKind::Sequence),
        ("project.*.exclude.*", ValueKind::String),
        ("project.*.include", ValueKind::Sequence),
        ("project.*.include.*", ValueKind::String),
        ("project.*.password", ValueKind::String),
    ],
    &[
        "project",
        "project.*",
        "project.*.include",
        "project.*.include.*",
    ],
);

#[derive(Debug, Clone)]
pub struct InterpreterV1 {
    env: Environment,
}

impl InterpreterV1 {
    pub const VERSION: &'static str = "1";

    pub fn new(context: &Path) -> Self {
        InterpreterV1 {
            env: Environment::new(context),
        }
    }

    pub fn schema(&self) -> &'static ParameterSchema {
        &SCHEMA_V1
    }

    #[cfg(test)]
    pub fn environment(&self) -> &Environment {
        &self.env
    }

    /// Declared projects, ordered by name.
    pub fn projects(&self, document: &Value) -> Result<Vec<Project>, RunupError> {
        let Some(area) = document.get("project") else {
            return Err(RunupError::config("project", "required parameter is missing"));
        };

        let mut projects = Vec::new();
        for (name, body) in children(area) {
            let key = format!("project.{name}");
            if !body.is_mapping() {
                return Err(RunupError::config(key, "expected a mapping"));
            }

            for ignored in ["encrypt", "password"] {
                if body.get(ignored).is_some() {
                    warn!("'{key}.{ignored}' is not supported and will be ignored");
                }
            }

            projects.push(Project {
                include: string_list(body.get("include"), &format!("{key}.include"))?,
                exclude: string_list(body.get("exclude"), &format!("{key}.exclude"))?,
                schedule: body.get("cron").and_then(Value::as_str).map(str::to_owned),
                name,
            });
        }

        projects.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(projects)
    }

    pub fn set_environment(&self, sink: &dyn EventSink) -> Result<SetupOutcome, RunupError> {
        let outcome = self.env.setup(Self::VERSION)?;
        if outcome == SetupOutcome::Created {
            sink.emit(Event::EnvironmentCreated {
                root: self.env.root().display().to_string(),
            });
        }
        Ok(outcome)
    }

    /// Fails when the environment was never set up, and warns when it was set
    /// up by a different interpreter version.
    fn check_environment(&self) -> Result<(), RunupError> {
        let stored = self.env.stored_version()?;
        if stored != Self::VERSION {
            warn!(
                "Environment '{}' was created by interpreter version {}, running version {}",
                self.env.root().display(),
                stored,
                Self::VERSION
            );
        }
        Ok(())
    }

    /// Backs up one project, or all of them in a single job.
    pub fn create_backup(
        &self,
        document: &Value,
        project: Option<&str>,
        sink: &dyn EventSink,
    ) -> Result<BackupSummary, RunupError> {
        self.check_environment()?;
        let projects = self.projects(document)?;
        backup::register_projects(&self.env, &projects, sink)?;

        let compression = Config::get().archive.compression();
        match project {
            Some(name) => {
                let selected = select(&projects, name)?;
                backup::create_backup(
                    &self.env,
                    JobScope::Project(name.to_owned()),
                    std::slice::from_ref(selected),
                    compression,
                    sink,
                )
            }
            None => {
                backup::create_backup(&self.env, JobScope::AllProjects, &projects, compression, sink)
            }
        }
    }

    /// Restores one project, or every declared project, into `location`
    /// (the backup root when omitted).
    pub fn restore_backup(
        &self,
        document: &Value,
        project: Option<&str>,
        location: Option<&Path>,
        job: Option<i64>,
        sink: &dyn EventSink,
    ) -> Result<Vec<(String, RestoreReport)>, RunupError> {
        self.check_environment()?;
        let projects = self.projects(document)?;
        backup::register_projects(&self.env, &projects, sink)?;

        let destination = location
            .map(Path::to_path_buf)
            .unwrap_or_else(|| restore::default_destination(&self.env));

        let mut reports = Vec::new();
        match project {
            Some(name) => {
                select(&projects, name)?;
                let report = restore::restore_backup(&self.env, name, job, &destination, sink)?;
                reports.push((name.to_owned(), report));
            }
            None => {
                for project in &projects {
                    match restore::restore_backup(&self.env, &project.name, job, &destination, sink)
                    {
                        Ok(report) => reports.push((project.name.clone(), report)),
                        Err(RunupError::NotFound(reason)) => {
                            info!("Nothing to restore for '{}': {}", project.name, reason);
                        }
                        Err(e) => return Err(e),
                    }
                }
            }
        }

        Ok(reports)
    }
}

fn select<'a>(projects: &'a [Project], name: &str) -> Result<&'a Project, RunupError> {
    projects
        .iter()
        .find(|p| p.name == name)
        .ok_or_else(|| RunupError::config("project", format!("project '{name}' is not declared")))
}

fn string_list(value: Option<&Value>, key: &str) -> Result<Vec<String>, RunupError> {
    let Some(value) = value else {
        return Ok(Vec::new());
    };
    if value.is_null() {
        return Ok(Vec::new());
    }

    children(value)
        .into_iter()
        .map(|(index, item)| {
            item.as_str()
                .map(str::to_owned)
                .ok_or_else(|| RunupError::config(format!("{key}.{index}"), "expected a string"))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::test_sink::RecordingSink;
    use crate::events::NullSink;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::TempDir;

    fn parse(text: &str) -> Value {
        serde_yaml::from_str(text).unwrap()
    }

    const TWO_PROJECTS: &str = r#"
version: "1"
project:
  site:
    include: [site]
    exclude: [site/tmp]
    cron: "0 3 * * *"
  notes:
    include:
      - notes
    password: hunter2
"#;

    #[test]
    fn test_schema_accepts_full_document() {
        let doc = parse(TWO_PROJECTS);
        SCHEMA_V1.validate_parameters(&doc).unwrap();
        assert_eq!(SCHEMA_V1.missing_parameter(&doc), None);
    }

    #[test]
    fn test_schema_rejects_unknown_key() {
        let doc = parse("version: '1'\nproject:\n  site:\n    include: [a]\n    retain: 3\n");
        let err = SCHEMA_V1.validate_parameters(&doc).unwrap_err();
        assert!(matches!(err, RunupError::ConfigError { ref key, .. } if key == "project.site.retain"));
    }

    #[test]
    fn test_schema_rejects_wrong_kind() {
        let doc = parse("version: '1'\nproject:\n  site:\n    include: site\n");
        let err = SCHEMA_V1.validate_parameters(&doc).unwrap_err();
        assert!(matches!(err, RunupError::ConfigError { ref key, .. } if key == "project.site.include"));
    }

    #[test]
    fn test_missing_project_and_empty_include() {
        let doc = parse("version: '1'\n");
        assert_eq!(SCHEMA_V1.missing_parameter(&doc).unwrap().to_string(), "project");

        let doc = parse("version: '1'\nproject: {}\n");
        assert_eq!(SCHEMA_V1.missing_parameter(&doc).unwrap().to_string(), "*project");

        let doc = parse("version: '1'\nproject:\n  site:\n    include: []\n");
        assert_eq!(
            SCHEMA_V1.missing_parameter(&doc).unwrap().to_string(),
            "*project.site.include"
        );
    }

    #[test]
    fn test_projects_sorted_and_typed() {
        let interpreter = InterpreterV1::new(Path::new("/tmp"));
        let projects = interpreter.projects(&parse(TWO_PROJECTS)).unwrap();

        assert_eq!(
            projects,
            vec![
                Project {
                    name: "notes".to_string(),
                    include: vec!["notes".to_string()],
                    exclude: vec![],
                    schedule: None,
                },
                Project {
                    name: "site".to_string(),
                    include: vec!["site".to_string()],
                    exclude: vec!["site/tmp".to_string()],
                    schedule: Some("0 3 * * *".to_string()),
                },
            ]
        );
    }

    #[test]
    fn test_set_environment_twice() {
        let dir = TempDir::new().unwrap();
        let interpreter = InterpreterV1::new(dir.path());

        let sink = RecordingSink::default();
        assert_eq!(interpreter.set_environment(&sink).unwrap(), SetupOutcome::Created);
        assert_eq!(
            interpreter.set_environment(&sink).unwrap(),
            SetupOutcome::AlreadyInitialized
        );
        assert_eq!(sink.names(), vec!["environment_created"]);
        assert_eq!(interpreter.environment().stored_version().unwrap(), "1");
    }

    #[test]
    fn test_backup_and_restore_by_name() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("site")).unwrap();
        fs::create_dir_all(root.join("notes")).unwrap();
        fs::write(root.join("site/index.html"), "<html></html>").unwrap();
        fs::write(root.join("notes/todo.txt"), "buy milk").unwrap();

        let doc = parse(TWO_PROJECTS);
        let interpreter = InterpreterV1::new(root);
        interpreter.set_environment(&NullSink).unwrap();

        let site = interpreter.create_backup(&doc, Some("site"), &NullSink).unwrap();
        let all = interpreter.create_backup(&doc, None, &NullSink).unwrap();
        assert_eq!(all.file_count(), 2);
        assert_eq!(all.deduplicated, 1);
        assert!(all.job_id > site.job_id);

        let out = TempDir::new().unwrap();
        let reports = interpreter
            .restore_backup(&doc, None, Some(out.path()), None, &NullSink)
            .unwrap();
        let names: Vec<&str> = reports.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, vec!["notes", "site"]);
        assert!(out.path().join("notes/todo.txt").is_file());
        assert!(out.path().join("site/index.html").is_file());

        let err = interpreter.create_backup(&doc, Some("missing"), &NullSink).unwrap_err();
        assert!(matches!(err, RunupError::ConfigError { ref key, .. } if key == "project"));
    }

    #[test]
    fn test_backup_before_setup() {
        let dir = TempDir::new().unwrap();
        let interpreter = InterpreterV1::new(dir.path());
        let err = interpreter
            .create_backup(&parse(TWO_PROJECTS), None, &NullSink)
            .unwrap_err();
        assert!(matches!(err, RunupError::NotInitialized(_)));
    }
}
