use std::path::PathBuf;

use clap::{Parser, Subcommand};
use log::{debug, info};

use crate::error::RunupError;
use crate::events::LogSink;
use crate::environment::SetupOutcome;
use crate::runup_yaml::RunupYaml;

#[derive(Parser, Debug)]
#[command(
    name = "runup",
    version,
    about = "RunUp: deduplicating file-level backup and restore"
)]
pub struct Cli {
    /// Directory holding runup.yaml (default: current directory)
    #[arg(long = "context", short = 'c', default_value = ".", global = true)]
    pub context: PathBuf,

    /// Log at debug level regardless of the configured level
    #[arg(long = "verbose", default_value_t = false, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Create the .runup environment next to runup.yaml
    Init,

    /// Back up one project, or every declared project in a single job
    Backup {
        /// Project to back up (default: all projects)
        project: Option<String>,
    },

    /// Restore one project, or every declared project
    Restore {
        /// Project to restore (default: all projects)
        project: Option<String>,

        /// Job to restore from (default: latest job holding the project)
        #[arg(long = "job", short = 'j')]
        job: Option<i64>,

        /// Destination directory (default: the context directory)
        #[arg(long = "location", short = 'l')]
        location: Option<PathBuf>,
    },
}

impl Cli {
    pub fn handle_command_line(self) -> Result<(), RunupError> {
        let context = dunce::canonicalize(&self.context)?;
        debug!("Context: '{}'", context.display());

        let yaml = RunupYaml::load(&context)?;
        debug!(
            "Using '{}' (version {})",
            yaml.path().display(),
            yaml.version()
        );
        let interpreter = yaml.interpreter(&LogSink)?;

        match self.command {
            Command::Init => match interpreter.set_environment(&LogSink)? {
                SetupOutcome::Created => println!("New environment created in '{}'", context.display()),
                SetupOutcome::AlreadyInitialized => println!("RunUp is already initialized"),
            },
            Command::Backup { project } => {
                let summary =
                    interpreter.create_backup(yaml.document(), project.as_deref(), &LogSink)?;
                println!(
                    "Job {}: {} files ({} stored, {} deduplicated)",
                    summary.job_id,
                    summary.file_count(),
                    summary.stored,
                    summary.deduplicated
                );
            }
            Command::Restore {
                project,
                job,
                location,
            } => {
                let reports = interpreter.restore_backup(
                    yaml.document(),
                    project.as_deref(),
                    location.as_deref(),
                    job,
                    &LogSink,
                )?;

                for (name, report) in &reports {
                    println!(
                        "{}: restored {} files from job {}",
                        name,
                        report.restored.len(),
                        report.job_id
                    );
                    for failure in &report.failures {
                        println!("  failed '{}': {}", failure.path, failure.error);
                    }
                }

                if reports.iter().any(|(_, report)| !report.is_complete()) {
                    let failed: usize = reports.iter().map(|(_, r)| r.failures.len()).sum();
                    return Err(RunupError::Error(format!("{failed} files could not be restored")));
                }
                info!("Restore complete");
            }
        }

        Ok(())
    }
}
