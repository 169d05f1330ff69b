use log::debug;
use serde::Serialize;
use strum::IntoStaticStr;

/// Notable steps of a backup or restore run.
///
/// Events are purely informational: the engine never inspects what a sink
/// does with them, and a run behaves identically with any sink attached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, IntoStaticStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Event {
    ConfigLoaded {
        path: String,
        version: String,
    },
    EnvironmentCreated {
        root: String,
    },
    BackupRegistered {
        name: String,
    },
    ManifestResolved {
        project: String,
        entries: usize,
    },
    JobCreated {
        job_id: i64,
        backup_name: Option<String>,
    },
    DirectoryArchived {
        path: String,
    },
    FileStored {
        path: String,
        file_id: i64,
    },
    FileDeduplicated {
        path: String,
        file_id: i64,
        origin_file_id: i64,
    },
    ArchiveFinalized {
        job_id: i64,
        file_count: i64,
    },
    RestoreJobResolved {
        backup_name: String,
        job_id: i64,
    },
    SourceArchiveOpened {
        job_id: i64,
        entries: usize,
    },
    FileRestored {
        path: String,
        source_job_id: i64,
    },
    RestoreFailed {
        path: String,
        error: String,
    },
}

impl Event {
    pub fn name(&self) -> &'static str {
        self.into()
    }

    /// The event's fields as a JSON object.
    pub fn payload(&self) -> serde_json::Value {
        match serde_json::to_value(self) {
            // Externally tagged: { "<name>": { ...fields } }
            Ok(serde_json::Value::Object(mut map)) => map
                .remove(self.name())
                .unwrap_or(serde_json::Value::Null),
            _ => serde_json::Value::Null,
        }
    }
}

/// Observer for engine events.
pub trait EventSink {
    fn emit(&self, event: Event);
}

/// Forwards every event to the `log` facade at debug level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl EventSink for LogSink {
    fn emit(&self, event: Event) {
        debug!("{}: {}", event.name(), event.payload());
    }
}

/// Discards events.
#[cfg(test)]
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

#[cfg(test)]
impl EventSink for NullSink {
    fn emit(&self, _event: Event) {}
}
