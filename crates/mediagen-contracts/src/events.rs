use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};

pub type EventPayload = Map<String, Value>;

const RESERVED_FIELDS: [&str; 3] = ["type", "session_id", "ts"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationEvent {
    DispatchStarted,
    ProviderSkipped,
    ProviderFailed,
    DispatchCompleted,
    PollAttempt,
    JobFinished,
}

impl GenerationEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DispatchStarted => "dispatch_started",
            Self::ProviderSkipped => "provider_skipped",
            Self::ProviderFailed => "provider_failed",
            Self::DispatchCompleted => "dispatch_completed",
            Self::PollAttempt => "poll_attempt",
            Self::JobFinished => "job_finished",
        }
    }
}

/// Trail of one CLI session's dispatch and poll decisions.
///
/// Each record names the event, the session and a UTC timestamp; those three fields always
/// win over same-named payload keys so a provider message can never relabel a row. Clones
/// share one file handle, opened on the first emit.
#[derive(Debug, Clone)]
pub struct EventWriter {
    shared: Arc<SessionLog>,
}

#[derive(Debug)]
struct SessionLog {
    path: PathBuf,
    session_id: String,
    file: Mutex<Option<File>>,
}

impl EventWriter {
    pub fn new(path: impl Into<PathBuf>, session_id: impl Into<String>) -> Self {
        Self {
            shared: Arc::new(SessionLog {
                path: path.into(),
                session_id: session_id.into(),
                file: Mutex::new(None),
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.shared.path
    }

    pub fn session_id(&self) -> &str {
        &self.shared.session_id
    }

    pub fn emit(&self, event: GenerationEvent, payload: EventPayload) -> anyhow::Result<Value> {
        let mut record: EventPayload = payload
            .into_iter()
            .filter(|(key, _)| !RESERVED_FIELDS.contains(&key.as_str()))
            .collect();
        record.insert("type".to_string(), Value::from(event.as_str()));
        record.insert("session_id".to_string(), Value::from(self.session_id()));
        record.insert(
            "ts".to_string(),
            Value::from(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)),
        );

        let mut line = serde_json::to_vec(&record)?;
        line.push(b'\n');

        let mut slot = self
            .shared
            .file
            .lock()
            .map_err(|_| anyhow::anyhow!("event log lock poisoned"))?;
        if slot.is_none() {
            *slot = Some(self.open_log()?);
        }
        if let Some(file) = slot.as_mut() {
            file.write_all(&line)?;
        }
        Ok(Value::Object(record))
    }

    fn open_log(&self) -> anyhow::Result<File> {
        let path = self.path();
        if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(file)
    }
}
