use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, bail, Result};
use mediagen_contracts::{GenerationRequest, MediaKind, NamedProvider, ProviderId};

use crate::{GenerationProvider, JobStatus, StatusQuery, Submission};

/// Scripted status reply for a stub job.
#[derive(Debug, Clone)]
pub(crate) enum StubStatus {
    Reply(JobStatus),
    Rejected(String),
    TimedOut,
}

/// In-process adapter with scripted replies and call counters.
pub(crate) struct StubProvider {
    id: ProviderId,
    kind: MediaKind,
    submission: Result<Submission, String>,
    statuses: Mutex<VecDeque<StubStatus>>,
    counters: StubCounters,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct StubCounters {
    submits: Arc<AtomicU32>,
    statuses: Arc<AtomicU32>,
}

impl StubCounters {
    pub(crate) fn submits(&self) -> u32 {
        self.submits.load(Ordering::SeqCst)
    }

    pub(crate) fn statuses(&self) -> u32 {
        self.statuses.load(Ordering::SeqCst)
    }
}

impl StubProvider {
    fn new(id: ProviderId, kind: MediaKind, submission: Result<Submission, String>) -> Self {
        Self {
            id,
            kind,
            submission,
            statuses: Mutex::new(VecDeque::new()),
            counters: StubCounters::default(),
        }
    }

    pub(crate) fn ready(id: ProviderId, kind: MediaKind, artifact_url: &str) -> Self {
        Self::new(
            id,
            kind,
            Ok(Submission::Ready {
                artifact_url: artifact_url.to_string(),
            }),
        )
    }

    pub(crate) fn accepting(id: ProviderId, job_id: &str) -> Self {
        Self::new(
            id,
            MediaKind::Video,
            Ok(Submission::Accepted {
                job_id: job_id.to_string(),
            }),
        )
    }

    pub(crate) fn failing(id: ProviderId, kind: MediaKind, message: &str) -> Self {
        Self::new(id, kind, Err(message.to_string()))
    }

    /// Queues status replies; the last one repeats once the queue drains.
    pub(crate) fn with_statuses(self, statuses: impl IntoIterator<Item = StubStatus>) -> Self {
        if let Ok(mut queue) = self.statuses.lock() {
            queue.extend(statuses);
        }
        self
    }

    pub(crate) fn counters(&self) -> StubCounters {
        self.counters.clone()
    }
}

impl NamedProvider for StubProvider {
    fn id(&self) -> ProviderId {
        self.id
    }

    fn media_kind(&self) -> MediaKind {
        self.kind
    }
}

impl GenerationProvider for StubProvider {
    fn submit(&self, _request: &GenerationRequest, _credential: Option<&str>) -> Result<Submission> {
        self.counters.submits.fetch_add(1, Ordering::SeqCst);
        match &self.submission {
            Ok(submission) => Ok(submission.clone()),
            Err(message) => bail!("{} request failed (500): {message}", self.id),
        }
    }

    fn status(&self, _query: &StatusQuery<'_>) -> Result<JobStatus> {
        self.counters.statuses.fetch_add(1, Ordering::SeqCst);
        let mut queue = self
            .statuses
            .lock()
            .map_err(|_| anyhow!("stub status queue poisoned"))?;
        let next = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        };
        match next.unwrap_or(StubStatus::Reply(JobStatus::Processing { progress: None })) {
            StubStatus::Reply(status) => Ok(status),
            StubStatus::Rejected(message) => bail!("{} poll request failed (502): {message}", self.id),
            StubStatus::TimedOut => Err(anyhow::Error::new(io::Error::new(
                io::ErrorKind::TimedOut,
                "operation timed out",
            ))
            .context(format!("{} poll request failed", self.id))),
        }
    }
}
