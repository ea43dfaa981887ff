//! Fake collaborators and reporters.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use casepress::collaborators::{Generation, GenerationError, GenerationRequest, GenerationTask};
use casepress::pipeline::{ProgressEvent, ProgressReporter};

use super::builders::{analysis_json, deidentified_json, draft_json};

type Reply = Result<String, GenerationError>;

/// Generation fake. Each task answers from its queue first, then from its
/// default reply. Every request is recorded.
pub struct ScriptedGenerator {
    queue: Mutex<VecDeque<(GenerationTask, Reply)>>,
    defaults: Mutex<Vec<(GenerationTask, String)>>,
    requests: Mutex<Vec<GenerationRequest>>,
    fail_marker: Mutex<Option<String>>,
    delay: Option<Duration>,
    running: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedGenerator {
    /// Valid replies for every task.
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            defaults: Mutex::new(vec![
                (
                    GenerationTask::Deidentify,
                    deidentified_json("[שם הוסר] פוטר מעבודתו", "low"),
                ),
                (GenerationTask::Analyze, analysis_json("פיצויי פיטורים")),
                (
                    GenerationTask::Draft,
                    draft_json(
                        "פיצויי פיטורים: מה קבע בית הדין",
                        "<h2>רקע</h2><p>העובד פוטר לאחר שנות עבודה.</p>",
                    ),
                ),
            ]),
            requests: Mutex::new(Vec::new()),
            fail_marker: Mutex::new(None),
            delay: None,
            running: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    /// Holds every call for `delay` so concurrent runs overlap.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queues one reply for the next call of `task`.
    pub fn push(&self, task: GenerationTask, reply: impl Into<String>) {
        self.queue.lock().unwrap().push_back((task, Ok(reply.into())));
    }

    pub fn push_error(&self, task: GenerationTask, error: GenerationError) {
        self.queue.lock().unwrap().push_back((task, Err(error)));
    }

    pub fn set_default(&self, task: GenerationTask, reply: impl Into<String>) {
        let mut defaults = self.defaults.lock().unwrap();
        defaults.retain(|(t, _)| *t != task);
        defaults.push((task, reply.into()));
    }

    /// Every call whose payload contains `marker` fails with a transport error.
    pub fn fail_payloads_containing(&self, marker: &str) {
        *self.fail_marker.lock().unwrap() = Some(marker.to_string());
    }

    pub fn requests(&self, task: GenerationTask) -> Vec<GenerationRequest> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.task == task)
            .cloned()
            .collect()
    }

    pub fn calls(&self, task: GenerationTask) -> usize {
        self.requests(task).len()
    }

    /// Highest number of calls that were in progress at the same time.
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn next_reply(&self, request: &GenerationRequest) -> Reply {
        if let Some(marker) = self.fail_marker.lock().unwrap().as_deref() {
            if request.payload.contains(marker) {
                return Err(GenerationError::Transport("scripted failure".to_string()));
            }
        }

        let mut queue = self.queue.lock().unwrap();
        if let Some(pos) = queue.iter().position(|(task, _)| *task == request.task) {
            if let Some((_, reply)) = queue.remove(pos) {
                return reply;
            }
        }
        drop(queue);

        self.defaults
            .lock()
            .unwrap()
            .iter()
            .find(|(task, _)| *task == request.task)
            .map(|(_, reply)| Ok(reply.clone()))
            .unwrap_or(Err(GenerationError::EmptyResponse))
    }
}

#[async_trait]
impl Generation for ScriptedGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        self.requests.lock().unwrap().push(request.clone());

        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.running.fetch_sub(1, Ordering::SeqCst);

        self.next_reply(request)
    }
}

/// Records every event it receives.
#[derive(Default)]
pub struct RecordingProgress {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingProgress {
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn percents(&self) -> Vec<u8> {
        self.events().iter().map(ProgressEvent::percent).collect()
    }
}

impl ProgressReporter for RecordingProgress {
    fn report(&self, event: ProgressEvent) {
        self.events.lock().unwrap().push(event);
    }
}
