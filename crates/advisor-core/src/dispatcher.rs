//! Background workers and the channel that carries their results.
//!
//! Every worker is a tokio task that reports back with [`WorkerEvent`]s over
//! an unbounded channel. Nothing here touches UI state: the receiving end is
//! drained by the UI task, which applies events in arrival order.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::ai::{ApiError, GenerativeApi, PendingRequest, RequestKind};
use crate::capture::{self, CaptureError, CaptureTarget, ScreenCapture, SETTLE_DELAY};
use crate::credential::Credential;
use crate::speech::{SpeechError, SpeechSynthesizer};

/// Prompt sent when checking a freshly saved API key.
pub const CONNECTION_TEST_PROMPT: &str = "Test connection";

pub type RequestId = u64;

#[derive(Debug)]
pub enum WorkerOutcome {
    /// Answer to a text prompt
    Reply(Result<String, ApiError>),
    /// Answer to a screenshot analysis
    ScanReply(Result<String, ApiError>),
    /// The screenshot has been taken (or failed); the UI may show itself again.
    /// Always precedes the final outcome of a scan.
    CaptureReleased,
    CaptureFailed(CaptureError),
    ConnectionChecked(Result<(), ApiError>),
    Speech(Result<PathBuf, SpeechError>),
}

impl WorkerOutcome {
    /// Whether this is the last event the worker sends
    pub fn is_final(&self) -> bool {
        !matches!(self, WorkerOutcome::CaptureReleased)
    }
}

#[derive(Debug)]
pub struct WorkerEvent {
    pub id: RequestId,
    pub outcome: WorkerOutcome,
}

/// Sends [`WorkerOutcome::CaptureReleased`] when dropped, so the UI gets its
/// screen back even if capturing fails or the task unwinds.
struct CaptureGuard {
    id: RequestId,
    events: UnboundedSender<WorkerEvent>,
}

impl Drop for CaptureGuard {
    fn drop(&mut self) {
        let _ = self.events.send(WorkerEvent {
            id: self.id,
            outcome: WorkerOutcome::CaptureReleased,
        });
    }
}

/// Delivers a worker's final event. If the worker is dropped before it calls
/// [`CompletionGuard::complete`] (a panic, for instance), the fallback outcome
/// is sent instead so the UI never waits forever.
struct CompletionGuard {
    id: RequestId,
    events: UnboundedSender<WorkerEvent>,
    fallback: Option<WorkerOutcome>,
}

impl CompletionGuard {
    fn new(id: RequestId, events: UnboundedSender<WorkerEvent>, fallback: WorkerOutcome) -> Self {
        Self {
            id,
            events,
            fallback: Some(fallback),
        }
    }

    fn complete(mut self, outcome: WorkerOutcome) {
        self.fallback = None;
        let _ = self.events.send(WorkerEvent { id: self.id, outcome });
    }
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        if let Some(outcome) = self.fallback.take() {
            warn!(id = self.id, "worker stopped without reporting");
            let _ = self.events.send(WorkerEvent { id: self.id, outcome });
        }
    }
}

fn aborted() -> ApiError {
    ApiError::Transport("worker stopped unexpectedly".to_string())
}

/// Spawns workers and keeps their handles until the UI task has seen their
/// final event.
pub struct Dispatcher {
    api: Arc<dyn GenerativeApi>,
    capture: Arc<dyn ScreenCapture>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    events: UnboundedSender<WorkerEvent>,
    workers: HashMap<RequestId, JoinHandle<()>>,
    next_id: RequestId,
    settle_delay: Duration,
}

impl Dispatcher {
    pub fn new(
        api: Arc<dyn GenerativeApi>,
        capture: Arc<dyn ScreenCapture>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        events: UnboundedSender<WorkerEvent>,
    ) -> Self {
        Self {
            api,
            capture,
            synthesizer,
            events,
            workers: HashMap::new(),
            next_id: 1,
            settle_delay: SETTLE_DELAY,
        }
    }

    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    fn allocate_id(&mut self) -> RequestId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// One API call for a text prompt or an already captured image
    pub fn spawn_request(&mut self, request: PendingRequest) -> RequestId {
        let id = self.allocate_id();
        let api = Arc::clone(&self.api);
        let events = self.events.clone();
        let kind = request.kind();

        info!(id, ?kind, "starting API worker");
        let reply = match kind {
            RequestKind::Text => WorkerOutcome::Reply,
            RequestKind::Image => WorkerOutcome::ScanReply,
        };
        let handle = tokio::spawn(async move {
            let guard = CompletionGuard::new(id, events, reply(Err(aborted())));
            let result = api.generate(request).await;
            if let Err(e) = &result {
                warn!(id, "API request failed: {}", e);
            }
            guard.complete(reply(result));
        });

        self.workers.insert(id, handle);
        id
    }

    /// Wait, capture the screen, then send the capture for analysis
    pub fn spawn_scan(&mut self, target: CaptureTarget, credential: Credential) -> RequestId {
        let id = self.allocate_id();
        let api = Arc::clone(&self.api);
        let capture = Arc::clone(&self.capture);
        let events = self.events.clone();
        let settle_delay = self.settle_delay;

        info!(id, ?target, "starting screen scan worker");
        let handle = tokio::spawn(async move {
            let completion =
                CompletionGuard::new(id, events.clone(), WorkerOutcome::ScanReply(Err(aborted())));
            let guard = CaptureGuard {
                id,
                events: events.clone(),
            };
            tokio::time::sleep(settle_delay).await;

            let captured = tokio::task::spawn_blocking(move || capture.capture_png(target))
                .await
                .unwrap_or_else(|e| Err(CaptureError::Backend(format!("capture task failed: {e}"))));
            drop(guard);

            let png = match captured {
                Ok(png) => png,
                Err(error) => {
                    warn!(id, "screen capture failed: {}", error);
                    completion.complete(WorkerOutcome::CaptureFailed(error));
                    return;
                }
            };

            debug!(id, bytes = png.len(), "screen captured");
            let request = PendingRequest::image(capture::to_base64(&png), credential);
            let result = api.generate(request).await;
            if let Err(e) = &result {
                warn!(id, "screen analysis failed: {}", e);
            }
            completion.complete(WorkerOutcome::ScanReply(result));
        });

        self.workers.insert(id, handle);
        id
    }

    pub fn spawn_connection_test(&mut self, credential: Credential) -> RequestId {
        let id = self.allocate_id();
        let api = Arc::clone(&self.api);
        let events = self.events.clone();

        info!(id, "testing API connection");
        let handle = tokio::spawn(async move {
            let guard =
                CompletionGuard::new(id, events, WorkerOutcome::ConnectionChecked(Err(aborted())));
            let result = api
                .generate(PendingRequest::prompt(CONNECTION_TEST_PROMPT, credential))
                .await
                .map(|_| ());
            guard.complete(WorkerOutcome::ConnectionChecked(result));
        });

        self.workers.insert(id, handle);
        id
    }

    pub fn spawn_speech(&mut self, text: String) -> RequestId {
        let id = self.allocate_id();
        let synthesizer = Arc::clone(&self.synthesizer);
        let events = self.events.clone();

        debug!(id, chars = text.chars().count(), "starting speech worker");
        let handle = tokio::spawn(async move {
            let guard = CompletionGuard::new(
                id,
                events,
                WorkerOutcome::Speech(Err(SpeechError::Worker("stopped unexpectedly".to_string()))),
            );
            let result = tokio::task::spawn_blocking(move || synthesizer.synthesize(&text))
                .await
                .unwrap_or_else(|e| Err(SpeechError::Worker(e.to_string())));
            guard.complete(WorkerOutcome::Speech(result));
        });

        self.workers.insert(id, handle);
        id
    }

    /// Forget a worker after its final event was applied
    pub fn finish(&mut self, id: RequestId) -> bool {
        self.workers.remove(&id).is_some()
    }

    pub fn in_flight(&self) -> usize {
        self.workers.len()
    }

    /// Wait for every outstanding worker, however long that takes
    pub async fn join_all(&mut self) {
        let handles: Vec<(RequestId, JoinHandle<()>)> = self.workers.drain().collect();
        if !handles.is_empty() {
            info!(count = handles.len(), "waiting for workers to finish");
        }

        for (id, handle) in handles {
            if let Err(e) = handle.await {
                warn!(id, "worker ended abnormally: {}", e);
            }
        }
    }
}
