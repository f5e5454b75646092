use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::db::VideoSource;

/// Queue depth between a running worker and the job driver.
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    pub progress: f64,
    pub status_text: String,
    pub current_time: Option<f64>,
}

/// A round boundary the worker found, with its saved screenshots.
#[derive(Debug, Clone, PartialEq)]
pub struct RoundDetection {
    pub image_url: String,
    pub full_image_url: Option<String>,
    pub timestamp: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WorkerEvent {
    Progress(ProgressUpdate),
    Round(RoundDetection),
}

/// Everything a worker needs to know about the job it runs.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisRequest {
    pub job_id: String,
    pub session_id: String,
    pub source: VideoSource,
    pub start_offset: Option<f64>,
    pub end_offset: Option<f64>,
    pub detection_threshold: f64,
}

/// Channel back to the controller plus the stop signal.
///
/// Workers must poll `is_cancelled` (or await `cancelled`) between units of
/// work and return promptly once it fires.
#[derive(Clone)]
pub struct WorkerContext {
    events: mpsc::Sender<WorkerEvent>,
    cancel: CancellationToken,
}

impl WorkerContext {
    pub fn new(events: mpsc::Sender<WorkerEvent>, cancel: CancellationToken) -> Self {
        Self { events, cancel }
    }

    pub async fn progress(
        &self,
        progress: f64,
        status_text: impl Into<String>,
        current_time: Option<f64>,
    ) -> Result<()> {
        self.send(WorkerEvent::Progress(ProgressUpdate {
            progress,
            status_text: status_text.into(),
            current_time,
        }))
        .await
    }

    pub async fn round(&self, detection: RoundDetection) -> Result<()> {
        self.send(WorkerEvent::Round(detection)).await
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    async fn send(&self, event: WorkerEvent) -> Result<()> {
        self.events
            .send(event)
            .await
            .map_err(|_| anyhow!("job driver is no longer listening"))
    }
}

/// The detection backend. One instance serves every job the controller runs.
#[async_trait]
pub trait AnalysisWorker: Send + Sync {
    async fn run(&self, request: AnalysisRequest, ctx: WorkerContext) -> Result<()>;
}
