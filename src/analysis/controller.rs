use std::sync::Arc;

use log::{error, info, warn};
use tokio::{
    sync::{mpsc, watch, Mutex},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
    db::{Database, Session, SessionStatus},
    error::{Result, ScoutError},
};

use super::{
    aggregator::{JobOutcome, RoundAggregator},
    params::{JobParameters, ValidatedParameters},
    state::JobStatus,
    worker::{AnalysisRequest, AnalysisWorker, WorkerContext, WorkerEvent, EVENT_CHANNEL_CAPACITY},
};

struct ActiveJob {
    job_id: String,
    cancel: CancellationToken,
    driver: JoinHandle<()>,
}

enum Ending {
    Completed,
    Stopped,
    Failed(String),
}

impl Ending {
    fn outcome(&self) -> JobOutcome {
        match self {
            Ending::Completed => JobOutcome::Completed,
            Ending::Stopped => JobOutcome::Stopped,
            Ending::Failed(_) => JobOutcome::Errored,
        }
    }
}

/// Owns the single job slot. Cloning shares the slot.
#[derive(Clone)]
pub struct JobController {
    db: Database,
    worker: Arc<dyn AnalysisWorker>,
    default_threshold: f64,
    status_tx: Arc<watch::Sender<JobStatus>>,
    current: Arc<Mutex<Option<ActiveJob>>>,
}

impl JobController {
    pub fn new(db: Database, worker: Arc<dyn AnalysisWorker>, default_threshold: f64) -> Self {
        let (status_tx, _) = watch::channel(JobStatus::default());
        Self {
            db,
            worker,
            default_threshold,
            status_tx: Arc::new(status_tx),
            current: Arc::new(Mutex::new(None)),
        }
    }

    pub fn status(&self) -> JobStatus {
        self.status_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<JobStatus> {
        self.status_tx.subscribe()
    }

    /// Validate, open the session and launch the job. Returns the job id as
    /// soon as the job is running; the work itself happens in the background.
    pub async fn start(&self, params: JobParameters) -> Result<String> {
        let mut current = self.current.lock().await;
        if self.status_tx.borrow().is_running {
            return Err(ScoutError::AlreadyRunning);
        }

        let params = params.validate(self.default_threshold)?;
        let session = self.open_session(&params).await?;

        let aggregator = RoundAggregator::new(self.db.clone(), session.session_id.clone());
        aggregator.begin().await?;

        let job_id = Uuid::new_v4().to_string();
        let cancel = CancellationToken::new();

        self.status_tx.send_modify(|status| {
            status.begin(job_id.clone(), session.session_id.clone(), params.start_offset)
        });

        let request = AnalysisRequest {
            job_id: job_id.clone(),
            session_id: session.session_id.clone(),
            source: params.source,
            start_offset: params.start_offset,
            end_offset: params.end_offset,
            detection_threshold: params.detection_threshold,
        };

        info!(
            "Starting job {} on session {} ({} {})",
            job_id,
            session.session_id,
            request.source.kind_str(),
            request.source.location()
        );

        let driver = tokio::spawn(drive_job(
            Arc::clone(&self.worker),
            request,
            aggregator,
            cancel.clone(),
            Arc::clone(&self.status_tx),
        ));

        *current = Some(ActiveJob {
            job_id: job_id.clone(),
            cancel,
            driver,
        });

        Ok(job_id)
    }

    /// Ask the running job to wind down. Returns whether a stop was issued.
    pub async fn stop(&self) -> bool {
        let current = self.current.lock().await;
        if !self.status_tx.borrow().is_running {
            return false;
        }

        match current.as_ref() {
            Some(job) => {
                info!("Stop requested for job {}", job.job_id);
                job.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel whatever is running and wait until its session is sealed.
    pub async fn shutdown(&self) {
        let active = self.current.lock().await.take();
        if let Some(job) = active {
            job.cancel.cancel();
            if let Err(err) = job.driver.await {
                error!("Job driver for {} failed to join: {err}", job.job_id);
            }
        }
    }

    async fn open_session(&self, params: &ValidatedParameters) -> Result<Session> {
        let Some(session_id) = params.session_id.as_deref() else {
            return Ok(self
                .db
                .create_session(params.source.clone(), params.tags.clone())
                .await?);
        };

        let session = self
            .db
            .get_session(session_id)
            .await?
            .ok_or_else(|| ScoutError::InvalidParameters(format!("unknown session {session_id}")))?;

        if session.status == SessionStatus::Running {
            return Err(ScoutError::InvalidParameters(format!(
                "session {session_id} is already being analyzed"
            )));
        }

        if params.tags.is_empty() {
            Ok(session)
        } else {
            Ok(self
                .db
                .add_session_tags(session_id, params.tags.clone())
                .await?)
        }
    }
}

async fn drive_job(
    worker: Arc<dyn AnalysisWorker>,
    request: AnalysisRequest,
    mut aggregator: RoundAggregator,
    cancel: CancellationToken,
    status_tx: Arc<watch::Sender<JobStatus>>,
) {
    let job_id = request.job_id.clone();
    let (events_tx, mut events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let ctx = WorkerContext::new(events_tx, cancel.clone());

    let worker_task = tokio::spawn(async move { worker.run(request, ctx).await });

    let mut storage_failure: Option<String> = None;
    while let Some(event) = events_rx.recv().await {
        match event {
            WorkerEvent::Progress(update) => {
                status_tx.send_modify(|status| status.apply_progress(&update));
            }
            WorkerEvent::Round(detection) => {
                if storage_failure.is_some() {
                    continue;
                }
                if let Err(err) = aggregator.record(detection).await {
                    error!("Job {job_id}: could not store round: {err}");
                    storage_failure = Some(format!("could not store round: {err}"));
                    cancel.cancel();
                }
            }
        }
    }

    let worker_result = match worker_task.await {
        Ok(result) => result.map_err(|err| format!("{err:#}")),
        Err(join_err) => Err(format!("analysis worker panicked: {join_err}")),
    };

    let mut ending = match (storage_failure, worker_result) {
        (Some(reason), _) | (None, Err(reason)) => Ending::Failed(reason),
        (None, Ok(())) if cancel.is_cancelled() => Ending::Stopped,
        (None, Ok(())) => Ending::Completed,
    };

    let session_id = aggregator.session_id().to_string();
    if let Err(err) = aggregator.finish(ending.outcome()).await {
        error!("Job {job_id}: failed to seal session {session_id}: {err}");
        if !matches!(ending, Ending::Failed(_)) {
            ending = Ending::Failed(format!("could not seal session: {err}"));
        }
    }

    match &ending {
        Ending::Completed => info!("Job {job_id} completed"),
        Ending::Stopped => info!("Job {job_id} stopped"),
        Ending::Failed(reason) => warn!("Job {job_id} failed: {reason}"),
    }

    status_tx.send_modify(|status| match &ending {
        Ending::Completed => status.complete(),
        Ending::Stopped => status.stop(),
        Ending::Failed(reason) => status.fail(reason),
    });
}
