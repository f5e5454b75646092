use serde::{Deserialize, Serialize};

use super::worker::ProgressUpdate;

/// Highest progress a running job may report; `1.0` is kept for success.
const RUNNING_PROGRESS_CEILING: f64 = 0.999;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum JobPhase {
    #[default]
    Idle,
    Running,
    Completed,
    Errored,
    Stopped,
}

impl JobPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobPhase::Completed | JobPhase::Errored | JobPhase::Stopped)
    }
}

/// Snapshot of the current (or last) job, as served to pollers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    pub id: Option<String>,
    pub is_running: bool,
    pub progress: f64,
    pub status_text: String,
    pub current_time: f64,
    pub state: JobPhase,
    pub session_id: Option<String>,
}

impl Default for JobStatus {
    fn default() -> Self {
        Self {
            id: None,
            is_running: false,
            progress: 0.0,
            status_text: "idle".into(),
            current_time: 0.0,
            state: JobPhase::Idle,
            session_id: None,
        }
    }
}

impl JobStatus {
    pub fn begin(&mut self, job_id: String, session_id: String, start_offset: Option<f64>) {
        *self = Self {
            id: Some(job_id),
            is_running: true,
            progress: 0.0,
            status_text: "starting".into(),
            current_time: start_offset.unwrap_or(0.0),
            state: JobPhase::Running,
            session_id: Some(session_id),
        };
    }

    /// Fold a worker report in. Progress never moves backwards and stays
    /// below `1.0` until the job completes.
    pub fn apply_progress(&mut self, update: &ProgressUpdate) {
        if !self.is_running {
            return;
        }

        if update.progress.is_finite() {
            let clamped = update.progress.clamp(0.0, RUNNING_PROGRESS_CEILING);
            self.progress = self.progress.max(clamped);
        }
        if !update.status_text.is_empty() {
            self.status_text = update.status_text.clone();
        }
        if let Some(current_time) = update.current_time.filter(|t| t.is_finite() && *t >= 0.0) {
            self.current_time = current_time;
        }
    }

    pub fn complete(&mut self) {
        self.is_running = false;
        self.progress = 1.0;
        self.status_text = "completed".into();
        self.state = JobPhase::Completed;
    }

    pub fn stop(&mut self) {
        self.is_running = false;
        self.status_text = "stopped".into();
        self.state = JobPhase::Stopped;
    }

    pub fn fail(&mut self, reason: &str) {
        self.is_running = false;
        self.status_text = format!("error: {reason}");
        self.state = JobPhase::Errored;
    }
}
