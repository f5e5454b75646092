//! Session-related data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Round;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SessionStatus {
    Pending,
    Running,
    Completed,
    Errored,
    Stopped,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Pending => "Pending",
            SessionStatus::Running => "Running",
            SessionStatus::Completed => "Completed",
            SessionStatus::Errored => "Errored",
            SessionStatus::Stopped => "Stopped",
        }
    }
}

/// Where the analyzed video comes from. Exactly one variant per job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "location", rename_all = "camelCase")]
pub enum VideoSource {
    LocalPath(String),
    RemoteUrl(String),
}

impl VideoSource {
    pub fn kind_str(&self) -> &'static str {
        match self {
            VideoSource::LocalPath(_) => "localPath",
            VideoSource::RemoteUrl(_) => "remoteUrl",
        }
    }

    pub fn location(&self) -> &str {
        match self {
            VideoSource::LocalPath(location) | VideoSource::RemoteUrl(location) => location,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub session_id: String,
    pub video_source: VideoSource,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub status: SessionStatus,
    pub round_count: u32,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AggregateCounts {
    pub total_sessions: u64,
    pub total_rounds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionWithRounds {
    #[serde(flatten)]
    pub session: Session,
    pub rounds: Vec<Round>,
}

/// Every session with its rounds plus the totals, read in one pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundsListing {
    pub sessions: Vec<SessionWithRounds>,
    pub total_sessions: u64,
    pub total_rounds: u64,
}

/// `vlr_{YYYYMMDD}_{12 hex}`; the suffix is random so ids never repeat.
pub fn generate_session_id(now: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("vlr_{}_{}", now.format("%Y%m%d"), &suffix[..12])
}
