use std::convert::TryFrom;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};

use crate::db::models::{SessionStatus, VideoSource};

pub fn to_u32(value: i64, field: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| anyhow!("{field} out of range: {value}"))
}

/// Fixed-width RFC 3339 so that text order in SQLite equals time order.
pub fn format_datetime(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_datetime(value: &str, field: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("failed to parse {field}"))
}

pub fn parse_status(value: &str) -> Result<SessionStatus> {
    match value {
        "Pending" => Ok(SessionStatus::Pending),
        "Running" => Ok(SessionStatus::Running),
        "Completed" => Ok(SessionStatus::Completed),
        "Errored" => Ok(SessionStatus::Errored),
        "Stopped" => Ok(SessionStatus::Stopped),
        other => Err(anyhow!("unknown session status {other}")),
    }
}

pub fn parse_video_source(kind: &str, location: String) -> Result<VideoSource> {
    match kind {
        "localPath" => Ok(VideoSource::LocalPath(location)),
        "remoteUrl" => Ok(VideoSource::RemoteUrl(location)),
        other => Err(anyhow!("unknown video source kind {other}")),
    }
}

pub fn encode_tags(tags: &[String]) -> Result<String> {
    serde_json::to_string(tags).context("failed to encode session tags")
}

pub fn decode_tags(raw: &str) -> Result<Vec<String>> {
    serde_json::from_str(raw).context("failed to decode session tags")
}

/// Sorted, deduplicated, blank entries dropped.
pub fn normalize_tags<I>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut out: Vec<String> = tags
        .into_iter()
        .map(|tag| tag.trim().to_string())
        .filter(|tag| !tag.is_empty())
        .collect();
    out.sort();
    out.dedup();
    out
}
