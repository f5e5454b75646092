use serde::{Deserialize, Serialize};

use crate::{
    db::VideoSource,
    error::{Result, ScoutError},
    timecode,
};

/// A time bound as the dashboard sends it: plain seconds or a time string.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum TimeInput {
    Seconds(f64),
    Text(String),
}

impl TimeInput {
    pub fn to_seconds(&self) -> Result<f64> {
        match self {
            TimeInput::Seconds(value) => Ok(*value),
            TimeInput::Text(text) => timecode::parse(text),
        }
    }
}

impl From<f64> for TimeInput {
    fn from(value: f64) -> Self {
        TimeInput::Seconds(value)
    }
}

impl From<&str> for TimeInput {
    fn from(value: &str) -> Self {
        TimeInput::Text(value.to_string())
    }
}

/// Raw start request. Nothing here is trusted until `validate` runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobParameters {
    #[serde(default, alias = "video_url")]
    pub video_url: Option<String>,
    #[serde(default, alias = "local_video_path")]
    pub local_video_path: Option<String>,
    #[serde(default, alias = "startTime", alias = "start_time")]
    pub start_offset: Option<TimeInput>,
    #[serde(default, alias = "endTime", alias = "end_time")]
    pub end_offset: Option<TimeInput>,
    #[serde(default, alias = "detection_threshold")]
    pub detection_threshold: Option<f64>,
    #[serde(default, alias = "session_id")]
    pub session_id: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl JobParameters {
    pub fn local(path: impl Into<String>) -> Self {
        Self {
            local_video_path: Some(path.into()),
            ..Self::default()
        }
    }

    pub fn remote(url: impl Into<String>) -> Self {
        Self {
            video_url: Some(url.into()),
            ..Self::default()
        }
    }

    pub fn with_range(mut self, start: Option<TimeInput>, end: Option<TimeInput>) -> Self {
        self.start_offset = start;
        self.end_offset = end;
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Check the request and resolve it into typed values.
    pub fn validate(self, default_threshold: f64) -> Result<ValidatedParameters> {
        let source = resolve_source(self.local_video_path, self.video_url)?;

        let start_offset = resolve_offset(self.start_offset.as_ref())?;
        let end_offset = resolve_offset(self.end_offset.as_ref())?;
        timecode::validate_range(start_offset, end_offset)
            .map_err(ScoutError::into_invalid_parameters)?;

        let detection_threshold = self.detection_threshold.unwrap_or(default_threshold);
        if !detection_threshold.is_finite() || !(0.0..=1.0).contains(&detection_threshold) {
            return Err(ScoutError::InvalidParameters(format!(
                "detection threshold {detection_threshold} must be within [0, 1]"
            )));
        }

        Ok(ValidatedParameters {
            source,
            start_offset,
            end_offset,
            detection_threshold,
            session_id: non_blank(self.session_id),
            tags: self.tags,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedParameters {
    pub source: VideoSource,
    pub start_offset: Option<f64>,
    pub end_offset: Option<f64>,
    pub detection_threshold: f64,
    pub session_id: Option<String>,
    pub tags: Vec<String>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn looks_like_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

fn resolve_source(local: Option<String>, url: Option<String>) -> Result<VideoSource> {
    match (non_blank(local), non_blank(url)) {
        (Some(_), Some(_)) => Err(ScoutError::InvalidParameters(
            "give either a local video path or a video URL, not both".into(),
        )),
        (None, None) => Err(ScoutError::InvalidParameters(
            "a local video path or a video URL is required".into(),
        )),
        (Some(path), None) if looks_like_url(&path) => Ok(VideoSource::RemoteUrl(path)),
        (Some(path), None) => Ok(VideoSource::LocalPath(path)),
        (None, Some(url)) => Ok(VideoSource::RemoteUrl(url)),
    }
}

fn resolve_offset(input: Option<&TimeInput>) -> Result<Option<f64>> {
    input
        .map(|value| value.to_seconds().map_err(ScoutError::into_invalid_parameters))
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invalid(result: Result<ValidatedParameters>) -> String {
        match result {
            Err(ScoutError::InvalidParameters(msg)) => msg,
            other => panic!("expected InvalidParameters, got {other:?}"),
        }
    }

    #[test]
    fn resolves_sources() {
        let local = JobParameters::local("v.mp4").validate(0.7).unwrap();
        assert_eq!(local.source, VideoSource::LocalPath("v.mp4".into()));
        assert_eq!(local.detection_threshold, 0.7);

        let remote = JobParameters::remote(" https://youtu.be/x ").validate(0.7).unwrap();
        assert_eq!(remote.source, VideoSource::RemoteUrl("https://youtu.be/x".into()));

        let pasted = JobParameters::local("https://youtu.be/y").validate(0.7).unwrap();
        assert_eq!(pasted.source, VideoSource::RemoteUrl("https://youtu.be/y".into()));
    }

    #[test]
    fn rejects_missing_or_double_sources() {
        invalid(JobParameters::default().validate(0.7));
        invalid(
            JobParameters {
                local_video_path: Some("   ".into()),
                video_url: Some("".into()),
                ..JobParameters::default()
            }
            .validate(0.7),
        );
        invalid(
            JobParameters {
                local_video_path: Some("v.mp4".into()),
                video_url: Some("https://youtu.be/x".into()),
                ..JobParameters::default()
            }
            .validate(0.7),
        );
    }

    #[test]
    fn resolves_and_checks_offsets() {
        let ok = JobParameters::local("v.mp4")
            .with_range(Some("1:30".into()), Some(600.0.into()))
            .validate(0.7)
            .unwrap();
        assert_eq!(ok.start_offset, Some(90.0));
        assert_eq!(ok.end_offset, Some(600.0));

        invalid(
            JobParameters::local("v.mp4")
                .with_range(Some(30.0.into()), Some(10.0.into()))
                .validate(0.7),
        );
        invalid(
            JobParameters::local("v.mp4")
                .with_range(Some("abc".into()), None)
                .validate(0.7),
        );
        invalid(
            JobParameters::local("v.mp4")
                .with_range(Some((-4.0).into()), None)
                .validate(0.7),
        );
    }

    #[test]
    fn checks_threshold() {
        let mut params = JobParameters::local("v.mp4");
        params.detection_threshold = Some(1.2);
        invalid(params.clone().validate(0.7));
        params.detection_threshold = Some(0.0);
        assert_eq!(params.validate(0.7).unwrap().detection_threshold, 0.0);
    }

    #[test]
    fn accepts_dashboard_json() {
        let params: JobParameters = serde_json::from_value(serde_json::json!({
            "local_video_path": "match.mp4",
            "start_time": "2:00",
            "endTime": 900,
            "detection_threshold": 0.8,
            "sessionId": "  ",
        }))
        .unwrap();

        let validated = params.validate(0.7).unwrap();
        assert_eq!(validated.start_offset, Some(120.0));
        assert_eq!(validated.end_offset, Some(900.0));
        assert_eq!(validated.detection_threshold, 0.8);
        assert_eq!(validated.session_id, None);
    }
}
