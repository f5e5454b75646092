//! Runs an out-of-process analyzer and translates its JSON-lines output.

use std::{path::PathBuf, process::Stdio};

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use log::{debug, info, warn};
use serde::Deserialize;
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    process::{Child, ChildStdin, Command},
};

use crate::{db::VideoSource, timecode};

use super::worker::{AnalysisRequest, AnalysisWorker, RoundDetection, WorkerContext};

#[derive(Debug, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
enum AnalyzerEvent {
    #[serde(rename_all = "camelCase")]
    Progress {
        progress: f64,
        #[serde(default)]
        status: String,
        #[serde(default)]
        current_time: Option<f64>,
    },
    #[serde(rename_all = "camelCase")]
    Round {
        image: String,
        #[serde(default)]
        full_image: Option<String>,
        #[serde(default)]
        timestamp: Option<f64>,
    },
    Error {
        message: String,
    },
}

fn parse_event_line(line: &str) -> Option<AnalyzerEvent> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    match serde_json::from_str(trimmed) {
        Ok(event) => Some(event),
        Err(err) => {
            debug!("Skipping analyzer output {trimmed:?}: {err}");
            None
        }
    }
}

/// Rewrites a path relative to the session directory into a served URL.
fn artifact_url(session_id: &str, image: &str) -> String {
    if image.starts_with('/') || image.starts_with("http://") || image.starts_with("https://") {
        image.to_string()
    } else {
        format!("/artifacts/{session_id}/{}", image.trim_start_matches("./"))
    }
}

#[derive(Debug, Clone)]
pub struct ExternalAnalyzer {
    program: String,
    args: Vec<String>,
    sessions_dir: PathBuf,
}

impl ExternalAnalyzer {
    pub fn new(program: impl Into<String>, args: Vec<String>, sessions_dir: PathBuf) -> Self {
        Self {
            program: program.into(),
            args,
            sessions_dir,
        }
    }

    fn request_args(&self, request: &AnalysisRequest) -> Vec<String> {
        let session_dir = self.sessions_dir.join(&request.session_id);
        let mut args = self.args.clone();
        args.push("--session-dir".into());
        args.push(session_dir.display().to_string());
        args.push("--threshold".into());
        args.push(request.detection_threshold.to_string());
        if let Some(start) = request.start_offset {
            args.push("--start-time".into());
            args.push(timecode::format(start));
        }
        if let Some(end) = request.end_offset {
            args.push("--end-time".into());
            args.push(timecode::format(end));
        }
        match &request.source {
            VideoSource::LocalPath(path) => {
                args.push("--local-video".into());
                args.push(path.clone());
            }
            VideoSource::RemoteUrl(url) => {
                args.push("--url".into());
                args.push(url.clone());
            }
        }
        args
    }

    fn spawn(&self, request: &AnalysisRequest) -> Result<Child> {
        Command::new(&self.program)
            .args(self.request_args(request))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to launch analyzer '{}'", self.program))
    }
}

async fn request_stop(stdin: &mut Option<ChildStdin>) {
    if let Some(mut pipe) = stdin.take() {
        if let Err(err) = pipe.write_all(b"stop\n").await {
            warn!("Could not deliver stop request to analyzer: {err}");
            return;
        }
        if let Err(err) = pipe.flush().await {
            warn!("Could not flush stop request to analyzer: {err}");
        }
    }
}

#[async_trait]
impl AnalysisWorker for ExternalAnalyzer {
    async fn run(&self, request: AnalysisRequest, ctx: WorkerContext) -> Result<()> {
        let session_dir = self.sessions_dir.join(&request.session_id);
        tokio::fs::create_dir_all(&session_dir)
            .await
            .with_context(|| format!("failed to create {}", session_dir.display()))?;

        let mut child = self.spawn(&request)?;
        info!(
            "Analyzer '{}' started for job {} (pid {:?})",
            self.program,
            request.job_id,
            child.id()
        );

        let mut stdin = child.stdin.take();
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("analyzer stdout was not captured"))?;
        if let Some(stderr) = child.stderr.take() {
            let job_id = request.job_id.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!("analyzer[{job_id}]: {line}");
                }
            });
        }

        let mut lines = BufReader::new(stdout).lines();
        let mut reported_error: Option<String> = None;
        let mut stop_sent = false;

        loop {
            let line = tokio::select! {
                line = lines.next_line() => line.context("failed to read analyzer output")?,
                _ = ctx.cancelled(), if !stop_sent => {
                    stop_sent = true;
                    request_stop(&mut stdin).await;
                    continue;
                }
            };

            let Some(line) = line else { break };
            match parse_event_line(&line) {
                Some(AnalyzerEvent::Progress {
                    progress,
                    status,
                    current_time,
                }) => ctx.progress(progress, status, current_time).await?,
                Some(AnalyzerEvent::Round {
                    image,
                    full_image,
                    timestamp,
                }) => {
                    ctx.round(RoundDetection {
                        image_url: artifact_url(&request.session_id, &image),
                        full_image_url: full_image
                            .map(|full| artifact_url(&request.session_id, &full)),
                        timestamp,
                    })
                    .await?
                }
                Some(AnalyzerEvent::Error { message }) => {
                    warn!("Analyzer reported an error for job {}: {message}", request.job_id);
                    reported_error = Some(message);
                }
                None => {}
            }
        }

        drop(stdin);
        let exit = child
            .wait()
            .await
            .context("failed to wait for analyzer exit")?;

        if let Some(message) = reported_error {
            bail!(message);
        }
        if !exit.success() {
            bail!("analyzer exited with {exit}");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(source: VideoSource) -> AnalysisRequest {
        AnalysisRequest {
            job_id: "job".into(),
            session_id: "vlr_20240101_abcdefabcdef".into(),
            source,
            start_offset: Some(90.0),
            end_offset: None,
            detection_threshold: 0.7,
        }
    }

    #[test]
    fn parses_each_event_kind() {
        assert_eq!(
            parse_event_line(
                r#"{"type":"progress","progress":0.4,"status":"Scanning at 120s","currentTime":120.0}"#
            ),
            Some(AnalyzerEvent::Progress {
                progress: 0.4,
                status: "Scanning at 120s".into(),
                current_time: Some(120.0),
            })
        );
        assert_eq!(
            parse_event_line(r#"{"type":"round","image":"minimaps/round_01.png","timestamp":95.2}"#),
            Some(AnalyzerEvent::Round {
                image: "minimaps/round_01.png".into(),
                full_image: None,
                timestamp: Some(95.2),
            })
        );
        assert_eq!(
            parse_event_line(r#"{"type":"error","message":"no video stream"}"#),
            Some(AnalyzerEvent::Error {
                message: "no video stream".into()
            })
        );
        assert_eq!(parse_event_line("[download] 12%"), None);
        assert_eq!(parse_event_line("   "), None);
    }

    #[test]
    fn rewrites_relative_artifacts() {
        assert_eq!(
            artifact_url("vlr_x", "minimaps/round_01.png"),
            "/artifacts/vlr_x/minimaps/round_01.png"
        );
        assert_eq!(
            artifact_url("vlr_x", "./full_screenshots/round_01_full.png"),
            "/artifacts/vlr_x/full_screenshots/round_01_full.png"
        );
        assert_eq!(artifact_url("vlr_x", "/already/served.png"), "/already/served.png");
    }

    #[test]
    fn builds_arguments_from_request() {
        let analyzer = ExternalAnalyzer::new(
            "python3",
            vec!["scout.py".into()],
            PathBuf::from("output/sessions"),
        );
        let args = analyzer.request_args(&request(VideoSource::RemoteUrl(
            "https://youtu.be/x".into(),
        )));

        let session_dir = PathBuf::from("output/sessions")
            .join("vlr_20240101_abcdefabcdef")
            .display()
            .to_string();
        assert_eq!(
            args,
            vec![
                "scout.py".to_string(),
                "--session-dir".into(),
                session_dir,
                "--threshold".into(),
                "0.7".into(),
                "--start-time".into(),
                "1:30".into(),
                "--url".into(),
                "https://youtu.be/x".into(),
            ]
        );
    }

    #[cfg(unix)]
    mod process {
        use std::sync::Arc;

        use tempfile::TempDir;
        use tokio::sync::mpsc;
        use tokio_util::sync::CancellationToken;

        use super::*;
        use crate::analysis::worker::{AnalysisWorker, WorkerEvent, EVENT_CHANNEL_CAPACITY};

        fn shell(script: &str, dir: &TempDir) -> Arc<ExternalAnalyzer> {
            Arc::new(ExternalAnalyzer::new(
                "sh",
                vec!["-c".into(), script.into(), "analyzer".into()],
                dir.path().to_path_buf(),
            ))
        }

        async fn run(
            analyzer: Arc<ExternalAnalyzer>,
            cancel: CancellationToken,
        ) -> (Result<()>, Vec<WorkerEvent>) {
            let (tx, mut rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
            let ctx = WorkerContext::new(tx, cancel);
            let req = request(VideoSource::LocalPath("v.mp4".into()));
            let task = tokio::spawn(async move { analyzer.run(req, ctx).await });

            let mut events = Vec::new();
            while let Some(event) = rx.recv().await {
                events.push(event);
            }
            (task.await.unwrap(), events)
        }

        #[tokio::test]
        async fn forwards_progress_and_rounds() {
            let dir = TempDir::new().unwrap();
            let analyzer = shell(
                r#"echo '{"type":"progress","progress":0.5,"status":"half"}'
                   echo 'noise'
                   echo '{"type":"round","image":"minimaps/round_01.png","timestamp":12}'"#,
                &dir,
            );

            let (result, events) = run(analyzer, CancellationToken::new()).await;
            result.unwrap();
            assert_eq!(events.len(), 2);
            assert!(matches!(&events[1], WorkerEvent::Round(r)
                if r.image_url == "/artifacts/vlr_20240101_abcdefabcdef/minimaps/round_01.png"));
            assert!(dir.path().join("vlr_20240101_abcdefabcdef").is_dir());
        }

        #[tokio::test]
        async fn error_event_and_exit_code_fail_the_run() {
            let dir = TempDir::new().unwrap();
            let (result, _) = run(
                shell(r#"echo '{"type":"error","message":"no video stream"}'"#, &dir),
                CancellationToken::new(),
            )
            .await;
            assert!(result.unwrap_err().to_string().contains("no video stream"));

            let (result, _) = run(shell("exit 3", &dir), CancellationToken::new()).await;
            assert!(result.is_err());
        }

        #[tokio::test]
        async fn stop_is_written_to_stdin() {
            let dir = TempDir::new().unwrap();
            let cancel = CancellationToken::new();
            cancel.cancel();

            let (result, events) = run(
                shell(
                    r#"read cmd
                       [ "$cmd" = "stop" ] && echo '{"type":"progress","progress":0.1,"status":"stopping"}'"#,
                    &dir,
                ),
                cancel,
            )
            .await;
            result.unwrap();
            assert!(matches!(&events[..], [WorkerEvent::Progress(p)] if p.status_text == "stopping"));
        }
    }
}
