use log::{debug, info, warn};

use crate::{
    db::{Database, NewRound, Round, Session, SessionStatus},
    error::{Result, ScoutError},
};

use super::worker::RoundDetection;

/// How a job ended, as far as its session is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    Errored,
    Stopped,
}

impl JobOutcome {
    fn session_status(self) -> SessionStatus {
        match self {
            JobOutcome::Completed => SessionStatus::Completed,
            JobOutcome::Errored => SessionStatus::Errored,
            JobOutcome::Stopped => SessionStatus::Stopped,
        }
    }
}

/// Writes one job's detections into its session.
pub struct RoundAggregator {
    db: Database,
    session_id: String,
    recorded: u32,
}

impl RoundAggregator {
    pub fn new(db: Database, session_id: String) -> Self {
        Self {
            db,
            session_id,
            recorded: 0,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Rounds this aggregator stored; reattached sessions may hold more.
    pub fn recorded(&self) -> u32 {
        self.recorded
    }

    pub async fn begin(&self) -> Result<()> {
        self.db
            .mark_session_status(&self.session_id, SessionStatus::Running)
            .await?;
        Ok(())
    }

    pub async fn record(&mut self, detection: RoundDetection) -> Result<Round> {
        let round = self
            .db
            .append_round(
                &self.session_id,
                NewRound {
                    image_url: detection.image_url,
                    full_image_url: detection.full_image_url,
                    timestamp: detection.timestamp,
                },
            )
            .await?;

        self.recorded += 1;
        debug!(
            "Recorded round {} for session {}",
            round.round_number, self.session_id
        );
        Ok(round)
    }

    /// Seal the session. If the requested status cannot be written, the
    /// session is marked `Errored` instead so it is not left `Running`.
    pub async fn finish(self, outcome: JobOutcome) -> Result<Session> {
        let status = outcome.session_status();
        if let Err(err) = self.db.mark_session_status(&self.session_id, status).await {
            if status != SessionStatus::Errored {
                if let Err(fallback) = self
                    .db
                    .mark_session_status(&self.session_id, SessionStatus::Errored)
                    .await
                {
                    warn!(
                        "Session {} could not be marked Errored either: {fallback}",
                        self.session_id
                    );
                }
            }
            return Err(err.into());
        }

        let session = self
            .db
            .get_session(&self.session_id)
            .await?
            .ok_or_else(|| ScoutError::NotFound(self.session_id.clone()))?;

        info!(
            "Session {} sealed as {} with {} round(s) ({} new)",
            session.session_id,
            status.as_str(),
            session.round_count,
            self.recorded
        );
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::VideoSource;

    fn detection(ts: f64) -> RoundDetection {
        RoundDetection {
            image_url: format!("/artifacts/s/minimaps/round_{ts}.png"),
            full_image_url: None,
            timestamp: Some(ts),
        }
    }

    #[tokio::test]
    async fn records_in_order_and_seals() {
        let db = Database::in_memory().unwrap();
        let session = db
            .create_session(VideoSource::LocalPath("v.mp4".into()), vec![])
            .await
            .unwrap();

        let mut aggregator = RoundAggregator::new(db.clone(), session.session_id.clone());
        aggregator.begin().await.unwrap();
        assert_eq!(
            db.get_session(&session.session_id).await.unwrap().unwrap().status,
            SessionStatus::Running
        );

        for (idx, ts) in [10.0, 95.5, 180.0].into_iter().enumerate() {
            let round = aggregator.record(detection(ts)).await.unwrap();
            assert_eq!(round.round_number, idx as u32 + 1);
        }
        assert_eq!(aggregator.recorded(), 3);

        let sealed = aggregator.finish(JobOutcome::Stopped).await.unwrap();
        assert_eq!(sealed.status, SessionStatus::Stopped);
        assert_eq!(sealed.round_count, 3);
    }

    #[tokio::test]
    async fn rejected_detection_leaves_session_intact() {
        let db = Database::in_memory().unwrap();
        let session = db
            .create_session(VideoSource::LocalPath("v.mp4".into()), vec![])
            .await
            .unwrap();

        let mut aggregator = RoundAggregator::new(db.clone(), session.session_id.clone());
        aggregator.record(detection(1.0)).await.unwrap();
        let bad = RoundDetection {
            image_url: String::new(),
            full_image_url: None,
            timestamp: None,
        };
        assert!(aggregator.record(bad).await.is_err());
        assert_eq!(aggregator.recorded(), 1);

        let sealed = aggregator.finish(JobOutcome::Errored).await.unwrap();
        assert_eq!(sealed.status, SessionStatus::Errored);
        assert_eq!(sealed.round_count, 1);
    }

    #[tokio::test]
    async fn unsealable_session_falls_back_to_errored() {
        let db = Database::in_memory().unwrap();
        let session = db
            .create_session(VideoSource::LocalPath("v.mp4".into()), vec![])
            .await
            .unwrap();
        refuse_completed_status(&db).await;

        let aggregator = RoundAggregator::new(db.clone(), session.session_id.clone());
        aggregator.begin().await.unwrap();
        assert!(aggregator.finish(JobOutcome::Completed).await.is_err());

        let stored = db.get_session(&session.session_id).await.unwrap().unwrap();
        assert_eq!(stored.status, SessionStatus::Errored);
    }

    async fn refuse_completed_status(db: &Database) {
        db.execute(|conn| {
            conn.execute_batch(
                "CREATE TRIGGER refuse_completed BEFORE UPDATE OF status ON sessions
                 WHEN NEW.status = 'Completed'
                 BEGIN SELECT RAISE(ABORT, 'completed status refused'); END;",
            )?;
            Ok(())
        })
        .await
        .unwrap();
    }
}
