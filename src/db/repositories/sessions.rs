use anyhow::{bail, Context, Result};
use chrono::{SubsecRound, Utc};
use log::{info, warn};
use rusqlite::{params, Connection, Row};

use crate::db::{
    connection::Database,
    helpers::{
        decode_tags, encode_tags, format_datetime, normalize_tags, parse_datetime, parse_status,
        parse_video_source, to_u32,
    },
    models::{
        generate_session_id, AggregateCounts, RoundsListing, Session, SessionStatus,
        SessionWithRounds, VideoSource,
    },
};

use super::rounds::load_rounds;

fn row_to_session(row: &Row) -> Result<Session> {
    let source_kind: String = row.get("source_kind")?;
    let source_location: String = row.get("source_location")?;
    let status: String = row.get("status")?;
    let round_count: i64 = row.get("round_count")?;
    let tags: String = row.get("tags")?;
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;

    Ok(Session {
        session_id: row.get("id")?,
        video_source: parse_video_source(&source_kind, source_location)?,
        created_at: parse_datetime(&created_at, "created_at")?,
        updated_at: parse_datetime(&updated_at, "updated_at")?,
        status: parse_status(&status)?,
        round_count: to_u32(round_count, "round_count")?,
        tags: decode_tags(&tags)?,
    })
}

fn load_session(conn: &Connection, session_id: &str) -> Result<Option<Session>> {
    let mut stmt = conn.prepare(
        "SELECT id, source_kind, source_location, status, round_count, tags, created_at, updated_at
         FROM sessions
         WHERE id = ?1",
    )?;

    let mut rows = stmt.query(params![session_id])?;
    match rows.next()? {
        Some(row) => Ok(Some(row_to_session(row)?)),
        None => Ok(None),
    }
}

fn load_all_sessions(conn: &Connection) -> Result<Vec<Session>> {
    let mut stmt = conn.prepare(
        "SELECT id, source_kind, source_location, status, round_count, tags, created_at, updated_at
         FROM sessions
         ORDER BY created_at ASC, rowid ASC",
    )?;

    let mut rows = stmt.query([])?;
    let mut sessions = Vec::new();
    while let Some(row) = rows.next()? {
        sessions.push(row_to_session(row)?);
    }

    Ok(sessions)
}

fn load_counts(conn: &Connection) -> Result<AggregateCounts> {
    let total_sessions: i64 = conn.query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get(0))?;
    let total_rounds: i64 = conn.query_row("SELECT COUNT(*) FROM rounds", [], |row| row.get(0))?;

    Ok(AggregateCounts {
        total_sessions: total_sessions.max(0) as u64,
        total_rounds: total_rounds.max(0) as u64,
    })
}

impl Database {
    /// Open a fresh `Pending` session with no rounds.
    pub async fn create_session(&self, source: VideoSource, tags: Vec<String>) -> Result<Session> {
        let now = Utc::now().trunc_subsecs(6);
        let session = Session {
            session_id: generate_session_id(now),
            video_source: source,
            created_at: now,
            updated_at: now,
            status: SessionStatus::Pending,
            round_count: 0,
            tags: normalize_tags(tags),
        };

        let record = session.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO sessions (id, source_kind, source_location, status, round_count, tags, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    record.session_id,
                    record.video_source.kind_str(),
                    record.video_source.location(),
                    record.status.as_str(),
                    record.round_count,
                    encode_tags(&record.tags)?,
                    format_datetime(&record.created_at),
                    format_datetime(&record.updated_at),
                ],
            )
            .context("failed to insert session")?;
            Ok(())
        })
        .await?;

        info!("Created session {}", session.session_id);
        Ok(session)
    }

    pub async fn get_session(&self, session_id: &str) -> Result<Option<Session>> {
        let session_id = session_id.to_string();
        self.execute(move |conn| load_session(conn, &session_id)).await
    }

    /// All sessions, oldest first. Ties keep insertion order.
    pub async fn list_sessions(&self) -> Result<Vec<Session>> {
        self.execute(|conn| load_all_sessions(conn)).await
    }

    pub async fn latest_session(&self) -> Result<Option<Session>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, source_kind, source_location, status, round_count, tags, created_at, updated_at
                 FROM sessions
                 ORDER BY created_at DESC, rowid DESC
                 LIMIT 1",
            )?;

            let mut rows = stmt.query([])?;
            match rows.next()? {
                Some(row) => Ok(Some(row_to_session(row)?)),
                None => Ok(None),
            }
        })
        .await
    }

    pub async fn mark_session_status(&self, session_id: &str, status: SessionStatus) -> Result<()> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            let rows_affected = conn
                .execute(
                    "UPDATE sessions
                     SET status = ?1,
                         updated_at = ?2
                     WHERE id = ?3",
                    params![status.as_str(), format_datetime(&Utc::now()), session_id],
                )
                .context("failed to update session status")?;

            if rows_affected == 0 {
                bail!("session {session_id} not found");
            }
            Ok(())
        })
        .await
    }

    /// Merge tags into an existing session's tag set.
    pub async fn add_session_tags(&self, session_id: &str, tags: Vec<String>) -> Result<Session> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            let tx = conn.transaction()?;
            let Some(mut session) = load_session(&tx, &session_id)? else {
                bail!("session {session_id} not found");
            };

            session.tags = normalize_tags(session.tags.into_iter().chain(tags));
            tx.execute(
                "UPDATE sessions SET tags = ?1 WHERE id = ?2",
                params![encode_tags(&session.tags)?, session_id],
            )
            .context("failed to update session tags")?;
            tx.commit()?;

            Ok(session)
        })
        .await
    }

    /// Totals recomputed from the stored rows.
    pub async fn aggregate_counts(&self) -> Result<AggregateCounts> {
        self.execute(|conn| load_counts(conn)).await
    }

    /// Sessions, their rounds and the totals from one consistent read.
    pub async fn list_sessions_with_rounds(&self) -> Result<RoundsListing> {
        self.execute(|conn| {
            let tx = conn.transaction()?;
            let counts = load_counts(&tx)?;
            let mut sessions = Vec::new();
            for session in load_all_sessions(&tx)? {
                let rounds = load_rounds(&tx, &session.session_id)?;
                sessions.push(SessionWithRounds { session, rounds });
            }
            tx.commit()?;

            Ok(RoundsListing {
                sessions,
                total_sessions: counts.total_sessions,
                total_rounds: counts.total_rounds,
            })
        })
        .await
    }

    /// Sessions still `Pending`/`Running` belong to a process that is gone;
    /// mark them `Errored` and return their ids.
    pub async fn recover_interrupted_sessions(&self) -> Result<Vec<String>> {
        let recovered = self
            .execute(|conn| {
                let tx = conn.transaction()?;
                let ids = {
                    let mut stmt = tx.prepare(
                        "SELECT id FROM sessions
                         WHERE status IN ('Pending', 'Running')
                         ORDER BY created_at ASC, rowid ASC",
                    )?;
                    let ids = stmt
                        .query_map([], |row| row.get::<_, String>(0))?
                        .collect::<rusqlite::Result<Vec<_>>>()?;
                    ids
                };

                tx.execute(
                    "UPDATE sessions
                     SET status = ?1,
                         updated_at = ?2
                     WHERE status IN ('Pending', 'Running')",
                    params![SessionStatus::Errored.as_str(), format_datetime(&Utc::now())],
                )?;
                tx.commit()?;

                Ok(ids)
            })
            .await?;

        for session_id in &recovered {
            warn!("Recovered interrupted session {session_id}; marked as Errored");
        }
        Ok(recovered)
    }
}
