use anyhow::{bail, Context, Result};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::db::{
    connection::Database,
    helpers::{format_datetime, to_u32},
    models::{NewRound, Round},
};

fn row_to_round(row: &Row) -> Result<Round> {
    let round_number: i64 = row.get("round_number")?;

    Ok(Round {
        session_id: row.get("session_id")?,
        round_number: to_u32(round_number, "round_number")?,
        image_url: row.get("image_url")?,
        full_image_url: row.get("full_image_url")?,
        timestamp: row.get("timestamp")?,
    })
}

pub(super) fn load_rounds(conn: &Connection, session_id: &str) -> Result<Vec<Round>> {
    let mut stmt = conn.prepare(
        "SELECT session_id, round_number, image_url, full_image_url, timestamp
         FROM rounds
         WHERE session_id = ?1
         ORDER BY round_number ASC",
    )?;

    let mut rows = stmt.query(params![session_id])?;
    let mut rounds = Vec::new();
    while let Some(row) = rows.next()? {
        rounds.push(row_to_round(row)?);
    }

    Ok(rounds)
}

fn check_new_round(round: &NewRound) -> Result<()> {
    if round.image_url.trim().is_empty() {
        bail!("round has no image reference");
    }
    if let Some(ts) = round.timestamp {
        if !ts.is_finite() || ts < 0.0 {
            bail!("round timestamp {ts} is not a valid offset");
        }
    }
    Ok(())
}

impl Database {
    /// Store one round under the next free number of its session.
    ///
    /// Number assignment, the insert and the session's `round_count` update
    /// share one transaction: either all of it lands or none of it does.
    pub async fn append_round(&self, session_id: &str, round: NewRound) -> Result<Round> {
        check_new_round(&round)?;

        let session_id = session_id.to_string();
        self.execute(move |conn| {
            let tx = conn.transaction()?;

            let exists: Option<String> = tx
                .query_row(
                    "SELECT id FROM sessions WHERE id = ?1",
                    params![session_id],
                    |row| row.get(0),
                )
                .optional()?;
            if exists.is_none() {
                bail!("session {session_id} not found");
            }

            let next_number: i64 = tx.query_row(
                "SELECT COALESCE(MAX(round_number), 0) + 1 FROM rounds WHERE session_id = ?1",
                params![session_id],
                |row| row.get(0),
            )?;
            let now = format_datetime(&Utc::now());

            tx.execute(
                "INSERT INTO rounds (session_id, round_number, image_url, full_image_url, timestamp, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    session_id,
                    next_number,
                    round.image_url,
                    round.full_image_url,
                    round.timestamp,
                    now,
                ],
            )
            .context("failed to insert round")?;

            tx.execute(
                "UPDATE sessions
                 SET round_count = (SELECT COUNT(*) FROM rounds WHERE session_id = ?1),
                     updated_at = ?2
                 WHERE id = ?1",
                params![session_id, now],
            )
            .context("failed to update session round count")?;

            tx.commit().context("failed to commit round")?;

            Ok(Round {
                session_id,
                round_number: to_u32(next_number, "round_number")?,
                image_url: round.image_url,
                full_image_url: round.full_image_url,
                timestamp: round.timestamp,
            })
        })
        .await
    }

    /// Rounds of one session in `round_number` order.
    pub async fn list_rounds_for(&self, session_id: &str) -> Result<Vec<Round>> {
        let session_id = session_id.to_string();
        self.execute(move |conn| load_rounds(conn, &session_id)).await
    }
}
