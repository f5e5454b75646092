use anyhow::{bail, Context, Result};
use rusqlite::Connection;

const SCHEMA_VERSION: i32 = 1;
const SCHEMA_V1: &str = include_str!("schemas/schema_v1.sql");

/// Create the registry tables on a fresh file. A file stamped by another
/// schema version is refused rather than guessed at.
pub fn run_migrations(conn: &mut Connection) -> Result<()> {
    let version: i32 = conn
        .pragma_query_value(None, "user_version", |row| row.get(0))
        .context("failed to read registry schema version")?;

    match version {
        SCHEMA_VERSION => Ok(()),
        0 => {
            let tx = conn
                .transaction()
                .context("failed to open schema transaction")?;
            tx.execute_batch(SCHEMA_V1)
                .context("failed to create registry tables")?;
            tx.pragma_update(None, "user_version", SCHEMA_VERSION)
                .context("failed to stamp registry schema version")?;
            tx.commit().context("failed to commit registry schema")
        }
        other => bail!(
            "registry schema version {other} is not supported (this build reads {SCHEMA_VERSION})"
        ),
    }
}
