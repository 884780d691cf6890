//! Persisted session rows. Only the secret's digest is stored; the session
//! manager in `colab-auth` owns all lifecycle decisions.

use rusqlite::{OptionalExtension, Row, params};

use crate::{Db, StoreResult};

#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub id: String,
    pub user_id: String,
    /// Hex-encoded SHA-256 digest of the session secret.
    pub secret_hash: String,
    pub created_at: u64,
    pub last_verified_at: u64,
}

fn map_session(row: &Row<'_>) -> rusqlite::Result<SessionRecord> {
    Ok(SessionRecord {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        secret_hash: row.get("secret_hash")?,
        created_at: row.get::<_, i64>("created_at")? as u64,
        last_verified_at: row.get::<_, i64>("last_verified_at")? as u64,
    })
}

impl Db {
    pub fn insert_session(&self, session: &SessionRecord) -> StoreResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO sessions (id, user_id, secret_hash, created_at, last_verified_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    session.id,
                    session.user_id,
                    session.secret_hash,
                    session.created_at as i64,
                    session.last_verified_at as i64,
                ],
            )?;
            Ok(())
        })
    }

    pub fn session_by_id(&self, id: &str) -> StoreResult<Option<SessionRecord>> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT id, user_id, secret_hash, created_at, last_verified_at
                     FROM sessions WHERE id = ?1",
                    [id],
                    map_session,
                )
                .optional()?)
        })
    }

    pub fn touch_session(&self, id: &str, last_verified_at: u64) -> StoreResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE sessions SET last_verified_at = ?2 WHERE id = ?1",
                params![id, last_verified_at as i64],
            )?;
            Ok(())
        })
    }

    /// Idempotent: deleting an absent session is not an error.
    pub fn delete_session(&self, id: &str) -> StoreResult<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM sessions WHERE id = ?1", [id])?;
            Ok(())
        })
    }

    pub fn delete_sessions_for_user(&self, user_id: &str) -> StoreResult<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM sessions WHERE user_id = ?1", [user_id])?;
            Ok(())
        })
    }
}
