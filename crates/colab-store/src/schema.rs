//! Versioned schema migrations, applied at every open.
//!
//! `PRAGMA user_version` tracks the applied level. Each migration is a
//! single `execute_batch` and runs at most once; fresh databases replay all
//! of them in order.

use rusqlite::Connection;
use tracing::info;

use crate::StoreResult;

const MIGRATIONS: &[&str] = &[
    // v1: initial schema
    "CREATE TABLE IF NOT EXISTS users (
        id                  TEXT PRIMARY KEY NOT NULL,
        name                TEXT NOT NULL,
        email               TEXT NOT NULL UNIQUE,
        contact_number      TEXT NOT NULL,
        password_hash       TEXT NOT NULL,
        role                TEXT NOT NULL DEFAULT 'user',
        email_verified      INTEGER NOT NULL DEFAULT 0,
        verification_token  TEXT,
        invite_token        TEXT,
        profile_picture_url TEXT,
        created_at          INTEGER NOT NULL
    );
    CREATE TABLE IF NOT EXISTS sessions (
        id               TEXT PRIMARY KEY NOT NULL,
        user_id          TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        secret_hash      TEXT NOT NULL,
        created_at       INTEGER NOT NULL,
        last_verified_at INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id);
    CREATE TABLE IF NOT EXISTS projects (
        id          TEXT PRIMARY KEY NOT NULL,
        name        TEXT NOT NULL,
        description TEXT,
        created_by  TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        created_at  INTEGER NOT NULL
    );
    CREATE TABLE IF NOT EXISTS project_members (
        project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
        user_id    TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        role       TEXT NOT NULL DEFAULT 'editor',
        created_at INTEGER NOT NULL,
        PRIMARY KEY (project_id, user_id)
    );
    CREATE TABLE IF NOT EXISTS tasks (
        id          TEXT PRIMARY KEY NOT NULL,
        project_id  TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
        user_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        title       TEXT NOT NULL,
        description TEXT,
        status      TEXT NOT NULL DEFAULT 'todo',
        priority    TEXT NOT NULL DEFAULT 'medium',
        created_at  INTEGER NOT NULL,
        updated_at  INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_tasks_project ON tasks(project_id);
    CREATE TABLE IF NOT EXISTS files (
        id          TEXT PRIMARY KEY NOT NULL,
        task_id     TEXT NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
        name        TEXT NOT NULL,
        object_key  TEXT NOT NULL,
        uploaded_at INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_files_task ON files(task_id);
    CREATE TABLE IF NOT EXISTS messages (
        id         TEXT PRIMARY KEY NOT NULL,
        project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
        user_id    TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        body       TEXT NOT NULL,
        created_at INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_messages_project ON messages(project_id);",
];

pub(crate) fn migrate(conn: &Connection) -> StoreResult<()> {
    let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;

    let pending = &MIGRATIONS[(version as usize).min(MIGRATIONS.len())..];
    if pending.is_empty() {
        return Ok(());
    }

    for (offset, migration) in pending.iter().enumerate() {
        conn.execute_batch(migration)?;
        let applied = version + offset as i64 + 1;
        conn.pragma_update(None, "user_version", applied)?;
        info!(version = applied, "applied schema migration");
    }
    Ok(())
}
