//! SQLite-backed persistence for the CoLab server.
//!
//! A single [`Db`] handle wraps one `rusqlite::Connection` behind a
//! `std::sync::Mutex`. All statements are short and synchronous; callers on
//! the async side wrap calls in `spawn_blocking` where latency matters.
//! Opening a database applies the schema migrations before returning, so a
//! handle is always at the current schema version.

mod error;
mod schema;

pub mod admin;
pub mod messages;
pub mod projects;
pub mod sessions;
pub mod tasks;
pub mod users;

use std::path::Path;
use std::sync::Mutex;

use rusqlite::Connection;

pub use error::StoreError;
pub use sessions::SessionRecord;
pub use users::{NewUser, UserRecord};

pub type StoreResult<T> = Result<T, StoreError>;

pub struct Db {
    conn: Mutex<Connection>,
}

impl Db {
    /// Open (creating if needed) the database at `path` and run migrations.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// In-memory database, used by tests and as a dev fallback.
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> StoreResult<Self> {
        // WAL mode for better concurrent read performance
        conn.pragma_update(None, "journal_mode", "WAL").ok();
        conn.pragma_update(None, "synchronous", "NORMAL").ok();
        conn.pragma_update(None, "foreign_keys", "ON").ok();

        schema::migrate(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub(crate) fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let conn = self.conn.lock().map_err(|_| StoreError::Lock)?;
        f(&conn)
    }

    pub(crate) fn with_conn_mut<T>(
        &self,
        f: impl FnOnce(&mut Connection) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let mut conn = self.conn.lock().map_err(|_| StoreError::Lock)?;
        f(&mut conn)
    }
}

pub(crate) fn new_row_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
