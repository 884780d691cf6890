use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("store lock poisoned")]
    Lock,

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}
