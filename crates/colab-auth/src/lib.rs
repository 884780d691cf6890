//! Session credentials for the CoLab server.
//!
//! A session token handed to a client is `id.secret`. The id is an opaque
//! lookup key; the secret never touches disk; only its SHA-256 digest is
//! persisted, and verification recomputes the digest and compares in
//! constant time. The [`SessionManager`] owns the whole lifecycle; HTTP
//! code only ever holds the bearer token in a cookie.

pub mod cookie;
pub mod password;
pub mod session;
pub mod token;

use thiserror::Error;

pub use session::{NewSession, SessionConfig, SessionManager};

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("storage error: {0}")]
    Store(#[from] colab_store::StoreError),

    #[error("password hash error: {0}")]
    PasswordHash(String),
}
