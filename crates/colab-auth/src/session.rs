//! Session lifecycle: issue, validate, expire, revoke.
//!
//! Expiry policy: sessions expire by absolute age since creation
//! (`inactivity_timeout`), enforced in [`SessionManager::get_session`].
//! `validate_session_token` separately throttles `last_verified_at` writes
//! to one per `refresh_interval`, so steady traffic does not rewrite the
//! row on every request.

use std::sync::Arc;
use std::time::Duration;

use colab_proto::time::now_ms;
use colab_store::{Db, SessionRecord};
use tracing::debug;

use crate::AuthError;
use crate::token::{constant_time_equal, generate_opaque_id, hash_secret, hash_secret_hex};

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Absolute session lifetime since creation.
    pub inactivity_timeout: Duration,
    /// Minimum gap between `last_verified_at` touches.
    pub refresh_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            inactivity_timeout: Duration::from_secs(10 * 24 * 60 * 60),
            refresh_interval: Duration::from_secs(60 * 60),
        }
    }
}

/// Result of [`SessionManager::create_session`]. The composite token is
/// returned exactly once; the secret half is not recoverable afterwards.
#[derive(Debug, Clone)]
pub struct NewSession {
    pub id: String,
    pub user_id: String,
    pub token: String,
    pub created_at: u64,
}

#[derive(Clone)]
pub struct SessionManager {
    db: Arc<Db>,
    config: SessionConfig,
}

impl SessionManager {
    pub fn new(db: Arc<Db>) -> Self {
        Self::with_config(db, SessionConfig::default())
    }

    pub fn with_config(db: Arc<Db>, config: SessionConfig) -> Self {
        Self { db, config }
    }

    /// Issue a fresh session for `user_id` and persist its digest.
    pub fn create_session(&self, user_id: &str) -> Result<NewSession, AuthError> {
        let id = generate_opaque_id();
        let secret = generate_opaque_id();
        let now = now_ms();

        let record = SessionRecord {
            id: id.clone(),
            user_id: user_id.to_string(),
            secret_hash: hash_secret_hex(&secret),
            created_at: now,
            last_verified_at: now,
        };
        self.db.insert_session(&record)?;

        Ok(NewSession {
            token: format!("{id}.{secret}"),
            id,
            user_id: user_id.to_string(),
            created_at: now,
        })
    }

    /// Resolve a bearer token to its session.
    ///
    /// Malformed tokens, unknown ids and secret mismatches all collapse to
    /// `None` so a caller cannot learn which half of the token was wrong.
    /// Storage failures propagate.
    pub fn validate_session_token(&self, token: &str) -> Result<Option<SessionRecord>, AuthError> {
        let Some((session_id, secret)) = token.split_once('.') else {
            return Ok(None);
        };
        if session_id.is_empty() || secret.is_empty() {
            return Ok(None);
        }

        let Some(session) = self.db.session_by_id(session_id)? else {
            return Ok(None);
        };

        let supplied = hash_secret(secret);
        let stored = match hex::decode(&session.secret_hash) {
            Ok(bytes) => bytes,
            Err(_) => return Ok(None),
        };
        if !constant_time_equal(&supplied, &stored) {
            return Ok(None);
        }

        let now = now_ms();
        if now.saturating_sub(session.last_verified_at)
            >= self.config.refresh_interval.as_millis() as u64
        {
            self.db.touch_session(&session.id, now)?;
            let mut session = session;
            session.last_verified_at = now;
            return Ok(Some(session));
        }

        Ok(Some(session))
    }

    /// Look up a session by id, expiring it when its absolute age exceeds
    /// the timeout. Expired sessions are deleted as a side effect, so a
    /// second call for the same id also reports `None`.
    pub fn get_session(&self, session_id: &str) -> Result<Option<SessionRecord>, AuthError> {
        let Some(session) = self.db.session_by_id(session_id)? else {
            return Ok(None);
        };

        let now = now_ms();
        if now.saturating_sub(session.created_at)
            >= self.config.inactivity_timeout.as_millis() as u64
        {
            debug!(session_id, "session expired, deleting");
            self.db.delete_session(session_id)?;
            return Ok(None);
        }

        Ok(Some(session))
    }

    /// Idempotent removal.
    pub fn delete_session(&self, session_id: &str) -> Result<(), AuthError> {
        self.db.delete_session(session_id)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use colab_proto::UserRole;
    use colab_store::NewUser;

    fn setup() -> (Arc<Db>, String) {
        let db = Arc::new(Db::open_in_memory().unwrap());
        let user_id = db
            .create_user(NewUser {
                name: "Ada".into(),
                email: "ada@example.com".into(),
                contact_number: "555-0100".into(),
                password_hash: "hash".into(),
                role: UserRole::User,
                verification_token: None,
            })
            .unwrap()
            .id;
        (db, user_id)
    }

    #[test]
    fn create_then_validate_round_trip() {
        let (db, user_id) = setup();
        let manager = SessionManager::new(db);

        let created = manager.create_session(&user_id).unwrap();
        let session = manager
            .validate_session_token(&created.token)
            .unwrap()
            .expect("fresh token should validate");
        assert_eq!(session.user_id, user_id);
        assert_eq!(session.id, created.id);
    }

    #[test]
    fn tampered_token_is_rejected() {
        let (db, user_id) = setup();
        let manager = SessionManager::new(db);
        let created = manager.create_session(&user_id).unwrap();

        // Flip the last character of the secret half.
        let mut tampered = created.token.clone();
        let last = tampered.pop().unwrap();
        tampered.push(if last == 'a' { 'b' } else { 'a' });

        assert!(manager.validate_session_token(&tampered).unwrap().is_none());
        // The original still works: validation is side-effect free on mismatch.
        assert!(manager.validate_session_token(&created.token).unwrap().is_some());
    }

    #[test]
    fn malformed_tokens_fail_closed() {
        let (db, _user_id) = setup();
        let manager = SessionManager::new(db);

        for token in ["", "no-separator", ".secret-only", "id-only.", "."] {
            assert!(
                manager.validate_session_token(token).unwrap().is_none(),
                "token {token:?} should be invalid"
            );
        }
    }

    #[test]
    fn unknown_id_with_valid_shape_is_rejected() {
        let (db, _user_id) = setup();
        let manager = SessionManager::new(db);
        assert!(
            manager
                .validate_session_token("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa.bbbb")
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn throttled_touch_updates_after_interval() {
        let (db, user_id) = setup();
        let manager = SessionManager::with_config(
            Arc::clone(&db),
            SessionConfig {
                inactivity_timeout: Duration::from_secs(864_000),
                refresh_interval: Duration::from_millis(0),
            },
        );
        let created = manager.create_session(&user_id).unwrap();

        // Backdate the last verification far enough to force a touch.
        db.touch_session(&created.id, created.created_at.saturating_sub(10_000))
            .unwrap();
        let session = manager.validate_session_token(&created.token).unwrap().unwrap();
        assert!(session.last_verified_at >= created.created_at);
    }

    #[test]
    fn touch_is_skipped_inside_refresh_interval() {
        let (db, user_id) = setup();
        let manager = SessionManager::new(Arc::clone(&db));
        let created = manager.create_session(&user_id).unwrap();

        let before = db.session_by_id(&created.id).unwrap().unwrap().last_verified_at;
        manager.validate_session_token(&created.token).unwrap().unwrap();
        let after = db.session_by_id(&created.id).unwrap().unwrap().last_verified_at;
        assert_eq!(before, after);
    }

    #[test]
    fn aged_session_expires_idempotently() {
        let (db, user_id) = setup();
        let manager = SessionManager::with_config(
            Arc::clone(&db),
            SessionConfig {
                inactivity_timeout: Duration::from_millis(0),
                refresh_interval: Duration::from_secs(3_600),
            },
        );
        let created = manager.create_session(&user_id).unwrap();

        assert!(manager.get_session(&created.id).unwrap().is_none());
        // Second call after the delete also reports None.
        assert!(manager.get_session(&created.id).unwrap().is_none());
        assert!(db.session_by_id(&created.id).unwrap().is_none());
    }

    #[test]
    fn fresh_session_survives_get() {
        let (db, user_id) = setup();
        let manager = SessionManager::new(db);
        let created = manager.create_session(&user_id).unwrap();
        assert!(manager.get_session(&created.id).unwrap().is_some());
    }

    #[test]
    fn delete_session_is_idempotent() {
        let (db, user_id) = setup();
        let manager = SessionManager::new(db);
        let created = manager.create_session(&user_id).unwrap();

        manager.delete_session(&created.id).unwrap();
        manager.delete_session(&created.id).unwrap();
        assert!(manager.validate_session_token(&created.token).unwrap().is_none());
    }
}
