//! User account rows.

use colab_proto::{UserRole, UserView, time::now_ms};
use rusqlite::{OptionalExtension, Row, params};

use crate::{Db, StoreError, StoreResult, new_row_id};

/// Input for account creation. The password is already hashed by the caller.
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub contact_number: String,
    pub password_hash: String,
    pub role: UserRole,
    pub verification_token: Option<String>,
}

/// Full row including credential material. Never serialized to clients;
/// convert with [`UserRecord::into_view`] first.
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub id: String,
    pub name: String,
    pub email: String,
    pub contact_number: String,
    pub password_hash: String,
    pub role: UserRole,
    pub email_verified: bool,
    pub verification_token: Option<String>,
    pub invite_token: Option<String>,
    pub profile_picture_url: Option<String>,
    pub created_at: u64,
}

impl UserRecord {
    pub fn into_view(self) -> UserView {
        UserView {
            id: self.id,
            name: self.name,
            email: self.email,
            contact_number: self.contact_number,
            role: self.role,
            email_verified: self.email_verified,
            profile_picture_url: self.profile_picture_url,
            created_at: self.created_at,
        }
    }
}

fn map_user(row: &Row<'_>) -> rusqlite::Result<UserRecord> {
    let role: String = row.get("role")?;
    Ok(UserRecord {
        id: row.get("id")?,
        name: row.get("name")?,
        email: row.get("email")?,
        contact_number: row.get("contact_number")?,
        password_hash: row.get("password_hash")?,
        role: UserRole::parse(&role).unwrap_or(UserRole::User),
        email_verified: row.get::<_, i64>("email_verified")? != 0,
        verification_token: row.get("verification_token")?,
        invite_token: row.get("invite_token")?,
        profile_picture_url: row.get("profile_picture_url")?,
        created_at: row.get::<_, i64>("created_at")? as u64,
    })
}

const USER_COLUMNS: &str = "id, name, email, contact_number, password_hash, role, email_verified, \
                            verification_token, invite_token, profile_picture_url, created_at";

impl Db {
    /// Insert a new user. Fails with [`StoreError::Conflict`] if the email
    /// address is already registered.
    pub fn create_user(&self, new: NewUser) -> StoreResult<UserRecord> {
        self.with_conn(|conn| {
            let taken: Option<String> = conn
                .query_row("SELECT id FROM users WHERE email = ?1", [&new.email], |r| {
                    r.get(0)
                })
                .optional()?;
            if taken.is_some() {
                return Err(StoreError::Conflict("email_already_used".into()));
            }

            let id = new_row_id();
            let now = now_ms();
            conn.execute(
                "INSERT INTO users (id, name, email, contact_number, password_hash, role,
                                    email_verified, verification_token, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7, ?8)",
                params![
                    id,
                    new.name,
                    new.email,
                    new.contact_number,
                    new.password_hash,
                    new.role.as_str(),
                    new.verification_token,
                    now as i64,
                ],
            )?;

            Ok(UserRecord {
                id,
                name: new.name,
                email: new.email,
                contact_number: new.contact_number,
                password_hash: new.password_hash,
                role: new.role,
                email_verified: false,
                verification_token: new.verification_token,
                invite_token: None,
                profile_picture_url: None,
                created_at: now,
            })
        })
    }

    /// Placeholder account for a project invite sent to an unregistered
    /// address. The invitee completes name/password via the setup flow.
    pub fn create_invited_user(&self, email: &str, invite_token: &str) -> StoreResult<UserRecord> {
        self.with_conn(|conn| {
            let taken: Option<String> = conn
                .query_row("SELECT id FROM users WHERE email = ?1", [email], |r| r.get(0))
                .optional()?;
            if taken.is_some() {
                return Err(StoreError::Conflict("email_already_used".into()));
            }

            let id = new_row_id();
            let now = now_ms();
            conn.execute(
                "INSERT INTO users (id, name, email, contact_number, password_hash, role,
                                    email_verified, invite_token, created_at)
                 VALUES (?1, '', ?2, '', '', 'user', 0, ?3, ?4)",
                params![id, email, invite_token, now as i64],
            )?;
            conn.query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                [&id],
                map_user,
            )
            .map_err(Into::into)
        })
    }

    pub fn user_by_invite_token(&self, token: &str) -> StoreResult<Option<UserRecord>> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    &format!(
                        "SELECT {USER_COLUMNS} FROM users
                         WHERE invite_token = ?1 AND email_verified = 0"
                    ),
                    [token],
                    map_user,
                )
                .optional()?)
        })
    }

    /// Finish an invited account: set profile fields and credentials,
    /// verify the address and consume the invite token.
    pub fn complete_setup(
        &self,
        user_id: &str,
        name: &str,
        contact_number: &str,
        password_hash: &str,
    ) -> StoreResult<UserRecord> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users SET name = ?2, contact_number = ?3, password_hash = ?4,
                                  email_verified = 1, invite_token = NULL
                 WHERE id = ?1",
                params![user_id, name, contact_number, password_hash],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound);
            }
            conn.query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                [user_id],
                map_user,
            )
            .map_err(Into::into)
        })
    }

    pub fn user_by_id(&self, id: &str) -> StoreResult<Option<UserRecord>> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                    [id],
                    map_user,
                )
                .optional()?)
        })
    }

    pub fn user_by_email(&self, email: &str) -> StoreResult<Option<UserRecord>> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    &format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1"),
                    [email],
                    map_user,
                )
                .optional()?)
        })
    }

    pub fn user_by_verification_token(&self, token: &str) -> StoreResult<Option<UserRecord>> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    &format!("SELECT {USER_COLUMNS} FROM users WHERE verification_token = ?1"),
                    [token],
                    map_user,
                )
                .optional()?)
        })
    }

    /// Clears the verification token and marks the address verified.
    pub fn mark_email_verified(&self, user_id: &str) -> StoreResult<()> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users SET email_verified = 1, verification_token = NULL WHERE id = ?1",
                [user_id],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound);
            }
            Ok(())
        })
    }

    pub fn set_verification_token(&self, user_id: &str, token: &str) -> StoreResult<()> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users SET verification_token = ?2 WHERE id = ?1",
                params![user_id, token],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound);
            }
            Ok(())
        })
    }

    pub fn update_profile(
        &self,
        user_id: &str,
        name: Option<&str>,
        contact_number: Option<&str>,
        profile_picture_url: Option<&str>,
    ) -> StoreResult<UserRecord> {
        self.with_conn(|conn| {
            if let Some(name) = name {
                conn.execute("UPDATE users SET name = ?2 WHERE id = ?1", params![user_id, name])?;
            }
            if let Some(contact) = contact_number {
                conn.execute(
                    "UPDATE users SET contact_number = ?2 WHERE id = ?1",
                    params![user_id, contact],
                )?;
            }
            if let Some(url) = profile_picture_url {
                conn.execute(
                    "UPDATE users SET profile_picture_url = ?2 WHERE id = ?1",
                    params![user_id, url],
                )?;
            }
            conn.query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                [user_id],
                map_user,
            )
            .optional()?
            .ok_or(StoreError::NotFound)
        })
    }

    pub fn set_user_role(&self, user_id: &str, role: UserRole) -> StoreResult<()> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users SET role = ?2 WHERE id = ?1",
                params![user_id, role.as_str()],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound);
            }
            Ok(())
        })
    }

    pub fn delete_user(&self, user_id: &str) -> StoreResult<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM users WHERE id = ?1", [user_id])?;
            Ok(())
        })
    }

    pub fn count_users(&self) -> StoreResult<u64> {
        self.with_conn(|conn| {
            let n: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |r| r.get(0))?;
            Ok(n as u64)
        })
    }

    pub fn list_users(&self) -> StoreResult<Vec<UserRecord>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {USER_COLUMNS} FROM users ORDER BY created_at DESC"
            ))?;
            let rows = stmt.query_map([], map_user)?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_user(email: &str) -> NewUser {
        NewUser {
            name: "Ada".into(),
            email: email.into(),
            contact_number: "555-0100".into(),
            password_hash: "$argon2id$stub".into(),
            role: UserRole::User,
            verification_token: Some("tok-1".into()),
        }
    }

    #[test]
    fn create_and_fetch_user() {
        let db = Db::open_in_memory().unwrap();
        let created = db.create_user(test_user("ada@example.com")).unwrap();

        let by_id = db.user_by_id(&created.id).unwrap().unwrap();
        assert_eq!(by_id.email, "ada@example.com");
        assert!(!by_id.email_verified);

        let by_email = db.user_by_email("ada@example.com").unwrap().unwrap();
        assert_eq!(by_email.id, created.id);
    }

    #[test]
    fn duplicate_email_rejected() {
        let db = Db::open_in_memory().unwrap();
        db.create_user(test_user("ada@example.com")).unwrap();
        let err = db.create_user(test_user("ada@example.com")).unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[test]
    fn verification_flow() {
        let db = Db::open_in_memory().unwrap();
        let user = db.create_user(test_user("ada@example.com")).unwrap();

        let found = db.user_by_verification_token("tok-1").unwrap().unwrap();
        assert_eq!(found.id, user.id);

        db.mark_email_verified(&user.id).unwrap();
        let verified = db.user_by_id(&user.id).unwrap().unwrap();
        assert!(verified.email_verified);
        assert!(verified.verification_token.is_none());
        assert!(db.user_by_verification_token("tok-1").unwrap().is_none());
    }

    #[test]
    fn invite_and_setup_flow() {
        let db = Db::open_in_memory().unwrap();
        let invited = db.create_invited_user("new@example.com", "invite-1").unwrap();
        assert!(!invited.email_verified);

        let found = db.user_by_invite_token("invite-1").unwrap().unwrap();
        assert_eq!(found.id, invited.id);

        let done = db
            .complete_setup(&invited.id, "Grace", "555-0101", "$argon2id$stub")
            .unwrap();
        assert!(done.email_verified);
        assert!(done.invite_token.is_none());
        assert_eq!(done.name, "Grace");
        assert!(db.user_by_invite_token("invite-1").unwrap().is_none());
    }

    #[test]
    fn first_user_count() {
        let db = Db::open_in_memory().unwrap();
        assert_eq!(db.count_users().unwrap(), 0);
        db.create_user(test_user("a@example.com")).unwrap();
        assert_eq!(db.count_users().unwrap(), 1);
    }
}
