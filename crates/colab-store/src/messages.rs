//! Project chat messages.

use colab_proto::{MessageView, time::now_ms};
use rusqlite::{Row, params};

use crate::{Db, StoreResult, new_row_id};

fn map_message(row: &Row<'_>) -> rusqlite::Result<MessageView> {
    Ok(MessageView {
        id: row.get("id")?,
        project_id: row.get("project_id")?,
        user_id: row.get("user_id")?,
        body: row.get("body")?,
        created_at: row.get::<_, i64>("created_at")? as u64,
    })
}

impl Db {
    pub fn create_message(
        &self,
        project_id: &str,
        user_id: &str,
        body: &str,
    ) -> StoreResult<MessageView> {
        self.with_conn(|conn| {
            let id = new_row_id();
            let now = now_ms();
            conn.execute(
                "INSERT INTO messages (id, project_id, user_id, body, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, project_id, user_id, body, now as i64],
            )?;
            Ok(MessageView {
                id,
                project_id: project_id.to_string(),
                user_id: user_id.to_string(),
                body: body.to_string(),
                created_at: now,
            })
        })
    }

    pub fn messages_for_project(&self, project_id: &str) -> StoreResult<Vec<MessageView>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, project_id, user_id, body, created_at FROM messages
                 WHERE project_id = ?1 ORDER BY created_at ASC",
            )?;
            let rows = stmt.query_map([project_id], map_message)?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::Db;
    use crate::users::NewUser;
    use colab_proto::UserRole;

    #[test]
    fn messages_are_ordered_oldest_first() {
        let db = Db::open_in_memory().unwrap();
        let user = db
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
        let project = db.create_project("Apollo", None, &user).unwrap().id;

        db.create_message(&project, &user, "first").unwrap();
        db.create_message(&project, &user, "second").unwrap();

        let listed = db.messages_for_project(&project).unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].body, "first");
        assert_eq!(listed[1].body, "second");
    }
}
