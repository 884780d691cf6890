//! Kanban tasks and their attached file metadata.

use colab_proto::{FileView, TaskOwner, TaskPriority, TaskStatus, TaskView, time::now_ms};
use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::{Db, StoreError, StoreResult, new_row_id};

/// Field changes for a task update; `None` leaves the column untouched.
#[derive(Debug, Default)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
}

fn map_task(row: &Row<'_>) -> rusqlite::Result<TaskView> {
    let status: String = row.get("status")?;
    let priority: String = row.get("priority")?;
    Ok(TaskView {
        id: row.get("id")?,
        project_id: row.get("project_id")?,
        title: row.get("title")?,
        description: row.get("description")?,
        status: TaskStatus::parse(&status).unwrap_or(TaskStatus::Todo),
        priority: TaskPriority::parse(&priority).unwrap_or(TaskPriority::Medium),
        created_at: row.get::<_, i64>("created_at")? as u64,
        updated_at: row.get::<_, i64>("updated_at")? as u64,
        user: Some(TaskOwner {
            id: row.get("user_id")?,
            name: row.get("user_name")?,
            profile_picture_url: row.get("user_picture")?,
        }),
        files: Vec::new(),
    })
}

const TASK_COLUMNS: &str = "t.id, t.project_id, t.title, t.description, t.status, t.priority,
        t.created_at, t.updated_at, t.user_id, u.name AS user_name,
        u.profile_picture_url AS user_picture";

fn files_for_task(conn: &Connection, task_id: &str) -> rusqlite::Result<Vec<FileView>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, object_key, uploaded_at FROM files
         WHERE task_id = ?1 ORDER BY uploaded_at ASC",
    )?;
    let rows = stmt.query_map([task_id], |row| {
        Ok(FileView {
            id: row.get("id")?,
            name: row.get("name")?,
            object_key: row.get("object_key")?,
            uploaded_at: row.get::<_, i64>("uploaded_at")? as u64,
        })
    })?;
    rows.collect()
}

impl Db {
    pub fn create_task(
        &self,
        project_id: &str,
        user_id: &str,
        title: &str,
        description: Option<&str>,
        status: Option<TaskStatus>,
        priority: Option<TaskPriority>,
    ) -> StoreResult<TaskView> {
        self.with_conn(|conn| {
            let id = new_row_id();
            let now = now_ms();
            let status = status.unwrap_or(TaskStatus::Todo);
            let priority = priority.unwrap_or(TaskPriority::Medium);
            conn.execute(
                "INSERT INTO tasks (id, project_id, user_id, title, description, status,
                                    priority, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
                params![
                    id,
                    project_id,
                    user_id,
                    title,
                    description,
                    status.as_str(),
                    priority.as_str(),
                    now as i64,
                ],
            )?;
            conn.query_row(
                &format!("SELECT {TASK_COLUMNS} FROM tasks t JOIN users u ON u.id = t.user_id
                          WHERE t.id = ?1"),
                [&id],
                map_task,
            )
            .optional()?
            .ok_or(StoreError::NotFound)
        })
    }

    pub fn tasks_for_project(&self, project_id: &str) -> StoreResult<Vec<TaskView>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {TASK_COLUMNS} FROM tasks t JOIN users u ON u.id = t.user_id
                 WHERE t.project_id = ?1 ORDER BY t.created_at ASC"
            ))?;
            let rows = stmt.query_map([project_id], map_task)?;
            let mut tasks = rows.collect::<Result<Vec<_>, _>>()?;
            for task in &mut tasks {
                task.files = files_for_task(conn, &task.id)?;
            }
            Ok(tasks)
        })
    }

    /// Fetch a task scoped to its project; `None` when either id is wrong.
    pub fn task_in_project(&self, project_id: &str, task_id: &str) -> StoreResult<Option<TaskView>> {
        self.with_conn(|conn| {
            let task = conn
                .query_row(
                    &format!(
                        "SELECT {TASK_COLUMNS} FROM tasks t JOIN users u ON u.id = t.user_id
                         WHERE t.id = ?1 AND t.project_id = ?2"
                    ),
                    params![task_id, project_id],
                    map_task,
                )
                .optional()?;
            match task {
                Some(mut task) => {
                    task.files = files_for_task(conn, &task.id)?;
                    Ok(Some(task))
                }
                None => Ok(None),
            }
        })
    }

    /// Applies the patch and bumps `updated_at`. Returns the updated row.
    pub fn update_task(
        &self,
        project_id: &str,
        task_id: &str,
        patch: TaskPatch,
    ) -> StoreResult<TaskView> {
        self.with_conn(|conn| {
            let exists: Option<String> = conn
                .query_row(
                    "SELECT id FROM tasks WHERE id = ?1 AND project_id = ?2",
                    params![task_id, project_id],
                    |r| r.get(0),
                )
                .optional()?;
            if exists.is_none() {
                return Err(StoreError::NotFound);
            }

            if let Some(title) = &patch.title {
                conn.execute("UPDATE tasks SET title = ?2 WHERE id = ?1", params![task_id, title])?;
            }
            if let Some(description) = &patch.description {
                conn.execute(
                    "UPDATE tasks SET description = ?2 WHERE id = ?1",
                    params![task_id, description],
                )?;
            }
            if let Some(status) = patch.status {
                conn.execute(
                    "UPDATE tasks SET status = ?2 WHERE id = ?1",
                    params![task_id, status.as_str()],
                )?;
            }
            if let Some(priority) = patch.priority {
                conn.execute(
                    "UPDATE tasks SET priority = ?2 WHERE id = ?1",
                    params![task_id, priority.as_str()],
                )?;
            }
            conn.execute(
                "UPDATE tasks SET updated_at = ?2 WHERE id = ?1",
                params![task_id, now_ms() as i64],
            )?;

            let mut task = conn
                .query_row(
                    &format!("SELECT {TASK_COLUMNS} FROM tasks t JOIN users u ON u.id = t.user_id
                              WHERE t.id = ?1"),
                    [task_id],
                    map_task,
                )
                .optional()?
                .ok_or(StoreError::NotFound)?;
            task.files = files_for_task(conn, task_id)?;
            Ok(task)
        })
    }

    /// Deletes the task and its file metadata in one transaction.
    pub fn delete_task(&self, project_id: &str, task_id: &str) -> StoreResult<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let exists: Option<String> = tx
                .query_row(
                    "SELECT id FROM tasks WHERE id = ?1 AND project_id = ?2",
                    params![task_id, project_id],
                    |r| r.get(0),
                )
                .optional()?;
            if exists.is_none() {
                return Err(StoreError::NotFound);
            }
            tx.execute("DELETE FROM files WHERE task_id = ?1", [task_id])?;
            tx.execute("DELETE FROM tasks WHERE id = ?1", [task_id])?;
            tx.commit()?;
            Ok(())
        })
    }

    pub fn add_file(
        &self,
        task_id: &str,
        name: &str,
        object_key: &str,
    ) -> StoreResult<FileView> {
        self.with_conn(|conn| {
            let id = new_row_id();
            let now = now_ms();
            conn.execute(
                "INSERT INTO files (id, task_id, name, object_key, uploaded_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, task_id, name, object_key, now as i64],
            )?;
            Ok(FileView {
                id,
                name: name.to_string(),
                object_key: object_key.to_string(),
                uploaded_at: now,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::NewUser;
    use colab_proto::UserRole;

    fn seed(db: &Db) -> (String, String) {
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
        (user, project)
    }

    #[test]
    fn create_defaults_to_todo_medium() {
        let db = Db::open_in_memory().unwrap();
        let (user, project) = seed(&db);
        let task = db.create_task(&project, &user, "write docs", None, None, None).unwrap();
        assert_eq!(task.status, TaskStatus::Todo);
        assert_eq!(task.priority, TaskPriority::Medium);
        assert_eq!(task.user.as_ref().unwrap().name, "Ada");
    }

    #[test]
    fn update_patch_applies_selected_fields() {
        let db = Db::open_in_memory().unwrap();
        let (user, project) = seed(&db);
        let task = db.create_task(&project, &user, "write docs", None, None, None).unwrap();

        let patch = TaskPatch {
            status: Some(TaskStatus::InProgress),
            ..TaskPatch::default()
        };
        let updated = db.update_task(&project, &task.id, patch).unwrap();
        assert_eq!(updated.status, TaskStatus::InProgress);
        assert_eq!(updated.title, "write docs");
        assert!(updated.updated_at >= task.updated_at);
    }

    #[test]
    fn update_missing_task_is_not_found() {
        let db = Db::open_in_memory().unwrap();
        let (_user, project) = seed(&db);
        let err = db.update_task(&project, "nope", TaskPatch::default()).unwrap_err();
        assert!(matches!(err, StoreError::NotFound));
    }

    #[test]
    fn delete_removes_task_and_files() {
        let db = Db::open_in_memory().unwrap();
        let (user, project) = seed(&db);
        let task = db.create_task(&project, &user, "write docs", None, None, None).unwrap();
        db.add_file(&task.id, "notes.txt", "blobs/notes").unwrap();

        db.delete_task(&project, &task.id).unwrap();
        assert!(db.task_in_project(&project, &task.id).unwrap().is_none());
    }

    #[test]
    fn task_scoped_to_project() {
        let db = Db::open_in_memory().unwrap();
        let (user, project) = seed(&db);
        let other = db.create_project("Gemini", None, &user).unwrap();
        let task = db.create_task(&project, &user, "write docs", None, None, None).unwrap();

        assert!(db.task_in_project(&other.id, &task.id).unwrap().is_none());
        assert!(db.task_in_project(&project, &task.id).unwrap().is_some());
    }
}
