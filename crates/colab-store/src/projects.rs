//! Projects and project membership.
//!
//! The creator becomes the owner member in the same transaction that
//! inserts the project row, so a project is never visible without at least
//! one member.

use colab_proto::{MemberView, ProjectRole, ProjectView, time::now_ms};
use rusqlite::{OptionalExtension, Row, params};

use crate::{Db, StoreError, StoreResult, new_row_id};

fn map_project(row: &Row<'_>) -> rusqlite::Result<ProjectView> {
    Ok(ProjectView {
        id: row.get("id")?,
        name: row.get("name")?,
        description: row.get("description")?,
        created_by: row.get("created_by")?,
        created_at: row.get::<_, i64>("created_at")? as u64,
        task_count: row.get::<_, i64>("task_count")? as u64,
        file_count: row.get::<_, i64>("file_count")? as u64,
        message_count: row.get::<_, i64>("message_count")? as u64,
    })
}

const PROJECT_WITH_COUNTS: &str = "SELECT p.id, p.name, p.description, p.created_by, p.created_at,
        (SELECT COUNT(*) FROM tasks t WHERE t.project_id = p.id) AS task_count,
        (SELECT COUNT(*) FROM files f JOIN tasks t ON f.task_id = t.id
          WHERE t.project_id = p.id) AS file_count,
        (SELECT COUNT(*) FROM messages m WHERE m.project_id = p.id) AS message_count
     FROM projects p";

impl Db {
    pub fn create_project(
        &self,
        name: &str,
        description: Option<&str>,
        created_by: &str,
    ) -> StoreResult<ProjectView> {
        self.with_conn_mut(|conn| {
            let id = new_row_id();
            let now = now_ms();

            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO projects (id, name, description, created_by, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, name, description, created_by, now as i64],
            )?;
            tx.execute(
                "INSERT INTO project_members (project_id, user_id, role, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![id, created_by, ProjectRole::Owner.as_str(), now as i64],
            )?;
            tx.commit()?;

            Ok(ProjectView {
                id,
                name: name.to_string(),
                description: description.map(str::to_string),
                created_by: created_by.to_string(),
                created_at: now,
                task_count: 0,
                file_count: 0,
                message_count: 0,
            })
        })
    }

    /// Projects the user is a member of, newest first.
    pub fn projects_for_user(&self, user_id: &str) -> StoreResult<Vec<ProjectView>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{PROJECT_WITH_COUNTS}
                 JOIN project_members pm ON pm.project_id = p.id
                 WHERE pm.user_id = ?1
                 ORDER BY p.created_at DESC"
            ))?;
            let rows = stmt.query_map([user_id], map_project)?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
    }

    /// Every project in the system, for the admin console.
    pub fn all_projects(&self) -> StoreResult<Vec<ProjectView>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare(&format!("{PROJECT_WITH_COUNTS} ORDER BY p.created_at DESC"))?;
            let rows = stmt.query_map([], map_project)?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
    }

    pub fn project_by_id(&self, project_id: &str) -> StoreResult<Option<ProjectView>> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    &format!("{PROJECT_WITH_COUNTS} WHERE p.id = ?1"),
                    [project_id],
                    map_project,
                )
                .optional()?)
        })
    }

    pub fn update_project(
        &self,
        project_id: &str,
        name: Option<&str>,
        description: Option<&str>,
    ) -> StoreResult<ProjectView> {
        self.with_conn(|conn| {
            if let Some(name) = name {
                conn.execute(
                    "UPDATE projects SET name = ?2 WHERE id = ?1",
                    params![project_id, name],
                )?;
            }
            if let Some(description) = description {
                conn.execute(
                    "UPDATE projects SET description = ?2 WHERE id = ?1",
                    params![project_id, description],
                )?;
            }
            conn.query_row(
                &format!("{PROJECT_WITH_COUNTS} WHERE p.id = ?1"),
                [project_id],
                map_project,
            )
            .optional()?
            .ok_or(StoreError::NotFound)
        })
    }

    /// Deletes the project and everything hanging off it.
    pub fn delete_project(&self, project_id: &str) -> StoreResult<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "DELETE FROM files WHERE task_id IN (SELECT id FROM tasks WHERE project_id = ?1)",
                [project_id],
            )?;
            tx.execute("DELETE FROM tasks WHERE project_id = ?1", [project_id])?;
            tx.execute("DELETE FROM messages WHERE project_id = ?1", [project_id])?;
            tx.execute("DELETE FROM project_members WHERE project_id = ?1", [project_id])?;
            tx.execute("DELETE FROM projects WHERE id = ?1", [project_id])?;
            tx.commit()?;
            Ok(())
        })
    }

    pub fn is_project_member(&self, project_id: &str, user_id: &str) -> StoreResult<bool> {
        Ok(self.member_role(project_id, user_id)?.is_some())
    }

    pub fn member_role(&self, project_id: &str, user_id: &str) -> StoreResult<Option<ProjectRole>> {
        self.with_conn(|conn| {
            let role: Option<String> = conn
                .query_row(
                    "SELECT role FROM project_members WHERE project_id = ?1 AND user_id = ?2",
                    params![project_id, user_id],
                    |r| r.get(0),
                )
                .optional()?;
            Ok(role.and_then(|r| ProjectRole::parse(&r)))
        })
    }

    pub fn add_member(
        &self,
        project_id: &str,
        user_id: &str,
        role: ProjectRole,
    ) -> StoreResult<()> {
        self.with_conn(|conn| {
            let exists: Option<String> = conn
                .query_row(
                    "SELECT user_id FROM project_members WHERE project_id = ?1 AND user_id = ?2",
                    params![project_id, user_id],
                    |r| r.get(0),
                )
                .optional()?;
            if exists.is_some() {
                return Err(StoreError::Conflict("already_a_member".into()));
            }
            conn.execute(
                "INSERT INTO project_members (project_id, user_id, role, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![project_id, user_id, role.as_str(), now_ms() as i64],
            )?;
            Ok(())
        })
    }

    pub fn remove_member(&self, project_id: &str, user_id: &str) -> StoreResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                "DELETE FROM project_members WHERE project_id = ?1 AND user_id = ?2",
                params![project_id, user_id],
            )?;
            Ok(())
        })
    }

    pub fn list_members(&self, project_id: &str) -> StoreResult<Vec<MemberView>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT pm.project_id, pm.user_id, u.name, u.email, pm.role, pm.created_at
                 FROM project_members pm
                 JOIN users u ON u.id = pm.user_id
                 WHERE pm.project_id = ?1
                 ORDER BY pm.created_at ASC",
            )?;
            let rows = stmt.query_map([project_id], |row| {
                let role: String = row.get("role")?;
                Ok(MemberView {
                    project_id: row.get("project_id")?,
                    user_id: row.get("user_id")?,
                    name: row.get("name")?,
                    email: row.get("email")?,
                    role: ProjectRole::parse(&role).unwrap_or(ProjectRole::Viewer),
                    created_at: row.get::<_, i64>("created_at")? as u64,
                })
            })?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
    }
}
