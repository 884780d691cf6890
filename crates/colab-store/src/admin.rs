//! Aggregate statistics for the admin console.

use rusqlite::params;
use serde_json::{Value, json};

use crate::{Db, StoreResult};

/// Application-wide totals and groupings, shaped for the admin dashboard.
#[derive(Debug, Clone)]
pub struct AdminStats {
    pub total_users: u64,
    pub total_admins: u64,
    pub total_projects: u64,
    pub total_tasks: u64,
    pub total_files: u64,
    pub total_messages: u64,
    pub new_users_since: u64,
    pub new_projects_since: u64,
    pub new_tasks_since: u64,
    /// `(role, count)` pairs.
    pub users_by_role: Vec<(String, u64)>,
    /// `(status, count)` pairs.
    pub tasks_by_status: Vec<(String, u64)>,
    /// Recent users and projects, newest first, five each.
    pub recent_users: Vec<Value>,
    pub recent_projects: Vec<Value>,
}

impl AdminStats {
    pub fn to_json(&self) -> Value {
        json!({
            "totals": {
                "users": self.total_users,
                "admins": self.total_admins,
                "projects": self.total_projects,
                "tasks": self.total_tasks,
                "files": self.total_files,
                "messages": self.total_messages,
            },
            "recent": {
                "newUsers": self.new_users_since,
                "newProjects": self.new_projects_since,
                "newTasks": self.new_tasks_since,
            },
            "usersByRole": self.users_by_role.iter()
                .map(|(role, n)| json!({"role": role, "count": n}))
                .collect::<Vec<_>>(),
            "tasksByStatus": self.tasks_by_status.iter()
                .map(|(status, n)| json!({"status": status, "count": n}))
                .collect::<Vec<_>>(),
            "recentActivity": {
                "users": self.recent_users,
                "projects": self.recent_projects,
            },
        })
    }
}

impl Db {
    /// Collect dashboard statistics. `users_since`/`tasks_since` bound the
    /// "new this month"/"new this week" windows (epoch milliseconds).
    pub fn admin_stats(&self, users_since: u64, tasks_since: u64) -> StoreResult<AdminStats> {
        self.with_conn(|conn| {
            let count = |sql: &str| -> rusqlite::Result<u64> {
                conn.query_row(sql, [], |r| r.get::<_, i64>(0)).map(|n| n as u64)
            };
            let count_since = |sql: &str, since: u64| -> rusqlite::Result<u64> {
                conn.query_row(sql, params![since as i64], |r| r.get::<_, i64>(0))
                    .map(|n| n as u64)
            };

            let mut users_by_role = Vec::new();
            {
                let mut stmt =
                    conn.prepare("SELECT role, COUNT(*) FROM users GROUP BY role ORDER BY role")?;
                let rows = stmt.query_map([], |r| {
                    Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)? as u64))
                })?;
                for row in rows {
                    users_by_role.push(row?);
                }
            }

            let mut tasks_by_status = Vec::new();
            {
                let mut stmt = conn
                    .prepare("SELECT status, COUNT(*) FROM tasks GROUP BY status ORDER BY status")?;
                let rows = stmt.query_map([], |r| {
                    Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)? as u64))
                })?;
                for row in rows {
                    tasks_by_status.push(row?);
                }
            }

            let mut recent_users = Vec::new();
            {
                let mut stmt = conn.prepare(
                    "SELECT id, name, created_at FROM users ORDER BY created_at DESC LIMIT 5",
                )?;
                let rows = stmt.query_map([], |r| {
                    Ok(json!({
                        "id": r.get::<_, String>(0)?,
                        "name": r.get::<_, String>(1)?,
                        "createdAt": r.get::<_, i64>(2)?,
                    }))
                })?;
                for row in rows {
                    recent_users.push(row?);
                }
            }

            let mut recent_projects = Vec::new();
            {
                let mut stmt = conn.prepare(
                    "SELECT p.id, p.name, p.created_at, u.name FROM projects p
                     JOIN users u ON u.id = p.created_by
                     ORDER BY p.created_at DESC LIMIT 5",
                )?;
                let rows = stmt.query_map([], |r| {
                    Ok(json!({
                        "id": r.get::<_, String>(0)?,
                        "name": r.get::<_, String>(1)?,
                        "createdAt": r.get::<_, i64>(2)?,
                        "createdBy": r.get::<_, String>(3)?,
                    }))
                })?;
                for row in rows {
                    recent_projects.push(row?);
                }
            }

            Ok(AdminStats {
                total_users: count("SELECT COUNT(*) FROM users")?,
                total_admins: count("SELECT COUNT(*) FROM users WHERE role = 'admin'")?,
                total_projects: count("SELECT COUNT(*) FROM projects")?,
                total_tasks: count("SELECT COUNT(*) FROM tasks")?,
                total_files: count("SELECT COUNT(*) FROM files")?,
                total_messages: count("SELECT COUNT(*) FROM messages")?,
                new_users_since: count_since(
                    "SELECT COUNT(*) FROM users WHERE created_at >= ?1",
                    users_since,
                )?,
                new_projects_since: count_since(
                    "SELECT COUNT(*) FROM projects WHERE created_at >= ?1",
                    users_since,
                )?,
                new_tasks_since: count_since(
                    "SELECT COUNT(*) FROM tasks WHERE created_at >= ?1",
                    tasks_since,
                )?,
                users_by_role,
                tasks_by_status,
                recent_users,
                recent_projects,
            })
        })
    }
}
