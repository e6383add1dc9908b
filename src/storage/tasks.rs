//! Owner-scoped task persistence.

use tokio_rusqlite::Connection;

use crate::core::errors::AppResult;
use crate::core::ids::{TaskId, UserId};
use crate::core::models::{Task, TaskStatus};
use crate::storage::millis_to_datetime;

/// Store for tasks. Every query is filtered by the owning user.
#[derive(Clone)]
pub struct TaskStore {
    conn: Connection,
}

type TaskRow = (TaskId, UserId, String, String, TaskStatus, i64, i64);

fn row_to_task(row: TaskRow) -> tokio_rusqlite::Result<Task> {
    let (id, owner, title, description, status, created_at, updated_at) = row;
    Ok(Task {
        id,
        owner,
        title,
        description,
        status,
        created_at: millis_to_datetime(created_at)?,
        updated_at: millis_to_datetime(updated_at)?,
    })
}

impl TaskStore {
    pub(crate) fn new(conn: Connection) -> Self {
        Self { conn }
    }

    /// Persist a new task.
    ///
    /// # Errors
    /// Returns an error on storage failure.
    pub async fn insert(&self, task: &Task) -> AppResult<()> {
        let task = task.clone();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO tasks (id, owner, title, description, status, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    rusqlite::params![
                        task.id,
                        task.owner,
                        task.title,
                        task.description,
                        task.status,
                        task.created_at.timestamp_millis(),
                        task.updated_at.timestamp_millis(),
                    ],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// All tasks owned by `owner`, newest first.
    ///
    /// # Errors
    /// Returns an error on storage failure.
    pub async fn list(&self, owner: UserId) -> AppResult<Vec<Task>> {
        let tasks = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, owner, title, description, status, created_at, updated_at
                     FROM tasks WHERE owner = ?1
                     ORDER BY created_at DESC, id DESC",
                )?;
                let rows = stmt
                    .query_map(rusqlite::params![owner], |row| {
                        Ok((
                            row.get(0)?,
                            row.get(1)?,
                            row.get(2)?,
                            row.get(3)?,
                            row.get(4)?,
                            row.get(5)?,
                            row.get(6)?,
                        ))
                    })?
                    .collect::<Result<Vec<TaskRow>, _>>()?;

                rows.into_iter().map(row_to_task).collect()
            })
            .await?;
        Ok(tasks)
    }

    /// Fetch one task if it exists and belongs to `owner`.
    ///
    /// # Errors
    /// Returns an error on storage failure.
    pub async fn get(&self, id: TaskId, owner: UserId) -> AppResult<Option<Task>> {
        let task = self
            .conn
            .call(move |conn| {
                let row = conn
                    .query_row(
                        "SELECT id, owner, title, description, status, created_at, updated_at
                         FROM tasks WHERE id = ?1 AND owner = ?2",
                        rusqlite::params![id, owner],
                        |row| {
                            Ok((
                                row.get(0)?,
                                row.get(1)?,
                                row.get(2)?,
                                row.get(3)?,
                                row.get(4)?,
                                row.get(5)?,
                                row.get(6)?,
                            ))
                        },
                    )
                    .ok();

                row.map(row_to_task).transpose()
            })
            .await?;
        Ok(task)
    }

    /// Overwrite the mutable fields of a task owned by `owner`.
    ///
    /// # Errors
    /// Returns an error on storage failure.
    pub async fn update(&self, task: &Task) -> AppResult<()> {
        let task = task.clone();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE tasks SET title = ?3, description = ?4, status = ?5, updated_at = ?6
                     WHERE id = ?1 AND owner = ?2",
                    rusqlite::params![
                        task.id,
                        task.owner,
                        task.title,
                        task.description,
                        task.status,
                        task.updated_at.timestamp_millis(),
                    ],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Delete a task owned by `owner`. Returns whether a row was removed.
    ///
    /// # Errors
    /// Returns an error on storage failure.
    pub async fn delete(&self, id: TaskId, owner: UserId) -> AppResult<bool> {
        let removed = self
            .conn
            .call(move |conn| {
                let n = conn.execute(
                    "DELETE FROM tasks WHERE id = ?1 AND owner = ?2",
                    rusqlite::params![id, owner],
                )?;
                Ok(n > 0)
            })
            .await?;
        Ok(removed)
    }

    /// Number of tasks owned by `owner`. Used by tests asserting that
    /// failed validations persist nothing.
    ///
    /// # Errors
    /// Returns an error on storage failure.
    pub async fn count(&self, owner: UserId) -> AppResult<u64> {
        let count = self
            .conn
            .call(move |conn| {
                let n: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM tasks WHERE owner = ?1",
                    rusqlite::params![owner],
                    |row| row.get(0),
                )?;
                Ok(u64::try_from(n).unwrap_or(0))
            })
            .await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Storage;

    #[tokio::test]
    async fn tasks_are_isolated_per_owner() {
        let storage = Storage::open_in_memory().await.unwrap();
        let tasks = storage.tasks();
        let alice = UserId::new();
        let bob = UserId::new();

        tasks
            .insert(&Task::new(alice, "Groceries", "Milk", TaskStatus::NotStarted))
            .await
            .unwrap();

        assert_eq!(tasks.list(alice).await.unwrap().len(), 1);
        assert!(tasks.list(bob).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_requires_matching_owner() {
        let storage = Storage::open_in_memory().await.unwrap();
        let tasks = storage.tasks();
        let alice = UserId::new();
        let task = Task::new(alice, "Groceries", "Milk", TaskStatus::NotStarted);
        tasks.insert(&task).await.unwrap();

        assert!(!tasks.delete(task.id, UserId::new()).await.unwrap());
        assert!(tasks.delete(task.id, alice).await.unwrap());
        assert_eq!(tasks.count(alice).await.unwrap(), 0);
    }
}
