//! Validates tool arguments and performs the requested side effect.

use serde_json::Value;

use crate::core::config::LimitsConfig;
use crate::core::ids::UserId;
use crate::core::models::{ExecutionResult, Note, Task, TaskStatus};
use crate::storage::{NoteStore, TaskStore};

use super::registry::{CREATE_NOTE, CREATE_TASK, LIST_NOTES, LIST_TASKS};

/// Executes tool calls against the task and note stores.
///
/// Validation failures and persistence failures both come back as a
/// failure [`ExecutionResult`]; nothing is persisted unless the result
/// says `success`.
#[derive(Clone)]
pub struct ToolExecutor {
    tasks: TaskStore,
    notes: NoteStore,
    limits: LimitsConfig,
}

impl ToolExecutor {
    /// Build an executor over the given stores.
    #[must_use]
    pub fn new(tasks: TaskStore, notes: NoteStore, limits: LimitsConfig) -> Self {
        Self {
            tasks,
            notes,
            limits,
        }
    }

    /// Execute `name` with `args` on behalf of `owner`.
    pub async fn execute(&self, name: &str, args: &Value, owner: UserId) -> ExecutionResult {
        match name {
            CREATE_TASK => self.create_task(args, owner).await,
            CREATE_NOTE => self.create_note(args, owner).await,
            LIST_TASKS => self.list_tasks(owner).await,
            LIST_NOTES => self.list_notes(owner).await,
            other => {
                tracing::warn!(function = other, "unknown function requested by model");
                ExecutionResult::failure("Unknown function")
            }
        }
    }

    async fn create_task(&self, args: &Value, owner: UserId) -> ExecutionResult {
        let title = trimmed_str(args, "title");
        if title.chars().count() < self.limits.task_title_min {
            return ExecutionResult::failure(format!(
                "Task title must be at least {} characters long",
                self.limits.task_title_min
            ));
        }

        let description = trimmed_str(args, "description");
        if description.chars().count() < self.limits.task_description_min {
            return ExecutionResult::failure(format!(
                "Task description must be at least {} characters long",
                self.limits.task_description_min
            ));
        }

        let status = args
            .get("status")
            .and_then(Value::as_str)
            .and_then(TaskStatus::parse)
            .unwrap_or_default();

        let task = Task::new(owner, title, description, status);
        match self.tasks.insert(&task).await {
            Ok(()) => {
                tracing::info!(%owner, task = %task.id, "task created via tool call");
                match serde_json::to_value(&task) {
                    Ok(data) => ExecutionResult::ok(
                        format!("Task \"{}\" created successfully!", task.title),
                        data,
                    ),
                    Err(e) => ExecutionResult::failure(e.to_string()),
                }
            }
            Err(e) => {
                tracing::error!(%owner, error = %e, "task creation failed");
                ExecutionResult::failure(e.to_string())
            }
        }
    }

    async fn create_note(&self, args: &Value, owner: UserId) -> ExecutionResult {
        let title = trimmed_str(args, "title");
        if title.chars().count() < self.limits.note_title_min {
            return ExecutionResult::failure(format!(
                "Note title must be at least {} characters long",
                self.limits.note_title_min
            ));
        }

        let content = trimmed_str(args, "content");
        if content.chars().count() < self.limits.note_content_min {
            return ExecutionResult::failure("Note content cannot be empty");
        }

        let note = Note::new(owner, title, content);
        match self.notes.insert(&note).await {
            Ok(()) => {
                tracing::info!(%owner, note = %note.id, "note created via tool call");
                match serde_json::to_value(&note) {
                    Ok(data) => ExecutionResult::ok(
                        format!("Note \"{}\" created successfully!", note.title),
                        data,
                    ),
                    Err(e) => ExecutionResult::failure(e.to_string()),
                }
            }
            Err(e) => {
                tracing::error!(%owner, error = %e, "note creation failed");
                ExecutionResult::failure(e.to_string())
            }
        }
    }

    async fn list_tasks(&self, owner: UserId) -> ExecutionResult {
        match self.tasks.list(owner).await {
            Ok(tasks) => {
                let count = tasks.len();
                match serde_json::to_value(&tasks) {
                    Ok(data) => ExecutionResult::ok(format!("Found {count} task(s)"), data),
                    Err(e) => ExecutionResult::failure(e.to_string()),
                }
            }
            Err(e) => {
                tracing::error!(%owner, error = %e, "task listing failed");
                ExecutionResult::failure(e.to_string())
            }
        }
    }

    async fn list_notes(&self, owner: UserId) -> ExecutionResult {
        match self.notes.list(owner).await {
            Ok(notes) => {
                let count = notes.len();
                match serde_json::to_value(&notes) {
                    Ok(data) => ExecutionResult::ok(format!("Found {count} note(s)"), data),
                    Err(e) => ExecutionResult::failure(e.to_string()),
                }
            }
            Err(e) => {
                tracing::error!(%owner, error = %e, "note listing failed");
                ExecutionResult::failure(e.to_string())
            }
        }
    }
}

fn trimmed_str<'a>(args: &'a Value, key: &str) -> &'a str {
    args.get(key).and_then(Value::as_str).unwrap_or("").trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Storage;
    use serde_json::json;

    async fn executor() -> (Storage, ToolExecutor, UserId) {
        let storage = Storage::open_in_memory().await.unwrap();
        let executor = ToolExecutor::new(storage.tasks(), storage.notes(), LimitsConfig::default());
        (storage, executor, UserId::new())
    }

    #[tokio::test]
    async fn valid_create_task_persists_exactly_one_owned_task() {
        let (storage, executor, owner) = executor().await;
        let args = json!({
            "title": "Buy groceries",
            "description": "Buy groceries from the store"
        });

        let result = executor.execute("create_task", &args, owner).await;
        assert!(result.success, "{}", result.message);
        assert_eq!(storage.tasks().count(owner).await.unwrap(), 1);

        let tasks = storage.tasks().list(owner).await.unwrap();
        assert_eq!(tasks[0].title, "Buy groceries");
        assert_eq!(tasks[0].status, TaskStatus::NotStarted);
        assert_eq!(tasks[0].owner, owner);
    }

    #[tokio::test]
    async fn short_title_fails_and_persists_nothing() {
        let (storage, executor, owner) = executor().await;
        let args = json!({"title": "AB", "description": "long enough"});

        let result = executor.execute("create_task", &args, owner).await;
        assert!(!result.success);
        assert!(result.message.contains("at least 3"), "{}", result.message);
        assert!(result.data.is_none());
        assert_eq!(storage.tasks().count(owner).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn short_description_fails_and_persists_nothing() {
        let (storage, executor, owner) = executor().await;
        let args = json!({"title": "Valid title", "description": "abcd"});

        let result = executor.execute("create_task", &args, owner).await;
        assert!(!result.success);
        assert!(result.message.contains("at least 5"), "{}", result.message);
        assert_eq!(storage.tasks().count(owner).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn explicit_status_is_honored() {
        let (storage, executor, owner) = executor().await;
        let args = json!({
            "title": "Ship release",
            "description": "Tag and publish",
            "status": "In Progress"
        });

        let result = executor.execute("create_task", &args, owner).await;
        assert!(result.success);
        let tasks = storage.tasks().list(owner).await.unwrap();
        assert_eq!(tasks[0].status, TaskStatus::InProgress);
    }

    #[tokio::test]
    async fn empty_note_content_is_rejected() {
        let (storage, executor, owner) = executor().await;
        let args = json!({"title": "Ideas", "content": "   "});

        let result = executor.execute("create_note", &args, owner).await;
        assert!(!result.success);
        assert_eq!(storage.notes().count(owner).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn valid_note_is_created() {
        let (storage, executor, owner) = executor().await;
        let args = json!({"title": "Ideas", "content": "Remember the milk"});

        let result = executor.execute("create_note", &args, owner).await;
        assert!(result.success, "{}", result.message);
        assert_eq!(storage.notes().count(owner).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn unknown_function_is_a_failure_without_side_effects() {
        let (storage, executor, owner) = executor().await;
        let result = executor.execute("drop_database", &json!({}), owner).await;
        assert!(!result.success);
        assert_eq!(result.message, "Unknown function");
        assert_eq!(storage.tasks().count(owner).await.unwrap(), 0);
        assert_eq!(storage.notes().count(owner).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn list_tasks_returns_newest_first() {
        let (_storage, executor, owner) = executor().await;
        for (i, title) in ["First task", "Second task"].iter().enumerate() {
            let args = json!({"title": title, "description": "some details"});
            // Distinct timestamps so ordering is deterministic.
            tokio::time::sleep(std::time::Duration::from_millis(2 + i as u64)).await;
            assert!(executor.execute("create_task", &args, owner).await.success);
        }

        let result = executor.execute("list_tasks", &json!({}), owner).await;
        assert!(result.success);
        let data = result.data.unwrap();
        let titles: Vec<_> = data
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["title"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(titles, vec!["Second task", "First task"]);
    }
}
