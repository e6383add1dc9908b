//! Static declarations of the tools the assistant may call.

use std::collections::BTreeMap;

use crate::llm::types::{FunctionSpec, ParameterSchema, PropertySchema, ToolSpec};

/// Function name for task creation.
pub const CREATE_TASK: &str = "create_task";
/// Function name for note creation.
pub const CREATE_NOTE: &str = "create_note";
/// Function name for listing tasks.
pub const LIST_TASKS: &str = "list_tasks";
/// Function name for listing notes.
pub const LIST_NOTES: &str = "list_notes";

/// Immutable set of tool specifications advertised to the model.
pub struct ToolRegistry {
    tools: Vec<ToolSpec>,
}

impl ToolRegistry {
    /// The standard registry: two action tools and two read-only tools.
    #[must_use]
    pub fn standard() -> Self {
        Self {
            tools: vec![create_task_spec(), create_note_spec(), list_tasks_spec(), list_notes_spec()],
        }
    }

    /// The declared tool specifications.
    #[must_use]
    pub fn specs(&self) -> &[ToolSpec] {
        &self.tools
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

fn create_task_spec() -> ToolSpec {
    let mut properties = BTreeMap::new();
    properties.insert(
        "title",
        PropertySchema::string(
            "The title of the task (1-200 characters). Extract from the user's \
             message or generate a clear title.",
        ),
    );
    properties.insert(
        "description",
        PropertySchema::string(
            "Description of the task. Can be brief. Generate reasonable content \
             if not specified.",
        ),
    );
    properties.insert(
        "status",
        PropertySchema::string_enum(
            "The status of the task. Default to \"Not Started\".",
            vec!["Not Started", "In Progress", "Completed"],
        ),
    );

    ToolSpec {
        kind: "function",
        function: FunctionSpec {
            name: CREATE_TASK,
            description: "Create a new task for the user immediately without confirmation. \
                          Use this whenever the user asks to create, add, or make a task.",
            parameters: ParameterSchema {
                kind: "object",
                properties,
                required: vec!["title", "description"],
            },
        },
    }
}

fn create_note_spec() -> ToolSpec {
    let mut properties = BTreeMap::new();
    properties.insert(
        "title",
        PropertySchema::string("The title of the note (e.g., \"Meeting Ideas\")."),
    );
    properties.insert(
        "content",
        PropertySchema::string(
            "The detailed content of the note. If the user only provides a topic, \
             generate relevant starter content.",
        ),
    );

    ToolSpec {
        kind: "function",
        function: FunctionSpec {
            name: CREATE_NOTE,
            description: "Create a new note for the user with a title and content. Use this \
                          when the user wants to save information, ideas, or reminders.",
            parameters: ParameterSchema {
                kind: "object",
                properties,
                required: vec!["title", "content"],
            },
        },
    }
}

fn list_tasks_spec() -> ToolSpec {
    ToolSpec {
        kind: "function",
        function: FunctionSpec {
            name: LIST_TASKS,
            description: "Get all tasks for the user to help answer questions about their tasks.",
            parameters: ParameterSchema::empty(),
        },
    }
}

fn list_notes_spec() -> ToolSpec {
    ToolSpec {
        kind: "function",
        function: FunctionSpec {
            name: LIST_NOTES,
            description: "Get all notes for the user to help answer questions about their notes.",
            parameters: ParameterSchema::empty(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_declares_the_four_tools() {
        let registry = ToolRegistry::standard();
        let names: Vec<_> = registry
            .specs()
            .iter()
            .map(|t| t.function.name)
            .collect();
        assert_eq!(names, vec![CREATE_TASK, CREATE_NOTE, LIST_TASKS, LIST_NOTES]);
    }

    #[test]
    fn create_task_schema_has_status_enum_and_required_fields() {
        let json = serde_json::to_value(create_task_spec()).unwrap();
        assert_eq!(json["type"], "function");
        assert_eq!(json["function"]["name"], "create_task");
        let params = &json["function"]["parameters"];
        assert_eq!(params["type"], "object");
        assert_eq!(
            params["properties"]["status"]["enum"],
            serde_json::json!(["Not Started", "In Progress", "Completed"])
        );
        assert_eq!(params["required"], serde_json::json!(["title", "description"]));
    }

    #[test]
    fn read_only_tools_take_no_parameters() {
        let json = serde_json::to_value(list_tasks_spec()).unwrap();
        assert!(
            json["function"]["parameters"]["properties"]
                .as_object()
                .unwrap()
                .is_empty()
        );
        assert!(json["function"]["parameters"].get("required").is_none());
    }
}
