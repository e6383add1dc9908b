//! Reassembly of tool calls that arrive fragmented across stream chunks.

use std::collections::BTreeMap;

use crate::core::models::{FunctionCall, ToolCallRecord};
use crate::llm::types::ToolCallDelta;

#[derive(Debug, Default)]
struct PartialCall {
    id: String,
    kind: String,
    name: String,
    arguments: String,
}

/// Collects [`ToolCallDelta`] fragments keyed by stream index and
/// concatenates their pieces in arrival order.
///
/// The upstream model may interleave fragments of several calls; each
/// call's `arguments` is partial JSON text that only parses once every
/// fragment with that index has been appended.
#[derive(Debug, Default)]
pub struct ToolCallAccumulator {
    calls: BTreeMap<u32, PartialCall>,
    // Indices in the order their first fragment arrived.
    order: Vec<u32>,
}

impl ToolCallAccumulator {
    /// An empty accumulator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one fragment into the call it belongs to.
    pub fn apply(&mut self, delta: &ToolCallDelta) {
        if !self.calls.contains_key(&delta.index) {
            self.order.push(delta.index);
        }
        let call = self.calls.entry(delta.index).or_default();

        if let Some(id) = &delta.id {
            call.id.push_str(id);
        }
        if let Some(kind) = &delta.kind {
            call.kind.push_str(kind);
        }
        if let Some(function) = &delta.function {
            if let Some(name) = &function.name {
                call.name.push_str(name);
            }
            if let Some(arguments) = &function.arguments {
                call.arguments.push_str(arguments);
            }
        }
    }

    /// Whether any fragment has been seen.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Finish accumulation and return the assembled calls in the order
    /// their first fragments arrived.
    #[must_use]
    pub fn into_records(self) -> Vec<ToolCallRecord> {
        let mut calls = self.calls;
        self.order
            .into_iter()
            .filter_map(|index| calls.remove(&index))
            .map(|call| ToolCallRecord {
                id: call.id,
                kind: if call.kind.is_empty() {
                    "function".to_string()
                } else {
                    call.kind
                },
                function: FunctionCall {
                    name: call.name,
                    arguments: call.arguments,
                },
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::types::FunctionDelta;

    fn fragment(
        index: u32,
        id: Option<&str>,
        name: Option<&str>,
        arguments: Option<&str>,
    ) -> ToolCallDelta {
        ToolCallDelta {
            index,
            id: id.map(str::to_string),
            kind: id.map(|_| "function".to_string()),
            function: Some(FunctionDelta {
                name: name.map(str::to_string),
                arguments: arguments.map(str::to_string),
            }),
        }
    }

    #[test]
    fn fragmented_arguments_concatenate_in_arrival_order() {
        let mut acc = ToolCallAccumulator::new();
        acc.apply(&fragment(0, Some("call_abc"), Some("create_task"), Some("")));
        acc.apply(&fragment(0, None, None, Some("{\"title\":\"Buy")));
        acc.apply(&fragment(0, None, None, Some(" groceries\",\"descri")));
        acc.apply(&fragment(0, None, None, Some("ption\":\"From the store\"}")));

        let records = acc.into_records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "call_abc");
        assert_eq!(records[0].kind, "function");
        assert_eq!(records[0].function.name, "create_task");

        let args: serde_json::Value =
            serde_json::from_str(&records[0].function.arguments).unwrap();
        assert_eq!(args["title"], "Buy groceries");
        assert_eq!(args["description"], "From the store");
    }

    #[test]
    fn interleaved_calls_are_kept_separate() {
        let mut acc = ToolCallAccumulator::new();
        acc.apply(&fragment(0, Some("call_a"), Some("create_task"), None));
        acc.apply(&fragment(1, Some("call_b"), Some("create_note"), None));
        acc.apply(&fragment(0, None, None, Some("{\"title\":\"A\"}")));
        acc.apply(&fragment(1, None, None, Some("{\"title\":\"B\"}")));

        let records = acc.into_records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].function.name, "create_task");
        assert_eq!(records[0].function.arguments, "{\"title\":\"A\"}");
        assert_eq!(records[1].function.name, "create_note");
        assert_eq!(records[1].function.arguments, "{\"title\":\"B\"}");
    }

    #[test]
    fn first_record_follows_first_fragment_even_for_higher_index() {
        let mut acc = ToolCallAccumulator::new();
        acc.apply(&fragment(1, Some("call_late"), Some("list_notes"), None));
        acc.apply(&fragment(0, Some("call_early"), Some("list_tasks"), None));

        let records = acc.into_records();
        assert_eq!(records[0].id, "call_late");
        assert_eq!(records[1].id, "call_early");
    }

    #[test]
    fn missing_type_defaults_to_function() {
        let mut acc = ToolCallAccumulator::new();
        acc.apply(&ToolCallDelta {
            index: 0,
            id: Some("call_x".to_string()),
            kind: None,
            function: Some(FunctionDelta {
                name: Some("list_tasks".to_string()),
                arguments: Some("{}".to_string()),
            }),
        });

        let records = acc.into_records();
        assert_eq!(records[0].kind, "function");
    }

    #[test]
    fn empty_accumulator_yields_no_records() {
        let acc = ToolCallAccumulator::new();
        assert!(acc.is_empty());
        assert!(acc.into_records().is_empty());
    }
}
