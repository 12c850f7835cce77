use std::collections::HashMap;

use openapi_mcp_core::Operation;
use serde_json::{Value, json};

/// Read-only operation catalog, looked up by tool name on every call.
///
/// Duplicate operation ids are kept as declared: both appear in `tools/list`,
/// and lookup resolves to the one declared last.
#[derive(Debug, Clone, Default)]
pub struct ToolCatalog {
    operations: Vec<Operation>,
    by_name: HashMap<String, usize>,
}

impl ToolCatalog {
    pub fn new(operations: Vec<Operation>) -> Self {
        let by_name = operations
            .iter()
            .enumerate()
            .map(|(idx, op)| (op.operation_id.clone(), idx))
            .collect();
        Self {
            operations,
            by_name,
        }
    }

    pub fn get(&self, name: &str) -> Option<&Operation> {
        self.by_name.get(name).map(|&idx| &self.operations[idx])
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn tool_definitions(&self) -> Vec<Value> {
        self.operations
            .iter()
            .map(|op| {
                json!({
                    "name": op.operation_id,
                    "description": op.tool_description(),
                    "inputSchema": op.input_schema,
                })
            })
            .collect()
    }
}
