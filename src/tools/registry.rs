use std::collections::BTreeMap;
use std::sync::Arc;

use crate::inference::provider::ToolDef;
use super::Tool;

/// Name-keyed set of tools.
///
/// Writes happen only during startup; runs see an immutable snapshot (a
/// runner freezes its tool definitions at construction). Registering a
/// name twice silently replaces the earlier entry.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// A shallow copy restricted to `names`; an empty list means "all".
    /// Unknown names are ignored.
    pub fn scope(&self, names: &[String]) -> ToolRegistry {
        if names.is_empty() {
            return self.clone();
        }
        let tools = names
            .iter()
            .filter_map(|n| self.tools.get(n).map(|t| (n.clone(), t.clone())))
            .collect();
        ToolRegistry { tools }
    }

    /// Tool definitions for the model API, in stable name order.
    pub fn tool_definitions(&self) -> Vec<ToolDef> {
        self.tools
            .values()
            .map(|tool| ToolDef {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.parameters_schema(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
