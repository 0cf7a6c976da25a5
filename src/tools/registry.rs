use std::collections::HashMap;

use super::tool::Tool;

/// Global, in-process registry of every tool handler the core knows about
/// (`spec.md` §6, "Tool registry": `get(name)`, `list()`).
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Tool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Tool) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<&Tool> {
        self.tools.get(name)
    }

    pub fn list(&self) -> Vec<&Tool> {
        self.tools.values().collect()
    }

    /// Resolve the tool schema exposed to the model for one step:
    /// `*` means "every registered tool" (`spec.md` §4.1 step 2), otherwise
    /// the intersection of `allowed` with the global registry.
    pub fn resolve(&self, allowed: &[String]) -> Vec<Tool> {
        if allowed.iter().any(|n| n == "*") {
            return self.tools.values().cloned().collect();
        }
        allowed
            .iter()
            .filter_map(|name| self.tools.get(name))
            .cloned()
            .collect()
    }
}
