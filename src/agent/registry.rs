//! Tool registry and per-run overlay.
//!
//! The process-wide [`ToolRegistry`] holds the built-in tools and is shared
//! read-only (`Arc`) by all runs. Each run wraps it in a
//! [`RequestToolRegistry`] whose overlay receives the request-scoped tools
//! (knowledge-base retrievers, configured remote tools), so concurrent runs
//! never see each other's registrations.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use super::tool::{ToolDefinition, ToolDescriptor, ToolRunningMode, builtin_tools};
use crate::error::AgentError;

/// Name-keyed tool descriptors. Registration is last-write-wins.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, ToolDescriptor>,
}

impl ToolRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-filled with the built-in tools.
    #[must_use]
    pub fn with_builtins() -> Self {
        builtin_tools().into_iter().collect()
    }

    /// Registers a tool, replacing (and returning) any tool with the same name.
    pub fn register(&mut self, descriptor: ToolDescriptor) -> Option<ToolDescriptor> {
        self.tools.insert(descriptor.name().to_string(), descriptor)
    }

    /// Looks a tool up by name.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::ToolNotFound`] if no tool has that name.
    pub fn lookup(&self, name: &str) -> Result<&ToolDescriptor, AgentError> {
        self.get(name).ok_or_else(|| AgentError::ToolNotFound {
            name: name.to_string(),
        })
    }

    /// Looks a tool up by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.get(name)
    }

    /// Whether a tool with that name exists.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Registered tool names.
    #[must_use]
    pub fn list_names(&self) -> BTreeSet<String> {
        self.tools.keys().cloned().collect()
    }

    /// Iterates over all descriptors.
    pub fn iter(&self) -> impl Iterator<Item = &ToolDescriptor> {
        self.tools.values()
    }

    /// Number of registered tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl FromIterator<ToolDescriptor> for ToolRegistry {
    fn from_iter<T: IntoIterator<Item = ToolDescriptor>>(iter: T) -> Self {
        let mut registry = Self::new();
        for descriptor in iter {
            registry.register(descriptor);
        }
        registry
    }
}

/// Base registry plus request-scoped additions for one run.
///
/// Overlay entries shadow base entries with the same name.
#[derive(Debug, Clone)]
pub struct RequestToolRegistry {
    base: Arc<ToolRegistry>,
    overlay: ToolRegistry,
}

impl RequestToolRegistry {
    /// Wraps the shared base registry.
    #[must_use]
    pub fn new(base: Arc<ToolRegistry>) -> Self {
        Self {
            base,
            overlay: ToolRegistry::new(),
        }
    }

    /// Registers a run-scoped tool (last write wins).
    pub fn register(&mut self, descriptor: ToolDescriptor) -> Option<ToolDescriptor> {
        self.overlay.register(descriptor)
    }

    /// Registers a knowledge-base retriever as a ONCE retrieval tool.
    pub fn register_rag_tool(&mut self, name: &str, description: &str) {
        self.register(ToolDescriptor::retriever(name, description));
    }

    /// Registers a tool served by the remote tool-execution service.
    pub fn register_remote_tool(&mut self, name: &str, description: &str, mode: ToolRunningMode) {
        self.register(ToolDescriptor::remote(name, description, mode));
    }

    /// Looks a tool up, overlay first.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::ToolNotFound`] if neither layer has the tool.
    pub fn lookup(&self, name: &str) -> Result<&ToolDescriptor, AgentError> {
        self.get(name).ok_or_else(|| AgentError::ToolNotFound {
            name: name.to_string(),
        })
    }

    /// Looks a tool up, overlay first.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.overlay.get(name).or_else(|| self.base.get(name))
    }

    /// Whether either layer has the tool.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Names visible to this run.
    #[must_use]
    pub fn list_names(&self) -> BTreeSet<String> {
        let mut names = self.base.list_names();
        names.extend(self.overlay.list_names());
        names
    }

    /// Function-calling definitions for the named tools. Unknown names are
    /// skipped; the result is sorted and deduplicated.
    #[must_use]
    pub fn definitions_for<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> Vec<ToolDefinition> {
        let names: BTreeSet<&str> = names.into_iter().collect();
        names
            .into_iter()
            .filter_map(|name| self.get(name))
            .map(|d| d.definition.clone())
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::agent::tool::{GIVE_FINAL_RESPONSE, RAG_TOOL, ToolKind};

    fn base() -> Arc<ToolRegistry> {
        Arc::new(ToolRegistry::with_builtins())
    }

    #[test]
    fn test_builtins_registered() {
        let registry = ToolRegistry::with_builtins();
        assert_eq!(registry.len(), 6);
        assert!(registry.contains(RAG_TOOL));
        assert!(registry.contains(GIVE_FINAL_RESPONSE));
    }

    #[test]
    fn test_lookup_missing_tool() {
        let registry = ToolRegistry::new();
        let err = registry.lookup("nope").err();
        assert!(matches!(err, Some(AgentError::ToolNotFound { name }) if name == "nope"));
    }

    #[test]
    fn test_register_is_last_write_wins() {
        let mut registry = ToolRegistry::new();
        assert!(registry.register(ToolDescriptor::retriever("QA", "first")).is_none());
        let old = registry.register(ToolDescriptor::retriever("QA", "second"));
        assert_eq!(old.map(|d| d.definition.description), Some("first".to_string()));
        let current = registry.lookup("QA").unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(current.definition.description, "second");
    }

    #[test]
    fn test_overlay_does_not_leak_between_runs() {
        let shared = base();
        let mut run_a = RequestToolRegistry::new(Arc::clone(&shared));
        let run_b = RequestToolRegistry::new(Arc::clone(&shared));

        run_a.register_rag_tool("QA", "Answer from docs");

        assert!(run_a.contains("QA"));
        assert!(!run_b.contains("QA"));
        assert!(!shared.contains("QA"));
    }

    #[test]
    fn test_overlay_shadows_base() {
        let mut run = RequestToolRegistry::new(base());
        run.register_remote_tool(RAG_TOOL, "custom", ToolRunningMode::Repeatable);
        let tool = run.lookup(RAG_TOOL).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(tool.kind, ToolKind::Remote);
        assert_eq!(run.list_names().len(), 6);
    }

    #[test]
    fn test_definitions_for_skips_unknown() {
        let run = RequestToolRegistry::new(base());
        let defs = run.definitions_for(["get_weather", "unknown", GIVE_FINAL_RESPONSE, "get_weather"]);
        let names: Vec<&str> = defs.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["get_weather", GIVE_FINAL_RESPONSE]);
    }
}
