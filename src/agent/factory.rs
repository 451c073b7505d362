use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use anyhow::Result;

use crate::inference::provider::Provider;
use crate::memory::Memory;
use crate::persistence::Store;
use crate::tools::ToolRegistry;
use super::runner::Runner;

/// A named agent configuration with a scoped toolset.
/// An empty tool list means "all tools".
#[derive(Debug, Clone)]
pub struct AgentProfile {
    pub name: String,
    pub system_prompt: String,
    pub tools: Vec<String>,
}

/// Builds scoped runners from agent profiles. Held by the delegate tool to
/// spawn sub-agents.
///
/// The global registry is shared behind a lock because the delegate tool is
/// registered into it *after* the factory exists (the tool needs the
/// factory, the factory needs the registry). Writes stop at startup; runs
/// only read.
pub struct RunnerFactory {
    provider: Arc<dyn Provider>,
    store: Store,
    memory: Arc<dyn Memory>,
    global_registry: Arc<RwLock<ToolRegistry>>,
    profiles: HashMap<String, AgentProfile>,
}

impl RunnerFactory {
    pub fn new(
        provider: Arc<dyn Provider>,
        store: Store,
        memory: Arc<dyn Memory>,
        global_registry: Arc<RwLock<ToolRegistry>>,
        profiles: HashMap<String, AgentProfile>,
    ) -> Self {
        Self {
            provider,
            store,
            memory,
            global_registry,
            profiles,
        }
    }

    /// Create a fresh runner scoped to the named profile.
    pub fn build(&self, profile_name: &str) -> Result<Runner> {
        let profile = self
            .profiles
            .get(profile_name)
            .ok_or_else(|| anyhow::anyhow!("unknown agent profile: {profile_name}"))?;

        let registry = self
            .global_registry
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .scope(&profile.tools);
        let mut runner = Runner::new(
            self.provider.clone(),
            self.store.clone(),
            self.memory.clone(),
            registry,
        );
        if !profile.system_prompt.is_empty() {
            runner = runner.with_system_prompt(&profile.system_prompt);
        }
        Ok(runner)
    }

    /// Names of all registered profiles, sorted for stable schema output.
    pub fn profiles(&self) -> Vec<String> {
        let mut names: Vec<String> = self.profiles.keys().cloned().collect();
        names.sort();
        names
    }
}
