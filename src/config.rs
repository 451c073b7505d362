use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;

/// Top-level pingu configuration, parsed from `~/.config/pingu/config.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Name of the `[llm.<name>]` entry used for chat.
    pub default_llm: String,
    pub llm: HashMap<String, LlmConfig>,
    pub gateway: GatewayConfig,
    pub channel: HashMap<String, ChannelConfig>,
    pub agent: HashMap<String, AgentProfileConfig>,
    pub db: DbConfig,
    pub services: ServicesConfig,
    pub memory: MemoryConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub model: String,
    pub base_url: String,
    pub api_key: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listen address. A bare `:port` binds all interfaces.
    pub addr: String,
    pub token: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            addr: ":8484".to_string(),
            token: String::new(),
        }
    }
}

impl GatewayConfig {
    /// Normalize `:8484`-style addresses into something a TCP listener accepts.
    pub fn bind_addr(&self) -> String {
        if self.addr.starts_with(':') {
            format!("0.0.0.0{}", self.addr)
        } else {
            self.addr.clone()
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    pub enabled: bool,
    #[serde(rename = "type")]
    pub kind: String,
    pub settings: HashMap<String, String>,
}

/// A named agent profile: its system prompt and the subset of tools it may use.
/// An empty tool list means "all tools".
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AgentProfileConfig {
    pub system_prompt: String,
    pub tools: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DbConfig {
    pub path: String,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: "~/.local/share/pingu/pingu.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServicesConfig {
    pub brave: BraveConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BraveConfig {
    pub api_key: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    pub embedding: EmbeddingConfig,
    pub vector_weight: f32,
    pub fts_weight: f32,
    /// Inject relevant memories into the model context on every turn.
    pub auto_inject: bool,
    /// Persist each user message as a conversation memory in the background.
    pub auto_save: bool,
    pub max_results: usize,
    pub compaction: CompactionConfig,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            embedding: EmbeddingConfig::default(),
            vector_weight: 0.7,
            fts_weight: 0.3,
            auto_inject: true,
            auto_save: true,
            max_results: 5,
            compaction: CompactionConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub enabled: bool,
    /// Name of the `[llm.<name>]` entry that serves the embeddings endpoint.
    pub llm: String,
    pub model: String,
    pub dimensions: usize,
    pub cache_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            llm: String::new(),
            model: String::new(),
            dimensions: 0,
            cache_size: 10_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CompactionConfig {
    pub enabled: bool,
    pub turn_threshold: usize,
    pub keep_recent: usize,
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            turn_threshold: 20,
            keep_recent: 5,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let mut llm = HashMap::new();
        llm.insert(
            "openai".to_string(),
            LlmConfig {
                model: "gpt-4.1-nano".to_string(),
                ..LlmConfig::default()
            },
        );
        Self {
            default_llm: "openai".to_string(),
            llm,
            gateway: GatewayConfig::default(),
            channel: HashMap::new(),
            agent: HashMap::new(),
            db: DbConfig::default(),
            services: ServicesConfig::default(),
            memory: MemoryConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from the default path. A missing file yields the
    /// built-in defaults; a malformed file is an error.
    pub fn load() -> Result<Self> {
        let path = config_path();
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("could not read config file: {}", path.display()))?;
        Self::from_str(&contents)
    }

    /// Parse configuration from a TOML string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(toml_str: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(toml_str).with_context(|| "failed to parse config.toml")?;
        config.validate()?;
        Ok(config)
    }

    /// Validate semantic invariants that serde can't enforce.
    pub fn validate(&self) -> Result<()> {
        if !self.llm.contains_key(&self.default_llm) {
            anyhow::bail!(
                "default_llm '{}' not found in [llm] configuration",
                self.default_llm
            );
        }
        if self.memory.embedding.enabled && !self.llm.contains_key(&self.memory.embedding.llm) {
            anyhow::bail!(
                "embedding LLM '{}' not found in [llm] configuration",
                self.memory.embedding.llm
            );
        }
        anyhow::ensure!(
            self.memory.vector_weight >= 0.0 && self.memory.fts_weight >= 0.0,
            "memory weights must be non-negative"
        );
        Ok(())
    }
}

fn config_path() -> PathBuf {
    home_dir().join(".config").join("pingu").join("config.toml")
}

/// Resolve the user's home directory, falling back to the current directory.
pub fn home_dir() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

/// Expand a leading `~/` to the home directory.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        home_dir().join(rest)
    } else {
        PathBuf::from(path)
    }
}

// ─── Tests ───────────────────────────────────────────────────────
