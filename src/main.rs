use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use pingu::agent::{AgentProfile, Emit, Event, RunContext, Runner, RunnerFactory};
use pingu::channels::build_channels;
use pingu::config::Config;
use pingu::gateway::{AppState, router};
use pingu::inference::embeddings::EmbeddingProvider;
use pingu::inference::{CachedEmbedder, OpenAiEmbedder, OpenAiProvider, Provider};
use pingu::memory::{Compactor, ConversationMemory, EnhancedMemory, Memory, SemanticStore};
use pingu::persistence::{HybridSearcher, Store};
use pingu::tools::ToolRegistry;
use pingu::tools::builtins::{
    DelegateTool, FileTool, MemoryRecallTool, MemoryStoreTool, MessageTool, ShellTool, WebTool,
};

/// pingu: a personal AI assistant backbone
#[derive(Parser, Debug)]
#[command(name = "pingu", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Start the gateway server (HTTP + channels)
    Gateway {
        /// Override the listen address from config
        #[arg(long, short)]
        addr: Option<String>,
    },

    /// Run a single message through the agent and print the reply
    Chat {
        /// Session id (defaults to a fresh one)
        #[arg(long)]
        session: Option<String>,

        /// The message to send
        message: String,
    },
}

fn init_tracing() {
    // LOG_LEVEL=debug raises verbosity; default is info.
    let filter = EnvFilter::try_from_env("LOG_LEVEL").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = Config::load().with_context(|| "loading config")?;

    match cli.command {
        Commands::Gateway { addr } => run_gateway(config, addr).await,
        Commands::Chat { session, message } => run_chat(config, session, message).await,
    }
}

/// Wire the full runtime from configuration: store, provider, memory stack,
/// tool registry, profiles, and the orchestrator runner.
async fn build_runner(config: &Config) -> Result<Arc<Runner>> {
    let store = Store::open(&config.db.path).await?;

    let llm_cfg = config
        .llm
        .get(&config.default_llm)
        .with_context(|| format!("default LLM {:?} not found in config", config.default_llm))?;
    let provider: Arc<dyn Provider> = Arc::new(OpenAiProvider::new(
        &llm_cfg.base_url,
        &llm_cfg.api_key,
        &llm_cfg.model,
    )?);

    // Embedding provider (optional), wrapped in the content-addressed cache.
    let embedder: Option<Arc<dyn EmbeddingProvider>> = if config.memory.embedding.enabled {
        let embedding = &config.memory.embedding;
        let emb_llm = config
            .llm
            .get(&embedding.llm)
            .with_context(|| format!("embedding LLM {:?} not found in config", embedding.llm))?;
        let raw = OpenAiEmbedder::new(
            &emb_llm.base_url,
            &emb_llm.api_key,
            &embedding.model,
            embedding.dimensions,
        )?;
        info!(
            model = %embedding.model,
            dimensions = embedding.dimensions,
            "embedding provider enabled"
        );
        Some(Arc::new(CachedEmbedder::new(
            Arc::new(raw),
            store.clone(),
            embedding.cache_size,
        )))
    } else {
        None
    };

    let semantic_store = Arc::new(SemanticStore::new(store.clone(), embedder.clone()));
    let searcher = Arc::new(HybridSearcher::new(
        store.clone(),
        embedder,
        config.memory.vector_weight,
        config.memory.fts_weight,
    ));

    let memory: Arc<dyn Memory> = if config.memory.auto_inject {
        Arc::new(EnhancedMemory::new(
            store.clone(),
            searcher.clone(),
            config.memory.max_results,
        ))
    } else {
        Arc::new(ConversationMemory::new(store.clone()))
    };

    // Global tool registry.
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(MessageTool));
    registry.register(Arc::new(ShellTool));
    registry.register(Arc::new(FileTool));
    if !config.services.brave.api_key.is_empty() {
        registry.register(Arc::new(WebTool::new(&config.services.brave.api_key)));
    }
    registry.register(Arc::new(MemoryStoreTool::new(semantic_store.clone())));
    registry.register(Arc::new(MemoryRecallTool::new(searcher)));
    let registry = Arc::new(RwLock::new(registry));

    // Agent profiles enable the delegate tool. The tool lands in the shared
    // registry after the factory exists, so sub-agents can delegate too.
    let profiles: HashMap<String, AgentProfile> = config
        .agent
        .iter()
        .map(|(name, profile)| {
            (
                name.clone(),
                AgentProfile {
                    name: name.clone(),
                    system_prompt: profile.system_prompt.clone(),
                    tools: profile.tools.clone(),
                },
            )
        })
        .collect();
    if !profiles.is_empty() {
        let factory = Arc::new(RunnerFactory::new(
            provider.clone(),
            store.clone(),
            memory.clone(),
            registry.clone(),
            profiles.clone(),
        ));
        registry
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .register(Arc::new(DelegateTool::new(factory)));
    }

    // Orchestrator runner: "orchestrator" profile overrides prompt + scope.
    let orchestrator = profiles.get("orchestrator");
    let scoped = {
        let registry = registry.read().unwrap_or_else(|e| e.into_inner());
        match orchestrator {
            Some(profile) => registry.scope(&profile.tools),
            None => registry.clone(),
        }
    };

    let mut runner = Runner::new(provider.clone(), store.clone(), memory, scoped);
    if let Some(profile) = orchestrator
        && !profile.system_prompt.is_empty()
    {
        runner = runner.with_system_prompt(&profile.system_prompt);
    }
    if config.memory.auto_save {
        runner = runner.with_semantic_store(semantic_store);
        info!("memory auto-save enabled");
    }
    if config.memory.compaction.enabled {
        let compaction = config.memory.compaction.clone();
        info!(
            threshold = compaction.turn_threshold,
            keep_recent = compaction.keep_recent,
            "compaction enabled"
        );
        runner = runner.with_compactor(Arc::new(Compactor::new(store, provider, compaction)));
    }

    Ok(Arc::new(runner))
}

async fn run_gateway(mut config: Config, addr_override: Option<String>) -> Result<()> {
    if let Some(addr) = addr_override {
        config.gateway.addr = addr;
    }

    let runner = build_runner(&config).await?;
    let channels = build_channels(&config, runner.clone());

    let shutdown = CancellationToken::new();

    // Long-poll channel workers run for the life of the process.
    let mut channel_routers = Vec::new();
    for channel in &channels {
        if let Some(routes) = channel.routes() {
            channel_routers.push(routes);
        }
        let channel = channel.clone();
        let cancel = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = channel.start(cancel.clone()).await
                && !cancel.is_cancelled()
            {
                error!(name = %channel.name(), error = %e, "channel stopped");
            }
        });
    }

    let app = router(AppState { runner }, channel_routers);
    let bind_addr = config.gateway.bind_addr();
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    info!(addr = %config.gateway.addr, channels = channels.len(), "starting gateway");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await
        .with_context(|| "server error")?;
    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "failed to register SIGTERM handler");
            std::future::pending::<()>().await;
            unreachable!();
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
    info!("shutting down");
    shutdown.cancel();
}

async fn run_chat(config: Config, session: Option<String>, message: String) -> Result<()> {
    let runner = build_runner(&config).await?;
    let session_id = session.unwrap_or_else(|| format!("cli:{}", uuid::Uuid::new_v4()));

    let emit: Emit = Arc::new(|event| match event {
        Event::Token { content } => println!("{content}"),
        Event::Error { error } => eprintln!("error: {error}"),
        _ => {}
    });

    let ctx = RunContext::new(session_id, emit, CancellationToken::new());
    runner.run(ctx, &message).await
}
