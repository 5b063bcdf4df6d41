mod console;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use switchboard_core::config::AppConfig;
use switchboard_core::event::EventBus;
use switchboard_core::types::SessionEvent;
use switchboard_credentials::{CredentialResolver, OAuthRefresher, RpcVault};
use switchboard_runtime::{
    AgentFactory, ConfigCache, GraphLoader, SessionLauncher, WorkflowTarget,
};
use switchboard_store::{SqliteStore, WorkflowBundle};
use switchboard_tools::{IntegrationEnv, ToolRegistry};

use crate::console::ConsoleHost;

#[derive(Parser)]
#[command(name = "switchboard", version, about = "Multi-agent voice workflow runtime")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "switchboard.toml", env = "SWITCHBOARD_CONFIG")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List stored workflows
    List,
    /// Load a workflow graph and print its agents, tools and paths
    Inspect {
        #[command(flatten)]
        target: TargetArgs,
        /// Print tool schemas as JSON
        #[arg(long)]
        schemas: bool,
    },
    /// Run a session in the terminal
    Chat {
        #[command(flatten)]
        target: TargetArgs,
    },
    /// Import a workflow bundle (JSON) into the database
    Import {
        /// Bundle file
        file: PathBuf,
    },
    /// Show current configuration
    Config,
}

#[derive(Args)]
struct TargetArgs {
    /// Workflow id; runs its published version unless --draft is given
    #[arg(long, required_unless_present = "version", conflicts_with = "version")]
    workflow: Option<String>,
    /// Exact workflow version id
    #[arg(long)]
    version: Option<String>,
    /// Use the latest draft instead of the published version
    #[arg(long, requires = "workflow")]
    draft: bool,
}

impl TargetArgs {
    fn target(&self) -> anyhow::Result<WorkflowTarget> {
        match (&self.version, &self.workflow) {
            (Some(version), _) => Ok(WorkflowTarget::Version(version.clone())),
            (None, Some(workflow)) => Ok(WorkflowTarget::Workflow {
                workflow_id: workflow.clone(),
                use_draft: self.draft,
            }),
            (None, None) => anyhow::bail!("either --workflow or --version is required"),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("switchboard=info,warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    if let Commands::Config = cli.command {
        println!("{}", toml::to_string_pretty(&config)?);
        return Ok(());
    }

    let db_path = config.database_path();
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let store = Arc::new(
        SqliteStore::open(&db_path)
            .with_context(|| format!("opening database {}", db_path.display()))?,
    );

    match &cli.command {
        Commands::List => {
            let workflows = store.list_workflows()?;
            if workflows.is_empty() {
                println!("No workflows. Import one with `switchboard import <bundle.json>`.");
            }
            for (workflow, latest) in workflows {
                println!(
                    "{:<38} {:<30} org={} latest={}",
                    workflow.id,
                    workflow.name,
                    workflow.organization_id,
                    latest.map(|v| v.to_string()).unwrap_or_else(|| "-".into())
                );
            }
        }
        Commands::Import { file } => {
            let raw = std::fs::read_to_string(file)
                .with_context(|| format!("reading {}", file.display()))?;
            let bundle: WorkflowBundle = serde_json::from_str(&raw)
                .with_context(|| format!("parsing {}", file.display()))?;
            store.import_bundle(&bundle)?;
            println!("Imported workflow {} ({})", bundle.workflow.name, bundle.workflow.id);
        }
        Commands::Inspect { target, schemas } => {
            let launcher = build_launcher(&config, store)?;
            let graph = launcher.resolve(&target.target()?).await?;

            println!(
                "{} v{} ({}) org={}",
                graph.workflow_name, graph.version_number, graph.version_id, graph.organization_id
            );
            for agent_config in graph.agents() {
                let entry = if agent_config.id == graph.entry_agent_id() { " [entry]" } else { "" };
                println!("\n{} ({}){}", agent_config.name, agent_config.id, entry);
                for path in &agent_config.paths {
                    println!("  path {} -> {}", path.label(), path.target_agent_id);
                }
                let agent = launcher.factory().create(agent_config, &graph);
                for tool in agent.tools() {
                    println!("  tool {:<40} {:?}", tool.name(), tool.kind());
                    if *schemas {
                        println!("{}", serde_json::to_string_pretty(&tool.input_schema())?);
                    }
                }
            }
        }
        Commands::Chat { target } => {
            let launcher = build_launcher(&config, store)?;
            let logger = spawn_event_logger(launcher.events());
            let host = Arc::new(ConsoleHost::new());
            let runtime = launcher.launch(&target.target()?, host.clone()).await?;
            let result = console::run_chat(&runtime, &host).await;
            logger.abort();
            result?;
        }
        Commands::Config => {}
    }

    Ok(())
}

fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    if path.exists() {
        return Ok(AppConfig::load(path)?);
    }
    let home_config = std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".switchboard").join("config.toml"));
    match home_config {
        Some(home) if home.exists() => {
            info!(path = %home.display(), "Loading config from home directory");
            Ok(AppConfig::load(&home)?)
        }
        _ => {
            warn!(path = %path.display(), "No config file found; using defaults");
            Ok(AppConfig::default())
        }
    }
}

/// Tool registry with the integration builders when a vault is configured,
/// otherwise an empty one.
fn build_registry(config: &AppConfig, store: Arc<SqliteStore>) -> anyhow::Result<ToolRegistry> {
    let vault = match RpcVault::new(&config.vault) {
        Ok(vault) => Arc::new(vault),
        Err(e) => {
            warn!(error = %e, "Vault not configured; integration tools are disabled");
            return Ok(ToolRegistry::new());
        }
    };

    let timeout = config.integrations.http_timeout_secs;
    let credentials = CredentialResolver::new(vault, store, config.integrations.refresh_margin_secs)
        .with_refresher(Arc::new(OAuthRefresher::airtable(&config.integrations.airtable, timeout)?))
        .with_refresher(Arc::new(OAuthRefresher::gmail(&config.integrations.gmail, timeout)?));

    let env = IntegrationEnv::new(Arc::new(credentials), config.integrations.clone())?;
    Ok(ToolRegistry::with_integrations(Arc::new(env)))
}

fn build_launcher(config: &AppConfig, store: Arc<SqliteStore>) -> anyhow::Result<SessionLauncher> {
    let registry = build_registry(config, store.clone())?;
    debug!(tool_types = ?registry.tool_types(), "Tool registry ready");
    let factory = AgentFactory::new(Arc::new(registry), config.speech.clone());
    Ok(SessionLauncher::new(
        GraphLoader::new(store),
        Arc::new(ConfigCache::new()),
        Arc::new(factory),
        Arc::new(EventBus::default()),
    )
    .with_tool_timeout(config.session.tool_timeout_secs))
}

fn spawn_event_logger(events: &EventBus) -> tokio::task::JoinHandle<()> {
    let mut rx = events.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = rx.recv().await {
            match event {
                SessionEvent::Started { session_id, workflow_id, version_id } => {
                    info!(session = %session_id, workflow = %workflow_id, version = %version_id, "Session started")
                }
                SessionEvent::AgentEntered { session_id, agent_id, agent_name } => {
                    info!(session = %session_id, agent_id = %agent_id, agent = %agent_name, "Agent entered")
                }
                SessionEvent::ToolStarted { session_id, tool } => {
                    debug!(session = %session_id, tool = %tool, "Tool started")
                }
                SessionEvent::ToolFinished { session_id, tool, is_error } => {
                    debug!(session = %session_id, tool = %tool, is_error, "Tool finished")
                }
                SessionEvent::VariableCaptured { session_id, path_id, variable } => {
                    info!(session = %session_id, path = %path_id, variable = %variable, "Variable captured")
                }
                SessionEvent::Transferred { session_id, from_agent_id, to_agent_id } => {
                    info!(session = %session_id, from = %from_agent_id, to = %to_agent_id, "Transferred")
                }
            }
        }
    })
}
