//! StarNarrator command line: inspect a saved canvas or run one of its nodes

#![warn(clippy::all)]

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use bpaf::Bpaf;
use thiserror::Error;

use starnarrator_canvas::media::InMemoryMediaCache;
use starnarrator_canvas::prompt::effective_prompt;
use starnarrator_canvas::remote::HttpGateway;
use starnarrator_canvas::{
    persist, Adapters, AdapterError, ConfigError, EngineSettings, GraphStore, NodeId, NodeType,
    PersistError, Studio, StudioConfig,
};

#[derive(Debug, Clone, Bpaf)]
#[bpaf(options, version)]
/// Node-graph workflow engine for AI image and video generation
struct Cli {
    /// JSON config file; STARNARRATOR_* variables override it
    #[bpaf(long, short, argument("PATH"))]
    config: Option<PathBuf>,
    #[bpaf(external(action))]
    action: Action,
}

#[derive(Debug, Clone, Bpaf)]
enum Action {
    /// List nodes, edges and effective prompts
    #[bpaf(command)]
    Inspect {
        /// Workflow file
        #[bpaf(positional("WORKFLOW"))]
        workflow: PathBuf,
    },
    /// Run one node and save the result into the workflow file
    #[bpaf(command)]
    Run {
        /// Workflow file
        #[bpaf(positional("WORKFLOW"))]
        workflow: PathBuf,
        /// Id of the node to run
        #[bpaf(positional("NODE"))]
        node: String,
    },
}

#[derive(Error, Debug)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Persist(#[from] PersistError),
    #[error(transparent)]
    Adapter(#[from] AdapterError),
    #[error("no node {0:?} in workflow")]
    UnknownNode(String),
    #[error("{0} is not configured")]
    MissingCredentials(&'static str),
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();
    let cli = cli().run();

    match dispatch(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("{}", err);
            eprintln!("error: {}", err);
            ExitCode::FAILURE
        }
    }
}

async fn dispatch(cli: Cli) -> Result<(), CliError> {
    let config = StudioConfig::discover(cli.config.as_deref())?;
    match cli.action {
        Action::Inspect { workflow } => {
            let store = persist::load(&workflow, config.history_limit)?;
            inspect(&store);
            Ok(())
        }
        Action::Run { workflow, node } => run_node(&config, &workflow, NodeId::new(node)).await,
    }
}

fn inspect(store: &GraphStore) {
    println!("{} nodes, {} edges", store.node_count(), store.edges().len());
    for node in store.nodes() {
        println!(
            "  {:<10} {:<7} {} ({})",
            node.node_type().as_str(),
            node.data.status.as_str(),
            node.id,
            node.data.label
        );
        if node.node_type().is_generation() {
            if let Some(prompt) = effective_prompt(store, &node.id) {
                println!("             prompt: {}", prompt);
            }
        }
        if let Some(message) = &node.data.error_message {
            println!("             error: {}", message);
        }
    }
    for edge in store.edges() {
        println!("  {} -> {}", edge.source, edge.target);
    }
}

async fn run_node(config: &StudioConfig, workflow: &Path, id: NodeId) -> Result<(), CliError> {
    let store = persist::load(workflow, config.history_limit)?;
    let node_type = store
        .node(&id)
        .map(|node| node.node_type())
        .ok_or_else(|| CliError::UnknownNode(id.to_string()))?;

    let needs_text = matches!(node_type, NodeType::Script | NodeType::Character);
    let needs_channel = matches!(
        node_type,
        NodeType::Character | NodeType::Image | NodeType::Video
    );
    if needs_text && !config.text_engine.is_configured() {
        return Err(CliError::MissingCredentials("text engine api key"));
    }
    if needs_channel && !config.channel.is_configured() {
        return Err(CliError::MissingCredentials("generation channel"));
    }

    let gateway = Arc::new(HttpGateway::new()?);
    let studio = Studio::new(
        store,
        Adapters::from_gateway(gateway, Arc::new(InMemoryMediaCache::new())),
        EngineSettings::from(config),
    );

    studio
        .process_node(&id, &config.channel, &config.text_engine)
        .await;
    studio.shutdown();

    if let Some(node) = studio.node(&id) {
        match &node.data.error_message {
            Some(message) => println!("{} failed: {}", id, message),
            None => println!("{} {}", id, node.data.status),
        }
    }
    studio.with_store(|store| persist::save(store, workflow))?;
    Ok(())
}
