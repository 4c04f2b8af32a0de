mod config;

use clap::{Parser, Subcommand};
use config::OmnigateConfig;
use omnigate_gateway::{AuthConfig, GatewayServer};
use omnigate_orchestrator::{
    AutonomousLoop, Collaborators, HealthMonitor, WorkflowCoordinator, WorkflowRequest,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "omnigate", about = "Omnigate: AI gateway workflow orchestrator")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "omnigate.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway server
    Serve {
        /// Host to bind to (overrides config)
        #[arg(long)]
        host: Option<String>,
        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Run one workflow request (JSON) to completion and print its result
    Run {
        /// Request file, or `-` for stdin
        request: PathBuf,
    },
    /// Manage tools
    Tools {
        #[command(subcommand)]
        action: ToolsAction,
    },
}

#[derive(Subcommand)]
enum ToolsAction {
    /// List enabled tools
    List,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            return Err(e.into());
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let cli = Cli::parse();
    let config = OmnigateConfig::load(&cli.config).await?;

    match cli.command {
        Commands::Serve { host, port } => serve(config, host, port).await?,
        Commands::Run { request } => run(config, request).await?,
        Commands::Tools { action } => match action {
            ToolsAction::List => {
                let registry = config.tool_registry()?;
                let tools = registry.list_descriptors();
                if tools.is_empty() {
                    println!("No tools enabled.");
                } else {
                    println!("Enabled tools:");
                    for tool in &tools {
                        println!("  {}: {}", tool.name, tool.description);
                    }
                    println!("\nTotal: {} tool(s)", tools.len());
                }
            }
        },
    }

    Ok(())
}

fn build(config: &OmnigateConfig) -> anyhow::Result<(Arc<WorkflowCoordinator>, Arc<AutonomousLoop>)> {
    let tools = config.tool_registry()?;
    info!(count = tools.tool_count(), "Tools registered");
    let collaborators = Collaborators {
        tools: Arc::new(tools),
        ..Collaborators::in_memory()
    };
    let health = Arc::new(HealthMonitor::new(
        collaborators.probes(),
        Arc::clone(&collaborators.metrics),
    ));
    let coordinator = WorkflowCoordinator::new(config.orchestrator.clone(), collaborators);
    let autonomy = AutonomousLoop::new(Arc::clone(&coordinator), health);
    Ok((coordinator, autonomy))
}

async fn serve(config: OmnigateConfig, host: Option<String>, port: Option<u16>) -> anyhow::Result<()> {
    let host = host.unwrap_or_else(|| config.server.host.clone());
    let port = port.unwrap_or(config.server.port);
    info!("Starting omnigate gateway on {}:{}", host, port);

    let (coordinator, autonomy) = build(&config)?;

    let auth = AuthConfig::new(
        config.security.api_keys.clone(),
        config.security.admin_keys.clone(),
    );
    if auth.is_enabled() {
        info!(
            keys = config.security.api_keys.len(),
            admin_keys = config.security.admin_keys.len(),
            "API key auth enabled"
        );
    }

    if config.server.autonomous {
        autonomy.start();
    }

    let app = GatewayServer::build_with_auth(coordinator, Arc::clone(&autonomy), auth);
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Omnigate gateway listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %e, "Failed to listen for shutdown signal");
            }
            info!("Shutdown signal received");
        })
        .await?;

    autonomy.stop().await;
    Ok(())
}

async fn run(config: OmnigateConfig, path: PathBuf) -> anyhow::Result<()> {
    let raw = if path.as_os_str() == "-" {
        tokio::task::spawn_blocking(|| std::io::read_to_string(std::io::stdin())).await??
    } else {
        tokio::fs::read_to_string(&path).await.map_err(|e| {
            anyhow::anyhow!("Failed to read request file '{}': {}", path.display(), e)
        })?
    };
    let request: WorkflowRequest = serde_json::from_str(&raw)?;

    let (coordinator, _) = build(&config)?;
    let workflow = coordinator.create_workflow(request).await?;
    info!(workflow_id = %workflow.id, tasks = workflow.tasks.len(), "Running workflow");

    let result = coordinator.execute_workflow(&workflow.id).await?;
    let output = serde_json::json!({
        "id": workflow.id,
        "status": "completed",
        "result": result,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
