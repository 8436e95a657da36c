use anyhow::Result;
use clap::{Parser, Subcommand};
use log::{debug, info};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use query_guard_core::QueryValidator;
use query_guard_gateway::api::{create_router, AppState};
use query_guard_gateway::config::GatewayConfig;
use query_guard_gateway::warehouse::{Environment, SqlApiConnector, WarehouseConnector};
use query_guard_gateway::{build_services, Catalog, QueryGate};

#[derive(Parser, Debug)]
#[clap(author, version, about = "Warehouse Query Guard - query-safety gate for analytics dashboards")]
struct Args {
    /// Config file path
    #[clap(short, long, env = "QUERY_GUARD_CONFIG")]
    config: Option<String>,

    /// Queries allowed per identity in one window
    #[clap(long, env = "QUERY_GUARD_RATE_LIMIT")]
    rate_limit: Option<u32>,

    /// Warehouse call timeout in seconds
    #[clap(long, env = "QUERY_GUARD_QUERY_TIMEOUT")]
    query_timeout: Option<u64>,

    /// Maximum rows returned by one query
    #[clap(long, env = "QUERY_GUARD_MAX_ROWS")]
    max_rows: Option<usize>,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate a query without running it
    Check {
        /// SQL text
        query: String,
    },

    /// Validate and run a query
    Run {
        /// SQL text
        query: String,

        /// Identity the rate limit is charged to
        #[clap(long, default_value = "cli")]
        identity: String,
    },

    /// List the tables of the sample schema
    Tables,

    /// Show the detected environment and connection parameters
    Env,

    /// Serve the HTTP API
    Serve {
        /// TCP port to listen on
        #[clap(short, long, env = "QUERY_GUARD_PORT")]
        port: Option<u16>,
    },
}

fn environment(config: &GatewayConfig) -> Environment {
    Environment::new(&config.token_path, std::env::vars().collect())
}

fn services(config: &GatewayConfig) -> Result<(QueryGate, Catalog)> {
    let params = environment(config).connection_parameters()?;
    let connector: Arc<dyn WarehouseConnector> =
        Arc::new(SqlApiConnector::new(params, config.query_timeout())?);
    Ok(build_services(config, connector)?)
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine
    dotenvy::dotenv().ok();

    // Parse command-line arguments
    let args = Args::parse();

    // Load configuration
    let mut config = match &args.config {
        Some(path) => GatewayConfig::from_file(path)?,
        None => GatewayConfig::from_env()?,
    };

    // Initialize logging
    env_logger::init_from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, &config.log_level),
    );

    // Override config with command-line arguments
    if let Some(rate_limit) = args.rate_limit {
        config.rate_limiter.max_requests = rate_limit;
    }
    if let Some(query_timeout) = args.query_timeout {
        config.query_timeout_secs = query_timeout;
    }
    if let Some(max_rows) = args.max_rows {
        config.validator.max_rows = max_rows;
    }
    config.validate()?;

    match args.command {
        Command::Check { query } => {
            let validator = QueryValidator::new(config.validator.clone())?;
            let result = validator.validate(&query);
            println!("{}", serde_json::to_string_pretty(&result)?);
            if !result.allowed {
                std::process::exit(1);
            }
        }
        Command::Run { query, identity } => {
            let (gate, _) = services(&config)?;
            match gate.execute(&query, &identity).await {
                Ok(result) => println!("{}", serde_json::to_string_pretty(&result)?),
                Err(err) => {
                    eprintln!("{}: {}", err.code_str(), err.user_message());
                    std::process::exit(1);
                }
            }
        }
        Command::Tables => {
            let (_, catalog) = services(&config)?;
            let tables = catalog.list_tables().await?;
            println!("{}", serde_json::to_string_pretty(&tables)?);
        }
        Command::Env => {
            let environment = environment(&config);
            let kind = environment.kind();
            let report = match environment.connection_parameters() {
                Ok(params) => serde_json::to_value(&params)?,
                Err(err) => json!({ "kind": kind, "error": err.to_string() }),
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Serve { port } => {
            if let Some(port) = port {
                config.listen_addr.set_port(port);
            }
            let kind = environment(&config).kind();
            let (gate, catalog) = services(&config)?;

            // Drop identities whose window has emptied
            let limiter = gate.limiter().clone();
            let window = Duration::from_secs(config.rate_limiter.window_secs.max(1));
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(window);
                loop {
                    interval.tick().await;
                    let dropped = limiter.cleanup();
                    if dropped > 0 {
                        debug!("Dropped {} idle rate-limit windows", dropped);
                    }
                }
            });

            let app = create_router(Arc::new(AppState {
                gate,
                catalog,
                environment: kind,
            }));

            let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
            info!("Starting query guard ({} environment) on {}", kind, config.listen_addr);

            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    tokio::signal::ctrl_c().await.ok();
                })
                .await?;

            info!("Server stopped");
        }
    }

    Ok(())
}
