use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use leaf_disease_detection::{
    build_router,
    cli::{execute_command, Cli, Commands},
    config::{Config, DatabaseConfig, LogFormat, LoggingConfig},
    server::AppState,
    storage::SqliteStorage,
    vision::VisionClient,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command.clone() {
        Some(command @ (Commands::Stats | Commands::History { .. })) => {
            run_offline(command).await
        }
        Some(Commands::Serve) | None => serve(cli).await,
    }
}

/// Run a database command without touching the vision API
async fn run_offline(command: Commands) -> anyhow::Result<()> {
    init_logging(&LoggingConfig::from_env());

    let database = DatabaseConfig::from_env();
    let storage = match SqliteStorage::new(&database).await {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, path = %database.path.display(), "Failed to open database");
            return Err(e.into());
        }
    };

    let result = execute_command(command, &storage).await;
    storage.close().await;

    if result.exit_code == 0 {
        println!("{}", result.message);
        Ok(())
    } else {
        eprintln!("{}", result.message);
        std::process::exit(result.exit_code);
    }
}

async fn serve(cli: Cli) -> anyhow::Result<()> {
    // Load configuration
    let mut config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    init_logging(&config.logging);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Leaf Disease Detection API starting..."
    );

    // Initialize storage
    let storage = match SqliteStorage::new(&config.database).await {
        Ok(s) => {
            info!(path = %config.database.path.display(), "Database initialized");
            s
        }
        Err(e) => {
            error!(error = %e, "Failed to initialize database");
            return Err(e.into());
        }
    };

    // Initialize vision client
    let vision = match VisionClient::new(&config.vision, config.request.clone()) {
        Ok(c) => {
            info!(
                base_url = %config.vision.base_url,
                model = %config.vision.model,
                "Vision client initialized"
            );
            c
        }
        Err(e) => {
            error!(error = %e, "Failed to initialize vision client");
            return Err(e.into());
        }
    };

    let addr = config.server.bind_addr();
    let state = Arc::new(AppState::new(config, storage.clone(), Arc::new(vision)));
    let app = build_router(state);

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            error!(error = %e, addr = %addr, "Failed to bind listener");
            return Err(e.into());
        }
    };

    info!(addr = %addr, "Server ready, listening for requests");

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    storage.close().await;
    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

/// Initialize tracing/logging
fn init_logging(config: &LoggingConfig) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    match config.format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}
