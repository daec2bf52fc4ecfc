//! Confidant CLI and HTTP API entry point.
//!
//! Binary name: `confidant`
//!
//! Parses CLI arguments, initializes tracing and application state, then
//! dispatches to the command handler or starts the HTTP server.

mod cli;
mod http;
mod state;

use clap::Parser;

use confidant_observe::tracing_setup::{TracingOptions, init_tracing, shutdown_tracing};

use cli::{Cli, Commands};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing(&TracingOptions {
        default_filter: TracingOptions::filter_for_verbosity(cli.verbose, cli.quiet).to_string(),
        json: cli.json_logs,
        otel: cli.otel,
    })
    .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    let result = run(cli).await;
    shutdown_tracing();
    result
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Serve {
            port,
            host,
            ephemeral,
        } => {
            let state = AppState::init(ephemeral).await?;

            let addr = format!("{host}:{port}");
            let listener = tokio::net::TcpListener::bind(&addr).await?;

            println!(
                "  {} Confidant listening on {} ({} store)",
                console::style("⚡").bold(),
                console::style(format!("http://{addr}")).cyan(),
                state.store_kind,
            );
            println!(
                "  {}",
                console::style(format!("Data directory: {}", state.data_dir.display())).dim()
            );
            println!("  {}", console::style("Press Ctrl+C to stop").dim());

            let router = http::router::build_router(state.clone());

            axum::serve(listener, router)
                .with_graceful_shutdown(shutdown_signal())
                .await?;

            state.drain().await;
            println!("\n  Server stopped.");
        }

        Commands::Respond {
            user,
            action,
            text,
            len,
            timezone,
            json,
        } => {
            let state = AppState::init(false).await?;
            let body = cli::respond::request_body(user, action, text, len, timezone);
            cli::respond::respond(&state, body, json).await?;
        }

        Commands::Chat { user, len } => {
            let state = AppState::init(false).await?;
            cli::chat::chat(&state, user, len).await?;
        }

        Commands::Stream { user, message, len } => {
            let state = AppState::init(false).await?;
            cli::respond::stream(&state, user, message, len).await?;
        }
    }

    Ok(())
}

/// Wait for Ctrl+C or SIGTERM for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
