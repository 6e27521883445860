use anyhow::Result;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use webinar_gateway::{config, middleware, routes, session};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env first so the setup check sees its values
    dotenvy::dotenv().ok();

    // Check if interactive setup is needed (no .env and missing credentials)
    if config::needs_interactive_setup() {
        if let Some(interactive) = config::run_interactive_setup()? {
            // Set environment variables so Config::load() picks them up
            std::env::set_var("ZOOM_ACCOUNT_ID", &interactive.account_id);
            std::env::set_var("ZOOM_CLIENT_ID", &interactive.client_id);
            std::env::set_var("ZOOM_CLIENT_SECRET", &interactive.client_secret);
        }
    }

    // Load configuration first (for log level)
    let config = config::Config::load()?;
    config.validate()?;

    // Initialize logging with a configured level
    let log_level = config.log_level.to_lowercase();
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("Webinar Gateway starting...");
    tracing::info!(
        "Server configured: {}:{}",
        config.server_host,
        config.server_port
    );

    let sessions = Arc::new(session::SessionSlot::new(session::SessionSettings::from(
        &config,
    )));

    // Try to auto-configure from credentials supplied at startup
    match config.zoom.clone() {
        Some(zoom) => match sessions.configure(zoom).await {
            Ok(session) => {
                tracing::info!("Auto-configured Zoom API from environment variables");
                match session.manager.get_authorization(false).await {
                    Ok(token) => tracing::info!(
                        "Authentication successful (token: {}...)",
                        token.chars().take(12).collect::<String>()
                    ),
                    Err(e) => {
                        tracing::error!("Authentication failed: {}", e);
                        tracing::warn!(
                            "Server will start but Zoom requests will fail until credentials are fixed"
                        );
                    }
                }
            }
            Err(e) => tracing::warn!("Auto-configuration failed: {:#}", e),
        },
        None => {
            tracing::info!("Zoom credentials not found. Manual configuration required.");
        }
    }

    let app_state = routes::AppState {
        gateway_api_key: config.gateway_api_key.clone(),
        sessions: sessions.clone(),
        config: Arc::new(config.clone()),
    };

    let app = build_app(app_state);

    // Bind to configured host and port
    let addr = format!("{}:{}", config.server_host, config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    print_startup_banner(&config);

    tracing::info!("Server listening on http://{}", addr);

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    // Release the session on every exit path
    tracing::info!("Cleaning up resources...");
    sessions.shutdown().await;
    served?;

    tracing::info!("Server shutdown complete");

    Ok(())
}

/// Build the application with all routes and middleware
fn build_app(state: routes::AppState) -> axum::Router {
    use axum::Router;

    Router::new()
        .merge(routes::health_routes())
        .merge(routes::tool_routes(state))
        .layer(middleware::cors_layer())
        .layer(TraceLayer::new_for_http())
}

/// Print startup banner
fn print_startup_banner(config: &config::Config) {
    println!();
    println!("  Webinar Gateway");
    println!("  Version:      {}", env!("CARGO_PKG_VERSION"));
    println!(
        "  Server:       http://{}:{}",
        config.server_host, config.server_port
    );
    println!("  Token store:  {}", config.token_file.display());
    println!("  Refresh buffer: {} minutes", config.refresh_buffer_minutes);
    println!(
        "  Zoom:         {}",
        if config.zoom.is_some() {
            "configured"
        } else {
            "not configured"
        }
    );
    println!("  Log Level:    {}", config.log_level);
    println!();
}

/// Handle graceful shutdown signal
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal, initiating graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown...");
        },
    }
}
