use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;

mod auth;
mod config;
mod error;
mod http_client;
mod middleware;
mod ownership;
mod routes;

#[tokio::main]
async fn main() -> Result<()> {
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

    tracing::info!("🚀 Webflow proxy starting...");
    tracing::info!(
        "Server configured: {}:{}",
        config.server_host,
        config.server_port
    );

    // Credential storage
    tracing::info!(
        "Opening credential store: {}",
        config.credentials_db_file.display()
    );
    let store = Arc::new(auth::SqliteStore::open(&config.credentials_db_file)?);

    // Credential manager, built once and shared by handle
    let oauth = auth::OAuthClient::new(config.oauth.clone(), config.http_request_timeout)?;
    let credentials = auth::CredentialManager::new(
        store,
        config.credentials_storage_key.clone(),
        oauth,
        config.token_refresh_threshold,
    );

    match credentials.state() {
        Ok(auth::CredentialState::Authorized) => {
            tracing::info!("✅ Stored credentials found");
        }
        Ok(auth::CredentialState::Expired) => {
            tracing::warn!("Stored access token is expired, it will be refreshed on first use");
        }
        Ok(auth::CredentialState::Unauthenticated) => {
            tracing::warn!(
                "No credentials stored yet. Visit http://{}:{}{} to authorize",
                config.server_host,
                config.server_port,
                error::AUTHORIZE_PATH
            );
        }
        Err(e) => {
            tracing::error!("❌ Failed to read stored credentials: {}", e);
        }
    }

    let refresh_task = auth::spawn_refresh_task(
        credentials.clone(),
        Duration::from_secs(config.token_refresh_interval),
    );

    let cms_client = Arc::new(http_client::CmsHttpClient::new(
        credentials.clone(),
        &config.cms_api_base_url,
        config.http_connect_timeout,
        config.http_request_timeout,
    )?);
    tracing::info!("✅ CMS client initialized ({})", config.cms_api_base_url);

    let app_state = routes::AppState {
        proxy_api_key: config.proxy_api_key.clone(),
        credentials,
        cms_client,
    };

    let app = build_app(app_state);

    let addr = format!("{}:{}", config.server_host, config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    print_startup_banner(&config);

    tracing::info!("🚀 Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    refresh_task.abort();
    tracing::info!("👋 Server shutdown complete");

    Ok(())
}

/// Build the application with all routes and middleware
fn build_app(state: routes::AppState) -> axum::Router {
    use axum::Router;

    Router::new()
        .merge(routes::health_routes())
        .merge(routes::auth_routes(state.clone()))
        .merge(routes::cms_routes(state))
        .layer(middleware::cors_layer())
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Print startup banner
fn print_startup_banner(config: &config::Config) {
    println!();
    println!("  Webflow Proxy {}", env!("CARGO_PKG_VERSION"));
    println!(
        "  Server:      http://{}:{}",
        config.server_host, config.server_port
    );
    println!("  CMS API:     {}", config.cms_api_base_url);
    println!("  Credentials: {}", config.credentials_db_file.display());
    println!(
        "  API key:     {}",
        if config.proxy_api_key.is_some() {
            "required"
        } else {
            "disabled"
        }
    );
    println!("  Log Level:   {}", config.log_level);
    println!();
}

/// Handle graceful shutdown signal
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
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
