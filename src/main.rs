use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use assassin::{
    api,
    auth::{AdminAuthConfig, SweepSecret},
    config::{GameConfig, ServerConfig},
    mail::MailConfig,
    state::AppState,
    store::RingStore,
    sweeper,
};

#[tokio::main]
async fn main() {
    // Load .env file if present (before any env var reads)
    if let Err(e) = dotenvy::dotenv() {
        // Not an error if .env doesn't exist, only log if it's a different issue
        if !matches!(e, dotenvy::Error::Io(_)) {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "assassin=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Assassin...");

    let server_config = ServerConfig::from_env();
    let game_config = GameConfig::from_env();
    tracing::info!(
        policy = ?game_config.policy,
        review_minutes = game_config.review_window.num_minutes(),
        "Game configured"
    );

    let admin_auth = Arc::new(AdminAuthConfig::from_env());
    if server_config.cron_secret.is_none() {
        tracing::warn!("CRON_SECRET not set - anyone can trigger the auto-approve sweep");
    }
    let sweep_secret = Arc::new(SweepSecret(server_config.cron_secret.clone()));

    let mailer = match MailConfig::from_env().build_mailer() {
        Ok(mailer) => {
            tracing::info!("Mail gateway: {}", mailer.name());
            mailer
        }
        Err(e) => {
            tracing::error!("Failed to initialize mail gateway: {}", e);
            std::process::exit(1);
        }
    };

    let store = match &server_config.state_file {
        Some(path) => match RingStore::open(path.clone()).await {
            Ok(store) => {
                tracing::info!("Persisting state to {}", path.display());
                store
            }
            Err(e) => {
                tracing::error!("Failed to open state file {}: {}", path.display(), e);
                std::process::exit(1);
            }
        },
        None => {
            tracing::warn!("STATE_FILE not set - game state lives in memory only");
            RingStore::new()
        }
    };

    let state = Arc::new(AppState::with_parts(store, mailer, game_config));

    if let Some(interval) = server_config.sweep_interval {
        sweeper::spawn_auto_approve_sweeper(state.clone(), interval);
    }

    let app = api::router(state, admin_auth, sweep_secret)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let listener = match tokio::net::TcpListener::bind(&server_config.bind_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", server_config.bind_addr, e);
            std::process::exit(1);
        }
    };
    tracing::info!("Listening on http://{}", server_config.bind_addr);

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
