//! USSD dialogue service
//!
//! Serves the feature-phone menu of the training platform: learners log in
//! with an anonymous access code, browse their courses and progress, and get
//! SMS nudges, all over a telecom gateway's USSD callbacks.

mod api;
mod config;
mod dialogue;
mod learning;
mod notify;
mod session;

#[cfg(test)]
mod testing;

use api::{create_router, AppState, Engine};
use config::{Config, SessionBackend};
use dialogue::MenuRenderer;
use learning::{CourseCatalog, FixtureCatalog, LearnerDirectory, PlatformClient};
use notify::{LogChannel, NotificationChannel, NotificationDispatcher, SmsGatewayChannel};
use session::{MemorySessionStore, SessionReaper, SessionStore, SqliteSessionStore};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ussd_dialogue=info,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(false),
        )
        .init();

    let config = Config::from_env()?;

    // Session store
    let store: Arc<dyn SessionStore> = match &config.backend {
        SessionBackend::Memory => {
            tracing::info!("Keeping sessions in memory");
            Arc::new(MemorySessionStore::new(config.session_timeout))
        }
        SessionBackend::Sqlite { path } => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            tracing::info!(path = %path.display(), "Opening session database");
            Arc::new(SqliteSessionStore::open(path, config.session_timeout)?)
        }
    };

    // Learning platform
    let (directory, catalog): (Arc<dyn LearnerDirectory>, Arc<dyn CourseCatalog>) =
        if let Some(platform) = &config.platform {
            tracing::info!(url = %platform.base_url, "Using learning platform backend");
            let client = Arc::new(PlatformClient::new(&platform.base_url, platform.token.clone())?);
            (client.clone() as Arc<dyn LearnerDirectory>, client as Arc<dyn CourseCatalog>)
        } else {
            let fixture = Arc::new(FixtureCatalog::load(&config.fixture_path)?);
            tracing::warn!(
                path = %config.fixture_path.display(),
                learners = fixture.learner_count(),
                "PLATFORM_API_URL not set, serving learning data from fixture file"
            );
            (fixture.clone() as Arc<dyn LearnerDirectory>, fixture as Arc<dyn CourseCatalog>)
        };

    // SMS
    let channel: Arc<dyn NotificationChannel> = if let Some(sms) = &config.sms {
        Arc::new(SmsGatewayChannel::new(
            &sms.api_url,
            &sms.api_key,
            &sms.username,
            sms.sender_id.clone(),
        )?)
    } else {
        tracing::warn!("SMS gateway not configured. Notifications will only be logged.");
        Arc::new(LogChannel)
    };
    let notifier = NotificationDispatcher::new(channel, &config.service_code);

    let engine = Arc::new(Engine::new(
        store.clone(),
        directory,
        catalog,
        notifier,
        MenuRenderer::new(&config.external_url),
        config.max_screen_chars,
    ));

    // Expired session cleanup
    let shutdown = CancellationToken::new();
    let reaper = SessionReaper::new(store, config.sweep_interval).spawn(shutdown.clone());

    // Create router
    let state = AppState::new(engine.clone(), config.timeout_label());

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let compression = CompressionLayer::new()
        .gzip(true)
        .br(true)
        .deflate(true)
        .zstd(true);

    let app = create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(compression);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!(
        %addr,
        timeout_secs = config.session_timeout.as_secs(),
        service_code = %config.service_code,
        "USSD dialogue server listening"
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
            }
            tracing::info!("Shutting down");
        })
        .await?;

    shutdown.cancel();
    reaper.await?;
    engine.notifier().flush().await;

    Ok(())
}
