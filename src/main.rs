use anyhow::{Context, Result};
use axum::Router;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;

use social_dispatch::config::Config;
use social_dispatch::services::captions::TemplateCaptions;
use social_dispatch::services::deps::PostingDeps;
use social_dispatch::services::events::{PostEvent, PostEvents};
use social_dispatch::services::linkedin::LinkedInClient;
use social_dispatch::store::PgStore;
use social_dispatch::workers::{self, Workers};
use social_dispatch::{AppState, logging, routes};

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();

    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!("Configuration loaded");

    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;

    let linkedin =
        LinkedInClient::new(config.linkedin.clone()).context("Failed to build LinkedIn client")?;

    let events = PostEvents::default();
    let deps = PostingDeps::postgres(
        PgStore::new(pool),
        Arc::new(linkedin.clone()),
        Arc::new(TemplateCaptions::new(config.brand_hashtag.clone())),
        events.clone(),
        config.policy.clone(),
    );

    spawn_event_observer(&events);

    let periodic = Workers::new(&deps, &config.workers);
    tokio::spawn({
        let worker_config = config.workers.clone();
        async move {
            if let Err(e) = workers::run_workers(periodic, worker_config).await {
                tracing::error!(error = %e, "Workers stopped");
            }
        }
    });

    let state = Arc::new(AppState { deps, linkedin });

    let app = Router::new()
        .merge(routes::build_routes())
        .with_state(state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    tracing::info!("Listening on http://{}", addr);
    axum::serve(listener, app).await.context("Server failed")?;
    Ok(())
}

/// Log every publish outcome; stands in for a real-time delivery layer
fn spawn_event_observer(events: &PostEvents) {
    let mut rx = events.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let payload = serde_json::to_string(&event).unwrap_or_default();
                    match event {
                        PostEvent::PostSuccess { social_post_id, .. } => {
                            tracing::info!(social_post_id, %payload, "post event")
                        }
                        PostEvent::PostFailed { social_post_id, .. } => {
                            tracing::warn!(social_post_id, %payload, "post event")
                        }
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event observer lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}
