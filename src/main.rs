mod config;
mod db;
mod db_types;
mod error;
mod handlers;
mod ivr;
mod session;
mod signature;
mod tasks;
mod twilio_types;
mod types;

use crate::config::Config;
use crate::consts::IVR_PATH;
use crate::types::AppState;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::prelude::*;

pub mod consts {
    pub const APP_GREETING: &str = "Thanks for calling.";
    pub const HOLD_MESSAGE: &str = "Please hold while I connect you to the front desk.";
    pub const IVR_PATH: &str = "/twilio/voice/ivr";
}

pub fn app(app_state: Arc<AppState>) -> Router {
    let twilio = Router::new()
        .route("/twilio/voice/incoming", post(handlers::incoming_call))
        .route(IVR_PATH, post(handlers::ivr_turn))
        .route("/twilio/voice/status", post(handlers::status_callback))
        .route_layer(middleware::from_fn_with_state(
            app_state.clone(),
            signature::verify_twilio_signature,
        ));

    Router::new()
        .merge(twilio)
        .route("/healthz", get(|| async { "ok" }))
        .with_state(app_state)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error=%e, "failed to listen for shutdown signal");
    }
    info!("shutting down");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // A missing .env file is fine; the environment may already be populated.
    dotenvy::dotenv().ok();
    let subscriber = tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_file(true)
                .with_line_number(true),
        )
        .with(tracing_subscriber::filter::Targets::new().with_targets([
            ("hyper", tracing_subscriber::filter::LevelFilter::OFF),
            ("sqlx", tracing_subscriber::filter::LevelFilter::WARN),
            ("twilio_ivr", tracing_subscriber::filter::LevelFilter::DEBUG),
        ]));
    tracing::subscriber::set_global_default(subscriber)?;

    let config = Config::from_env()?;
    if config.twilio_auth_token.is_none() {
        info!("TWILIO_AUTH_TOKEN not set; webhook signatures will not be checked");
    }
    let db_pool = match config.database_url.as_deref() {
        Some(url) => Some(db::connect(url).await?),
        None => None,
    };

    let bind_addr = config.bind_addr;
    let sweep_interval = config.session_sweep_interval;
    let app_state = Arc::new(AppState::new(config, db_pool));
    tokio::spawn(tasks::sweep_expired_sessions(
        app_state.clone(),
        sweep_interval,
    ));

    info!(%bind_addr, "listening");
    axum::Server::bind(&bind_addr)
        .serve(app(app_state).into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}
