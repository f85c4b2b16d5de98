//! Main Entrypoint for the Fast Pass Skill Service
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Initializing logging.
//! 3. Building the completion client and the skill.
//! 4. Constructing the Axum router.
//! 5. Starting the web server and handling graceful shutdown.

use anyhow::Context;
use fastpass_api::{config::Config, router::create_router, state::AppState};
use fastpass_core::{
    Skill,
    llm_client::{CompletionConfig, OpenAICompletionClient},
    speech::Voice,
};
use std::sync::Arc;
use tracing::info;

/// Listens for the `Ctrl+C` signal to gracefully shut down the server.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal. Shutting down gracefully...");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();
    info!("Configuration loaded. Initializing skill...");

    // --- 3. Initialize the Skill ---
    let bind_address = config.bind_address;
    let completion_config = CompletionConfig::builder(config.openai_api_key)
        .with_api_base(&config.openai_api_base)
        .with_model(&config.chat_model)
        .with_system_prompt(&config.system_prompt)
        .with_max_tokens(config.max_tokens)
        .with_temperature(config.temperature)
        .build();
    let completion = Arc::new(OpenAICompletionClient::new(completion_config));
    let skill = Skill::new(completion, Voice::new(config.voice_name.as_str()));

    if config.skill_id.is_none() {
        info!("SKILL_ID not set; accepting requests for any application id.");
    }
    let app_state = Arc::new(AppState::new(skill, config.skill_id));

    // --- 4. Create Router ---
    let app = create_router(app_state);

    // --- 5. Start Server ---
    info!(
        model = %config.chat_model,
        voice = %config.voice_name,
        bind_address = %bind_address,
        "Service configured. Starting server..."
    );
    let listener = tokio::net::TcpListener::bind(bind_address)
        .await
        .with_context(|| format!("Failed to bind {bind_address}"))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server has shut down.");
    Ok(())
}
