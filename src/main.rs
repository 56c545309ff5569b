// Main entry point for the image-upscaler server.
// Reads configuration, decides once whether the remote AI upscaler is
// available, builds the Axum router and serves it until shutdown.

mod config;
mod gatekeeper;
mod image_codec;
mod shutdown_signal;
mod upscaler;
mod web;

use clap::Parser;
use config::AppConfig;
use tracing::Level;
use upscaler::UpscaleBackend;
use web::AppState;

#[tokio::main]
async fn main() {
    // A missing .env file is fine; real environment variables still apply
    let dotenv_result = dotenvy::dotenv();

    // Parse command line args and environment variables
    let config = AppConfig::parse();

    // Logs go to stdout
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("Starting image-upscaler...");
    if let Ok(path) = dotenv_result {
        tracing::info!("Loaded environment from {}", path.display());
    }

    let policy = config.upload_policy();
    tracing::info!("Maximum upload size: {}MB", policy.max_file_size_mb());

    // Decided once; the health endpoint reports it for the lifetime of the process
    let backend = UpscaleBackend::initialize(&config.upscaler_config());
    if !backend.is_ai_available() {
        tracing::warn!("Responses will be labelled 'fallback_' until the server is restarted with valid credentials.");
    }

    let state = AppState::new(policy, backend).with_static_dir(config.static_dir.clone());
    let app = web::create_app(state);

    tracing::info!("Axum router configured.");

    let listener = match web::create_listener(&config.host, config.port).await {
        Ok((addr, l)) => {
            tracing::info!("Server successfully bound. Listening on {}", addr);
            l
        }
        Err(e) => {
            tracing::error!("FATAL: Failed to bind server: {}", e);
            eprintln!("FATAL: Could not bind server. Error: {}. Exiting.", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal::shutdown_signal())
        .await
    {
        tracing::error!("Server run error: {}", e);
        eprintln!("ERROR: Server shut down unexpectedly. Error: {}", e);
    }

    tracing::info!("image-upscaler has shut down.");
}
