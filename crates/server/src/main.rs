//! Voice Loop server entry point

use std::net::SocketAddr;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use voice_loop_config::{load_settings, Settings};
use voice_loop_providers::ProviderSet;
use voice_loop_server::{create_router, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let settings = load_settings(std::env::var("VOICE_LOOP_ENV").ok().as_deref())?;

    init_tracing(&settings);

    tracing::info!("starting voice-loop server v{}", env!("CARGO_PKG_VERSION"));

    // A broken detector install must fail here, not per connection.
    preflight_models(&settings)?;

    // Concrete backends live outside this repository; without one wired in,
    // the loopback set keeps the full pipeline runnable.
    tracing::warn!("no provider backend configured, using loopback providers");
    let providers = ProviderSet::loopback();

    let state = AppState::new(settings.clone(), providers);
    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", settings.server.host, settings.server.port).parse()?;
    tracing::info!("listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server shutdown complete");
    Ok(())
}

/// Verify the VAD model loads before accepting connections.
#[cfg(feature = "onnx")]
fn preflight_models(settings: &Settings) -> Result<(), Box<dyn std::error::Error>> {
    voice_loop_pipeline::vad::SileroVad::preflight(&settings.models.vad)?;
    tracing::info!(path = %settings.models.vad, "vad model loaded");
    Ok(())
}

#[cfg(not(feature = "onnx"))]
fn preflight_models(_settings: &Settings) -> Result<(), Box<dyn std::error::Error>> {
    tracing::warn!("built without onnx feature, sessions use the energy scorer");
    Ok(())
}

fn init_tracing(settings: &Settings) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("voice_loop={}", settings.observability.log_level).into());

    let fmt_layer = if settings.observability.log_json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
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
        _ = ctrl_c => {
            tracing::info!("received Ctrl+C, shutting down");
        }
        _ = terminate => {
            tracing::info!("received SIGTERM, shutting down");
        }
    }
}
