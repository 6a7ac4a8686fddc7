use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use comfygate_api::config::ServerConfig;
use comfygate_api::router::build_app_router;
use comfygate_api::state::AppState;
use comfygate_cloud::location::StoreLocation;
use comfygate_cloud::persistence::RemotePersistence;
use comfygate_cloud::s3::S3Store;
use comfygate_comfyui::engine::{Engine, EngineRoots};
use comfygate_comfyui::remote::RemoteEngine;
use comfygate_pipeline::coordinator::RunCoordinator;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "comfygate_api=debug,comfygate_pipeline=debug,comfygate_comfyui=info,tower_http=debug"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Engine ---
    let engine: Arc<dyn Engine> = Arc::new(RemoteEngine::new(&config.comfyui_url));
    let coordinator = Arc::new(RunCoordinator::new(
        engine,
        EngineRoots::under(&config.engine_root),
        Duration::from_secs(config.run_timeout_secs),
    ));
    tracing::info!(
        comfyui_url = %config.comfyui_url,
        engine_root = %config.engine_root.display(),
        run_timeout_secs = config.run_timeout_secs,
        "Run coordinator created",
    );

    // Warm the engine up in the background; a failure here is retried by
    // the first run.
    let warmup = Arc::clone(&coordinator);
    tokio::spawn(async move {
        if let Err(e) = warmup.bootstrap().ensure_ready().await {
            tracing::warn!(error = %e, "Engine bootstrap failed, will retry on first run");
        }
    });

    // --- Remote persistence ---
    let persistence = match &config.output_bucket {
        Some(raw) => {
            let location = StoreLocation::parse(raw)
                .expect("OUTPUT_BUCKET must be a bucket name or s3://bucket/prefix");
            let store = S3Store::from_env(location.bucket, config.s3_endpoint_url.as_deref()).await;
            Some(Arc::new(RemotePersistence::new(Arc::new(store), location.prefix)))
        }
        None => {
            tracing::info!("OUTPUT_BUCKET not set, remote persistence disabled");
            None
        }
    };

    // --- App state & router ---
    let state = AppState {
        config: Arc::new(config.clone()),
        coordinator,
        persistence,
    };
    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(config.host.parse().expect("Invalid HOST"), config.port);
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    tracing::info!("Graceful shutdown complete");
}

/// Wait for SIGINT (Ctrl-C) or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl-C, starting graceful shutdown"),
        _ = terminate => tracing::info!("Received SIGTERM, starting graceful shutdown"),
    }
}
