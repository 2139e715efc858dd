use clap::{Parser, ValueEnum};
use dotenvy::dotenv;
use pifuhd_api::config::AppConfig;
use pifuhd_api::infrastructure::{collaborators, database, storage};
use pifuhd_api::services::storage::BlobStore;
use pifuhd_api::services::worker::{JobWorker, WorkerSettings};
use pifuhd_api::{API_PREFIX, AppState, create_app};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Mode {
    Api,
    Worker,
    All,
}

impl Mode {
    fn runs_api(self) -> bool {
        matches!(self, Mode::Api | Mode::All)
    }

    fn runs_worker(self) -> bool {
        matches!(self, Mode::Worker | Mode::All)
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Service type to run
    #[arg(short, long, value_enum, default_value_t = Mode::All)]
    mode: Mode,

    /// Port for the API server
    #[arg(short, long, default_value_t = 3000)]
    port: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Environment & logging
    dotenv().ok();
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pifuhd_api=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("🚀 Starting PIFuHD execution API [Mode: {:?}]...", args.mode);

    // 2. Shared infrastructure
    let config = AppConfig::from_env();
    info!(
        "🛡️  Config: Max Size={}MB, Pose={}, Reconstructor={}",
        config.max_file_size / 1024 / 1024,
        config.pose_estimator,
        config.reconstructor
    );

    let db = database::setup_database(&config).await?;
    let blobs = storage::setup_blob_stores(&config).await?;
    let image_blobs: Arc<dyn BlobStore> = blobs.images;
    let model_blobs: Arc<dyn BlobStore> = blobs.models;
    let estimator = collaborators::setup_pose_estimator(&config).await?;

    let state = AppState::new(
        db.clone(),
        image_blobs,
        model_blobs.clone(),
        estimator,
        config.clone(),
    );

    // 3. Shutdown channel
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut handles = Vec::new();

    // 4. Job worker
    if args.mode.runs_worker() {
        let reconstructor = collaborators::setup_reconstructor(&config).await?;
        let worker = JobWorker::new(
            state.jobs.clone(),
            state.images.clone(),
            state.poses.clone(),
            model_blobs,
            reconstructor,
            WorkerSettings::from_config(&config),
            shutdown_rx.clone(),
        );
        handles.push(tokio::spawn(worker.run()));
        info!("👷 Job worker initialized.");
    }

    // 5. HTTP API
    if args.mode.runs_api() {
        let trace_layer = TraceLayer::new_for_http()
            .make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("unknown");
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = %request_id,
                )
            })
            .on_request(|request: &axum::http::Request<_>, _span: &tracing::Span| {
                info!("📥 {} {}", request.method(), request.uri());
            })
            .on_response(
                |response: &axum::http::Response<_>,
                 latency: std::time::Duration,
                 _span: &tracing::Span| {
                    info!(
                        "📤 Finished in {:?} with status {}",
                        latency,
                        response.status()
                    );
                },
            );

        let app = create_app(state).layer(trace_layer);
        let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
        let listener = tokio::net::TcpListener::bind(addr).await?;

        info!("✅ API listening on: http://0.0.0.0:{}{}", args.port, API_PREFIX);
        info!("📖 Swagger UI documentation: http://localhost:{}/swagger-ui", args.port);

        let mut server_shutdown = shutdown_rx.clone();
        handles.push(tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = server_shutdown.changed().await;
                })
                .await
            {
                error!("❌ Server runtime error: {}", e);
            }
        }));
    }

    // 6. Wait for a signal, then stop everything
    shutdown_signal().await;
    let _ = shutdown_tx.send(true);

    info!("🛑 Shutting down services...");
    for handle in handles {
        if let Err(e) = handle.await {
            error!("Task ended abnormally: {}", e);
        }
    }

    if let Err(e) = db.close().await {
        error!("Failed to close database pool: {}", e);
    }

    info!("👋 Exited cleanly.");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("⌨️  Ctrl+C received, initiating graceful shutdown...");
        },
        _ = terminate => {
            info!("💤 SIGTERM received, initiating graceful shutdown...");
        },
    }
}
