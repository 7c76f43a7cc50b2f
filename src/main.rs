use anyhow::Context;
use forensic_case_manager::{
    api::{build_router, AppContext},
    config::Config,
    ml::InferenceService,
    seed::{generate_random_cases, seed_if_empty},
    state::create_store,
    telemetry::init_tracing,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = Config::load().unwrap_or_else(|e| {
        eprintln!("Failed to load configuration: {}", e);
        eprintln!("Using default configuration");
        Config::default()
    });

    init_tracing(&config.observability);
    tracing::info!(
        "Starting {} v{}",
        config.observability.service_name,
        env!("CARGO_PKG_VERSION")
    );

    // Initialize Prometheus metrics
    if config.observability.prometheus_enabled {
        if let Err(e) = forensic_case_manager::metrics::init_metrics() {
            tracing::warn!("Failed to initialize metrics: {}", e);
            tracing::warn!("Continuing without metrics");
        } else {
            tracing::info!("✅ Prometheus metrics initialized");
        }
    }

    // Open the case store; the service is useless without it
    tracing::info!("Storage backend: {:?}", config.store.backend);
    let store = create_store(&config.store).await.map_err(|e| {
        tracing::error!("Failed to open case store: {}", e);
        e
    })?;
    tracing::info!("✅ Storage backend initialized");

    if config.seed.enabled {
        let records = generate_random_cases(config.seed.count, &mut rand::rng());
        let inserted = seed_if_empty(store.as_ref(), &records).await?;
        if inserted > 0 {
            tracing::info!("✅ Inserted {} random cases into empty store", inserted);
        }
    }

    // Load the trained model; there is no degraded no-model mode
    let inference = InferenceService::load(&config.model.artifact_path)
        .map_err(|e| {
            tracing::error!(
                path = %config.model.artifact_path.display(),
                "Failed to load model artifact: {}",
                e
            );
            e
        })
        .context("model artifact is required; run `fcm-cli train` first")?;
    tracing::info!("✅ Model loaded with classes {:?}", inference.classes());

    let ctx = AppContext::new(store, inference);
    let app = build_router(ctx, &config.server);

    let http_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&http_addr)
        .await
        .with_context(|| format!("failed to bind {}", http_addr))?;

    tracing::info!("🚀 HTTP server listening on http://{}", http_addr);
    tracing::info!("   Health check: http://{}/health", http_addr);
    tracing::info!("   Cases: http://{}/api/casos", http_addr);
    tracing::info!("   Prediction: http://{}/api/predizer", http_addr);
    tracing::info!("Press Ctrl+C to shutdown");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutting down gracefully...");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    tracing::info!("Shutdown signal received");
}
