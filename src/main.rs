use opentelemetry::global;
use provisioner::{app, initialize_state, telemetry};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[cfg(feature = "dhat-heap")]
#[global_allocator]
static ALLOC: dhat::Alloc = dhat::Alloc;

const DEFAULT_PORT: u16 = 8080;
const OTLP_ENDPOINT_VAR: &str = "OTLP_ENDPOINT";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    #[cfg(feature = "dhat-heap")]
    let _profiler = dhat::Profiler::new_heap();

    let otlp_endpoint = std::env::var(OTLP_ENDPOINT_VAR).ok();

    let (logging, logger_provider) = match &otlp_endpoint {
        Some(endpoint) => {
            let (layer, provider) = telemetry::setup_logging(endpoint)?;
            (Some(layer), Some(provider))
        },
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .with(logging)
        .init();

    let tracer_provider = match &otlp_endpoint {
        Some(endpoint) => {
            let provider = telemetry::setup_tracer(endpoint)?;
            global::set_tracer_provider(provider.clone());
            Some(provider)
        },
        None => None,
    };

    let mut state = initialize_state().await?;
    state.metrics = Some(telemetry::setup_metrics_recorder()?);

    let port = state.config.port.unwrap_or(DEFAULT_PORT);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!(%port, "server started");

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(provider) = tracer_provider {
        provider.shutdown()?;
    }
    if let Some(provider) = logger_provider {
        provider.shutdown()?;
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "cannot listen for shutdown signal");
    }
    tracing::info!("shutting down");
}
