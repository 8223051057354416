use opentelemetry::global;
use opentelemetry::trace::TracerProvider;
use opentelemetry_otlp::{SpanExporter, WithExportConfig};
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::trace::SdkTracerProvider;
use opentelemetry_sdk::Resource;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry};

/// Initialization options for tracing
#[derive(Debug, Clone, Default)]
pub struct TracingConfig {
    pub service_name: String,
    /// OTLP collector endpoint; spans are only exported when set
    pub otlp_endpoint: Option<String>,
    /// Emit log lines as JSON objects instead of plain text
    pub json: bool,
}

static TRACER_PROVIDER: std::sync::OnceLock<SdkTracerProvider> = std::sync::OnceLock::new();

/// Initialize logging, plus an OpenTelemetry exporter when an endpoint is configured
pub fn init_tracing(config: TracingConfig) -> Result<(), anyhow::Error> {
    // RUST_LOG overrides; "info" keeps per-connection debug lines out of production logs
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let (plain_layer, json_layer) = if config.json {
        (
            None,
            Some(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(false)
                    .with_target(true),
            ),
        )
    } else {
        (
            Some(
                tracing_subscriber::fmt::layer()
                    .with_thread_ids(true)
                    .with_target(true),
            ),
            None,
        )
    };

    let otel_layer = match config.otlp_endpoint {
        Some(endpoint) => {
            global::set_text_map_propagator(TraceContextPropagator::new());

            let exporter = SpanExporter::builder()
                .with_tonic()
                .with_endpoint(endpoint)
                .build()?;

            let resource = Resource::builder()
                .with_service_name(config.service_name)
                .build();

            let tracer_provider = SdkTracerProvider::builder()
                .with_resource(resource)
                .with_batch_exporter(exporter)
                .build();

            let tracer = tracer_provider.tracer("driftgate");
            let _ = TRACER_PROVIDER.set(tracer_provider.clone());
            global::set_tracer_provider(tracer_provider);

            Some(tracing_opentelemetry::layer().with_tracer(tracer))
        }
        None => None,
    };

    Registry::default()
        .with(env_filter)
        .with(plain_layer)
        .with(json_layer)
        .with(otel_layer)
        .try_init()?;

    tracing::info!("Tracing infrastructure initialized");
    Ok(())
}

/// Flush pending spans and shut the exporter down. No-op without an exporter.
pub fn shutdown_tracing() {
    if let Some(provider) = TRACER_PROVIDER.get() {
        if let Err(e) = provider.shutdown() {
            tracing::error!("Failed to shutdown tracer provider: {}", e);
        }
    }
}
