use opentelemetry::KeyValue;
use opentelemetry::trace::TracerProvider;
use opentelemetry_otlp::{SpanExporter, WithExportConfig};
use opentelemetry_sdk::{Resource, trace::SdkTracerProvider};
use opentelemetry_semantic_conventions::resource::{SERVICE_NAME, SERVICE_VERSION};
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use crate::config::AppConfig;

pub struct TelemetryConfig {
    pub service_name: String,
    pub service_version: String,
    pub environment: String,
    pub otlp_endpoint: String,
}

impl From<&AppConfig> for TelemetryConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            service_name: config.telemetry_service_name.clone(),
            service_version: config.telemetry_service_version.clone(),
            environment: config.telemetry_environment.clone(),
            otlp_endpoint: config.telemetry_otlp_endpoint.clone(),
        }
    }
}

/// Keeps the tracer provider alive; call [`Telemetry::shutdown`] on exit to flush spans.
pub struct Telemetry {
    provider: Option<SdkTracerProvider>,
}

impl Telemetry {
    pub fn shutdown(self) {
        if let Some(provider) = self.provider {
            match provider.shutdown() {
                Ok(()) => tracing::info!("OpenTelemetry tracer provider shut down"),
                Err(e) => tracing::warn!(error = %e, "failed to shut down tracer provider"),
            }
        }
    }
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// JSON logs always; OTLP export only when `telemetry_enabled` is set.
pub fn init(config: &AppConfig) -> anyhow::Result<Telemetry> {
    if !config.telemetry_enabled {
        tracing_subscriber::registry()
            .with(env_filter())
            .with(fmt::layer().json())
            .try_init()?;
        return Ok(Telemetry { provider: None });
    }

    let telemetry = TelemetryConfig::from(config);
    let resource = Resource::builder_empty()
        .with_attribute(KeyValue::new(SERVICE_NAME, telemetry.service_name.clone()))
        .with_attribute(KeyValue::new(SERVICE_VERSION, telemetry.service_version.clone()))
        .with_attribute(KeyValue::new(
            "deployment.environment.name",
            telemetry.environment.clone(),
        ))
        .build();

    let exporter = SpanExporter::builder()
        .with_tonic()
        .with_endpoint(&telemetry.otlp_endpoint)
        .build()?;

    let provider = SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(resource)
        .build();

    let tracer = provider.tracer(telemetry.service_name.clone());
    opentelemetry::global::set_tracer_provider(provider.clone());

    tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().json())
        .with(OpenTelemetryLayer::new(tracer))
        .try_init()?;

    tracing::info!(
        service = %telemetry.service_name,
        endpoint = %telemetry.otlp_endpoint,
        "OpenTelemetry initialized"
    );

    Ok(Telemetry {
        provider: Some(provider),
    })
}
