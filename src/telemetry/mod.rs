//! Logging, tracing, and metrics for capital call actions.
//!
//! Every process gets a fmt layer filtered by `RUST_LOG` or the configured
//! level. With an OTLP endpoint, action spans, the `capital_call.*`
//! instruments, and log events are exported there too. Without one, the
//! instruments in [`metrics`] record into the no-op global meter.

pub mod metrics;
pub mod span;

use opentelemetry_sdk::Resource;
use opentelemetry_sdk::logs::SdkLoggerProvider;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use opentelemetry_sdk::trace::SdkTracerProvider;

use crate::error::{Error, Result};

const TRACER_NAME: &str = "capital-call-rs";

pub struct TelemetryConfig {
    /// OTLP gRPC endpoint, e.g. "http://localhost:4317". `None` keeps
    /// everything local.
    pub endpoint: Option<String>,
    /// Reported as `service.name` on exported signals.
    pub service_name: String,
    /// Filter used when `RUST_LOG` is unset, e.g. `"info"` or
    /// `"capital_call_rs=debug,sqlx=warn"`.
    pub log_level: String,
}

impl TelemetryConfig {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            endpoint: None,
            service_name: service_name.into(),
            log_level: "info".to_string(),
        }
    }

    pub fn endpoint(mut self, endpoint: Option<String>) -> Self {
        self.endpoint = endpoint;
        self
    }

    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }
}

/// The three exporting providers, built together against one endpoint.
struct OtlpPipelines {
    tracer: SdkTracerProvider,
    meter: SdkMeterProvider,
    logger: SdkLoggerProvider,
}

impl OtlpPipelines {
    fn build(endpoint: &str, service_name: String) -> Result<Self> {
        use opentelemetry_otlp::{LogExporter, MetricExporter, SpanExporter, WithExportConfig as _};

        let resource = Resource::builder().with_service_name(service_name).build();
        let exporter_error = |signal: &str, e: &dyn std::fmt::Display| {
            Error::Other(format!("cannot build OTLP {signal} exporter for {endpoint}: {e}"))
        };

        let spans = SpanExporter::builder()
            .with_tonic()
            .with_endpoint(endpoint)
            .build()
            .map_err(|e| exporter_error("span", &e))?;
        let tracer = SdkTracerProvider::builder()
            .with_batch_exporter(spans)
            .with_resource(resource.clone())
            .build();

        let metrics = MetricExporter::builder()
            .with_tonic()
            .with_endpoint(endpoint)
            .build()
            .map_err(|e| exporter_error("metric", &e))?;
        let meter = SdkMeterProvider::builder()
            .with_periodic_exporter(metrics)
            .with_resource(resource.clone())
            .build();

        let logs = LogExporter::builder()
            .with_tonic()
            .with_endpoint(endpoint)
            .build()
            .map_err(|e| exporter_error("log", &e))?;
        let logger = SdkLoggerProvider::builder()
            .with_batch_exporter(logs)
            .with_resource(resource)
            .build();

        Ok(Self {
            tracer,
            meter,
            logger,
        })
    }
}

/// Keeps exporters alive. Dropping it flushes and shuts them down, logs
/// first so events from the final spans still go out.
pub struct TelemetryGuard {
    pipelines: Option<OtlpPipelines>,
}

impl TelemetryGuard {
    /// Push buffered spans, metrics, and logs now. A no-op when nothing
    /// is exported.
    pub fn force_flush(&self) {
        if let Some(p) = &self.pipelines {
            let _ = p.tracer.force_flush();
            let _ = p.meter.force_flush();
            let _ = p.logger.force_flush();
        }
    }

    pub fn is_exporting(&self) -> bool {
        self.pipelines.is_some()
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Some(p) = self.pipelines.take() {
            let _ = p.logger.shutdown();
            let _ = p.meter.shutdown();
            let _ = p.tracer.shutdown();
        }
    }
}

/// Install the global subscriber, and the OTLP pipelines when
/// `config.endpoint` is set. Hold the returned guard until exit.
///
/// # Errors
///
/// `Config` for an unparsable log level. `Other` when an exporter cannot
/// be built or a global subscriber is already installed.
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard> {
    use opentelemetry::trace::TracerProvider as _;
    use opentelemetry_appender_tracing::layer::OpenTelemetryTracingBridge;
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::layer::SubscriberExt as _;
    use tracing_subscriber::util::SubscriberInitExt as _;

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .map_err(|e| Error::Config(format!("invalid log level {:?}: {e}", config.log_level)))?;

    let pipelines = config
        .endpoint
        .as_deref()
        .map(|endpoint| OtlpPipelines::build(endpoint, config.service_name.clone()))
        .transpose()?;

    let (trace_layer, log_layer) = match &pipelines {
        Some(p) => {
            opentelemetry::global::set_meter_provider(p.meter.clone());
            (
                Some(tracing_opentelemetry::layer().with_tracer(p.tracer.tracer(TRACER_NAME))),
                Some(OpenTelemetryTracingBridge::new(&p.logger)),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().compact())
        .with(trace_layer)
        .with(log_layer)
        .try_init()
        .map_err(|e| Error::Other(format!("cannot install tracing subscriber: {e}")))?;

    if let Some(endpoint) = &config.endpoint {
        tracing::info!(%endpoint, service = %config.service_name, "exporting telemetry over OTLP");
    }
    Ok(TelemetryGuard { pipelines })
}
