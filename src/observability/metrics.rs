//! Meter provider construction.
//!
//! The provider is returned to the caller rather than installed into a
//! process-wide global: the host constructs it once, hands a meter to the
//! monitor, and owns shutdown. Export transport, batching, and retry all
//! live inside the OpenTelemetry SDK.

use opentelemetry_sdk::metrics::{ManualReader, SdkMeterProvider};
use std::time::Duration;

/// Metric export period when an OTLP endpoint is configured.
const EXPORT_PERIOD: Duration = Duration::from_secs(10);

/// Build a meter provider, exporting over OTLP gRPC when an endpoint is
/// given.
///
/// Without an endpoint (or if the exporter cannot be created) metrics are
/// recorded against a [`ManualReader`] and never leave the process, which
/// keeps instrument registration working in local development and tests.
///
/// Must be called from within a Tokio runtime when an endpoint is
/// configured; the periodic exporter runs on it.
pub fn build_meter_provider(otel_endpoint: Option<&str>) -> SdkMeterProvider {
    if let Some(endpoint) = otel_endpoint {
        use opentelemetry_otlp::{Protocol, WithExportConfig};

        let exporter = opentelemetry_otlp::new_exporter()
            .tonic()
            .with_endpoint(endpoint)
            .with_protocol(Protocol::Grpc);

        match opentelemetry_otlp::new_pipeline()
            .metrics(opentelemetry_sdk::runtime::Tokio)
            .with_exporter(exporter)
            .with_period(EXPORT_PERIOD)
            .build()
        {
            Ok(provider) => {
                tracing::info!(endpoint, "OTLP metrics exporter configured");
                return provider;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to create OTLP exporter, recording without export");
            }
        }
    }

    let reader = ManualReader::builder().build();
    SdkMeterProvider::builder().with_reader(reader).build()
}
