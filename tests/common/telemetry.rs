//! In-memory OpenTelemetry meter provider for metric assertions

use docweave::RequestMetrics;
use docweave::metrics::{DURATION_METRIC, ERRORS_METRIC, IN_FLIGHT_METRIC, METER_NAME, REQUESTS_METRIC};
use opentelemetry::metrics::MeterProvider as _;
use opentelemetry_sdk::metrics::data::{Histogram, ResourceMetrics, Sum};
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};
use opentelemetry_sdk::runtime;
use opentelemetry_sdk::testing::metrics::InMemoryMetricExporter;

/// Totals read back from the exporter
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Recorded {
    pub requests: u64,
    pub errors: u64,
    pub in_flight: i64,
    pub observed: u64,
}

/// Meter provider exporting into memory when collected
///
/// Create it inside a multi-threaded tokio runtime.
pub struct MetricsHarness {
    provider: SdkMeterProvider,
    exporter: InMemoryMetricExporter,
}

impl MetricsHarness {
    pub fn new() -> Self {
        let exporter = InMemoryMetricExporter::default();
        let reader = PeriodicReader::builder(exporter.clone(), runtime::Tokio).build();
        let provider = SdkMeterProvider::builder().with_reader(reader).build();
        Self { provider, exporter }
    }

    pub fn metrics(&self) -> RequestMetrics {
        RequestMetrics::new(&self.provider.meter(METER_NAME))
    }

    pub fn collect(&self) -> Recorded {
        self.provider.force_flush().unwrap();
        let exported = self.exporter.get_finished_metrics().unwrap();
        exported.last().map(totals).unwrap_or_default()
    }
}

fn totals(resource: &ResourceMetrics) -> Recorded {
    let mut recorded = Recorded::default();
    for metric in resource.scope_metrics.iter().flat_map(|s| s.metrics.iter()) {
        let data = metric.data.as_any();
        match metric.name.as_ref() {
            REQUESTS_METRIC => {
                if let Some(sum) = data.downcast_ref::<Sum<u64>>() {
                    recorded.requests = sum.data_points.iter().map(|p| p.value).sum();
                }
            }
            ERRORS_METRIC => {
                if let Some(sum) = data.downcast_ref::<Sum<u64>>() {
                    recorded.errors = sum.data_points.iter().map(|p| p.value).sum();
                }
            }
            IN_FLIGHT_METRIC => {
                if let Some(sum) = data.downcast_ref::<Sum<i64>>() {
                    recorded.in_flight = sum.data_points.iter().map(|p| p.value).sum();
                }
            }
            DURATION_METRIC => {
                if let Some(histogram) = data.downcast_ref::<Histogram<f64>>() {
                    recorded.observed = histogram.data_points.iter().map(|p| p.count).sum();
                }
            }
            _ => {}
        }
    }
    recorded
}
