//! Request metrics
//!
//! [`RequestMetrics`] is the sink the HTTP worker reports to: a request counter,
//! an error counter, an in-flight up-down counter and a duration histogram, all
//! OpenTelemetry instruments created from one [`Meter`]. It is purely
//! observational; nothing in the crate reads it to make a decision.
//!
//! Without a configured meter provider the global meter is a no-op, so an
//! embedding application opts in by installing its own provider.

use opentelemetry::KeyValue;
use opentelemetry::metrics::{Counter, Histogram, Meter, UpDownCounter};
use std::fmt;
use std::time::Instant;

/// Instrumentation scope used by [`RequestMetrics::default`]
pub const METER_NAME: &str = "docweave";

/// Requests started
pub const REQUESTS_METRIC: &str = "docweave.http.requests";
/// Requests that ended in an error
pub const ERRORS_METRIC: &str = "docweave.http.errors";
/// Requests currently running
pub const IN_FLIGHT_METRIC: &str = "docweave.http.active_requests";
/// Request duration in seconds
pub const DURATION_METRIC: &str = "docweave.http.request.duration";

/// Request instruments shared by every worker of a phase
#[derive(Clone)]
pub struct RequestMetrics {
    requests: Counter<u64>,
    errors: Counter<u64>,
    in_flight: UpDownCounter<i64>,
    duration: Histogram<f64>,
}

impl fmt::Debug for RequestMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestMetrics").finish_non_exhaustive()
    }
}

impl Default for RequestMetrics {
    /// Instruments on the global meter provider
    fn default() -> Self {
        Self::new(&opentelemetry::global::meter(METER_NAME))
    }
}

impl RequestMetrics {
    /// Create the instruments on `meter`
    pub fn new(meter: &Meter) -> Self {
        let requests = meter
            .u64_counter(REQUESTS_METRIC)
            .with_description("Total number of backend requests")
            .build();

        let errors = meter
            .u64_counter(ERRORS_METRIC)
            .with_description("Backend requests that failed (network, status or body limit)")
            .build();

        let in_flight = meter
            .i64_up_down_counter(IN_FLIGHT_METRIC)
            .with_description("Number of backend requests in flight")
            .build();

        let duration = meter
            .f64_histogram(DURATION_METRIC)
            .with_description("Backend request duration in seconds")
            .with_unit("s")
            .build();

        Self {
            requests,
            errors,
            in_flight,
            duration,
        }
    }

    /// Record the start of a request
    ///
    /// The returned guard decrements the in-flight counter and records the
    /// duration when dropped, so early returns are accounted for.
    pub fn start(&self) -> RequestTimer<'_> {
        self.requests.add(1, &[]);
        self.in_flight.add(1, &[]);
        RequestTimer {
            metrics: self,
            started: Instant::now(),
            failed: false,
        }
    }
}

/// Guard for one in-flight request
#[must_use = "dropping the timer immediately records a zero-length request"]
pub struct RequestTimer<'a> {
    metrics: &'a RequestMetrics,
    started: Instant,
    failed: bool,
}

impl RequestTimer<'_> {
    /// Mark the request as failed
    pub fn fail(&mut self) {
        self.failed = true;
    }
}

impl Drop for RequestTimer<'_> {
    fn drop(&mut self) {
        let outcome = if self.failed { "error" } else { "ok" };
        let labels = [KeyValue::new("outcome", outcome)];

        self.metrics
            .duration
            .record(self.started.elapsed().as_secs_f64(), &labels);
        self.metrics.in_flight.add(-1, &[]);
        if self.failed {
            self.metrics.errors.add(1, &[]);
        }
    }
}

/// In-memory meter provider for asserting on recorded values
#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use opentelemetry::metrics::MeterProvider as _;
    use opentelemetry_sdk::metrics::data::{Histogram, ResourceMetrics, Sum};
    use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};
    use opentelemetry_sdk::runtime;
    use opentelemetry_sdk::testing::metrics::InMemoryMetricExporter;

    /// Totals read back from the exporter
    #[derive(Debug, Default, PartialEq, Eq)]
    pub(crate) struct Recorded {
        pub requests: u64,
        pub errors: u64,
        pub in_flight: i64,
        pub observed: u64,
    }

    /// Meter provider exporting into memory on demand
    ///
    /// Must be created inside a multi-threaded tokio runtime.
    pub(crate) struct MetricsHarness {
        provider: SdkMeterProvider,
        exporter: InMemoryMetricExporter,
    }

    impl MetricsHarness {
        pub(crate) fn new() -> Self {
            let exporter = InMemoryMetricExporter::default();
            let reader = PeriodicReader::builder(exporter.clone(), runtime::Tokio).build();
            let provider = SdkMeterProvider::builder().with_reader(reader).build();
            Self { provider, exporter }
        }

        pub(crate) fn metrics(&self) -> RequestMetrics {
            RequestMetrics::new(&self.provider.meter(METER_NAME))
        }

        pub(crate) fn collect(&self) -> Recorded {
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
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::testing::{MetricsHarness, Recorded};
    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn timer_records_on_drop() {
        let harness = MetricsHarness::new();
        let metrics = harness.metrics();
        {
            let _timer = metrics.start();
        }
        {
            let mut timer = metrics.start();
            timer.fail();
        }

        assert_eq!(
            harness.collect(),
            Recorded {
                requests: 2,
                errors: 1,
                in_flight: 0,
                observed: 2,
            }
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn running_request_counts_as_in_flight() {
        let harness = MetricsHarness::new();
        let metrics = harness.metrics();
        let _timer = metrics.start();

        let recorded = harness.collect();
        assert_eq!(recorded.requests, 1);
        assert_eq!(recorded.in_flight, 1);
        assert_eq!(recorded.observed, 0);
    }

    #[test]
    fn global_meter_without_provider_is_a_no_op() {
        let metrics = RequestMetrics::default();
        let mut timer = metrics.start();
        timer.fail();
    }
}
