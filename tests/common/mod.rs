//! Common test utilities for docweave integration tests

#[allow(dead_code)]
pub mod fakes;

#[allow(dead_code)]
pub mod telemetry;

#[allow(unused_imports)]
pub use fakes::*;
#[allow(unused_imports)]
pub use telemetry::*;

use docweave::config::ValidationConfig;
use std::time::Duration;

/// Validation config that checks every host and backs off in milliseconds
#[allow(dead_code)]
pub fn fast_validation_config(retries: usize) -> ValidationConfig {
    ValidationConfig {
        skip_loopback: false,
        skip_hosts: vec!["1.2.3.4".to_string()],
        backoff_table: vec![Duration::from_millis(10); retries],
        jitter_unit: Duration::ZERO,
        ..ValidationConfig::default()
    }
}
