//! Metrics and observability infrastructure.
//!
//! - `events`: Internal event types and the `InternalEvent` trait
//! - the Prometheus recorder, installed once per process
//!
//! collsplit is a batch tool, so there is no scrape endpoint. The recorder
//! collects for the lifetime of the run and the binary can dump the text
//! exposition to a file on exit.

pub mod events;

use std::path::Path;
use std::sync::OnceLock;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use snafu::prelude::*;
use tracing::info;

use crate::error::{
    AlreadyInitializedSnafu, MetricsError, NotInitializedSnafu, PrometheusInitSnafu,
    WriteSnapshotSnafu,
};

/// Histogram buckets for duration metrics (in seconds).
const DURATION_BUCKETS: &[f64] = &[
    0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 300.0, 900.0, 3600.0,
];

static CONTROLLER: OnceLock<MetricsController> = OnceLock::new();

/// Macro for emitting metric events.
///
/// Calls `InternalEvent::emit()` on the given event, which records the
/// corresponding metric through the `metrics` facade. Without an installed
/// recorder the call is a no-op.
///
/// # Example
///
/// ```ignore
/// use collsplit_core::emit;
/// use collsplit_core::metrics::events::RecordsScanned;
///
/// emit!(RecordsScanned { count: 100, target: "events".into() });
/// ```
#[macro_export]
macro_rules! emit {
    ($event:expr) => {
        $crate::metrics::events::InternalEvent::emit($event)
    };
}

/// Handle to the process-wide Prometheus recorder.
pub struct MetricsController {
    handle: PrometheusHandle,
}

/// Install the Prometheus recorder for this process.
///
/// # Errors
///
/// Returns an error if a recorder is already installed or the recorder fails
/// to build.
pub fn init_global() -> Result<(), MetricsError> {
    let handle = PrometheusBuilder::new()
        .set_buckets(DURATION_BUCKETS)
        .context(PrometheusInitSnafu)?
        .install_recorder()
        .context(PrometheusInitSnafu)?;

    CONTROLLER
        .set(MetricsController { handle })
        .map_err(|_| AlreadyInitializedSnafu.build())?;

    info!("Metrics recorder installed");
    Ok(())
}

impl MetricsController {
    /// Get a reference to the global metrics controller.
    pub fn get() -> Result<&'static Self, MetricsError> {
        CONTROLLER.get().context(NotInitializedSnafu)
    }

    /// Render metrics in Prometheus text format.
    pub fn render(&self) -> String {
        self.handle.render()
    }

    /// Write the rendered metrics to `path`.
    pub fn write_snapshot(&self, path: &Path) -> Result<(), MetricsError> {
        std::fs::write(path, self.render()).context(WriteSnapshotSnafu { path })?;
        info!(path = %path.display(), "Wrote metrics snapshot");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_controller_before_init() {
        // Unit tests never install the global recorder.
        assert!(matches!(
            MetricsController::get(),
            Err(MetricsError::NotInitialized)
        ));
    }
}
