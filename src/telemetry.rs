use std::sync::Arc;

#[cfg(feature = "prometheus")]
use std::sync::atomic::{AtomicBool, Ordering};
#[cfg(feature = "prometheus")]
use std::sync::Mutex;
#[cfg(feature = "prometheus")]
use std::thread::JoinHandle;
use std::time::Duration;

/// In-process hook for observing log lifecycle events.
///
/// The library never writes to stdout/stderr on its own; an embedder that
/// wants visibility supplies a listener and routes the events into whatever
/// it uses for logging or alerting. The default listener discards everything.
pub trait LogEventListener: std::fmt::Debug + Send + Sync + 'static {
    fn on_event(&self, event: LogEvent);
}

/// Structured events emitted by the log.
#[derive(Debug, Clone)]
pub enum LogEvent {
    /// A new active segment was opened at `base_offset`.
    SegmentRotated { base_offset: u64 },
    /// A segment and its files were removed.
    SegmentRemoved { base_offset: u64 },
    /// Whole segments below `lowest` were retired.
    LogTruncated { lowest: u64 },
}

#[derive(Debug)]
pub struct NoopEventListener;

impl LogEventListener for NoopEventListener {
    #[inline]
    fn on_event(&self, _event: LogEvent) {}
}

pub fn noop_event_listener() -> Arc<dyn LogEventListener> {
    Arc::new(NoopEventListener)
}

/// Metrics for the log's hot paths, emitted through the `metrics` facade.
///
/// Recording is a no-op until the embedder installs a recorder, so the
/// library adds no overhead by default. The `prometheus` feature bundles a
/// recorder whose output can be scraped in-process via `PrometheusRecorder`.
pub mod log_metrics {
    use super::*;

    use ::metrics::{describe_counter, describe_gauge, describe_histogram, Unit};

    #[cfg(feature = "prometheus")]
    use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

    // Metric names. The Prometheus exporter renders counters with a `_total`
    // suffix and expands histograms into bucket/sum/count series.

    pub const APPEND_RECORDS: &str = "seglog_append_records";
    pub const APPEND_BYTES: &str = "seglog_append_bytes";
    pub const READ_RECORDS: &str = "seglog_read_records";
    pub const APPEND_DURATION_SECONDS: &str = "seglog_append_duration_seconds";
    pub const READ_DURATION_SECONDS: &str = "seglog_read_duration_seconds";
    pub const ACTIVE_SEGMENTS: &str = "seglog_active_segments";

    /// In-process Prometheus recorder with text-exposition scraping.
    ///
    /// No listener of its own: embedders call [`PrometheusRecorder::render`]
    /// from whatever HTTP surface they already serve. A named background
    /// thread drives the exporter's periodic upkeep (the recorder requires it
    /// to keep its histogram storage bounded); dropping the handle stops that
    /// thread and waits for it.
    #[cfg(feature = "prometheus")]
    #[derive(Debug)]
    pub struct PrometheusRecorder {
        handle: PrometheusHandle,
        stopping: Arc<AtomicBool>,
        upkeep: Mutex<Option<JoinHandle<()>>>,
    }

    #[cfg(feature = "prometheus")]
    impl PrometheusRecorder {
        /// Registers metric descriptions and installs the process-global
        /// recorder. Fails if another recorder was installed first.
        pub fn install(upkeep_interval: Duration) -> Result<Self, PrometheusInitError> {
            describe_all();

            let handle = PrometheusBuilder::new()
                .install_recorder()
                .map_err(|e| match e {
                    BuildError::FailedToSetGlobalRecorder(_) => {
                        PrometheusInitError::AlreadyInstalled
                    }
                    other => PrometheusInitError::Recorder(other.to_string()),
                })?;

            let stopping = Arc::new(AtomicBool::new(false));
            let upkeep = {
                let stopping = Arc::clone(&stopping);
                let handle = handle.clone();
                std::thread::Builder::new()
                    .name("seglog-metrics-upkeep".into())
                    .spawn(move || loop {
                        std::thread::sleep(upkeep_interval);
                        if stopping.load(Ordering::Relaxed) {
                            break;
                        }
                        handle.run_upkeep();
                    })
                    .map_err(|e| PrometheusInitError::Upkeep(e.to_string()))?
            };

            Ok(Self {
                handle,
                stopping,
                upkeep: Mutex::new(Some(upkeep)),
            })
        }

        /// Current metrics in the Prometheus text exposition format.
        pub fn render(&self) -> String {
            self.handle.render()
        }
    }

    #[cfg(feature = "prometheus")]
    impl Drop for PrometheusRecorder {
        fn drop(&mut self) {
            self.stopping.store(true, Ordering::Relaxed);
            let thread = self.upkeep.lock().ok().and_then(|mut guard| guard.take());
            if let Some(thread) = thread {
                let _ = thread.join();
            }
        }
    }

    #[cfg(feature = "prometheus")]
    #[derive(Debug, thiserror::Error)]
    pub enum PrometheusInitError {
        #[error("a global metrics recorder is already installed")]
        AlreadyInstalled,
        #[error("prometheus recorder setup failed: {0}")]
        Recorder(String),
        #[error("metrics upkeep thread failed to start: {0}")]
        Upkeep(String),
    }

    #[inline]
    pub fn record_append(bytes: u64, duration: Duration) {
        ::metrics::counter!(APPEND_RECORDS).increment(1);
        if bytes > 0 {
            ::metrics::counter!(APPEND_BYTES).increment(bytes);
        }
        ::metrics::histogram!(APPEND_DURATION_SECONDS).record(duration.as_secs_f64());
    }

    #[inline]
    pub fn record_read(duration: Duration) {
        ::metrics::counter!(READ_RECORDS).increment(1);
        ::metrics::histogram!(READ_DURATION_SECONDS).record(duration.as_secs_f64());
    }

    #[inline]
    pub fn set_active_segments(count: usize) {
        ::metrics::gauge!(ACTIVE_SEGMENTS).set(count as f64);
    }

    fn describe_all() {
        // Counters
        describe_counter!(
            APPEND_RECORDS,
            Unit::Count,
            "Total number of records appended to the log."
        );
        describe_counter!(
            APPEND_BYTES,
            Unit::Bytes,
            "Total encoded record bytes appended to the log (length prefixes excluded)."
        );
        describe_counter!(
            READ_RECORDS,
            Unit::Count,
            "Total number of records read back from the log."
        );

        // Histograms
        describe_histogram!(
            APPEND_DURATION_SECONDS,
            Unit::Seconds,
            "Duration of Log::append including store and index writes."
        );
        describe_histogram!(
            READ_DURATION_SECONDS,
            Unit::Seconds,
            "Duration of Log::read including index lookup and store read."
        );

        // Gauges
        describe_gauge!(
            ACTIVE_SEGMENTS,
            Unit::Count,
            "Number of segments currently owned by the log."
        );
    }
}
