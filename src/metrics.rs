/// Prometheus metrics for the prediction service and the trainer.
///
/// Metrics are process-global; `init_metrics` registers them once and
/// `gather_metrics` renders the text exposition format.
use lazy_static::lazy_static;
use prometheus::{Counter, CounterVec, Gauge, Histogram, HistogramOpts, Opts, Registry};

const NAMESPACE: &str = "forensic_case_manager";

lazy_static! {
    /// Global Prometheus registry for all metrics
    pub static ref PROMETHEUS_REGISTRY: Registry = Registry::new();

    /// Predictions served
    ///
    /// Labels: outcome (success, invalid_input, error)
    pub static ref PREDICTIONS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("predictions_total", "Total number of case-type predictions")
            .namespace(NAMESPACE),
        &["outcome"]
    ).expect("Failed to create PREDICTIONS_TOTAL metric");

    /// Time spent encoding and scoring one prediction
    pub static ref PREDICTION_DURATION_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "prediction_duration_seconds",
            "Prediction latency in seconds"
        )
        .namespace(NAMESPACE)
        .buckets(vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5]),
    ).expect("Failed to create PREDICTION_DURATION_SECONDS metric");

    /// Number of case types the loaded model distinguishes
    pub static ref MODEL_CLASSES: Gauge = Gauge::with_opts(
        Opts::new("model_classes", "Number of classes known to the loaded model")
            .namespace(NAMESPACE)
    ).expect("Failed to create MODEL_CLASSES metric");

    /// Training runs
    ///
    /// Labels: outcome (succeeded, failed)
    pub static ref TRAINING_RUNS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("training_runs_total", "Total number of training runs")
            .namespace(NAMESPACE),
        &["outcome"]
    ).expect("Failed to create TRAINING_RUNS_TOTAL metric");

    /// Case records dropped by the feature extractor
    pub static ref TRAINING_SKIPPED_RECORDS: Counter = Counter::with_opts(
        Opts::new("training_skipped_records_total", "Malformed case records skipped during training")
            .namespace(NAMESPACE)
    ).expect("Failed to create TRAINING_SKIPPED_RECORDS metric");
}

/// Register all metrics with the global registry.
///
/// Calling it again is a no-op.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(PREDICTIONS_TOTAL.clone()),
        Box::new(PREDICTION_DURATION_SECONDS.clone()),
        Box::new(MODEL_CLASSES.clone()),
        Box::new(TRAINING_RUNS_TOTAL.clone()),
        Box::new(TRAINING_SKIPPED_RECORDS.clone()),
    ];

    for collector in collectors {
        match PROMETHEUS_REGISTRY.register(collector) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Render all registered metrics in Prometheus text format
pub fn gather_metrics() -> String {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let metric_families = PROMETHEUS_REGISTRY.gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return String::from("# Error encoding metrics\n");
    }

    String::from_utf8(buffer).unwrap_or_else(|e| {
        tracing::error!("Failed to convert metrics to string: {}", e);
        String::from("# Error converting metrics\n")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        init_metrics().unwrap();
        init_metrics().unwrap();
    }

    #[test]
    fn test_gather_metrics() {
        init_metrics().unwrap();
        PREDICTIONS_TOTAL.with_label_values(&["success"]).inc();

        let metrics = gather_metrics();
        assert!(metrics.contains("forensic_case_manager_predictions_total"));
    }
}
