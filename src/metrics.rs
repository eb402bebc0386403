//! Prometheus metrics for the validation pipeline.
//!
//! Recording is a no-op until a recorder is installed, so library callers and
//! tests pay nothing when `init_metrics` is never called.

use std::net::SocketAddr;

pub fn init_metrics(port: u16) {
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new().with_http_listener(addr);
    match builder.install() {
        Ok(()) => {
            tracing::info!("Prometheus exporter listening on http://{}/metrics", addr);
        }
        Err(e) => {
            tracing::warn!("Prometheus exporter install failed (possibly already installed): {}", e);
        }
    }
}

pub mod run {
    use metrics::{counter, histogram};

    pub fn started() {
        counter!("validator_runs_started_total").increment(1);
    }

    pub fn listing_failed() {
        counter!("validator_runs_listing_failed_total").increment(1);
    }

    pub fn finished(success: bool, duration_secs: f64) {
        if success {
            counter!("validator_runs_succeeded_total").increment(1);
        } else {
            counter!("validator_runs_failed_total").increment(1);
        }
        histogram!("validator_run_duration_seconds").record(duration_secs);
    }
}

pub mod inputs {
    use metrics::{counter, histogram};

    pub fn processed(duration_secs: f64) {
        counter!("validator_inputs_processed_total").increment(1);
        histogram!("validator_input_duration_seconds").record(duration_secs);
    }

    pub fn skipped(reason: &'static str) {
        counter!("validator_inputs_skipped_total", "reason" => reason).increment(1);
    }

    pub fn failed() {
        counter!("validator_inputs_failed_total").increment(1);
    }
}

pub mod records {
    use metrics::counter;

    pub fn routed(status: &'static str) {
        counter!("validator_records_routed_total", "status" => status).increment(1);
    }

    pub fn duplicate() {
        counter!("validator_records_duplicate_total").increment(1);
    }

    pub fn failed() {
        counter!("validator_records_failed_total").increment(1);
    }
}
