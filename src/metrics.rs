//! Control plane metrics
//!
//! Prometheus collectors for manager operations, scheduling decisions and
//! reported backend capacity, held in a registry owned by this struct and
//! exposed by the metrics endpoint.

use crate::error::{Error, Result};
use prometheus::core::Collector;
use prometheus::{Encoder, GaugeVec, IntCounterVec, Opts, Registry, TextEncoder};
use std::sync::Arc;

/// Outcome label for a finished operation
pub fn outcome_label<T>(result: &Result<T>) -> &'static str {
    match result {
        Ok(_) => "success",
        Err(_) => "failure",
    }
}

/// Prometheus collectors of one control plane process
pub struct ControlPlaneMetrics {
    registry: Registry,
    operations: IntCounterVec,
    scheduling_decisions: IntCounterVec,
    capacity_total_gb: GaugeVec,
    capacity_free_gb: GaugeVec,
}

impl ControlPlaneMetrics {
    pub fn new() -> Result<Arc<Self>> {
        let registry = Registry::new();

        let operations = IntCounterVec::new(
            Opts::new(
                "share_manager_operations_total",
                "Share manager operations by operation and outcome",
            ),
            &["operation", "outcome"],
        )
        .map_err(metrics_error)?;
        let scheduling_decisions = IntCounterVec::new(
            Opts::new(
                "share_scheduler_decisions_total",
                "Scheduling decisions by outcome",
            ),
            &["outcome"],
        )
        .map_err(metrics_error)?;
        let capacity_total_gb = GaugeVec::new(
            Opts::new(
                "share_backend_capacity_total_gigabytes",
                "Total capacity reported by each host",
            ),
            &["host"],
        )
        .map_err(metrics_error)?;
        let capacity_free_gb = GaugeVec::new(
            Opts::new(
                "share_backend_capacity_free_gigabytes",
                "Free capacity reported by each host",
            ),
            &["host"],
        )
        .map_err(metrics_error)?;

        registry
            .register(Box::new(operations.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(scheduling_decisions.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(capacity_total_gb.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(capacity_free_gb.clone()))
            .map_err(metrics_error)?;

        Ok(Arc::new(Self {
            registry,
            operations,
            scheduling_decisions,
            capacity_total_gb,
            capacity_free_gb,
        }))
    }

    pub fn record_operation(&self, operation: &str, outcome: &str) {
        self.operations
            .with_label_values(&[operation, outcome])
            .inc();
    }

    pub fn operation_count(&self, operation: &str, outcome: &str) -> u64 {
        self.operations
            .with_label_values(&[operation, outcome])
            .get()
    }

    pub fn record_scheduling(&self, outcome: &str) {
        self.scheduling_decisions.with_label_values(&[outcome]).inc();
    }

    pub fn scheduling_count(&self, outcome: &str) -> u64 {
        self.scheduling_decisions.with_label_values(&[outcome]).get()
    }

    /// Unknown capacity removes the gauge instead of reporting zero
    pub fn set_host_capacity(&self, host: &str, total_gb: Option<u64>, free_gb: Option<u64>) {
        for (gauge, value) in [
            (&self.capacity_total_gb, total_gb),
            (&self.capacity_free_gb, free_gb),
        ] {
            match value {
                Some(gb) => gauge.with_label_values(&[host]).set(gb as f64),
                None => {
                    let _ = gauge.remove_label_values(&[host]);
                }
            }
        }
    }

    pub fn clear_host_capacity(&self, host: &str) {
        let _ = self.capacity_total_gb.remove_label_values(&[host]);
        let _ = self.capacity_free_gb.remove_label_values(&[host]);
    }

    /// Free capacity last published for `host`
    pub fn host_free_capacity_gb(&self, host: &str) -> Option<f64> {
        self.capacity_free_gb
            .collect()
            .iter()
            .flat_map(|family| family.get_metric().iter())
            .find(|metric| {
                metric
                    .get_label()
                    .iter()
                    .any(|l| l.get_name() == "host" && l.get_value() == host)
            })
            .map(|metric| metric.get_gauge().get_value())
    }

    /// Text exposition of every collector
    pub fn encode(&self) -> Result<(String, Vec<u8>)> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(metrics_error)?;
        Ok((encoder.format_type().to_string(), buffer))
    }
}

fn metrics_error(e: prometheus::Error) -> Error {
    Error::Internal(format!("metrics: {}", e))
}
