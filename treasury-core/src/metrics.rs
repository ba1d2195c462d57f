//! Metrics collection for observability
//!
//! # Metrics
//!
//! - `treasury_disbursements_total` - Disbursements committed
//! - `treasury_recoveries_total` - Recoveries committed
//! - `treasury_tips_total` - Tips committed
//! - `treasury_airdrop_credits_total` - Airdrop credits confirmed
//! - `treasury_airdrop_failures_total` - Airdrop credits failed
//! - `treasury_balance_minor` - Treasury reserve, minor units
//! - `treasury_op_duration_seconds` - Operation latency histogram
//!
//! Each engine owns its own registry so parallel instances (and tests)
//! never collide on the process-global default registry.

use prometheus::{proto::MetricFamily, Histogram, HistogramOpts, IntCounter, IntGauge, Registry};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Disbursements committed
    pub disbursements_total: IntCounter,

    /// Recoveries committed
    pub recoveries_total: IntCounter,

    /// Tips committed
    pub tips_total: IntCounter,

    /// Airdrop credits confirmed
    pub airdrop_credits_total: IntCounter,

    /// Airdrop credits failed
    pub airdrop_failures_total: IntCounter,

    /// Treasury reserve, minor units
    pub treasury_balance: IntGauge,

    /// Operation latency histogram
    pub op_duration: Histogram,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics").finish_non_exhaustive()
    }
}

impl Metrics {
    /// Create a collector with its own registry
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let disbursements_total = IntCounter::new(
            "treasury_disbursements_total",
            "Disbursements committed against the treasury",
        )?;
        registry.register(Box::new(disbursements_total.clone()))?;

        let recoveries_total = IntCounter::new(
            "treasury_recoveries_total",
            "Recoveries committed against the treasury",
        )?;
        registry.register(Box::new(recoveries_total.clone()))?;

        let tips_total = IntCounter::new(
            "treasury_tips_total",
            "Direct user-to-user tips committed",
        )?;
        registry.register(Box::new(tips_total.clone()))?;

        let airdrop_credits_total = IntCounter::new(
            "treasury_airdrop_credits_total",
            "Airdrop per-user credits confirmed",
        )?;
        registry.register(Box::new(airdrop_credits_total.clone()))?;

        let airdrop_failures_total = IntCounter::new(
            "treasury_airdrop_failures_total",
            "Airdrop per-user credits failed",
        )?;
        registry.register(Box::new(airdrop_failures_total.clone()))?;

        let treasury_balance = IntGauge::new(
            "treasury_balance_minor",
            "Treasury reserve balance in minor units",
        )?;
        registry.register(Box::new(treasury_balance.clone()))?;

        let op_duration = Histogram::with_opts(
            HistogramOpts::new(
                "treasury_op_duration_seconds",
                "Latency of committed treasury operations",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]),
        )?;
        registry.register(Box::new(op_duration.clone()))?;

        Ok(Self {
            disbursements_total,
            recoveries_total,
            tips_total,
            airdrop_credits_total,
            airdrop_failures_total,
            treasury_balance,
            op_duration,
            registry,
        })
    }

    /// Gather all metric families for export
    pub fn gather(&self) -> Vec<MetricFamily> {
        self.registry.gather()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_register_and_gather() {
        let metrics = Metrics::new().unwrap();
        metrics.disbursements_total.inc();
        metrics.treasury_balance.set(500_000_000);

        let families = metrics.gather();
        assert!(families
            .iter()
            .any(|f| f.get_name() == "treasury_disbursements_total"));
    }

    #[test]
    fn test_independent_registries() {
        // Two collectors must not collide
        let a = Metrics::new().unwrap();
        let b = Metrics::new().unwrap();
        a.disbursements_total.inc();
        assert_eq!(b.disbursements_total.get(), 0);
    }
}
