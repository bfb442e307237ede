//! Prometheus metrics for the ledger node

use prometheus::{IntCounter, IntCounterVec, IntGauge, Opts, Registry};

pub struct Metrics {
    pub deposits_total: IntCounterVec,
    pub claims_total: IntCounterVec,
    /// Rejected deposits and claims, by error code
    pub rejections_total: IntCounterVec,
    pub global_exit_roots_published_total: IntCounter,
    pub global_exit_roots_imported_total: IntCounter,
    pub sync_errors_total: IntCounterVec,
    pub deposit_count: IntGauge,
    pub known_global_exit_roots: IntGauge,
    pub sync_cursor: IntGauge,
    pub emergency_state: IntGauge,
    pub registry: Registry,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let deposits_total = IntCounterVec::new(
            Opts::new("exit_ledger_deposits_total", "Deposits appended to the local exit tree"),
            &["leaf_type"],
        )
        .expect("constant metric name is valid");

        let claims_total = IntCounterVec::new(
            Opts::new("exit_ledger_claims_total", "Claims applied on this network"),
            &["leaf_type"],
        )
        .expect("constant metric name is valid");

        let rejections_total = IntCounterVec::new(
            Opts::new(
                "exit_ledger_rejections_total",
                "Rejected deposits and claims by error code",
            ),
            &["operation", "code"],
        )
        .expect("constant metric name is valid");

        let global_exit_roots_published_total = IntCounter::new(
            "exit_ledger_global_exit_roots_published_total",
            "New global exit roots committed by this authority",
        )
        .expect("constant metric name is valid");

        let global_exit_roots_imported_total = IntCounter::new(
            "exit_ledger_global_exit_roots_imported_total",
            "Global exit roots imported from the authority",
        )
        .expect("constant metric name is valid");

        let sync_errors_total = IntCounterVec::new(
            Opts::new("exit_ledger_sync_errors_total", "Failed peer sync attempts"),
            &["peer"],
        )
        .expect("constant metric name is valid");

        let deposit_count = IntGauge::new(
            "exit_ledger_deposit_count",
            "Number of leaves in the local exit tree",
        )
        .expect("constant metric name is valid");

        let known_global_exit_roots = IntGauge::new(
            "exit_ledger_known_global_exit_roots",
            "Global exit roots claims may be proven against",
        )
        .expect("constant metric name is valid");

        let sync_cursor = IntGauge::new(
            "exit_ledger_sync_cursor",
            "Next authority event cursor this replica will fetch",
        )
        .expect("constant metric name is valid");

        let emergency_state = IntGauge::new(
            "exit_ledger_emergency_state",
            "1 while deposits and claims are paused",
        )
        .expect("constant metric name is valid");

        // Names are unique constants and registration runs once per Metrics
        registry
            .register(Box::new(deposits_total.clone()))
            .expect("metric registration must not be called twice");
        registry
            .register(Box::new(claims_total.clone()))
            .expect("metric registration must not be called twice");
        registry
            .register(Box::new(rejections_total.clone()))
            .expect("metric registration must not be called twice");
        registry
            .register(Box::new(global_exit_roots_published_total.clone()))
            .expect("metric registration must not be called twice");
        registry
            .register(Box::new(global_exit_roots_imported_total.clone()))
            .expect("metric registration must not be called twice");
        registry
            .register(Box::new(sync_errors_total.clone()))
            .expect("metric registration must not be called twice");
        registry
            .register(Box::new(deposit_count.clone()))
            .expect("metric registration must not be called twice");
        registry
            .register(Box::new(known_global_exit_roots.clone()))
            .expect("metric registration must not be called twice");
        registry
            .register(Box::new(sync_cursor.clone()))
            .expect("metric registration must not be called twice");
        registry
            .register(Box::new(emergency_state.clone()))
            .expect("metric registration must not be called twice");

        Self {
            deposits_total,
            claims_total,
            rejections_total,
            global_exit_roots_published_total,
            global_exit_roots_imported_total,
            sync_errors_total,
            deposit_count,
            known_global_exit_roots,
            sync_cursor,
            emergency_state,
            registry,
        }
    }
}
