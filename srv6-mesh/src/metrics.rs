use std::sync::{LazyLock, RwLock};

use prometheus_client::metrics::counter::Counter;
use prometheus_client::registry::Registry;

pub static REGISTRY: LazyLock<RwLock<Registry>> =
    LazyLock::new(|| RwLock::new(Registry::with_prefix("srv6_mesh")));

#[derive(Clone)]
pub struct ReconcilerMetrics {
    pub runs: Counter,
    pub map_write_failures: Counter,
    pub signaler_events: Counter,
}

pub static RECONCILER: LazyLock<ReconcilerMetrics> = LazyLock::new(|| {
    let mut guard = REGISTRY.write().unwrap();
    let registry = guard.sub_registry_with_prefix("reconciler");

    let runs = Counter::default();
    let map_write_failures = Counter::default();
    let signaler_events = Counter::default();

    registry.register("runs", "Number of reconciliation passes", runs.clone());
    registry.register(
        "map_write_failures",
        "Number of datapath map writes that failed",
        map_write_failures.clone(),
    );
    registry.register(
        "signaler_events",
        "Number of BGP signaler kicks",
        signaler_events.clone(),
    );

    ReconcilerMetrics {
        runs,
        map_write_failures,
        signaler_events,
    }
});
