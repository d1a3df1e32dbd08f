// tests/integration/stats_test.rs

use meshkv::stats::StatsEngine;

#[test]
fn counters_and_latencies_surface_through_the_current_5m_view() {
    let engine = StatsEngine::new();

    for _ in 0..3 {
        engine.increment("get");
    }
    engine.increment("get_not_found");
    engine.record_latency("get_latency_us", 150);
    engine.record_latency("get_latency_us", 250);

    assert_eq!(engine.current_5m(|p| p.counters.get("get")), 3);
    assert_eq!(engine.current_5m(|p| p.counters.get("get_not_found")), 1);

    let snap = engine.current_5m(|p| p.accumulators.snapshot("get_latency_us").unwrap());
    assert_eq!(snap.count, 2);
    assert_eq!(snap.sum, 400);
    assert_eq!(snap.hwm, 250);
    assert_eq!(snap.lwm, 150);
}

#[test]
fn per_server_counters_are_tracked_as_managed_rows() {
    let engine = StatsEngine::new();
    engine.increment("server-a");
    engine.increment("server-a");
    engine.increment("server-b");

    assert_eq!(engine.current_5m(|p| p.counters.get("server-a")), 2);
    assert_eq!(engine.current_5m(|p| p.counters.get("server-b")), 1);
    assert_eq!(engine.current_5m(|p| p.counters.get("server-c")), 0);
}
