/// Stress tests for large canvases
///
/// These tests verify correctness under scale:
/// - Convergence of many replicas over tens of thousands of operations
/// - Index churn with constant moves on a large entity set
/// - A long-running session pair under continuous edits
///
/// Run with: cargo test --test stress_tests -- --ignored --nocapture

#[cfg(test)]
mod stress_tests {
    use quilt_core::core_canvas::sync::{memory_transport, SyncSession};
    use quilt_core::core_canvas::{fields, EntityId, Rect, Replica, ReplicaOptions, Site};
    use quilt_core::simulate::{self, SimulationConfig};
    use quilt_core::test_utils::{assert_index_consistent, assert_query_matches_scan, random_rect, test_rng_with_seed, wait_until};
    use rand::Rng;
    use std::time::{Duration, Instant};
    use tokio::sync::watch;

    #[test]
    #[ignore]
    fn stress_many_replicas_converge() {
        let config = SimulationConfig {
            replicas: 8,
            ops: 20_000,
            duplicates: 5_000,
            entities: 2_000,
            queries: 200,
            ..Default::default()
        };
        let start = Instant::now();
        let report = simulate::run(&config).unwrap();
        println!("simulated {} deliveries in {:?}", report.deliveries, start.elapsed());
        assert!(report.passed(), "{report:?}");
    }

    #[test]
    #[ignore]
    fn stress_index_churn() {
        let mut rng = test_rng_with_seed(7);
        let mut replica = Replica::with_options(Site::generate(), ReplicaOptions::default());
        let ids: Vec<EntityId> = (0..10_000)
            .map(|_| replica.create(random_rect(&mut rng, 10_000.0, 80.0)).unwrap().0)
            .collect();

        let start = Instant::now();
        for _ in 0..100_000 {
            let id = ids[rng.random_range(0..ids.len())];
            let field = if rng.random_bool(0.5) { fields::X } else { fields::Y };
            replica.apply_local(id, field, rng.random_range(0.0..10_000.0)).unwrap();
        }
        println!("100k moves in {:?}, {} repacks", start.elapsed(), replica.stats().index_rebuilds);

        assert_index_consistent(&replica);
        for _ in 0..50 {
            assert_query_matches_scan(&replica, random_rect(&mut rng, 10_000.0, 1_000.0));
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[ignore]
    async fn stress_session_under_continuous_edits() {
        // deep enough that neither session lags behind the edit loop
        let options = ReplicaOptions { op_capacity: 1 << 18, ..Default::default() };
        let a = Replica::with_options(Site::generate(), options.clone()).into_shared();
        let b = Replica::with_options(Site::generate(), options).into_shared();
        let (ta, tb) = memory_transport();
        let (stop_tx, stop_rx) = watch::channel(false);
        let left = tokio::spawn(SyncSession::new(a.clone(), ta).with_shutdown(stop_rx.clone()).run());
        let right = tokio::spawn(SyncSession::new(b.clone(), tb).with_shutdown(stop_rx).run());

        let mut rng = test_rng_with_seed(99);
        let ids: Vec<EntityId> = (0..500).map(|_| EntityId::generate()).collect();
        for round in 0..20_000 {
            let target = if round % 2 == 0 { &a } else { &b };
            let id = ids[rng.random_range(0..ids.len())];
            let rect = Rect::new(rng.random_range(0.0..500.0), rng.random_range(0.0..500.0), 5.0, 5.0);
            target.lock().unwrap().place(id, rect).unwrap();
            if round % 1_000 == 0 {
                tokio::task::yield_now().await;
            }
        }

        let converged = wait_until(Duration::from_secs(60), Duration::from_millis(20), || {
            *a.lock().unwrap().store() == *b.lock().unwrap().store()
        })
        .await;
        assert!(converged.is_ok());

        stop_tx.send(true).unwrap();
        let report_a = left.await.unwrap().unwrap();
        let report_b = right.await.unwrap().unwrap();
        println!("a sent {}, b sent {}", report_a.ops_sent, report_b.ops_sent);
    }
}
