//! Integration tests for offline evaluation

use chrono::{Duration, Utc};
use filmrec_core::{EvaluationConfig, Interaction, MatrixFactorizationConfig};
use filmrec_recommender::{Algorithm, EvaluationHarness, EvaluationReport};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::Layer;

/// Counts INFO events seen by the thread-local subscriber
struct InfoCounter(Arc<AtomicUsize>);

impl<S: Subscriber> Layer<S> for InfoCounter {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() == Level::INFO {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }
}

fn harness(sample_users: usize) -> EvaluationHarness {
    let config = EvaluationConfig {
        sample_users,
        k: 5,
        seed: Some(9),
        ..Default::default()
    };
    EvaluationHarness::new(config, &MatrixFactorizationConfig::default(), 20)
}

#[test]
fn test_no_interactions_reports_zero_users() {
    let report = harness(200).run(&[]);
    assert_eq!(report.n_users, 0);
    assert_eq!(report.k, 5);
    for algorithm in Algorithm::ALL {
        let metrics = report.metrics(algorithm);
        assert_eq!(metrics.hit_rate, 0.0);
        assert_eq!(metrics.precision_at_k, 0.0);
    }
}

#[test]
fn test_metrics_bounded_and_precision_is_hit_rate_over_k() {
    let t0 = Utc::now() - Duration::days(10);
    let mut interactions = Vec::new();
    let mut minute = 0;
    for user_id in 1..=8i64 {
        for offset in 0..4i64 {
            minute += 1;
            let item_id = (user_id + offset) % 10 + 1;
            interactions.push(
                Interaction::new(user_id, item_id, t0 + Duration::minutes(minute)).with_like(),
            );
        }
    }

    let report = harness(5).run(&interactions);
    assert_eq!(report.n_users, 5);

    for algorithm in Algorithm::ALL {
        let metrics = report.metrics(algorithm);
        assert!((0.0..=1.0).contains(&metrics.hit_rate));
        assert!((metrics.precision_at_k - metrics.hit_rate / 5.0).abs() < 1e-9);
    }
}

#[test]
fn test_seeded_runs_are_reproducible() {
    let t0 = Utc::now();
    let interactions: Vec<Interaction> = (0..30i64)
        .map(|n| {
            Interaction::new(n % 6, n % 7, t0 + Duration::seconds(n))
                .with_rating((n % 5 + 1) as u8)
        })
        .collect();

    let first = harness(3).run(&interactions);
    let second = harness(3).run(&interactions);
    assert_eq!(first, second);
}

#[test]
fn test_report_json_shape() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("recommendation_eval.json");
    EvaluationReport::empty(5).write_json(&path).unwrap();

    let value: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(value["n_users"], 0);
    assert_eq!(value["k"], 5);
    assert_eq!(value["user_based"]["hit_rate"], 0.0);
    assert_eq!(value["matrix_factorization"]["precision_at_k"], 0.0);
}

#[test]
fn test_per_user_rebuilds_stay_below_info() {
    let t0 = Utc::now();
    let interactions: Vec<Interaction> = (0..40i64)
        .map(|n| Interaction::new(n % 8, n % 9, t0 + Duration::seconds(n)).with_like())
        .collect();

    let count = Arc::new(AtomicUsize::new(0));
    let subscriber = tracing_subscriber::registry().with(InfoCounter(Arc::clone(&count)));
    let report = tracing::subscriber::with_default(subscriber, || harness(6).run(&interactions));

    assert_eq!(report.n_users, 6);
    // only the final summary
    assert_eq!(count.load(Ordering::SeqCst), 1);
}
