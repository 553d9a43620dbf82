//! Offline leave-one-out evaluation
//!
//! For each sampled user the chronologically last qualifying interaction is
//! held out, every algorithm is rebuilt from the remaining interactions, and
//! the held-out item is looked up in each algorithm's top-K candidates.

use crate::engine::{EngineSnapshot, ModelSource};
use crate::preference::PreferenceAggregator;
use crate::types::Algorithm;
use filmrec_core::{EvaluationConfig, Interaction, ItemId, MatrixFactorizationConfig, Result, UserId};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;
use std::time::Instant;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AlgorithmMetrics {
    pub hit_rate: f64,
    pub precision_at_k: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub n_users: usize,
    pub k: usize,
    pub user_based: AlgorithmMetrics,
    pub item_based: AlgorithmMetrics,
    pub matrix_factorization: AlgorithmMetrics,
}

impl EvaluationReport {
    pub fn empty(k: usize) -> Self {
        Self {
            n_users: 0,
            k,
            user_based: AlgorithmMetrics::default(),
            item_based: AlgorithmMetrics::default(),
            matrix_factorization: AlgorithmMetrics::default(),
        }
    }

    pub fn metrics(&self, algorithm: Algorithm) -> AlgorithmMetrics {
        match algorithm {
            Algorithm::UserBased => self.user_based,
            Algorithm::ItemBased => self.item_based,
            Algorithm::MatrixFactorization => self.matrix_factorization,
        }
    }

    fn metrics_mut(&mut self, algorithm: Algorithm) -> &mut AlgorithmMetrics {
        match algorithm {
            Algorithm::UserBased => &mut self.user_based,
            Algorithm::ItemBased => &mut self.item_based,
            Algorithm::MatrixFactorization => &mut self.matrix_factorization,
        }
    }

    /// Write the report as pretty JSON, creating parent directories
    pub fn write_json(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, self)?;
        tracing::info!(path = %path.display(), "Wrote evaluation report");
        Ok(())
    }
}

pub struct EvaluationHarness {
    config: EvaluationConfig,
    model_config: MatrixFactorizationConfig,
    neighbor_count: usize,
}

impl EvaluationHarness {
    /// `model_config` supplies the factor hyperparameters; epochs and seed
    /// are taken from the evaluation settings.
    pub fn new(
        config: EvaluationConfig,
        model_config: &MatrixFactorizationConfig,
        neighbor_count: usize,
    ) -> Self {
        let model_config = MatrixFactorizationConfig {
            epochs: config.epochs,
            seed: config.seed,
            ..model_config.clone()
        };
        Self {
            config,
            model_config,
            neighbor_count,
        }
    }

    pub fn run(&self, interactions: &[Interaction]) -> EvaluationReport {
        let start = Instant::now();
        let k = self.config.k;

        let mut ordered = interactions.to_vec();
        ordered.sort_by_key(|interaction| interaction.created_at);

        let users = self.sample_users(&ordered);
        if users.is_empty() {
            tracing::info!("No users with enough history to evaluate");
            return EvaluationReport::empty(k);
        }

        let mut report = EvaluationReport::empty(k);
        report.n_users = users.len();

        for &user_id in &users {
            let Some(held_out) = ordered
                .iter()
                .rposition(|i| i.user_id == user_id && i.is_qualifying())
            else {
                continue;
            };
            let target = ordered[held_out].item_id;

            let mut train = ordered.clone();
            train.remove(held_out);

            let exclude: HashSet<ItemId> = train
                .iter()
                .filter(|i| i.user_id == user_id)
                .map(|i| i.item_id)
                .collect();

            let snapshot = EngineSnapshot::build(
                &self.model_config,
                self.neighbor_count,
                &train,
                ModelSource::Train(None),
            );

            for algorithm in Algorithm::ALL {
                let top_k = snapshot.candidates(user_id, algorithm, &exclude, k);
                let hit = top_k.iter().any(|scored| scored.item_id == target);
                if hit {
                    let metrics = report.metrics_mut(algorithm);
                    metrics.hit_rate += 1.0;
                    metrics.precision_at_k += 1.0 / k as f64;
                }
            }
        }

        let n = report.n_users as f64;
        for algorithm in Algorithm::ALL {
            let metrics = report.metrics_mut(algorithm);
            metrics.hit_rate /= n;
            metrics.precision_at_k /= n;
        }

        tracing::info!(
            n_users = report.n_users,
            k,
            user_based_hit_rate = report.user_based.hit_rate,
            item_based_hit_rate = report.item_based.hit_rate,
            mf_hit_rate = report.matrix_factorization.hit_rate,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Evaluation finished"
        );

        report
    }

    /// Users with at least two qualifying items, shuffled and capped
    fn sample_users(&self, interactions: &[Interaction]) -> Vec<UserId> {
        let preferences = PreferenceAggregator::aggregate(interactions);
        let mut users: Vec<UserId> = preferences
            .sorted_user_ids()
            .into_iter()
            .filter(|&user_id| preferences.user_vector(user_id).map_or(0, |v| v.len()) >= 2)
            .collect();

        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        users.shuffle(&mut rng);
        users.truncate(self.config.sample_users);
        users
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn harness(k: usize) -> EvaluationHarness {
        let config = EvaluationConfig {
            k,
            seed: Some(3),
            ..Default::default()
        };
        EvaluationHarness::new(config, &MatrixFactorizationConfig::default(), 20)
    }

    #[test]
    fn test_no_eligible_users_gives_empty_report() {
        let now = Utc::now();
        let interactions = vec![
            Interaction::new(1, 10, now).with_like(),
            Interaction::new(2, 11, now).with_rating(3),
            Interaction::new(2, 12, now),
        ];

        let report = harness(5).run(&interactions);
        assert_eq!(report, EvaluationReport::empty(5));
    }

    #[test]
    fn test_held_out_item_found_by_neighborhood_methods() {
        let t0 = Utc::now();
        let at = |minutes: i64| t0 + Duration::minutes(minutes);
        let interactions = vec![
            Interaction::new(2, 10, at(0)).with_like(),
            Interaction::new(2, 11, at(1)).with_like(),
            Interaction::new(1, 10, at(2)).with_like(),
            // held out for user 1
            Interaction::new(1, 11, at(3)).with_like(),
        ];

        let report = harness(5).run(&interactions);

        assert_eq!(report.n_users, 2);
        assert!((report.user_based.hit_rate - 1.0).abs() < 1e-12);
        assert!((report.item_based.hit_rate - 1.0).abs() < 1e-12);
        assert!((report.user_based.precision_at_k - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_write_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reports").join("eval.json");
        let report = EvaluationReport::empty(5);
        report.write_json(&path).unwrap();

        let parsed: EvaluationReport =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed, report);
        assert!(fs::read_to_string(&path).unwrap().contains("\"matrix_factorization\""));
    }
}
