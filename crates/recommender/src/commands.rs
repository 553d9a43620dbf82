use anyhow::{Context, Result};
use colored::Colorize;
use filmrec_core::{ItemId, RecommenderConfig, UserId};
use filmrec_recommender::{
    Algorithm, EvaluationHarness, InMemoryStore, InteractionStore, ModelState,
    RecommendationEngine,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub fn open_store(interactions: &Path, items: &Path) -> Result<Arc<InMemoryStore>> {
    let store = InMemoryStore::from_json_files(interactions, items).with_context(|| {
        format!(
            "failed to load store exports {} and {}",
            interactions.display(),
            items.display()
        )
    })?;
    Ok(Arc::new(store))
}

fn engine(config: RecommenderConfig, store: Arc<InMemoryStore>) -> RecommendationEngine {
    RecommendationEngine::new(config, store.clone(), store)
}

pub fn train(config: RecommenderConfig, store: Arc<InMemoryStore>) -> Result<()> {
    println!("{}", "Training matrix factorization model...".cyan().bold());

    let engine = engine(config, store);
    engine.retrain().context("failed to rebuild recommendation state")?;

    let snapshot = engine.snapshot();
    match snapshot.model().state() {
        ModelState::Trained(factors) => {
            println!(
                "{} {} users x {} films, k = {}",
                "Trained".green().bold(),
                factors.user_ids().len(),
                factors.item_ids().len(),
                factors.factors()
            );
            if engine.storage().exists() {
                println!(
                    "  {} {}",
                    "→".cyan(),
                    engine.storage().path().display().to_string().white()
                );
            } else {
                println!("{}", "Model snapshot could not be written".yellow());
            }
        }
        ModelState::Untrained(reason) => {
            println!("{} {}", "Training not completed:".yellow().bold(), reason);
        }
        ModelState::Uninitialized => {
            println!("{}", "Training not completed".yellow().bold());
        }
    }

    Ok(())
}

pub fn recommend(
    config: RecommenderConfig,
    store: Arc<InMemoryStore>,
    user_id: UserId,
    algorithm: Algorithm,
    top_n: usize,
) -> Result<()> {
    let engine = engine(config, store);
    engine.reload().context("failed to build recommendation state")?;

    let bundle = engine
        .recommendation_bundle(user_id, algorithm, top_n)
        .with_context(|| format!("failed to recommend for user {}", user_id))?;
    print_json(&bundle)
}

pub fn similar_users(
    config: RecommenderConfig,
    store: Arc<InMemoryStore>,
    user_id: UserId,
    top_n: usize,
) -> Result<()> {
    let engine = engine(config, store);
    engine.reload().context("failed to build recommendation state")?;
    print_json(&engine.similar_users(user_id, top_n))
}

pub fn similar_items(
    config: RecommenderConfig,
    store: Arc<InMemoryStore>,
    item_id: ItemId,
    top_n: usize,
) -> Result<()> {
    let engine = engine(config, store);
    engine.reload().context("failed to build recommendation state")?;

    let similar = engine
        .similar_items(item_id, top_n)
        .with_context(|| format!("failed to look up films similar to {}", item_id))?;
    print_json(&similar)
}

pub fn evaluate(
    config: RecommenderConfig,
    store: Arc<InMemoryStore>,
    out: Option<PathBuf>,
) -> Result<()> {
    println!("{}", "Evaluating recommenders...".cyan().bold());

    let interactions = store
        .all_interactions()
        .context("failed to read interactions")?;
    let harness = EvaluationHarness::new(
        config.evaluation.clone(),
        &config.model,
        config.neighborhood.neighbor_count,
    );
    let report = harness.run(&interactions);

    if report.n_users == 0 {
        println!("{}", "Not enough users to evaluate, writing empty metrics".yellow());
    } else {
        println!(
            "\n{} users, K = {}\n",
            report.n_users.to_string().white().bold(),
            report.k
        );
        for algorithm in Algorithm::ALL {
            let metrics = report.metrics(algorithm);
            println!(
                "  {:<22} hit rate {:.4}  precision@K {:.4}",
                algorithm.as_str(),
                metrics.hit_rate,
                metrics.precision_at_k
            );
        }
    }

    let path = out.unwrap_or(config.evaluation.report_path);
    report
        .write_json(&path)
        .with_context(|| format!("failed to write report to {}", path.display()))?;
    println!(
        "\n{} {}",
        "Evaluation saved to".green().bold(),
        path.display()
    );

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("failed to encode output")?;
    println!("{}", json);
    Ok(())
}
