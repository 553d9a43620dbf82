use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use filmrec_core::{init_logging, load_dotenv, RecommenderConfig};
use filmrec_recommender::Algorithm;
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(name = "filmrec")]
#[command(about = "Film recommendation engine: training, serving and offline evaluation", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(
        long,
        global = true,
        env = "FILMREC_INTERACTIONS",
        help = "JSON export of user-film interactions"
    )]
    interactions: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        env = "FILMREC_ITEMS",
        help = "JSON export of the film catalog"
    )]
    items: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        env = "FILMREC_CONFIG",
        help = "Configuration file (defaults to config/filmrec.*)"
    )]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Train the matrix factorization model and persist it")]
    Train,

    #[command(about = "Recommend films for a user")]
    Recommend {
        #[arg(short, long, help = "User id")]
        user: i64,

        #[arg(
            short,
            long,
            default_value = "user_based",
            help = "user_based, item_based or matrix_factorization"
        )]
        algorithm: Algorithm,

        #[arg(short = 'n', long, default_value = "10", help = "Number of films")]
        top_n: usize,
    },

    #[command(about = "Show users with similar taste")]
    SimilarUsers {
        #[arg(short, long, help = "User id")]
        user: i64,

        #[arg(short = 'n', long, default_value = "5")]
        top_n: usize,
    },

    #[command(about = "Show films liked by the same users")]
    SimilarItems {
        #[arg(short, long, help = "Film id")]
        item: i64,

        #[arg(short = 'n', long, default_value = "10")]
        top_n: usize,
    },

    #[command(about = "Run leave-one-out evaluation and write the report")]
    Evaluate {
        #[arg(short, long, help = "Report path (defaults to evaluation.report_path)")]
        out: Option<PathBuf>,
    },
}

fn main() {
    if let Err(err) = run() {
        eprintln!("{} {:#}", "Error:".red().bold(), err);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    load_dotenv();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => RecommenderConfig::load_from(path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))?,
        None => RecommenderConfig::load().context("failed to load configuration")?,
    };
    init_logging(&config.logging).context("failed to initialize logging")?;

    let interactions = cli
        .interactions
        .context("--interactions or FILMREC_INTERACTIONS must be set")?;
    let items = cli
        .items
        .context("--items or FILMREC_ITEMS must be set")?;
    let store = commands::open_store(&interactions, &items)?;

    match cli.command {
        Commands::Train => commands::train(config, store)?,
        Commands::Recommend {
            user,
            algorithm,
            top_n,
        } => commands::recommend(config, store, user, algorithm, top_n)?,
        Commands::SimilarUsers { user, top_n } => {
            commands::similar_users(config, store, user, top_n)?
        }
        Commands::SimilarItems { item, top_n } => {
            commands::similar_items(config, store, item, top_n)?
        }
        Commands::Evaluate { out } => commands::evaluate(config, store, out)?,
    }

    Ok(())
}
