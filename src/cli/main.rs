use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use forensic_case_manager::{
    config::Config,
    ml::{run_training, train_model, FeatureRow, InferenceService, TrainingOutcome},
    seed::{generate_random_cases, reference_cases, seed_if_empty},
    state::create_store,
    telemetry::init_tracing,
};
use serde_json::Value;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "fcm-cli")]
#[command(about = "Forensic case manager trainer and model tools", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file layered over the built-in defaults
    #[arg(short, long, env = "CONFIG_PATH")]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train the case-type classifier and write the model artifact
    Train {
        /// Artifact output path (defaults to model.artifact_path)
        #[arg(short, long)]
        artifact: Option<PathBuf>,

        /// Train on a JSON array of case documents instead of the store
        #[arg(short, long, value_name = "FILE")]
        records: Option<PathBuf>,

        /// Insert the reference cases first when the store is empty
        #[arg(long)]
        seed_if_empty: bool,
    },

    /// Predict the case type for one victim
    Predict {
        #[arg(long)]
        idade: f64,

        #[arg(long)]
        etnia: String,

        #[arg(long)]
        localizacao: String,

        #[arg(short, long)]
        artifact: Option<PathBuf>,
    },

    /// Print per-feature importance of a trained model
    Importance {
        #[arg(short, long)]
        artifact: Option<PathBuf>,
    },

    /// Insert random cases into the store
    Seed {
        #[arg(short = 'n', long, default_value = "20")]
        count: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
    .context("failed to load configuration")?;

    init_tracing(&config.observability);

    match cli.command {
        Commands::Train {
            artifact,
            records,
            seed_if_empty: seed,
        } => {
            let mut model_config = config.model.clone();
            if let Some(path) = artifact {
                model_config.artifact_path = path;
            }

            let outcome = match records {
                Some(file) => {
                    let documents = read_documents(&file)?;
                    let outcome = train_model(&documents, &model_config.boosting)?;
                    outcome.artifact.save(&model_config.artifact_path)?;
                    outcome
                }
                None => {
                    let store = create_store(&config.store).await?;
                    if seed {
                        seed_if_empty(store.as_ref(), &reference_cases()).await?;
                    }
                    run_training(store.as_ref(), &model_config).await?
                }
            };

            print_training_summary(&outcome, &model_config.artifact_path);
        }

        Commands::Predict {
            idade,
            etnia,
            localizacao,
            artifact,
        } => {
            let service = load_service(artifact.as_ref().unwrap_or(&config.model.artifact_path))?;
            let prediction = service.predict(&FeatureRow::new(idade, etnia, localizacao))?;
            println!("{}", serde_json::to_string_pretty(&prediction)?);
        }

        Commands::Importance { artifact } => {
            let service = load_service(artifact.as_ref().unwrap_or(&config.model.artifact_path))?;
            let importance = service.feature_importance()?;
            println!("{}", serde_json::to_string_pretty(&importance)?);
        }

        Commands::Seed { count } => {
            let store = create_store(&config.store).await?;
            let documents: Vec<Value> = generate_random_cases(count, &mut rand::rng())
                .iter()
                .map(|record| record.to_document())
                .collect();
            let inserted = store.insert_many(&documents).await?;
            println!("✅ Inserted {} cases", inserted);
        }
    }

    Ok(())
}

fn read_documents(path: &Path) -> anyhow::Result<Vec<Value>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    match serde_json::from_str(&text)? {
        Value::Array(documents) => Ok(documents),
        _ => bail!("{} must contain a JSON array of case documents", path.display()),
    }
}

fn load_service(path: &Path) -> anyhow::Result<InferenceService> {
    InferenceService::load(path)
        .with_context(|| format!("failed to load model artifact {}", path.display()))
}

fn print_training_summary(outcome: &TrainingOutcome, path: &Path) {
    let metadata = &outcome.artifact.metadata;
    println!("✅ Model written to {}", path.display());
    println!("   Classes: {:?}", metadata.classes);
    println!(
        "   Samples: {} used, {} skipped",
        metadata.n_training_samples, metadata.n_skipped_records
    );
    println!(
        "   Training accuracy: {:.2}%",
        metadata.training_metrics.accuracy * 100.0
    );
    for skipped in &outcome.skipped {
        println!("   ⚠️  record {} skipped: {}", skipped.index, skipped.reason);
    }
}
