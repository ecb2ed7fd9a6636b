use algo_app::database::Database;
use algo_app::models::{Difficulty, SeedQuestion};
use anyhow::{anyhow, Context, Result};
use sqlx::Row;
use std::collections::BTreeSet;
use std::env;

#[derive(Debug, Default)]
struct SeedStats {
    in_dataset: usize,
    already_present: usize,
    invalid: Vec<String>,
    inserted: usize,
}

impl SeedStats {
    fn new_questions(&self) -> usize {
        self.in_dataset - self.already_present - self.invalid.len()
    }

    fn print_summary(&self, dry_run: bool) {
        println!("\n=== Seed Summary ===");
        println!("Questions in dataset: {}", self.in_dataset);
        println!("Already in database: {}", self.already_present);

        if !self.invalid.is_empty() {
            println!("Skipped as invalid: {}", self.invalid.len());
            for reason in &self.invalid {
                println!("  - {}", reason);
            }
        }

        if dry_run {
            println!("Questions that WOULD BE inserted: {}", self.new_questions());
            println!("\n** DRY RUN MODE - No changes were made **");
        } else {
            println!("Questions inserted: {}", self.inserted);
        }
    }
}

async fn existing_ids(db: &Database) -> Result<BTreeSet<i64>> {
    let rows = sqlx::query("SELECT id FROM questions")
        .fetch_all(db.pool())
        .await?;
    rows.iter()
        .map(|row| row.try_get::<i64, _>("id").map_err(anyhow::Error::from))
        .collect()
}

fn examine(seeds: &[SeedQuestion], existing: &BTreeSet<i64>) -> SeedStats {
    let mut stats = SeedStats {
        in_dataset: seeds.len(),
        ..SeedStats::default()
    };
    for seed in seeds {
        if Difficulty::from_level(seed.difficulty).is_none() {
            stats.invalid.push(format!(
                "Question {} (\"{}\") has unknown difficulty {}",
                seed.id, seed.title, seed.difficulty
            ));
        } else if existing.contains(&seed.id) {
            stats.already_present += 1;
        }
    }
    stats
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let args: Vec<String> = env::args().skip(1).collect();
    let dry_run = args.iter().any(|arg| arg == "--dry-run");
    let path = args
        .iter()
        .find(|arg| !arg.starts_with("--"))
        .cloned()
        .or_else(|| env::var("SEED_PATH").ok())
        .ok_or_else(|| anyhow!("Usage: seed_questions [--dry-run] <dataset.json> (or set SEED_PATH)"))?;

    println!("=== Question Seeding Tool ===");
    if dry_run {
        println!("** RUNNING IN DRY-RUN MODE **");
    }

    let raw = tokio::fs::read_to_string(&path)
        .await
        .with_context(|| format!("Failed to read dataset {}", path))?;
    let seeds: Vec<SeedQuestion> =
        serde_json::from_str(&raw).with_context(|| format!("Invalid dataset {}", path))?;

    let database_url = env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:algo_app.db".to_string());
    println!("\nConnecting to database: {}", database_url);
    let db = Database::new(&database_url).await?;

    let mut stats = examine(&seeds, &existing_ids(&db).await?);

    if dry_run {
        stats.print_summary(true);
        println!("\nTo seed the database, run:");
        println!("cargo run --bin seed_questions -- {}", path);
        return Ok(());
    }

    stats.inserted = db.seed_questions(&seeds).await?;
    println!("\n✓ Seeding complete");
    stats.print_summary(false);

    Ok(())
}
