//! Synthetic case records for demos and empty stores.

use crate::error::Result;
use crate::models::CaseRecord;
use crate::state::CaseStore;
use chrono::{Duration, Local};
use rand::seq::IndexedRandom;
use rand::Rng;
use serde_json::Value;

const CASE_TYPES: [&str; 4] = ["Furto", "Assalto", "Violência doméstica", "Tráfico"];
const LOCATIONS: [&str; 4] = ["Centro", "Bairro A", "Bairro B", "Zona Rural"];
const ETHNICITIES: [&str; 5] = ["Branca", "Preta", "Parda", "Indígena", "Amarela"];

/// Generate `n` valid case records dated within the last year
pub fn generate_random_cases<R: Rng + ?Sized>(n: usize, rng: &mut R) -> Vec<CaseRecord> {
    let today = Local::now().date_naive();

    (0..n)
        .map(|_| {
            let days_back = rng.random_range(0..=365);
            let date = today - Duration::days(days_back);
            CaseRecord::new(
                date.format("%Y-%m-%d").to_string(),
                pick(&CASE_TYPES, rng),
                pick(&LOCATIONS, rng),
                pick(&ETHNICITIES, rng),
                rng.random_range(1..=90),
            )
        })
        .collect()
}

fn pick<R: Rng + ?Sized>(values: &[&str], rng: &mut R) -> String {
    values.choose(rng).copied().unwrap_or_default().to_string()
}

/// The three two-class training records used as the reference data set
pub fn reference_cases() -> Vec<CaseRecord> {
    vec![
        CaseRecord::new("2024-01-10", "Caso A", "São Paulo", "Branca", 30),
        CaseRecord::new("2024-02-14", "Caso B", "Rio de Janeiro", "Parda", 25),
        CaseRecord::new("2024-03-21", "Caso A", "Belo Horizonte", "Negra", 40),
    ]
}

/// Insert `records` only when the store holds no cases. Returns how many were written.
pub async fn seed_if_empty(store: &dyn CaseStore, records: &[CaseRecord]) -> Result<usize> {
    let existing = store.count_cases().await?;
    if existing > 0 {
        tracing::debug!(existing, "Store already populated, skipping seed");
        return Ok(0);
    }

    let documents: Vec<Value> = records.iter().map(CaseRecord::to_document).collect();
    let inserted = store.insert_many(&documents).await?;
    tracing::info!(inserted, "Seeded empty case store");
    Ok(inserted)
}
