//! Synthetic population generator.
//!
//! `synth_population [count] [seed]` writes one NDJSON row per person to
//! stdout, using the mixed-case column names real survey extracts tend to
//! carry, and a short summary to stderr.

use std::collections::BTreeMap;
use std::env;
use std::io::{BufWriter, Write};

use anyhow::{Result, anyhow};
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use rand_distr::{Distribution, LogNormal, Normal};
use serde_json::json;

const MODES: [(&str, f64); 6] = [
    ("Drive", 0.62),
    ("Public Transit", 0.16),
    ("Bike", 0.06),
    ("Walk", 0.05),
    ("EV", 0.04),
    ("Carpool", 0.07),
];
const EDUCATION: [(&str, f64); 3] =
    [("High School", 0.42), ("Some College", 0.28), ("Bachelor", 0.30)];
const SECTORS: [(&str, f64); 6] = [
    ("Retail", 0.24),
    ("Manufacturing", 0.18),
    ("Healthcare", 0.20),
    ("Tech", 0.12),
    ("Hospitality", 0.16),
    ("Green Energy", 0.10),
];
const RACES: [(&str, f64); 5] =
    [("White", 0.45), ("Hispanic", 0.25), ("Black", 0.13), ("Asian", 0.14), ("Other", 0.03)];
const COUNTIES: [(&str, f64); 4] =
    [("Alameda", 0.35), ("Contra Costa", 0.25), ("San Joaquin", 0.22), ("Solano", 0.18)];

fn pick<'a>(rng: &mut impl Rng, table: &'a [(&'a str, f64)]) -> Result<&'a str> {
    table.choose_weighted(rng, |(_, w)| *w).map(|(name, _)| *name).map_err(|e| anyhow!("{e}"))
}

fn main() -> Result<()> {
    env_logger::init();

    let count: usize = env::args().nth(1).and_then(|s| s.parse().ok()).unwrap_or(1_000);
    let seed: u64 = env::args().nth(2).and_then(|s| s.parse().ok()).unwrap_or(42);

    let mut rng = ChaCha20Rng::seed_from_u64(seed);
    let income_dist = LogNormal::new(45_000f64.ln(), 0.6).map_err(|e| anyhow!("{e}"))?;
    let distance_dist = Normal::<f64>::new(12.0, 6.0).map_err(|e| anyhow!("{e}"))?;

    let stdout = std::io::stdout();
    let mut out = BufWriter::new(stdout.lock());

    let mut income_sum = 0.0;
    let mut mode_counts: BTreeMap<&str, usize> = BTreeMap::new();
    let mut race_counts: BTreeMap<&str, usize> = BTreeMap::new();

    for _ in 0..count {
        let income = income_dist.sample(&mut rng).clamp(8_000.0, 400_000.0).round();
        let rent = (income * rng.random_range(0.22..0.40) / 12.0).max(450.0).round();
        let mode = pick(&mut rng, &MODES)?;
        let distance = distance_dist.sample(&mut rng).clamp(0.5, 60.0);
        let owns_vehicle = matches!(mode, "Drive" | "EV" | "Carpool") || rng.random_bool(0.35);
        let household = rng.random_range(1..=6u32);
        let race = pick(&mut rng, &RACES)?;

        let row = json!({
            "Income": income,
            "Rent": rent,
            "Employed": if rng.random_bool(0.94) { "Yes" } else { "No" },
            "Commute_Mode": mode,
            "Commute_Distance": (distance * 10.0).round() / 10.0,
            "Vehicle_Own": if owns_vehicle { "Yes" } else { "No" },
            "Education_Level": pick(&mut rng, &EDUCATION)?,
            "Employment_Sector": pick(&mut rng, &SECTORS)?,
            "Household_Size": household,
            "Race_Ethnicity": race,
            "County": pick(&mut rng, &COUNTIES)?,
            "Energy_Use": (60.0 + household as f64 * 25.0 + rng.random_range(-20.0..20.0)).round()
        });
        writeln!(out, "{row}")?;

        income_sum += income;
        *mode_counts.entry(mode).or_insert(0) += 1;
        *race_counts.entry(race).or_insert(0) += 1;
    }
    out.flush()?;

    eprintln!(
        "synth_population: {count} people, seed {seed}, mean income {:.0}",
        if count == 0 { 0.0 } else { income_sum / count as f64 }
    );
    for (mode, n) in &mode_counts {
        eprintln!("  mode={mode:<16}  people={n:>6}");
    }
    for (race, n) in &race_counts {
        eprintln!("  race={race:<16}  people={n:>6}");
    }
    Ok(())
}
