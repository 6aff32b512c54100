use std::collections::HashMap;

use crate::types::{CommuteMode, IncomeBracket};

/// Commuting days per year; also the annualisation constant for carbon cost.
pub const COMMUTE_DAYS_PER_YEAR: f64 = 250.0;

/// Category label used when a record carries no value for a field.
pub const UNKNOWN: &str = "Unknown";

/// Gini coefficient of `incomes`: `Σ(2·rank − n − 1)·x / (n · Σx)` over the
/// ascending sort with 1-based rank. Zero when the total is zero (including
/// the empty population).
pub fn gini(incomes: &[f64]) -> f64 {
    let mut sorted = incomes.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let n = sorted.len() as f64;
    let total: f64 = sorted.iter().sum();
    if total == 0.0 {
        return 0.0;
    }
    let weighted: f64 = sorted
        .iter()
        .enumerate()
        .map(|(i, x)| (2.0 * (i + 1) as f64 - n - 1.0) * x)
        .sum();
    weighted / (n * total)
}

/// Count records per category label in discovery order.
///
/// `label` returns the first non-empty value among a field's candidate names;
/// `None` or an empty string counts as [`UNKNOWN`].
pub fn distribution<T, F>(records: &[T], label: F) -> Vec<(String, usize)>
where
    F: Fn(&T) -> Option<&str>,
{
    let mut counts: Vec<(String, usize)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for r in records {
        let value = label(r).map(str::trim).filter(|s| !s.is_empty()).unwrap_or(UNKNOWN);
        match index.get(value) {
            Some(&i) => counts[i].1 += 1,
            None => {
                index.insert(value.to_string(), counts.len());
                counts.push((value.to_string(), 1));
            }
        }
    }
    counts
}

pub fn income_bracket(income: f64) -> IncomeBracket {
    if income < 25_000.0 {
        IncomeBracket::Under25k
    } else if income < 50_000.0 {
        IncomeBracket::From25kTo50k
    } else if income < 75_000.0 {
        IncomeBracket::From50kTo75k
    } else if income < 100_000.0 {
        IncomeBracket::From75kTo100k
    } else {
        IncomeBracket::Over100k
    }
}

/// Counts for all five brackets, in bracket order, zero counts included.
pub fn income_bracket_distribution(incomes: &[f64]) -> Vec<(IncomeBracket, usize)> {
    let mut counts = [0usize; 5];
    for &income in incomes {
        counts[income_bracket(income) as usize] += 1;
    }
    IncomeBracket::ALL.iter().copied().zip(counts).collect()
}

/// kg CO2 per commute mile.
pub fn emission_factor(mode: &CommuteMode) -> f64 {
    match mode {
        CommuteMode::Drive | CommuteMode::Car => 0.4,
        CommuteMode::Transit | CommuteMode::PublicTransit => 0.15,
        CommuteMode::Bike | CommuteMode::Walk => 0.0,
        CommuteMode::Ev => 0.1,
        CommuteMode::Other(_) => 0.4,
    }
}

/// Annual commute emissions (kg CO2) for a daily distance in miles.
pub fn commute_emissions(distance: f64, mode: &CommuteMode) -> f64 {
    distance * emission_factor(mode) * COMMUTE_DAYS_PER_YEAR
}

/// Arithmetic mean; zero for an empty iterator.
pub fn mean(values: impl IntoIterator<Item = f64>) -> f64 {
    let (sum, n) = values.into_iter().fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 { 0.0 } else { sum / n as f64 }
}
