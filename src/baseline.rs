use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{SimError, SimResult};
use crate::metrics::{self, commute_emissions, gini, income_bracket, mean};
use crate::population::PersonRecord;
use crate::types::{GroupKind, IncomeBracket};

/// Share of households assumed to own a vehicle when the input carries no
/// ownership column at all (US average).
pub const DEFAULT_VEHICLE_OWNERSHIP_RATE: f64 = 0.80;

/// Reference income-tax rate used for the baseline disposable income.
pub const BASELINE_TAX_RATE: f64 = 0.22;

/// Income below this threshold counts towards the poverty rate.
pub const POVERTY_LINE: f64 = 25_000.0;

/// Per-group mean baseline income, used to normalise equity impacts against
/// each group's own starting point.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupBaselines {
    pub by_race: BTreeMap<String, f64>,
    pub by_county: BTreeMap<String, f64>,
    pub by_sector: BTreeMap<String, f64>,
    /// Only brackets with at least one member are present.
    pub by_income_bracket: BTreeMap<String, f64>,
}

impl GroupBaselines {
    pub fn for_kind(&self, kind: GroupKind) -> &BTreeMap<String, f64> {
        match kind {
            GroupKind::Race => &self.by_race,
            GroupKind::County => &self.by_county,
            GroupKind::IncomeBracket => &self.by_income_bracket,
            GroupKind::Sector => &self.by_sector,
        }
    }
}

/// Pre-policy snapshot every run is compared against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineMetrics {
    // Economic
    pub mean_income: f64,
    pub median_income: f64,
    pub mean_disposable_income: f64,
    pub gini: f64,
    pub employment_rate: f64,
    pub poverty_rate: f64,
    pub mean_rent: f64,
    pub mean_rent_paid: f64,
    pub mean_rent_burden: f64,

    // Behavioural
    pub commute_mode_distribution: Vec<(String, usize)>,
    pub vehicle_ownership_rate: f64,
    pub mean_commute_emissions: f64,
    pub mean_energy_use: f64,

    // Demographic
    pub mean_household_size: f64,
    pub education_distribution: Vec<(String, usize)>,
    pub income_bracket_distribution: Vec<(IncomeBracket, usize)>,
    pub sector_distribution: Vec<(String, usize)>,
    pub race_distribution: Vec<(String, usize)>,
    pub county_distribution: Vec<(String, usize)>,

    // Environmental
    pub total_co2_emissions: f64,
    pub co2_per_capita: f64,

    pub group_income: GroupBaselines,
    pub population: usize,
}

impl BaselineMetrics {
    /// Derive the snapshot from a population. Deterministic; no randomness.
    pub fn compute(people: &[PersonRecord]) -> SimResult<Self> {
        if people.is_empty() {
            return Err(SimError::EmptyPopulation);
        }
        let n = people.len() as f64;

        let incomes: Vec<f64> = people.iter().map(|p| p.income).collect();
        let mut sorted = incomes.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let median_income = sorted[sorted.len() / 2];

        let employed = people.iter().filter(|p| p.employed).count() as f64;
        let poor = incomes.iter().filter(|&&i| i < POVERTY_LINE).count() as f64;

        let emissions: Vec<f64> =
            people.iter().map(|p| commute_emissions(p.commute_distance, &p.commute_mode)).collect();
        let total_co2_emissions: f64 = emissions.iter().sum();

        let baseline = BaselineMetrics {
            mean_income: mean(incomes.iter().copied()),
            median_income,
            mean_disposable_income: mean(incomes.iter().map(|i| i * (1.0 - BASELINE_TAX_RATE))),
            gini: gini(&incomes),
            employment_rate: employed / n,
            poverty_rate: poor / n,
            mean_rent: mean(people.iter().map(|p| p.rent)),
            mean_rent_paid: mean(people.iter().map(|p| p.rent_paid)),
            mean_rent_burden: mean(people.iter().map(|p| p.rent * 12.0 / p.income)),

            commute_mode_distribution: metrics::distribution(people, |p| {
                Some(p.commute_mode.as_str())
            }),
            vehicle_ownership_rate: vehicle_ownership_rate(people),
            mean_commute_emissions: total_co2_emissions / n,
            mean_energy_use: mean(people.iter().map(|p| p.energy_use)),

            mean_household_size: mean(people.iter().map(|p| p.household_size as f64)),
            education_distribution: metrics::distribution(people, |p| {
                Some(p.education_level.as_str())
            }),
            income_bracket_distribution: metrics::income_bracket_distribution(&incomes),
            sector_distribution: metrics::distribution(people, |p| {
                Some(p.employment_sector.as_str())
            }),
            race_distribution: metrics::distribution(people, |p| Some(p.race_ethnicity.as_str())),
            county_distribution: metrics::distribution(people, |p| Some(p.county.as_str())),

            total_co2_emissions,
            co2_per_capita: total_co2_emissions / n,

            group_income: group_income(people),
            population: people.len(),
        };

        log::info!(
            "baseline: {} people, mean income {:.0}, gini {:.3}, employment {:.1}%",
            baseline.population,
            baseline.mean_income,
            baseline.gini,
            baseline.employment_rate * 100.0
        );
        Ok(baseline)
    }

    /// Baseline mean income of `group`, falling back to the population mean
    /// when the group did not exist at baseline.
    pub fn group_baseline_income(&self, kind: GroupKind, group: &str) -> f64 {
        self.group_income.for_kind(kind).get(group).copied().unwrap_or(self.mean_income)
    }
}

/// Share of owners among persons with ownership data; the documented default
/// when nobody carries any.
fn vehicle_ownership_rate(people: &[PersonRecord]) -> f64 {
    let known: Vec<bool> = people.iter().filter_map(|p| p.vehicle_owned).collect();
    if known.is_empty() {
        log::warn!(
            "no vehicle ownership data; assuming {:.0}% ownership",
            DEFAULT_VEHICLE_OWNERSHIP_RATE * 100.0
        );
        return DEFAULT_VEHICLE_OWNERSHIP_RATE;
    }
    known.iter().filter(|&&owned| owned).count() as f64 / known.len() as f64
}

fn group_income(people: &[PersonRecord]) -> GroupBaselines {
    fn tally(map: &mut BTreeMap<String, (f64, usize)>, key: &str, income: f64) {
        let e = map.entry(key.to_string()).or_insert((0.0, 0));
        e.0 += income;
        e.1 += 1;
    }
    fn means(map: BTreeMap<String, (f64, usize)>) -> BTreeMap<String, f64> {
        map.into_iter().map(|(k, (total, n))| (k, total / n as f64)).collect()
    }

    let mut race = BTreeMap::new();
    let mut county = BTreeMap::new();
    let mut sector = BTreeMap::new();
    let mut bracket = BTreeMap::new();
    for p in people {
        tally(&mut race, &p.race_ethnicity, p.income);
        tally(&mut county, &p.county, p.income);
        tally(&mut sector, &p.employment_sector, p.income);
        tally(&mut bracket, income_bracket(p.income).label(), p.income);
    }

    GroupBaselines {
        by_race: means(race),
        by_county: means(county),
        by_sector: means(sector),
        by_income_bracket: means(bracket),
    }
}
