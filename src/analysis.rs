use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::baseline::BaselineMetrics;
use crate::error::{SimError, SimResult};
use crate::metrics::{gini, mean};
use crate::policy::{PolicySettings, TransformedPerson};
use crate::types::GroupKind;

/// Aggregate outcome of one Monte Carlo trial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialResult {
    /// Zero-based trial index.
    pub trial: usize,
    pub mean_income: f64,
    pub mean_disposable_income: f64,
    pub gini: f64,
    pub employment_rate: f64,
    /// Mean market rent, before housing subsidy.
    pub mean_rent: f64,
    /// Mean rent actually paid, after housing subsidy.
    pub mean_rent_paid: f64,
    pub mean_rent_burden: f64,
    pub mean_emissions: f64,
    pub mean_energy_use: f64,
}

impl TrialResult {
    /// Aggregate a transformed population. Fails if any aggregate is not
    /// finite (e.g. a rent burden over a zero adjusted income).
    pub fn from_people(trial: usize, people: &[TransformedPerson]) -> SimResult<Self> {
        if people.is_empty() {
            return Err(SimError::Computation { trial, reason: "empty population".into() });
        }
        let incomes: Vec<f64> = people.iter().map(|p| p.adjusted_income).collect();
        let employed = people.iter().filter(|p| p.employed).count() as f64;
        let result = TrialResult {
            trial,
            mean_income: mean(incomes.iter().copied()),
            mean_disposable_income: mean(people.iter().map(|p| p.disposable_income)),
            gini: gini(&incomes),
            employment_rate: employed / people.len() as f64,
            mean_rent: mean(people.iter().map(|p| p.market_rent)),
            mean_rent_paid: mean(people.iter().map(|p| p.rent)),
            mean_rent_burden: mean(people.iter().map(|p| p.rent_burden)),
            mean_emissions: mean(people.iter().map(|p| p.commute_emissions)),
            mean_energy_use: mean(people.iter().map(|p| p.energy_use)),
        };
        result.check_finite()?;
        Ok(result)
    }

    fn check_finite(&self) -> SimResult<()> {
        let fields = [
            ("mean_income", self.mean_income),
            ("mean_disposable_income", self.mean_disposable_income),
            ("gini", self.gini),
            ("employment_rate", self.employment_rate),
            ("mean_rent", self.mean_rent),
            ("mean_rent_paid", self.mean_rent_paid),
            ("mean_rent_burden", self.mean_rent_burden),
            ("mean_emissions", self.mean_emissions),
            ("mean_energy_use", self.mean_energy_use),
        ];
        match fields.iter().find(|(_, v)| !v.is_finite()) {
            Some((name, v)) => Err(SimError::Computation {
                trial: self.trial,
                reason: format!("{name} is {v}"),
            }),
            None => Ok(()),
        }
    }
}

/// Mean and empirical 95% interval of one metric across trials.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricSummary {
    pub n: usize,
    pub mean: f64,
    pub ci95_lower: f64,
    pub ci95_upper: f64,
    pub std_dev: f64,
}

/// Empirical interval: sorted values at `floor(n·0.025)` and `floor(n·0.975)`.
/// No interpolation and no normal approximation.
pub fn metric_summary(values: &mut [f64]) -> Option<MetricSummary> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let n = values.len();
    let idx = |p: f64| ((n as f64 * p).floor() as usize).min(n - 1);

    let mean = values.iter().sum::<f64>() / n as f64;
    let variance = if n > 1 {
        values.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1) as f64
    } else {
        0.0
    };

    Some(MetricSummary {
        n,
        mean,
        ci95_lower: values[idx(0.025)],
        ci95_upper: values[idx(0.975)],
        std_dev: variance.sqrt(),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricsSummary {
    pub income: MetricSummary,
    pub disposable_income: MetricSummary,
    pub gini: MetricSummary,
    pub employment: MetricSummary,
    pub rent: MetricSummary,
    pub rent_paid: MetricSummary,
    pub rent_burden: MetricSummary,
    pub emissions: MetricSummary,
    pub energy_use: MetricSummary,
}

impl MetricsSummary {
    /// `None` when there are no trials.
    pub fn from_trials(trials: &[TrialResult]) -> Option<Self> {
        let stat = |f: fn(&TrialResult) -> f64| {
            let mut v: Vec<f64> = trials.iter().map(f).collect();
            metric_summary(&mut v)
        };
        Some(MetricsSummary {
            income: stat(|t| t.mean_income)?,
            disposable_income: stat(|t| t.mean_disposable_income)?,
            gini: stat(|t| t.gini)?,
            employment: stat(|t| t.employment_rate)?,
            rent: stat(|t| t.mean_rent)?,
            rent_paid: stat(|t| t.mean_rent_paid)?,
            rent_burden: stat(|t| t.mean_rent_burden)?,
            emissions: stat(|t| t.mean_emissions)?,
            energy_use: stat(|t| t.mean_energy_use)?,
        })
    }

    /// Name/summary pairs in display order.
    pub fn rows(&self) -> [(&'static str, &MetricSummary); 9] {
        [
            ("income", &self.income),
            ("disposable_income", &self.disposable_income),
            ("gini", &self.gini),
            ("employment", &self.employment),
            ("rent", &self.rent),
            ("rent_paid", &self.rent_paid),
            ("rent_burden", &self.rent_burden),
            ("emissions", &self.emissions),
            ("energy_use", &self.energy_use),
        ]
    }
}

/// Running income-change total for one group, summed over persons and trials.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupTally {
    pub total_income_change: f64,
    pub count: u64,
}

impl GroupTally {
    pub fn add(&mut self, change: f64) {
        self.total_income_change += change;
        self.count += 1;
    }

    pub fn merge(&mut self, other: &GroupTally) {
        self.total_income_change += other.total_income_change;
        self.count += other.count;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupImpact {
    pub group: String,
    pub mean_income_change: f64,
    pub baseline_income: f64,
    pub percent_change: f64,
}

/// Rank groups by mean income change, largest first. Each group is normalised
/// against its own baseline mean income; groups absent from the baseline use
/// the population mean.
pub fn rank_groups(
    kind: GroupKind,
    tallies: &BTreeMap<String, GroupTally>,
    baseline: &BaselineMetrics,
) -> SimResult<Vec<GroupImpact>> {
    let mut ranked = Vec::with_capacity(tallies.len());
    for (group, tally) in tallies.iter().filter(|(_, t)| t.count > 0) {
        let baseline_income = baseline.group_baseline_income(kind, group);
        if baseline_income == 0.0 {
            return Err(SimError::ZeroBaselineIncome { group_kind: kind, group: group.clone() });
        }
        let mean_income_change = tally.total_income_change / tally.count as f64;
        ranked.push(GroupImpact {
            group: group.clone(),
            mean_income_change,
            baseline_income,
            percent_change: mean_income_change / baseline_income * 100.0,
        });
    }
    ranked.sort_by(|a, b| {
        b.mean_income_change
            .partial_cmp(&a.mean_income_change)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    Ok(ranked)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EquityAnalysis {
    pub by_race: Vec<GroupImpact>,
    pub by_county: Vec<GroupImpact>,
    pub by_income_bracket: Vec<GroupImpact>,
    pub by_sector: Vec<GroupImpact>,
}

impl EquityAnalysis {
    pub fn for_kind(&self, kind: GroupKind) -> &[GroupImpact] {
        match kind {
            GroupKind::Race => &self.by_race,
            GroupKind::County => &self.by_county,
            GroupKind::IncomeBracket => &self.by_income_bracket,
            GroupKind::Sector => &self.by_sector,
        }
    }
}

/// Final output of a completed run. Read-only once published.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationSummary {
    /// All trials, ordered by trial index.
    pub trials: Vec<TrialResult>,
    pub summary: MetricsSummary,
    pub equity: EquityAnalysis,
    pub policy: PolicySettings,
    /// Base seed; trial `i` used `seed + i`.
    pub seed: u64,
    /// Generation of the baseline this summary was computed against.
    pub baseline_generation: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::population::PersonRecord;

    fn baseline_with_races(races: &[(&str, f64)]) -> BaselineMetrics {
        let people: Vec<PersonRecord> = races
            .iter()
            .map(|(r, income)| PersonRecord {
                income: *income,
                race_ethnicity: r.to_string(),
                ..PersonRecord::default()
            })
            .collect();
        BaselineMetrics::compute(&people).unwrap()
    }

    fn tallies(entries: &[(&str, f64, u64)]) -> BTreeMap<String, GroupTally> {
        entries
            .iter()
            .map(|(g, total, n)| {
                (g.to_string(), GroupTally { total_income_change: *total, count: *n })
            })
            .collect()
    }

    #[test]
    fn metric_summary_uses_floor_indices() {
        let mut values: Vec<f64> = (0..100).rev().map(|i| i as f64).collect();
        let s = metric_summary(&mut values).unwrap();
        assert_eq!(s.n, 100);
        assert_eq!(s.ci95_lower, 2.0);
        assert_eq!(s.ci95_upper, 97.0);
        assert!((s.mean - 49.5).abs() < 1e-12);
    }

    #[test]
    fn metric_summary_single_value() {
        let mut values = vec![4.2];
        let s = metric_summary(&mut values).unwrap();
        assert_eq!((s.ci95_lower, s.mean, s.ci95_upper), (4.2, 4.2, 4.2));
        assert_eq!(s.std_dev, 0.0);
    }

    #[test]
    fn metric_summary_empty_returns_none() {
        assert!(metric_summary(&mut []).is_none());
    }

    #[test]
    fn equity_ranking_orders_by_change_descending() {
        let baseline = baseline_with_races(&[("A", 50_000.0), ("B", 20_000.0), ("C", 100_000.0)]);
        let t = tallies(&[("A", 1_000.0, 2), ("B", -400.0, 2), ("C", 200.0, 2)]);
        let ranked = rank_groups(GroupKind::Race, &t, &baseline).unwrap();
        let changes: Vec<f64> = ranked.iter().map(|g| g.mean_income_change).collect();
        assert_eq!(changes, vec![500.0, 100.0, -200.0]);
        let groups: Vec<&str> = ranked.iter().map(|g| g.group.as_str()).collect();
        assert_eq!(groups, vec!["A", "C", "B"]);
    }

    #[test]
    fn percent_change_uses_each_groups_own_baseline() {
        let baseline = baseline_with_races(&[("A", 50_000.0), ("B", 20_000.0), ("C", 100_000.0)]);
        let t = tallies(&[("A", 500.0, 1), ("B", -200.0, 1), ("C", 100.0, 1)]);
        let ranked = rank_groups(GroupKind::Race, &t, &baseline).unwrap();
        assert!((ranked[0].percent_change - 1.0).abs() < 1e-12);
        assert_eq!(ranked[0].baseline_income, 50_000.0);
        assert!((ranked[1].percent_change - 0.1).abs() < 1e-12);
        assert!((ranked[2].percent_change + 1.0).abs() < 1e-12);
        assert_ne!(ranked[0].baseline_income, baseline.mean_income);
    }

    #[test]
    fn group_missing_from_baseline_uses_population_mean() {
        let baseline = baseline_with_races(&[("A", 40_000.0), ("B", 60_000.0)]);
        let t = tallies(&[("Green Energy", 1_000.0, 1)]);
        let ranked = rank_groups(GroupKind::Sector, &t, &baseline).unwrap();
        assert_eq!(ranked[0].baseline_income, 50_000.0);
        assert!((ranked[0].percent_change - 2.0).abs() < 1e-12);
    }

    #[test]
    fn zero_baseline_income_is_a_computation_error() {
        let mut baseline = baseline_with_races(&[("A", 40_000.0)]);
        baseline.group_income.by_race.insert("Z".into(), 0.0);
        let t = tallies(&[("Z", 10.0, 1)]);
        let err = rank_groups(GroupKind::Race, &t, &baseline).unwrap_err();
        assert!(matches!(err, SimError::ZeroBaselineIncome { .. }));
        assert_eq!(err.category(), crate::error::ErrorCategory::Computation);
    }

    #[test]
    fn trial_result_rejects_non_finite_aggregates() {
        let policy = PolicySettings::default();
        let draw = crate::policy::ElasticityDraw::central(&policy);
        let mut rng = <rand_chacha::ChaCha20Rng as rand::SeedableRng>::seed_from_u64(0);
        let mut p = crate::policy::transform(&PersonRecord::default(), &policy, &draw, &mut rng);
        p.rent_burden = f64::INFINITY;
        let err = TrialResult::from_people(3, &[p]).unwrap_err();
        assert!(matches!(err, SimError::Computation { trial: 3, .. }), "{err:?}");
    }
}
