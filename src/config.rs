use std::fs;
use std::ops::RangeInclusive;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::SimResult;
use crate::policy::PolicySettings;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Number of Monte Carlo trials.
    pub trials: usize,
    /// Trials per progress chunk; cancellation is checked between chunks.
    pub chunk_size: usize,
    /// Base seed. `None` draws one at run start; the summary records it.
    pub seed: Option<u64>,
    pub policy: PolicySettings,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self::canonical()
    }
}

impl SimulationConfig {
    pub fn canonical() -> Self {
        SimulationConfig { trials: 100, chunk_size: 10, seed: None, policy: PolicySettings::default() }
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> SimResult<Self> {
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}

impl PolicySettings {
    pub fn from_json_file(path: impl AsRef<Path>) -> SimResult<Self> {
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Names and values of levers outside their documented range. The engine
    /// never calls this; hosts decide whether to refuse or warn.
    pub fn check_ranges(&self) -> Vec<(&'static str, f64)> {
        use ranges::*;
        [
            ("min_wage", self.min_wage, MIN_WAGE),
            ("carbon_tax", self.carbon_tax, CARBON_TAX),
            ("housing_subsidy", self.housing_subsidy, HOUSING_SUBSIDY),
            ("tax_rate", self.tax_rate, TAX_RATE),
            ("education_subsidy", self.education_subsidy, EDUCATION_SUBSIDY),
            ("transit_subsidy", self.transit_subsidy, TRANSIT_SUBSIDY),
            ("ev_incentive", self.ev_incentive, EV_INCENTIVE),
            ("green_jobs_incentive", self.green_jobs_incentive, GREEN_JOBS_INCENTIVE),
        ]
        .into_iter()
        .filter(|(_, v, range)| !range.contains(v))
        .map(|(name, v, _)| (name, v))
        .collect()
    }
}

/// Documented lever ranges, as offered by the original policy controls.
pub mod ranges {
    use super::RangeInclusive;

    pub const MIN_WAGE: RangeInclusive<f64> = 10.0..=25.0;
    pub const MIN_WAGE_STEP: f64 = 0.5;
    pub const CARBON_TAX: RangeInclusive<f64> = 0.0..=100.0;
    pub const CARBON_TAX_STEP: f64 = 5.0;
    pub const HOUSING_SUBSIDY: RangeInclusive<f64> = 0.0..=500.0;
    pub const HOUSING_SUBSIDY_STEP: f64 = 25.0;
    pub const TAX_RATE: RangeInclusive<f64> = 0.10..=0.40;
    pub const TAX_RATE_STEP: f64 = 0.01;
    pub const EDUCATION_SUBSIDY: RangeInclusive<f64> = 0.0..=2_000.0;
    pub const EDUCATION_SUBSIDY_STEP: f64 = 100.0;
    pub const TRANSIT_SUBSIDY: RangeInclusive<f64> = 0.0..=1_000.0;
    pub const TRANSIT_SUBSIDY_STEP: f64 = 50.0;
    pub const EV_INCENTIVE: RangeInclusive<f64> = 0.0..=10_000.0;
    pub const EV_INCENTIVE_STEP: f64 = 500.0;
    pub const GREEN_JOBS_INCENTIVE: RangeInclusive<f64> = 0.0..=20.0;
    pub const TRIALS: RangeInclusive<usize> = 50..=500;
    pub const TRIALS_STEP: usize = 50;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_matches_ui_defaults() {
        let c = SimulationConfig::canonical();
        assert_eq!(c.trials, 100);
        assert_eq!(c.chunk_size, 10);
        assert_eq!(c.seed, None);
        assert_eq!(c.policy.min_wage, 15.0);
        assert_eq!(c.policy.tax_rate, 0.22);
        assert_eq!(c.policy.carbon_tax, 0.0);
        assert!(ranges::TRIALS.contains(&c.trials));
    }

    #[test]
    fn default_policy_is_within_ranges() {
        assert!(PolicySettings::default().check_ranges().is_empty());
    }

    #[test]
    fn out_of_range_levers_are_reported_not_clamped() {
        let p = PolicySettings { min_wage: 30.0, tax_rate: 0.05, ..PolicySettings::default() };
        assert_eq!(p.check_ranges(), vec![("min_wage", 30.0), ("tax_rate", 0.05)]);
        assert_eq!(p.min_wage, 30.0);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let c: SimulationConfig =
            serde_json::from_str(r#"{"trials": 250, "policy": {"carbon_tax": 40}}"#).unwrap();
        assert_eq!(c.trials, 250);
        assert_eq!(c.chunk_size, 10);
        assert_eq!(c.policy.carbon_tax, 40.0);
        assert_eq!(c.policy.min_wage, 15.0);
    }

    #[test]
    fn loads_policy_file() {
        let path = std::env::temp_dir().join(format!("fairsim_policy_{}.json", std::process::id()));
        fs::write(&path, r#"{"min_wage": 18.5, "transit_subsidy": 250}"#).unwrap();
        let p = PolicySettings::from_json_file(&path).unwrap();
        fs::remove_file(&path).ok();
        assert_eq!(p.min_wage, 18.5);
        assert_eq!(p.transit_subsidy, 250.0);
        assert_eq!(p.tax_rate, 0.22);
    }

    #[test]
    fn missing_file_is_an_input_error() {
        let err = SimulationConfig::from_json_file("/nonexistent/fairsim.json").unwrap_err();
        assert_eq!(err.category(), crate::error::ErrorCategory::Input);
    }
}
