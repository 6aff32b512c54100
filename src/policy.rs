use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::metrics::{COMMUTE_DAYS_PER_YEAR, commute_emissions};
use crate::population::PersonRecord;
use crate::types::{CommuteMode, EducationLevel};

/// Reference hourly wage the minimum-wage lever is measured against.
pub const REFERENCE_WAGE: f64 = 15.0;
/// Full-time hours per year.
pub const FULL_TIME_HOURS: f64 = 2_080.0;
/// Income ceiling for housing-subsidy eligibility.
pub const HOUSING_SUBSIDY_INCOME_LIMIT: f64 = 50_000.0;
/// Share of income kept after an employment shock.
pub const JOB_LOSS_RESIDUAL: f64 = 0.3;
/// kg CO2 per mile the carbon tax is levied on.
pub const CARBON_TAX_FACTOR: f64 = 0.4;

pub const GREEN_ENERGY: &str = "Green Energy";
pub const TECH: &str = "Tech";

/// Caller-supplied policy levers. The engine trusts the values; range
/// enforcement belongs to the caller (see `config::ranges`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicySettings {
    /// Currency per hour.
    pub min_wage: f64,
    /// Currency per mile-year.
    pub carbon_tax: f64,
    /// Currency per month.
    pub housing_subsidy: f64,
    /// Fraction in [0, 1].
    pub tax_rate: f64,
    /// Currency per year.
    pub education_subsidy: f64,
    /// Currency per year.
    pub transit_subsidy: f64,
    /// Currency, one-time.
    pub ev_incentive: f64,
    /// Percentage.
    pub green_jobs_incentive: f64,
}

impl Default for PolicySettings {
    fn default() -> Self {
        Self {
            min_wage: REFERENCE_WAGE,
            carbon_tax: 0.0,
            housing_subsidy: 0.0,
            tax_rate: 0.22,
            education_subsidy: 0.0,
            transit_subsidy: 0.0,
            ev_incentive: 0.0,
            green_jobs_incentive: 0.0,
        }
    }
}

impl PolicySettings {
    /// Relative minimum-wage change against the reference wage.
    pub fn wage_increase(&self) -> f64 {
        (self.min_wage - REFERENCE_WAGE) / REFERENCE_WAGE
    }

    /// Per-driver probability of switching to transit.
    pub fn transit_shift_probability(&self) -> f64 {
        if self.transit_subsidy > 0.0 { 0.1 + (self.transit_subsidy / 500.0) * 0.3 } else { 0.0 }
    }

    /// Per-driver probability of buying an EV.
    pub fn ev_adoption_probability(&self) -> f64 {
        if self.ev_incentive > 0.0 { 0.05 + (self.ev_incentive / 5_000.0) * 0.2 } else { 0.0 }
    }

    /// Per-worker probability of moving into a green or tech job.
    pub fn sector_shift_probability(&self) -> f64 {
        if self.green_jobs_incentive > 0.0 {
            0.05 + (self.green_jobs_incentive / 100.0) * 0.15
        } else {
            0.0
        }
    }
}

/// Per-trial economic regime, shared by every person in the trial.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ElasticityDraw {
    /// In [0.7, 1.3].
    pub wage: f64,
    /// In [0.02, 0.06].
    pub rent: f64,
    /// In [-0.03, -0.01].
    pub employment: f64,
    /// In [0.8, 1.2].
    pub education_effectiveness: f64,
    /// Derived from the green-jobs incentive.
    pub sector_shift: f64,
}

impl ElasticityDraw {
    pub fn sample(policy: &PolicySettings, rng: &mut impl Rng) -> Self {
        Self {
            wage: 0.7 + rng.random::<f64>() * 0.6,
            rent: 0.02 + rng.random::<f64>() * 0.04,
            employment: -0.03 + rng.random::<f64>() * 0.02,
            education_effectiveness: 0.8 + rng.random::<f64>() * 0.4,
            sector_shift: policy.sector_shift_probability(),
        }
    }

    /// Midpoint regime; useful where the stochastic spread is not wanted.
    pub fn central(policy: &PolicySettings) -> Self {
        Self {
            wage: 1.0,
            rent: 0.04,
            employment: -0.02,
            education_effectiveness: 1.0,
            sector_shift: policy.sector_shift_probability(),
        }
    }
}

/// A person after the policy has been applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformedPerson {
    /// Pre-tax income net of the annual carbon cost.
    pub adjusted_income: f64,
    /// After tax and carbon cost.
    pub disposable_income: f64,
    /// Monthly rent after wage pass-through, before any subsidy.
    pub market_rent: f64,
    /// Monthly rent actually paid, after the housing subsidy.
    pub rent: f64,
    pub employed: bool,
    pub commute_mode: CommuteMode,
    pub vehicle_owned: Option<bool>,
    pub education_level: EducationLevel,
    pub employment_sector: String,
    pub household_size: u32,
    /// kWh per month.
    pub energy_use: f64,
    /// kg CO2 per year.
    pub commute_emissions: f64,
    pub rent_burden: f64,
    /// `adjusted_income - person.income`.
    pub income_change: f64,
}

#[inline]
fn chance(rng: &mut impl Rng, p: f64) -> bool {
    rng.random::<f64>() < p
}

/// Apply `policy` to `person` under the trial regime `draw`. Steps run in a
/// fixed order and later steps consume the output of earlier ones: minimum
/// wage, education, green jobs, rent escalation, housing subsidy, employment
/// shock, tax, transit shift, EV adoption, carbon tax, energy use, then
/// emissions and rent burden.
///
/// Negative or NaN inputs are not validated here.
pub fn transform(
    person: &PersonRecord,
    policy: &PolicySettings,
    draw: &ElasticityDraw,
    rng: &mut impl Rng,
) -> TransformedPerson {
    let wage_increase = policy.wage_increase();
    let mut income = person.income;
    let mut employed = person.employed;
    let mut education = person.education_level.clone();
    let mut sector = person.employment_sector.clone();
    let mut mode = person.commute_mode.clone();
    let mut vehicle_owned = person.vehicle_owned;

    // 1. Minimum wage
    if income < policy.min_wage * FULL_TIME_HOURS {
        income *= 1.0 + wage_increase * draw.wage;
    }

    // 2. Education subsidy
    if policy.education_subsidy > 0.0
        && chance(rng, (policy.education_subsidy / 1_000.0) * draw.education_effectiveness)
    {
        match education {
            EducationLevel::HighSchool => {
                education = EducationLevel::SomeCollege;
                income *= 1.15;
            }
            EducationLevel::SomeCollege => {
                education = EducationLevel::Bachelor;
                income *= 1.25;
            }
            _ => {}
        }
    }

    // 3. Green jobs
    if policy.green_jobs_incentive > 0.0
        && chance(rng, draw.sector_shift)
        && sector != GREEN_ENERGY
        && sector != TECH
    {
        let target = if chance(rng, 0.5) { GREEN_ENERGY } else { TECH };
        sector = target.to_string();
        income *= 1.1;
    }

    // 4. Rent escalation
    let market_rent = person.rent * (1.0 + wage_increase * draw.rent);

    // 5. Housing subsidy
    let rent = if policy.housing_subsidy > 0.0 && income < HOUSING_SUBSIDY_INCOME_LIMIT {
        (market_rent - policy.housing_subsidy).max(0.0)
    } else {
        market_rent
    };

    // 6. Employment shock; applies regardless of prior employment status.
    if chance(rng, (draw.employment * wage_increase).abs()) {
        employed = false;
        income *= JOB_LOSS_RESIDUAL;
    }

    // 7. Tax
    let taxed_income = income * (1.0 - policy.tax_rate);

    // 8. Transit
    if policy.transit_subsidy > 0.0
        && mode.is_driving()
        && chance(rng, policy.transit_shift_probability())
    {
        mode = CommuteMode::Transit;
    }

    // 9. EV
    if policy.ev_incentive > 0.0 && mode.is_driving() && chance(rng, policy.ev_adoption_probability())
    {
        mode = CommuteMode::Ev;
        vehicle_owned = Some(true);
    }

    // 10. Carbon tax
    let annual_carbon_cost =
        policy.carbon_tax * person.commute_distance * CARBON_TAX_FACTOR * COMMUTE_DAYS_PER_YEAR;
    let adjusted_income = income - annual_carbon_cost;
    let disposable_income = taxed_income - annual_carbon_cost;

    // 11. Energy use
    let income_factor = (0.8 + (adjusted_income / 100_000.0) * 0.5).min(1.3);
    let household_factor = 1.0 + (person.household_size as f64 - 2.0) * 0.15;
    let mut energy_use = person.energy_use * income_factor * household_factor;
    if mode == CommuteMode::Ev {
        energy_use += person.commute_distance * 0.3 * 30.0;
    }
    if sector == GREEN_ENERGY && chance(rng, 0.3) {
        energy_use *= 0.93;
    }

    // 12. Emissions and burden
    let emissions = commute_emissions(person.commute_distance, &mode);
    let rent_burden = rent * 12.0 / adjusted_income;

    TransformedPerson {
        adjusted_income,
        disposable_income,
        market_rent,
        rent,
        employed,
        commute_mode: mode,
        vehicle_owned,
        education_level: education,
        employment_sector: sector,
        household_size: person.household_size,
        energy_use,
        commute_emissions: emissions,
        rent_burden,
        income_change: adjusted_income - person.income,
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    use super::*;

    fn rng(seed: u64) -> ChaCha20Rng {
        ChaCha20Rng::seed_from_u64(seed)
    }

    /// Reference wage, no tax, every lever off.
    fn neutral_policy() -> PolicySettings {
        PolicySettings { tax_rate: 0.0, ..PolicySettings::default() }
    }

    fn person(income: f64) -> PersonRecord {
        PersonRecord { income, ..PersonRecord::default() }
    }

    #[test]
    fn neutral_policy_leaves_income_unchanged() {
        let policy = neutral_policy();
        let mut r = rng(1);
        let draw = ElasticityDraw::sample(&policy, &mut r);
        for income in [20_000.0, 40_000.0, 80_000.0] {
            let t = transform(&person(income), &policy, &draw, &mut r);
            assert_eq!(t.adjusted_income, income);
            assert_eq!(t.disposable_income, income);
            assert_eq!(t.income_change, 0.0);
            assert!(t.employed);
            assert_eq!(t.commute_mode, CommuteMode::Drive);
            assert_eq!(t.commute_emissions, 1_000.0);
            assert_eq!(t.rent, 1_200.0);
        }
    }

    #[test]
    fn same_inputs_and_stream_give_identical_output() {
        let policy = PolicySettings {
            min_wage: 20.0,
            education_subsidy: 800.0,
            transit_subsidy: 300.0,
            ev_incentive: 4_000.0,
            green_jobs_incentive: 15.0,
            housing_subsidy: 200.0,
            carbon_tax: 20.0,
            ..PolicySettings::default()
        };
        let draw = ElasticityDraw::sample(&policy, &mut rng(7));
        let p = person(28_000.0);
        for seed in 0..20 {
            let a = transform(&p, &policy, &draw, &mut rng(seed));
            let b = transform(&p, &policy, &draw, &mut rng(seed));
            assert_eq!(a, b, "seed {seed}");
        }
    }

    #[test]
    fn minimum_wage_scales_only_low_earners() {
        let policy = PolicySettings { min_wage: 18.0, tax_rate: 0.0, ..PolicySettings::default() };
        let draw = ElasticityDraw { employment: 0.0, ..ElasticityDraw::central(&policy) };
        let mut r = rng(3);
        let low = transform(&person(30_000.0), &policy, &draw, &mut r);
        // 18 × 2080 = 37_440; wage increase 0.2 at elasticity 1.0.
        assert!((low.adjusted_income - 36_000.0).abs() < 1e-9);
        let high = transform(&person(40_000.0), &policy, &draw, &mut r);
        assert_eq!(high.adjusted_income, 40_000.0);
    }

    #[test]
    fn rent_passes_through_wage_increase() {
        let policy = PolicySettings { min_wage: 18.0, ..neutral_policy() };
        let draw = ElasticityDraw { employment: 0.0, ..ElasticityDraw::central(&policy) };
        let t = transform(&person(80_000.0), &policy, &draw, &mut rng(0));
        // 1200 × (1 + 0.2 × 0.04)
        assert!((t.market_rent - 1_209.6).abs() < 1e-9);
        assert_eq!(t.rent, t.market_rent);
    }

    #[test]
    fn housing_subsidy_floors_rent_at_zero_below_limit() {
        let policy = PolicySettings { housing_subsidy: 500.0, ..neutral_policy() };
        let draw = ElasticityDraw::central(&policy);
        let cheap = PersonRecord { income: 20_000.0, rent: 300.0, ..PersonRecord::default() };
        assert_eq!(transform(&cheap, &policy, &draw, &mut rng(0)).rent, 0.0);
        let eligible = transform(&person(49_999.0), &policy, &draw, &mut rng(0));
        assert_eq!(eligible.rent, 700.0);
        let ineligible = transform(&person(50_000.0), &policy, &draw, &mut rng(0));
        assert_eq!(ineligible.rent, 1_200.0);
    }

    #[test]
    fn full_education_probability_promotes_one_rung() {
        let policy = PolicySettings { education_subsidy: 2_000.0, ..neutral_policy() };
        let draw = ElasticityDraw::central(&policy);
        let hs = transform(&person(40_000.0), &policy, &draw, &mut rng(0));
        assert_eq!(hs.education_level, EducationLevel::SomeCollege);
        assert!((hs.adjusted_income - 46_000.0).abs() < 1e-9);

        let sc = PersonRecord { education_level: EducationLevel::SomeCollege, ..person(40_000.0) };
        let t = transform(&sc, &policy, &draw, &mut rng(0));
        assert_eq!(t.education_level, EducationLevel::Bachelor);
        assert!((t.adjusted_income - 50_000.0).abs() < 1e-9);

        let ba = PersonRecord { education_level: EducationLevel::Bachelor, ..person(40_000.0) };
        let t = transform(&ba, &policy, &draw, &mut rng(0));
        assert_eq!(t.education_level, EducationLevel::Bachelor);
        assert_eq!(t.adjusted_income, 40_000.0);
    }

    #[test]
    fn green_jobs_never_move_green_or_tech_workers() {
        let policy = PolicySettings { green_jobs_incentive: 20.0, ..neutral_policy() };
        let draw = ElasticityDraw { sector_shift: 1.0, ..ElasticityDraw::central(&policy) };
        let tech = PersonRecord { employment_sector: TECH.into(), ..person(60_000.0) };
        let t = transform(&tech, &policy, &draw, &mut rng(0));
        assert_eq!(t.employment_sector, TECH);
        assert_eq!(t.adjusted_income, 60_000.0);

        let retail = transform(&person(60_000.0), &policy, &draw, &mut rng(0));
        assert!(retail.employment_sector == GREEN_ENERGY || retail.employment_sector == TECH);
        assert!((retail.adjusted_income - 66_000.0).abs() < 1e-9);
    }

    #[test]
    fn employment_shock_keeps_residual_income() {
        // Probability |employment × wage_increase| = 1 guarantees the shock.
        let policy = PolicySettings { min_wage: 25.0, ..neutral_policy() };
        let draw = ElasticityDraw { employment: -1.5, wage: 0.0, ..ElasticityDraw::central(&policy) };
        let t = transform(&person(60_000.0), &policy, &draw, &mut rng(0));
        assert!(!t.employed);
        assert!((t.adjusted_income - 18_000.0).abs() < 1e-9);
    }

    #[test]
    fn carbon_tax_reduces_adjusted_and_disposable_income() {
        let policy = PolicySettings { carbon_tax: 10.0, tax_rate: 0.2, ..PolicySettings::default() };
        let draw = ElasticityDraw::central(&policy);
        let t = transform(&person(50_000.0), &policy, &draw, &mut rng(0));
        // 10 × 10 miles × 0.4 × 250 = 10_000
        assert!((t.adjusted_income - 40_000.0).abs() < 1e-9);
        assert!((t.disposable_income - 30_000.0).abs() < 1e-9);
        assert!((t.income_change + 10_000.0).abs() < 1e-9);
    }

    #[test]
    fn ev_adoption_sets_ownership_and_charging_load() {
        let policy = PolicySettings { ev_incentive: 1e9, ..neutral_policy() };
        let draw = ElasticityDraw::central(&policy);
        let t = transform(&person(50_000.0), &policy, &draw, &mut rng(0));
        assert_eq!(t.commute_mode, CommuteMode::Ev);
        assert_eq!(t.vehicle_owned, Some(true));
        assert_eq!(t.commute_emissions, 10.0 * 0.1 * 250.0);
        // income factor 0.8 + 0.25 = 1.05; household factor 1.0; EV load 10 × 0.3 × 30 = 90.
        assert!((t.energy_use - (105.0 + 90.0)).abs() < 1e-9);
    }

    #[test]
    fn transit_shift_only_applies_to_drivers() {
        let policy = PolicySettings { transit_subsidy: 1e9, ..neutral_policy() };
        let draw = ElasticityDraw::central(&policy);
        let car = PersonRecord { commute_mode: CommuteMode::Car, ..person(50_000.0) };
        assert_eq!(transform(&car, &policy, &draw, &mut rng(0)).commute_mode, CommuteMode::Transit);
        let bike = PersonRecord { commute_mode: CommuteMode::Bike, ..person(50_000.0) };
        assert_eq!(transform(&bike, &policy, &draw, &mut rng(0)).commute_mode, CommuteMode::Bike);
    }

    #[test]
    fn energy_income_factor_is_capped() {
        let policy = neutral_policy();
        let draw = ElasticityDraw::central(&policy);
        let big = PersonRecord { household_size: 4, ..person(500_000.0) };
        let t = transform(&big, &policy, &draw, &mut rng(0));
        assert!((t.energy_use - 100.0 * 1.3 * 1.3).abs() < 1e-9);
    }

    #[test]
    fn sampled_draw_stays_in_documented_ranges() {
        let policy = PolicySettings { green_jobs_incentive: 10.0, ..PolicySettings::default() };
        let mut r = rng(11);
        for _ in 0..1_000 {
            let d = ElasticityDraw::sample(&policy, &mut r);
            assert!((0.7..=1.3).contains(&d.wage));
            assert!((0.02..=0.06).contains(&d.rent));
            assert!((-0.03..=-0.01).contains(&d.employment));
            assert!((0.8..=1.2).contains(&d.education_effectiveness));
            assert!((d.sector_shift - 0.065).abs() < 1e-12);
        }
    }

    #[test]
    fn subsidy_eligibility_is_decided_before_the_shock() {
        // Guaranteed shock: |employment × wage_increase| = 1.
        let policy = PolicySettings { min_wage: 25.0, housing_subsidy: 500.0, ..neutral_policy() };
        let draw = ElasticityDraw { employment: -1.5, wage: 0.0, ..ElasticityDraw::central(&policy) };
        let t = transform(&person(60_000.0), &policy, &draw, &mut rng(0));
        assert!(!t.employed);
        assert!((t.adjusted_income - 18_000.0).abs() < 1e-9);
        // 60k was above the limit when eligibility was checked; no subsidy.
        assert_eq!(t.rent, t.market_rent);
        assert!(t.rent > 1_200.0);
    }

    #[test]
    fn minimum_wage_threshold_is_checked_before_education_premium() {
        // Threshold 20 × 2080 = 41_600; the premium would lift 40k above it.
        let policy = PolicySettings { min_wage: 20.0, education_subsidy: 2_000.0, ..neutral_policy() };
        let draw = ElasticityDraw { employment: 0.0, ..ElasticityDraw::central(&policy) };
        let t = transform(&person(40_000.0), &policy, &draw, &mut rng(0));
        assert_eq!(t.education_level, EducationLevel::SomeCollege);
        let expected = 40_000.0 * (1.0 + policy.wage_increase()) * 1.15;
        assert!((t.adjusted_income - expected).abs() < 1e-6);
        assert!((t.adjusted_income - 46_000.0).abs() > 1_000.0);
    }
}
