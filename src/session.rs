use std::sync::Arc;

use crate::analysis::SimulationSummary;
use crate::baseline::BaselineMetrics;
use crate::config::SimulationConfig;
use crate::error::{SimError, SimResult};
use crate::population::PersonRecord;
use crate::simulation::{CancelToken, Simulation};

/// A summary is only visible while its baseline generation is current.
#[derive(Default)]
pub struct Session {
    population: Option<Arc<Vec<PersonRecord>>>,
    baseline: Option<Arc<BaselineMetrics>>,
    generation: u64,
    summary: Option<Arc<SimulationSummary>>,
    in_flight: Option<CancelToken>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the population and compute its baseline. Cancels any run in
    /// flight and drops the previous summary. On error nothing changes.
    pub fn load_population(&mut self, people: Vec<PersonRecord>) -> SimResult<Arc<BaselineMetrics>> {
        let baseline = Arc::new(BaselineMetrics::compute(&people)?);
        self.replace(people, Some(baseline.clone()));
        Ok(baseline)
    }

    /// Replace the population without computing a baseline; the next run
    /// computes it.
    pub fn load_population_deferred(&mut self, people: Vec<PersonRecord>) -> SimResult<()> {
        if people.is_empty() {
            return Err(SimError::EmptyPopulation);
        }
        self.replace(people, None);
        Ok(())
    }

    fn replace(&mut self, people: Vec<PersonRecord>, baseline: Option<Arc<BaselineMetrics>>) {
        self.cancel();
        self.generation += 1;
        log::info!("population loaded: {} people (generation {})", people.len(), self.generation);
        self.population = Some(Arc::new(people));
        self.baseline = baseline;
        self.summary = None;
    }

    pub fn population(&self) -> Option<&Arc<Vec<PersonRecord>>> {
        self.population.as_ref()
    }

    pub fn baseline(&self) -> Option<&Arc<BaselineMetrics>> {
        self.baseline.as_ref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The published summary, if it was computed against the current baseline.
    pub fn summary(&self) -> Option<&Arc<SimulationSummary>> {
        self.summary.as_ref().filter(|s| s.baseline_generation == self.generation)
    }

    /// Signal any run in flight to stop at its next chunk boundary.
    pub fn cancel(&mut self) {
        if let Some(token) = self.in_flight.take() {
            token.cancel();
        }
    }

    /// Prepare a run against the current snapshots. A missing baseline is
    /// recomputed once here. Any previous run in flight is cancelled.
    pub fn start_run(&mut self, config: &SimulationConfig) -> SimResult<Simulation> {
        let people = self.population.clone().ok_or(SimError::NoPopulationLoaded)?;
        if config.trials < 1 {
            return Err(SimError::InvalidTrialCount(config.trials));
        }
        let baseline = match &self.baseline {
            Some(b) => b.clone(),
            None => {
                log::warn!("baseline missing for generation {}; recomputing", self.generation);
                let b = Arc::new(BaselineMetrics::compute(&people)?);
                self.baseline = Some(b.clone());
                b
            }
        };

        self.cancel();
        let token = CancelToken::new();
        self.in_flight = Some(token.clone());
        Ok(Simulation::new(people, Some(baseline), config)?
            .with_cancel_token(token)
            .with_baseline_generation(self.generation))
    }

    /// Make `summary` the current one. Rejected if the population changed
    /// since its run started.
    pub fn publish(&mut self, summary: SimulationSummary) -> SimResult<Arc<SimulationSummary>> {
        if summary.baseline_generation != self.generation {
            log::warn!(
                "discarding summary for generation {} (current {})",
                summary.baseline_generation,
                self.generation
            );
            return Err(SimError::StaleBaseline {
                expected: self.generation,
                actual: summary.baseline_generation,
            });
        }
        let summary = Arc::new(summary);
        self.summary = Some(summary.clone());
        self.in_flight = None;
        Ok(summary)
    }

    /// Run to completion and publish. On failure the previous summary stays.
    pub fn simulate(&mut self, config: &SimulationConfig) -> SimResult<Arc<SimulationSummary>> {
        let mut sim = self.start_run(config)?;
        let summary = sim.run()?;
        self.publish(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;
    use crate::policy::PolicySettings;

    fn people(n: usize) -> Vec<PersonRecord> {
        (0..n)
            .map(|i| PersonRecord { income: 10_000.0 + 5_000.0 * i as f64, ..PersonRecord::default() })
            .collect()
    }

    fn config(policy: PolicySettings) -> SimulationConfig {
        SimulationConfig { trials: 20, chunk_size: 5, seed: Some(42), policy }
    }

    #[test]
    fn simulate_without_population_is_a_state_error() {
        let err = Session::new().simulate(&SimulationConfig::canonical()).unwrap_err();
        assert!(matches!(err, SimError::NoPopulationLoaded));
        assert_eq!(err.category(), ErrorCategory::State);
    }

    #[test]
    fn empty_upload_keeps_previous_state() {
        let mut s = Session::new();
        s.load_population(people(5)).unwrap();
        s.simulate(&config(PolicySettings::default())).unwrap();
        assert!(matches!(s.load_population(vec![]), Err(SimError::EmptyPopulation)));
        assert_eq!(s.generation(), 1);
        assert!(s.summary().is_some());
    }

    #[test]
    fn reload_invalidates_summary() {
        let mut s = Session::new();
        s.load_population(people(5)).unwrap();
        s.simulate(&config(PolicySettings::default())).unwrap();
        assert!(s.summary().is_some());
        s.load_population(people(6)).unwrap();
        assert!(s.summary().is_none());
        assert_eq!(s.generation(), 2);
    }

    #[test]
    fn deferred_baseline_is_computed_by_the_run() {
        let mut s = Session::new();
        s.load_population_deferred(people(4)).unwrap();
        assert!(s.baseline().is_none());
        let summary = s.simulate(&config(PolicySettings::default())).unwrap();
        assert!(s.baseline().is_some());
        assert_eq!(summary.baseline_generation, 1);
    }

    #[test]
    fn upload_during_run_discards_in_flight_trials() {
        let mut s = Session::new();
        s.load_population(people(5)).unwrap();
        let mut sim = s.start_run(&config(PolicySettings::default())).unwrap();
        sim.step().unwrap();

        s.load_population(people(7)).unwrap();
        assert!(matches!(sim.step(), Err(SimError::Cancelled { completed: 5, total: 20 })));
        assert!(s.summary().is_none());
    }

    #[test]
    fn stale_summary_is_rejected() {
        let mut s = Session::new();
        s.load_population(people(5)).unwrap();
        let mut sim = s.start_run(&config(PolicySettings::default())).unwrap();
        let summary = sim.run().unwrap();
        s.load_population_deferred(people(5)).unwrap();
        let err = s.publish(summary).unwrap_err();
        assert!(matches!(err, SimError::StaleBaseline { expected: 2, actual: 1 }));
    }

    #[test]
    fn failed_run_leaves_previous_summary() {
        let mut s = Session::new();
        s.load_population(people(3)).unwrap();
        let first = s.simulate(&config(PolicySettings::default())).unwrap();

        // 10 × 10 miles × 0.4 × 250 wipes out the 10k earner: infinite rent burden.
        let failing = PolicySettings { carbon_tax: 10.0, ..PolicySettings::default() };
        let err = s.simulate(&config(failing)).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Computation);
        assert!(Arc::ptr_eq(s.summary().unwrap(), &first));
    }
}
