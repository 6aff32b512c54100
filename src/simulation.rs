use std::collections::BTreeMap;
use std::ops::Range;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::analysis::{
    EquityAnalysis, GroupTally, MetricsSummary, SimulationSummary, TrialResult, rank_groups,
};
use crate::baseline::BaselineMetrics;
use crate::config::SimulationConfig;
use crate::error::{SimError, SimResult};
use crate::metrics::income_bracket;
use crate::policy::{ElasticityDraw, PolicySettings, TransformedPerson, transform};
use crate::population::PersonRecord;
use crate::types::GroupKind;

/// Advisory cancellation flag, checked between chunks.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running { completed: usize },
    Aggregating,
    Complete,
    Failed,
    Cancelled { completed: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
}

impl Progress {
    pub fn percent(&self) -> f64 {
        if self.total == 0 { 100.0 } else { self.completed as f64 / self.total as f64 * 100.0 }
    }
}

/// Per-group income-change totals. Merging is commutative and associative,
/// so accumulators from any partition of the trials combine to the same totals.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EquityAccumulator {
    pub by_race: BTreeMap<String, GroupTally>,
    pub by_county: BTreeMap<String, GroupTally>,
    pub by_income_bracket: BTreeMap<String, GroupTally>,
    pub by_sector: BTreeMap<String, GroupTally>,
}

impl EquityAccumulator {
    /// Bracket is taken from the original income; sector from the transformed
    /// person, so green-jobs moves are credited to the new sector.
    pub fn record(&mut self, person: &PersonRecord, outcome: &TransformedPerson) {
        let change = outcome.income_change;
        tally(&mut self.by_race, &person.race_ethnicity, change);
        tally(&mut self.by_county, &person.county, change);
        tally(&mut self.by_income_bracket, income_bracket(person.income).label(), change);
        tally(&mut self.by_sector, &outcome.employment_sector, change);
    }

    pub fn merge(&mut self, other: &EquityAccumulator) {
        for kind in GroupKind::ALL {
            let into = self.for_kind_mut(kind);
            for (group, t) in other.for_kind(kind) {
                into.entry(group.clone()).or_default().merge(t);
            }
        }
    }

    pub fn for_kind(&self, kind: GroupKind) -> &BTreeMap<String, GroupTally> {
        match kind {
            GroupKind::Race => &self.by_race,
            GroupKind::County => &self.by_county,
            GroupKind::IncomeBracket => &self.by_income_bracket,
            GroupKind::Sector => &self.by_sector,
        }
    }

    fn for_kind_mut(&mut self, kind: GroupKind) -> &mut BTreeMap<String, GroupTally> {
        match kind {
            GroupKind::Race => &mut self.by_race,
            GroupKind::County => &mut self.by_county,
            GroupKind::IncomeBracket => &mut self.by_income_bracket,
            GroupKind::Sector => &mut self.by_sector,
        }
    }

    pub fn rank(&self, baseline: &BaselineMetrics) -> SimResult<EquityAnalysis> {
        Ok(EquityAnalysis {
            by_race: rank_groups(GroupKind::Race, &self.by_race, baseline)?,
            by_county: rank_groups(GroupKind::County, &self.by_county, baseline)?,
            by_income_bracket: rank_groups(
                GroupKind::IncomeBracket,
                &self.by_income_bracket,
                baseline,
            )?,
            by_sector: rank_groups(GroupKind::Sector, &self.by_sector, baseline)?,
        })
    }
}

fn tally(map: &mut BTreeMap<String, GroupTally>, group: &str, change: f64) {
    map.entry(group.to_string()).or_default().add(change);
}

/// Results of a contiguous or merged set of trials.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrialBatch {
    pub trials: Vec<TrialResult>,
    pub equity: EquityAccumulator,
}

impl TrialBatch {
    pub fn merge(&mut self, other: TrialBatch) {
        self.trials.extend(other.trials);
        self.trials.sort_by_key(|t| t.trial);
        self.equity.merge(&other.equity);
    }
}

/// Run one trial: draw the regime, transform every person, aggregate.
pub fn run_trial(
    people: &[PersonRecord],
    policy: &PolicySettings,
    trial: usize,
    seed: u64,
) -> SimResult<(TrialResult, EquityAccumulator)> {
    let mut rng = ChaCha20Rng::seed_from_u64(seed.wrapping_add(trial as u64));
    let draw = ElasticityDraw::sample(policy, &mut rng);

    let mut equity = EquityAccumulator::default();
    let transformed: Vec<TransformedPerson> = people
        .iter()
        .map(|p| {
            let t = transform(p, policy, &draw, &mut rng);
            equity.record(p, &t);
            t
        })
        .collect();

    let result = TrialResult::from_people(trial, &transformed)?;
    Ok((result, equity))
}

/// Trial `i` draws from `ChaCha20Rng::seed_from_u64(seed + i)`, so results do
/// not depend on chunk size or scheduling.
pub struct Simulation {
    people: Arc<Vec<PersonRecord>>,
    baseline: Arc<BaselineMetrics>,
    baseline_generation: u64,
    policy: PolicySettings,
    total: usize,
    chunk_size: usize,
    seed: u64,
    state: RunState,
    batch: TrialBatch,
    cancel: CancelToken,
}

impl Simulation {
    /// Validate preconditions and prepare a run. A missing baseline is
    /// computed on demand.
    pub fn new(
        people: Arc<Vec<PersonRecord>>,
        baseline: Option<Arc<BaselineMetrics>>,
        config: &SimulationConfig,
    ) -> SimResult<Self> {
        if people.is_empty() {
            return Err(SimError::NoPopulationLoaded);
        }
        if config.trials < 1 {
            return Err(SimError::InvalidTrialCount(config.trials));
        }
        let baseline = match baseline {
            Some(b) => b,
            None => {
                log::warn!("no baseline present; computing one before the run");
                Arc::new(BaselineMetrics::compute(&people)?)
            }
        };
        let seed = config.seed.unwrap_or_else(|| rand::rng().random());

        Ok(Simulation {
            people,
            baseline,
            baseline_generation: 0,
            policy: config.policy,
            total: config.trials,
            chunk_size: config.chunk_size.max(1),
            seed,
            state: RunState::Idle,
            batch: TrialBatch::default(),
            cancel: CancelToken::new(),
        })
    }

    /// Share an externally owned cancellation token.
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    /// Tag the published summary with the baseline generation it was run against.
    pub fn with_baseline_generation(mut self, generation: u64) -> Self {
        self.baseline_generation = generation;
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn baseline(&self) -> &Arc<BaselineMetrics> {
        &self.baseline
    }

    pub fn progress(&self) -> Progress {
        Progress { completed: self.completed(), total: self.total }
    }

    fn completed(&self) -> usize {
        match self.state {
            RunState::Idle => 0,
            RunState::Running { completed } | RunState::Cancelled { completed } => completed,
            _ => self.batch.trials.len(),
        }
    }

    /// Execute the trials in `range` in parallel, independently of any other
    /// range. Trials are returned in index order.
    pub fn run_trials(&self, range: Range<usize>) -> SimResult<TrialBatch> {
        let results: Vec<(TrialResult, EquityAccumulator)> = range
            .into_par_iter()
            .map(|trial| run_trial(&self.people, &self.policy, trial, self.seed))
            .collect::<SimResult<_>>()?;

        let mut batch = TrialBatch::default();
        for (result, equity) in results {
            batch.trials.push(result);
            batch.equity.merge(&equity);
        }
        Ok(batch)
    }

    /// Run the next chunk. `Ok(None)` once every trial has run or the run has
    /// ended. Any error discards the accumulated trials.
    pub fn step(&mut self) -> SimResult<Option<Progress>> {
        let start = match self.state {
            RunState::Idle => 0,
            RunState::Running { completed } if completed < self.total => completed,
            RunState::Cancelled { completed } => {
                return Err(SimError::Cancelled { completed, total: self.total });
            }
            _ => return Ok(None),
        };

        if self.cancel.is_cancelled() {
            log::warn!("run cancelled after {start} of {} trials", self.total);
            self.abort(RunState::Cancelled { completed: start });
            return Err(SimError::Cancelled { completed: start, total: self.total });
        }
        if start == 0 {
            log::info!(
                "starting run: {} trials over {} people, chunk {}, seed {}",
                self.total,
                self.people.len(),
                self.chunk_size,
                self.seed
            );
        }

        let end = (start + self.chunk_size).min(self.total);
        match self.run_trials(start..end) {
            Ok(chunk) => self.batch.merge(chunk),
            Err(e) => {
                log::error!("trial failure in chunk {start}..{end}: {e}");
                self.abort(RunState::Failed);
                return Err(e);
            }
        }

        self.state = RunState::Running { completed: end };
        let progress = self.progress();
        log::debug!("{end}/{} trials ({:.0}%)", self.total, progress.percent());
        Ok(Some(progress))
    }

    /// Iterate the run chunk by chunk; the host may poll progress or cancel
    /// between items.
    pub fn batches(&mut self) -> Batches<'_> {
        Batches { sim: self }
    }

    /// Run any remaining chunks, then aggregate. Nothing is returned for a
    /// failed or cancelled run.
    pub fn run(&mut self) -> SimResult<SimulationSummary> {
        while self.step()?.is_some() {}
        self.aggregate()
    }

    fn aggregate(&mut self) -> SimResult<SimulationSummary> {
        match self.state {
            RunState::Running { completed } if completed == self.total => {}
            RunState::Failed => {
                return Err(SimError::Computation {
                    trial: 0,
                    reason: "run failed; start a new one".into(),
                });
            }
            RunState::Aggregating | RunState::Complete => return Err(SimError::RunFinished),
            _ => {
                return Err(SimError::Cancelled {
                    completed: self.completed(),
                    total: self.total,
                });
            }
        }
        self.state = RunState::Aggregating;

        let batch = std::mem::take(&mut self.batch);
        let summary = match MetricsSummary::from_trials(&batch.trials) {
            Some(s) => s,
            None => {
                self.state = RunState::Failed;
                return Err(SimError::Computation { trial: 0, reason: "no trials".into() });
            }
        };
        let equity = match batch.equity.rank(&self.baseline) {
            Ok(e) => e,
            Err(e) => {
                self.state = RunState::Failed;
                return Err(e);
            }
        };

        self.state = RunState::Complete;
        log::info!(
            "run complete: {} trials, mean income {:.0} [{:.0}, {:.0}]",
            batch.trials.len(),
            summary.income.mean,
            summary.income.ci95_lower,
            summary.income.ci95_upper
        );
        Ok(SimulationSummary {
            trials: batch.trials,
            summary,
            equity,
            policy: self.policy,
            seed: self.seed,
            baseline_generation: self.baseline_generation,
        })
    }

    fn abort(&mut self, state: RunState) {
        self.batch = TrialBatch::default();
        self.state = state;
    }
}

pub struct Batches<'a> {
    sim: &'a mut Simulation,
}

impl Iterator for Batches<'_> {
    type Item = SimResult<Progress>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.sim.state {
            RunState::Failed | RunState::Cancelled { .. } => None,
            _ => self.sim.step().transpose(),
        }
    }
}
