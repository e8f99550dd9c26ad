//! Scenario capability and the weighted scenario table

use async_trait::async_trait;
use loadcheck_core::{BenchError, BenchResult, RunContext};
use loadcheck_http::{ActionPlayer, HttpSettings};
use loadcheck_metrics::{Counters, SharedCounters};
use loadcheck_pool::{UserLease, UserPool, VirtualUser};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fmt;
use std::sync::Arc;

/// One business workflow played against the target.
///
/// Scenarios own no concurrency or session state: they receive a leased
/// user and everything else through the [`ScenarioContext`].
#[async_trait]
pub trait Scenario: Send + Sync {
    /// Name used in tallies and reports
    fn name(&self) -> &str;

    /// Play the workflow once with `lease`
    async fn run(&self, ctx: &ScenarioContext, lease: &mut UserLease) -> BenchResult<()>;
}

/// Everything a scenario may touch during one attempt
#[derive(Clone)]
pub struct ScenarioContext {
    run: RunContext,
    pool: UserPool,
    counters: SharedCounters,
    settings: Arc<HttpSettings>,
    rng: Arc<Mutex<StdRng>>,
}

impl ScenarioContext {
    pub fn new(
        run: RunContext,
        pool: UserPool,
        counters: SharedCounters,
        settings: Arc<HttpSettings>,
    ) -> Self {
        Self {
            run,
            pool,
            counters,
            settings,
            rng: Arc::new(Mutex::new(StdRng::from_entropy())),
        }
    }

    /// Reseed the random source scenarios draw generated content from
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Arc::new(Mutex::new(StdRng::seed_from_u64(seed)));
        self
    }

    pub fn run(&self) -> &RunContext {
        &self.run
    }

    /// The user pool, for extra acquisitions and registrations
    pub fn pool(&self) -> &UserPool {
        &self.pool
    }

    pub fn counters(&self) -> &Counters {
        &self.counters
    }

    pub fn settings(&self) -> &HttpSettings {
        &self.settings
    }

    /// Player bound to `user` for the rest of the borrow
    pub fn player<'a>(&'a self, user: &'a mut VirtualUser) -> ActionPlayer<'a> {
        ActionPlayer::new(user, &self.counters, &self.settings)
    }

    /// Random source for generated request content, shared by clones
    pub fn rng(&self) -> &Mutex<StdRng> {
        &self.rng
    }

    /// Lease an additional user; `None` once the run is cancelled
    pub async fn acquire(&self) -> Option<UserLease> {
        self.pool.acquire_random(&self.run).await
    }
}

impl fmt::Debug for ScenarioContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScenarioContext")
            .field("base_url", &self.settings.base_url().as_str())
            .field("users", &self.pool.len())
            .field("cancelled", &self.run.is_cancelled())
            .finish()
    }
}

/// Weighted set of scenarios the workers pick from
#[derive(Clone, Default)]
pub struct ScenarioTable {
    entries: Vec<(Arc<dyn Scenario>, u32)>,
    total_weight: u32,
}

impl ScenarioTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`push`](Self::push)
    pub fn with(mut self, scenario: impl Scenario + 'static, weight: u32) -> Self {
        self.push(Arc::new(scenario), weight);
        self
    }

    pub fn push(&mut self, scenario: Arc<dyn Scenario>, weight: u32) {
        self.total_weight = self.total_weight.saturating_add(weight);
        self.entries.push((scenario, weight));
    }

    /// Reject a table nothing can be picked from
    pub fn validate(&self) -> BenchResult<()> {
        if self.total_weight == 0 {
            return Err(BenchError::contract(
                "scenario table has no entry with a positive weight",
            ));
        }
        Ok(())
    }

    /// Weighted random pick; `None` when the total weight is zero
    pub fn choose<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<&Arc<dyn Scenario>> {
        if self.total_weight == 0 {
            return None;
        }
        let mut ticket = rng.gen_range(0..self.total_weight);
        for (scenario, weight) in &self.entries {
            if ticket < *weight {
                return Some(scenario);
            }
            ticket -= weight;
        }
        None
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|(s, _)| s.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for ScenarioTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.entries.iter().map(|(s, w)| (s.name(), w)))
            .finish()
    }
}
