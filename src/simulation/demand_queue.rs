//! Stochastic passenger queues at a stop
//!
//! A `DemandQueue` holds one accumulating passenger count per key (a line or
//! a line-group). Every tick each key draws a Poisson number of arrivals from
//! its rate; boarding buses take passengers back out with `decrease`.

use rand::Rng;
use std::collections::BTreeMap;
use std::fmt::Debug;

use super::error::SimError;

/// Rates above this are split into chunks before sampling so `exp(-lambda)`
/// never underflows.
const MAX_KNUTH_LAMBDA: f64 = 30.0;

/// Draw one Poisson-distributed count with mean `lambda`
///
/// Knuth's multiplication method: multiply uniforms until the product drops
/// below `exp(-lambda)`.
pub fn sample_poisson<R: Rng + ?Sized>(rng: &mut R, lambda: f64) -> u64 {
    if lambda <= 0.0 || !lambda.is_finite() {
        return 0;
    }

    let mut remaining = lambda;
    let mut count = 0;
    while remaining > 0.0 {
        let chunk = remaining.min(MAX_KNUTH_LAMBDA);
        remaining -= chunk;

        let limit = (-chunk).exp();
        let mut product: f64 = rng.random();
        while product > limit {
            count += 1;
            product *= rng.random::<f64>();
        }
    }
    count
}

/// Per-key passenger accumulation with optional ceilings
#[derive(Debug, Clone)]
pub struct DemandQueue<K: Ord + Copy + Debug> {
    /// Arrival rate per tick for each key
    lambdas: BTreeMap<K, f64>,
    /// Passengers currently waiting for each key
    levels: BTreeMap<K, f64>,
    /// Ceiling on each level, once bounded
    caps: BTreeMap<K, f64>,
}

impl<K: Ord + Copy + Debug> DemandQueue<K> {
    pub fn new(lambdas: BTreeMap<K, f64>) -> Self {
        let levels = lambdas.keys().map(|k| (*k, 0.0)).collect();
        Self {
            lambdas,
            levels,
            caps: BTreeMap::new(),
        }
    }

    /// Add one tick's worth of arrivals to every key
    pub fn arrival<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        for (key, lambda) in &self.lambdas {
            let arrived = sample_poisson(rng, *lambda) as f64;
            let level = self.levels.entry(*key).or_insert(0.0);
            *level += arrived;
            if let Some(cap) = self.caps.get(key) {
                *level = level.min(*cap);
            }
        }
    }

    /// Current number of passengers waiting for `key`
    pub fn query(&self, key: K) -> Result<f64, SimError> {
        self.levels
            .get(&key)
            .copied()
            .ok_or_else(|| SimError::InvalidKey(format!("{key:?} not in demand queue")))
    }

    /// Remove boarded passengers from `key`
    ///
    /// `amount` must not exceed the current level; the level never goes
    /// negative.
    pub fn decrease(&mut self, key: K, amount: f64) -> Result<(), SimError> {
        let level = self
            .levels
            .get_mut(&key)
            .ok_or_else(|| SimError::InvalidKey(format!("{key:?} not in demand queue")))?;
        debug_assert!(
            amount <= *level + 1e-9,
            "decrease of {amount} exceeds level {level} for {key:?}"
        );
        *level = (*level - amount).max(0.0);
        Ok(())
    }

    /// Cap every key's level at `cap`
    ///
    /// Levels already above the cap are clamped straight away; later arrivals
    /// never push a level past it.
    pub fn pax_demand_bounding(&mut self, cap: f64) {
        let cap = cap.max(0.0);
        for (key, level) in self.levels.iter_mut() {
            self.caps.insert(*key, cap);
            *level = level.min(cap);
        }
    }

    /// Zero all levels, keeping rates and caps
    pub fn reset(&mut self) {
        for level in self.levels.values_mut() {
            *level = 0.0;
        }
    }

    pub fn lambda(&self, key: K) -> Option<f64> {
        self.lambdas.get(&key).copied()
    }

    pub fn cap(&self, key: K) -> Option<f64> {
        self.caps.get(&key).copied()
    }

    pub fn keys(&self) -> impl Iterator<Item = K> + '_ {
        self.lambdas.keys().copied()
    }

    /// Total passengers waiting across all keys
    pub fn total(&self) -> f64 {
        self.levels.values().sum()
    }
}
