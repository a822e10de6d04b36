use std::collections::VecDeque;

use contracts::ExperimentConfig;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Source of the per-round disruption draw.
pub trait RandomSource {
    /// Uniform draw in `[0, 100)`.
    fn draw_percent(&mut self) -> f64;
}

impl<R: RandomSource + ?Sized> RandomSource for &mut R {
    fn draw_percent(&mut self) -> f64 {
        (**self).draw_percent()
    }
}

#[derive(Debug, Clone)]
pub struct SeededRandom {
    rng: StdRng,
}

impl SeededRandom {
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Deterministic when the config carries a seed.
    pub fn for_config(config: &ExperimentConfig) -> Self {
        match config.seed {
            Some(seed) => Self::from_seed(seed),
            None => Self::from_entropy(),
        }
    }
}

impl RandomSource for SeededRandom {
    fn draw_percent(&mut self) -> f64 {
        self.rng.gen_range(0.0..100.0)
    }
}

/// Always returns the same draw.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedDraw(pub f64);

impl RandomSource for FixedDraw {
    fn draw_percent(&mut self) -> f64 {
        self.0
    }
}

/// Replays queued draws in order, then repeats `fallback`.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptedDraws {
    draws: VecDeque<f64>,
    fallback: f64,
}

impl ScriptedDraws {
    pub fn new(draws: impl IntoIterator<Item = f64>, fallback: f64) -> Self {
        Self {
            draws: draws.into_iter().collect(),
            fallback,
        }
    }

    pub fn remaining(&self) -> usize {
        self.draws.len()
    }
}

impl RandomSource for ScriptedDraws {
    fn draw_percent(&mut self) -> f64 {
        self.draws.pop_front().unwrap_or(self.fallback)
    }
}

/// Running totals carried from the previous round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Baseline {
    pub cumulative_cost: i64,
    pub expected_profit: i64,
}

impl Baseline {
    pub fn initial(config: &ExperimentConfig) -> Self {
        Self {
            cumulative_cost: 0,
            expected_profit: config.initial_profit,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Settlement {
    pub spending: u32,
    pub draw: f64,
    pub disruption_probability: f64,
    pub disruption_impact: i64,
    pub disrupted: bool,
    pub disruption_cost: i64,
    pub cumulative_cost: i64,
    pub expected_profit: i64,
}

/// Disruption probability in percent, decaying linearly to zero at full spending.
pub fn disruption_probability(config: &ExperimentConfig, spending: u32) -> f64 {
    let max_spending = f64::from(config.max_spending.max(1));
    let remaining = 1.0 - f64::from(spending) / max_spending;
    (config.basic_probability * remaining).max(0.0)
}

/// Cost of a disruption at this spending level, floored to whole currency units.
pub fn disruption_impact(config: &ExperimentConfig, spending: u32) -> i64 {
    let max_spending = i64::from(config.max_spending.max(1));
    let remaining = (max_spending - i64::from(spending)).max(0);
    (config.disruption_cost * remaining / max_spending).max(0)
}

/// Resolves one round. `spending` must already be validated against the config range.
pub fn settle<R>(
    config: &ExperimentConfig,
    spending: u32,
    baseline: Baseline,
    rng: &mut R,
) -> Settlement
where
    R: RandomSource + ?Sized,
{
    let probability = disruption_probability(config, spending);
    let impact = disruption_impact(config, spending);
    let draw = rng.draw_percent();

    let disrupted = draw < probability;
    let disruption_cost = if disrupted { impact } else { 0 };
    let round_cost = i64::from(spending) + disruption_cost;

    Settlement {
        spending,
        draw,
        disruption_probability: probability,
        disruption_impact: impact,
        disrupted,
        disruption_cost,
        cumulative_cost: baseline.cumulative_cost + round_cost,
        expected_profit: baseline.expected_profit - round_cost,
    }
}
