//! Consumer state machine.
//!
//! A consumer repeatedly asks for part of its remaining need, then hands back
//! part of what it holds, until it neither needs nor holds anything.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Golden-ratio increment, spreads consecutive consumer ids across the seed space.
const SEED_STRIDE: u64 = 0x9E37_79B9_7F4A_7C15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConsumerState {
    Active,
    Done,
}

/// Per-consumer counters collected during a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumerReport {
    pub consumer: usize,
    pub grants: u64,
    pub denied_unavailable: u64,
    pub denied_unsafe: u64,
    pub releases: u64,
}

impl ConsumerReport {
    pub fn new(consumer: usize) -> Self {
        Self {
            consumer,
            ..Default::default()
        }
    }

    pub fn denials(&self) -> u64 {
        self.denied_unavailable + self.denied_unsafe
    }
}

#[derive(Debug)]
pub struct Consumer {
    id: usize,
    rng: SmallRng,
    state: ConsumerState,
}

impl Consumer {
    /// Creates consumer `id` whose choices are fully determined by `run_seed`.
    pub fn new(id: usize, run_seed: u64) -> Self {
        let seed = run_seed ^ (id as u64).wrapping_add(1).wrapping_mul(SEED_STRIDE);
        Self {
            id,
            rng: SmallRng::seed_from_u64(seed),
            state: ConsumerState::Active,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn state(&self) -> ConsumerState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == ConsumerState::Active
    }

    /// Picks a request bounded entry-wise by `need`.
    pub fn next_request(&mut self, need: &[u32]) -> Vec<u32> {
        need.iter().map(|&n| draw(&mut self.rng, n)).collect()
    }

    /// Picks a release bounded entry-wise by `held`.
    pub fn next_release(&mut self, held: &[u32]) -> Vec<u32> {
        held.iter().map(|&h| draw(&mut self.rng, h)).collect()
    }

    /// Moves to `Done` once the ledger shows nothing needed and nothing held.
    pub fn settle(&mut self, settled: bool) -> ConsumerState {
        if settled {
            self.state = ConsumerState::Done;
        }
        self.state
    }
}

/// 0 and 1 are taken whole, larger bounds draw uniformly from `0..bound`.
fn draw<R: Rng>(rng: &mut R, bound: u32) -> u32 {
    match bound {
        0 | 1 => bound,
        b => rng.random_range(0..b),
    }
}
