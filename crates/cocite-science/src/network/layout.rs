use std::collections::HashSet;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const EXTENT: f64 = 2.0;
const SCALE: f64 = 10_000.0;
const MAX_ATTEMPTS: usize = 10_000;

/// Hands out distinct placeholder coordinates in `[-2, 2]²`, rounded to four
/// decimals. Seeded, so a given seed and node count always yield the same
/// sequence.
pub struct CoordinateAllocator {
    rng: StdRng,
    /// Coordinates in units of 1e-4, so they hash exactly.
    used: HashSet<(i64, i64)>,
}

impl CoordinateAllocator {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            used: HashSet::new(),
        }
    }

    pub fn next_point(&mut self) -> (f64, f64) {
        for _ in 0..MAX_ATTEMPTS {
            let x = to_units(self.rng.gen_range(-EXTENT..=EXTENT));
            let y = to_units(self.rng.gen_range(-EXTENT..=EXTENT));
            if self.used.insert((x, y)) {
                return (from_units(x), from_units(y));
            }
        }
        self.grid_fallback()
    }

    fn grid_fallback(&mut self) -> (f64, f64) {
        let side = (2.0 * EXTENT * SCALE) as i64 + 1;
        let origin = -(EXTENT * SCALE) as i64;
        let mut cell = 0i64;
        loop {
            let point = (origin + cell % side, origin + (cell / side) % side);
            if self.used.insert(point) {
                return (from_units(point.0), from_units(point.1));
            }
            cell += 1;
        }
    }
}

fn to_units(v: f64) -> i64 {
    (v * SCALE).round() as i64
}

fn from_units(v: i64) -> f64 {
    v as f64 / SCALE
}
