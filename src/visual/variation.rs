//! Seedable choice among variation strategies.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Picks one of a fixed list of options. A seed makes the sequence reproducible.
#[derive(Debug, Clone)]
pub struct VariationPicker<T> {
    options: Vec<T>,
    rng: StdRng,
}

impl<T> VariationPicker<T> {
    /// Reproducible picker
    pub fn seeded(options: Vec<T>, seed: u64) -> Self {
        Self {
            options,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Seeded from `seed` when given, otherwise from OS entropy
    pub fn new(options: Vec<T>, seed: Option<u64>) -> Self {
        match seed {
            Some(seed) => Self::seeded(options, seed),
            None => Self {
                options,
                rng: StdRng::from_entropy(),
            },
        }
    }

    pub fn pick(&mut self) -> Option<&T> {
        self.options.choose(&mut self.rng)
    }

    pub fn options(&self) -> &[T] {
        &self.options
    }
}
