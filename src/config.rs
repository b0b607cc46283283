//! Parameters for generating maps and checking engines.

use rand_chacha::ChaCha8Rng;
use rand_core::SeedableRng;

use crate::error::{IterationError, Result};
use crate::function_map::FunctionMap;

/// Largest domain the generator accepts; the binary file format stores
/// elements as `u32`.
pub const MAX_DOMAIN_SIZE: usize = u32::MAX as usize;

/// Seeded random map generation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GeneratorParams {
    pub domain_size: usize,
    pub seed: u64,
}

impl GeneratorParams {
    pub fn new(domain_size: usize, seed: u64) -> Self {
        Self { domain_size, seed }
    }

    pub fn validate(&self) -> Result<()> {
        if self.domain_size == 0 {
            return Err(IterationError::InvalidParameters(
                "domain size must be positive".to_string(),
            ));
        }
        if self.domain_size > MAX_DOMAIN_SIZE {
            return Err(IterationError::InvalidParameters(format!(
                "domain size {} exceeds {}",
                self.domain_size, MAX_DOMAIN_SIZE
            )));
        }
        Ok(())
    }

    pub fn rng(&self) -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(self.seed)
    }

    pub fn generate(&self) -> Result<FunctionMap> {
        self.validate()?;
        Ok(FunctionMap::random(self.domain_size, &mut self.rng()))
    }
}

/// How far the verification sweep runs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckParams {
    /// Every `x` is checked for `0 <= i < max_steps`.
    pub max_steps: u64,
    /// Spread the sweep over the rayon pool.
    pub parallel: bool,
}

impl CheckParams {
    /// Checks every step count below the domain size, as the classic sanity
    /// sweep does.
    pub fn for_domain(domain_size: usize) -> Self {
        Self { max_steps: domain_size as u64, parallel: true }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_steps == 0 {
            return Err(IterationError::InvalidParameters(
                "max_steps must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
