use crate::error::{IterationError, Result};
use crate::function_map::SelfMap;

/// Work done by a single query, reported by [`IterationEngine::eval_with_cost`].
///
/// `table_lookups` counts doubling-table reads, `segments_crossed` counts
/// chained nodes traversed before the final index. An engine leaves the
/// counter it does not use at zero.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueryCost {
    pub table_lookups: usize,
    pub segments_crossed: usize,
}

/// A preprocessed self-map answering `f^i(x)` queries.
///
/// All preprocessing happens in [`construct`](IterationEngine::construct);
/// afterwards the engine is immutable and may be shared between threads.
/// Storage is released when the engine is dropped.
pub trait IterationEngine: Sized + Send + Sync {
    /// Short label used in logs and harness output.
    const NAME: &'static str;

    /// Runs the full preprocessing over `map`.
    fn construct<M: SelfMap + ?Sized>(map: &M) -> Result<Self>;

    fn domain_size(&self) -> usize;

    /// `f^i(x)` together with the work done to find it.
    fn eval_with_cost(&self, x: usize, i: u64) -> Result<(usize, QueryCost)>;

    /// `f^i(x)`.
    fn eval(&self, x: usize, i: u64) -> Result<usize> {
        self.eval_with_cost(x, i).map(|(y, _)| y)
    }

    fn check_element(&self, x: usize) -> Result<()> {
        check_element(x, self.domain_size())
    }
}

pub(crate) fn check_element(x: usize, size: usize) -> Result<()> {
    if x < size {
        Ok(())
    } else {
        Err(IterationError::ElementOutOfRange { element: x, size })
    }
}

/// Converts a signed step count into the unsigned count the engines accept.
pub fn steps_from_signed(i: i64) -> Result<u64> {
    u64::try_from(i).map_err(|_| IterationError::NegativeSteps(i))
}

/// Reads every image of `map` once, rejecting images outside the domain.
///
/// This is the first preprocessing pass of both engines; everything after it
/// works on the returned table.
pub(crate) fn snapshot_images<M: SelfMap + ?Sized>(map: &M) -> Result<Vec<usize>> {
    let size = map.size();
    (0..size)
        .map(|index| {
            let image = map.apply(index);
            if image < size {
                Ok(image)
            } else {
                Err(IterationError::DomainError { index, image, size })
            }
        })
        .collect()
}
