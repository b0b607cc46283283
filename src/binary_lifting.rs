//! Binary-lifting engine for iterated evaluation.
//!
//! Preprocessing classifies every element of the functional graph by the
//! rho-shaped orbit it starts: how many steps it takes to reach a cycle, which
//! cycle it reaches, and where on that cycle it lands. It then builds a
//! doubling table `jumps[k][x] = f^(2^k)(x)`.
//!
//! A query `f^i(x)` that runs past the transient is answered in one step by
//! modular indexing into the cycle. A query that stays on the transient is
//! answered by peeling off the highest set bit of `i` repeatedly, one table
//! lookup per set bit, so it never costs more than `log2(i) + 1` lookups.
//!
//! Costs: O(n log n) time and space to preprocess, O(log i) per query.

use std::fmt;

use rayon::prelude::*;
use tracing::debug;

use crate::engine::{snapshot_images, IterationEngine, QueryCost};
use crate::error::{IterationError, Result};
use crate::function_map::SelfMap;

/// Where an element's orbit meets its cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransientInfo {
    /// Steps from the element to its cycle; zero for cycle elements.
    pub length: usize,
    /// Index into [`BinaryLiftingEngine::cycles`].
    pub cycle: usize,
    /// Offset on the cycle where the orbit enters it, or the element's own
    /// offset when `length == 0`.
    pub position: usize,
}

#[derive(Clone, Copy)]
enum Mark {
    Unvisited,
    /// On the walk currently being recorded, at this index of the path.
    InWalk(usize),
    Classified(TransientInfo),
}

pub struct BinaryLiftingEngine {
    jumps: Vec<Vec<usize>>,
    cycles: Vec<Vec<usize>>,
    transient: Vec<TransientInfo>,
}

impl BinaryLiftingEngine {
    pub fn transient_info(&self, x: usize) -> Result<TransientInfo> {
        self.check_element(x)?;
        Ok(self.transient[x])
    }

    /// Every cycle of the graph, each listed in the order `f` walks it.
    pub fn cycles(&self) -> &[Vec<usize>] {
        &self.cycles
    }

    /// Number of doubling levels stored.
    pub fn levels(&self) -> usize {
        self.jumps.len()
    }

    /// Total words held by the engine's tables.
    pub fn storage_words(&self) -> usize {
        let table: usize = self.jumps.iter().map(Vec::len).sum();
        let cycles: usize = self.cycles.iter().map(Vec::len).sum();
        table + cycles + 3 * self.transient.len()
    }
}

/// Walks forward from every unclassified element, either closing a new cycle
/// or joining an orbit classified by an earlier walk.
fn classify(images: &[usize]) -> Result<(Vec<TransientInfo>, Vec<Vec<usize>>)> {
    let mut marks = vec![Mark::Unvisited; images.len()];
    let mut cycles: Vec<Vec<usize>> = Vec::new();
    let mut path = Vec::new();

    for start in 0..images.len() {
        if !matches!(marks[start], Mark::Unvisited) {
            continue;
        }

        path.clear();
        let mut current = start;
        while let Mark::Unvisited = marks[current] {
            marks[current] = Mark::InWalk(path.len());
            path.push(current);
            current = images[current];
        }

        match marks[current] {
            Mark::Classified(junction) => {
                let mut info = junction;
                for &x in path.iter().rev() {
                    info.length += 1;
                    marks[x] = Mark::Classified(info);
                }
            }
            Mark::InWalk(cycle_start) => {
                let cycle = cycles.len();
                for (offset, &x) in path[..cycle_start].iter().enumerate() {
                    marks[x] = Mark::Classified(TransientInfo {
                        length: cycle_start - offset,
                        cycle,
                        position: 0,
                    });
                }
                for (position, &x) in path[cycle_start..].iter().enumerate() {
                    marks[x] = Mark::Classified(TransientInfo { length: 0, cycle, position });
                }
                cycles.push(path[cycle_start..].to_vec());
            }
            Mark::Unvisited => {
                return Err(IterationError::InvariantViolation(format!(
                    "walk from {} stopped at unvisited element {}",
                    start, current
                )));
            }
        }
    }

    let transient = marks
        .into_iter()
        .enumerate()
        .map(|(x, mark)| match mark {
            Mark::Classified(info) => Ok(info),
            _ => Err(IterationError::InvariantViolation(format!(
                "element {} has no transient info after preprocessing",
                x
            ))),
        })
        .collect::<Result<Vec<_>>>()?;

    Ok((transient, cycles))
}

/// `levels[k][x] = f^(2^k)(x)`, enough levels to cover any step count below
/// the domain size.
fn build_jump_table(images: Vec<usize>) -> Vec<Vec<usize>> {
    let size = images.len();
    if size == 0 {
        return Vec::new();
    }

    let levels = (usize::BITS - size.leading_zeros()) as usize;
    let mut jumps = Vec::with_capacity(levels);
    jumps.push(images);
    for k in 1..levels {
        let prev = &jumps[k - 1];
        let next: Vec<usize> = prev.par_iter().map(|&y| prev[y]).collect();
        jumps.push(next);
    }
    jumps
}

impl IterationEngine for BinaryLiftingEngine {
    const NAME: &'static str = "binary-lifting";

    fn construct<M: SelfMap + ?Sized>(map: &M) -> Result<Self> {
        let images = snapshot_images(map)?;
        let (transient, cycles) = classify(&images)?;
        let jumps = build_jump_table(images);

        debug!(
            size = transient.len(),
            cycles = cycles.len(),
            levels = jumps.len(),
            "binary lifting preprocessing complete"
        );

        Ok(Self { jumps, cycles, transient })
    }

    fn domain_size(&self) -> usize {
        self.transient.len()
    }

    fn eval_with_cost(&self, x: usize, i: u64) -> Result<(usize, QueryCost)> {
        self.check_element(x)?;
        if i == 0 {
            return Ok((x, QueryCost::default()));
        }

        let info = self.transient[x];
        if i > info.length as u64 {
            let cycle = &self.cycles[info.cycle];
            let len = cycle.len() as u64;
            let index = ((i - info.length as u64) % len + info.position as u64) % len;
            let cost = QueryCost { table_lookups: 1, ..QueryCost::default() };
            return Ok((cycle[index as usize], cost));
        }

        // i <= info.length < size, so every level below is stored
        let mut remaining = i;
        let mut current = x;
        let mut lookups = 0;
        while remaining > 0 {
            let level = (u64::BITS - 1 - remaining.leading_zeros()) as usize;
            current = self.jumps[level][current];
            remaining -= 1u64 << level;
            lookups += 1;
        }

        Ok((current, QueryCost { table_lookups: lookups, ..QueryCost::default() }))
    }
}

impl fmt::Display for BinaryLiftingEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for x in 0..self.domain_size() {
            write!(f, "{}:", x)?;
            for level in &self.jumps {
                write!(f, "\t{}", level[x])?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function_map::{FnSelfMap, FunctionMap};

    #[test]
    fn test_small_rho() {
        let f = FunctionMap::new(vec![1, 2, 2]).unwrap();
        let engine = BinaryLiftingEngine::construct(&f).unwrap();

        assert_eq!(engine.eval(0, 0).unwrap(), 0);
        assert_eq!(engine.eval(0, 1).unwrap(), 1);
        assert_eq!(engine.eval(0, 2).unwrap(), 2);
        assert_eq!(engine.eval(0, 100).unwrap(), 2);
        assert_eq!(engine.eval(1, 0).unwrap(), 1);
        assert_eq!(engine.eval(1, 1).unwrap(), 2);
        assert_eq!(engine.eval(2, 5).unwrap(), 2);

        assert_eq!(engine.cycles(), &[vec![2]]);
        assert_eq!(
            engine.transient_info(0).unwrap(),
            TransientInfo { length: 2, cycle: 0, position: 0 }
        );
    }

    #[test]
    fn test_transient_info_entry_positions() {
        // 0 -> 1 -> 2 -> 3 -> 1, 4 -> 3
        let f = FunctionMap::new(vec![1, 2, 3, 1, 3]).unwrap();
        let engine = BinaryLiftingEngine::construct(&f).unwrap();

        assert_eq!(engine.cycles(), &[vec![1, 2, 3]]);
        assert_eq!(
            engine.transient_info(4).unwrap(),
            TransientInfo { length: 1, cycle: 0, position: 2 }
        );
        assert_eq!(
            engine.transient_info(2).unwrap(),
            TransientInfo { length: 0, cycle: 0, position: 1 }
        );
        assert_eq!(engine.eval(4, 2).unwrap(), 1);
        assert_eq!(engine.eval(4, 7).unwrap(), f.iterate(4, 7).unwrap());
    }

    #[test]
    fn test_jump_table_levels() {
        let f = FunctionMap::new(vec![1, 2, 3, 4, 5, 6, 7, 0]).unwrap();
        let engine = BinaryLiftingEngine::construct(&f).unwrap();

        assert_eq!(engine.levels(), 4);
        for (k, level) in engine.jumps.iter().enumerate() {
            for x in 0..8 {
                assert_eq!(level[x], (x + (1 << k)) % 8);
            }
        }
    }

    #[test]
    fn test_lookups_grow_with_log_of_steps() {
        let size = 1 << 12;
        let path = FnSelfMap::new(size, |x| (x + 1).min(size - 1));
        let engine = BinaryLiftingEngine::construct(&path).unwrap();

        for k in 1..12u32 {
            let i = (1u64 << k) - 1;
            let (y, cost) = engine.eval_with_cost(0, i).unwrap();
            assert_eq!(y, i as usize);
            assert_eq!(cost.table_lookups, k as usize);
        }

        for i in 1..(size as u64) {
            let (_, cost) = engine.eval_with_cost(0, i).unwrap();
            let bits = (u64::BITS - i.leading_zeros()) as usize;
            assert!(cost.table_lookups <= bits);
        }
    }

    #[test]
    fn test_large_step_counts() {
        let f = FunctionMap::new(vec![1, 2, 0, 0]).unwrap();
        let engine = BinaryLiftingEngine::construct(&f).unwrap();

        assert_eq!(engine.eval(3, u64::MAX).unwrap(), ((u64::MAX - 1) % 3) as usize);
        assert_eq!(engine.eval(0, 3_000_000_000).unwrap(), 0);
    }

    #[test]
    fn test_rejects_bad_input() {
        let f = FunctionMap::new(vec![0, 0]).unwrap();
        let engine = BinaryLiftingEngine::construct(&f).unwrap();
        assert!(engine.eval(2, 0).unwrap_err().is_invalid_argument());

        let escaping = FnSelfMap::new(3, |x| x * 2);
        assert!(matches!(
            BinaryLiftingEngine::construct(&escaping),
            Err(IterationError::DomainError { index: 2, image: 4, size: 3 })
        ));
    }

    #[test]
    fn test_empty_domain() {
        let f = FunctionMap::new(Vec::new()).unwrap();
        let engine = BinaryLiftingEngine::construct(&f).unwrap();
        assert_eq!(engine.levels(), 0);
        assert!(engine.eval(0, 0).is_err());
    }

    #[test]
    fn test_display_rows() {
        let f = FunctionMap::new(vec![1, 0]).unwrap();
        let engine = BinaryLiftingEngine::construct(&f).unwrap();
        assert_eq!(engine.to_string(), "0:\t1\t0\n1:\t0\t1\n");
    }
}
