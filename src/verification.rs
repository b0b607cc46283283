//! Cross-checking and timing of iteration engines.
//!
//! The reference for every check is naive step-by-step iteration of the
//! [`FunctionMap`]. Sweeps cover every domain element and every step count
//! below [`CheckParams::max_steps`]; the naive answer for `(x, i + 1)` is
//! derived from `(x, i)` so a sweep costs one map step per query.

use std::hint::black_box;
use std::time::{Duration, Instant};

use rayon::prelude::*;
use tracing::{info, warn};

use crate::config::CheckParams;
use crate::engine::{IterationEngine, QueryCost};
use crate::error::{IterationError, Result};
use crate::function_map::FunctionMap;

/// Mismatches beyond this many are counted but not logged.
const LOGGED_MISMATCHES: usize = 8;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Mismatch {
    pub x: usize,
    pub i: u64,
    pub expected: usize,
    pub actual: usize,
}

#[derive(Clone, Debug)]
pub struct CheckReport {
    pub engine: &'static str,
    pub queries: u64,
    pub mismatches: Vec<Mismatch>,
    /// Largest per-query cost observed during the sweep.
    pub worst_cost: QueryCost,
}

impl CheckReport {
    pub fn is_clean(&self) -> bool {
        self.mismatches.is_empty()
    }
}

#[derive(Clone, Debug)]
pub struct Timing {
    pub engine: &'static str,
    pub preprocessing: Duration,
    pub sweep: Duration,
    pub queries: u64,
}

fn ensure_same_domain(map: &FunctionMap, engine_size: usize) -> Result<()> {
    if map.size() != engine_size {
        return Err(IterationError::InvalidParameters(format!(
            "engine covers {} elements but the map has {}",
            engine_size,
            map.size()
        )));
    }
    Ok(())
}

fn sweep_element<E: IterationEngine>(
    map: &FunctionMap,
    engine: &E,
    x: usize,
    max_steps: u64,
) -> Result<(Vec<Mismatch>, QueryCost)> {
    let images = map.as_slice();
    let mut mismatches = Vec::new();
    let mut worst = QueryCost::default();
    let mut expected = x;

    for i in 0..max_steps {
        let (actual, cost) = engine.eval_with_cost(x, i)?;
        if actual != expected {
            mismatches.push(Mismatch { x, i, expected, actual });
        }
        worst.table_lookups = worst.table_lookups.max(cost.table_lookups);
        worst.segments_crossed = worst.segments_crossed.max(cost.segments_crossed);
        expected = images[expected];
    }
    Ok((mismatches, worst))
}

/// Compares `engine` against naive iteration for every `x` and every
/// `i < params.max_steps`.
pub fn cross_check<E: IterationEngine>(
    map: &FunctionMap,
    engine: &E,
    params: &CheckParams,
) -> Result<CheckReport> {
    params.validate()?;
    ensure_same_domain(map, engine.domain_size())?;

    let per_element: Vec<(Vec<Mismatch>, QueryCost)> = if params.parallel {
        (0..map.size())
            .into_par_iter()
            .map(|x| sweep_element(map, engine, x, params.max_steps))
            .collect::<Result<_>>()?
    } else {
        (0..map.size())
            .map(|x| sweep_element(map, engine, x, params.max_steps))
            .collect::<Result<_>>()?
    };

    let mut mismatches = Vec::new();
    let mut worst_cost = QueryCost::default();
    for (found, cost) in per_element {
        mismatches.extend(found);
        worst_cost.table_lookups = worst_cost.table_lookups.max(cost.table_lookups);
        worst_cost.segments_crossed = worst_cost.segments_crossed.max(cost.segments_crossed);
    }

    for m in mismatches.iter().take(LOGGED_MISMATCHES) {
        warn!(
            engine = E::NAME,
            x = m.x,
            i = m.i,
            expected = m.expected,
            actual = m.actual,
            "engine disagrees with naive iteration"
        );
    }

    let queries = map.size() as u64 * params.max_steps;
    info!(
        engine = E::NAME,
        queries,
        mismatches = mismatches.len(),
        "cross-check complete"
    );

    Ok(CheckReport { engine: E::NAME, queries, mismatches, worst_cost })
}

/// Runs both engines over the same queries and reports where they disagree;
/// `expected` holds the answer of `a`.
pub fn compare_engines<A: IterationEngine, B: IterationEngine>(
    a: &A,
    b: &B,
    max_steps: u64,
) -> Result<Vec<Mismatch>> {
    if a.domain_size() != b.domain_size() {
        return Err(IterationError::InvalidParameters(format!(
            "{} covers {} elements, {} covers {}",
            A::NAME,
            a.domain_size(),
            B::NAME,
            b.domain_size()
        )));
    }

    let mut mismatches = Vec::new();
    for x in 0..a.domain_size() {
        for i in 0..max_steps {
            let expected = a.eval(x, i)?;
            let actual = b.eval(x, i)?;
            if expected != actual {
                mismatches.push(Mismatch { x, i, expected, actual });
            }
        }
    }
    Ok(mismatches)
}

/// Builds an engine and times its preprocessing and a full query sweep.
pub fn time_engine<E: IterationEngine>(map: &FunctionMap, params: &CheckParams) -> Result<(E, Timing)> {
    params.validate()?;

    let start = Instant::now();
    let engine = E::construct(map)?;
    let preprocessing = start.elapsed();

    let start = Instant::now();
    for x in 0..engine.domain_size() {
        for i in 0..params.max_steps {
            black_box(engine.eval(x, i)?);
        }
    }
    let sweep = start.elapsed();

    let queries = engine.domain_size() as u64 * params.max_steps;
    info!(
        engine = E::NAME,
        preprocessing_us = preprocessing.as_micros() as u64,
        sweep_us = sweep.as_micros() as u64,
        queries,
        "timing complete"
    );

    Ok((engine, Timing { engine: E::NAME, preprocessing, sweep, queries }))
}

/// Times the same sweep answered by naive iteration.
pub fn time_naive(map: &FunctionMap, params: &CheckParams) -> Result<Duration> {
    params.validate()?;

    let start = Instant::now();
    for x in 0..map.size() {
        for i in 0..params.max_steps {
            black_box(map.iterate(x, i)?);
        }
    }
    Ok(start.elapsed())
}
