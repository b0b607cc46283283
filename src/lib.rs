pub mod binary_lifting;
pub mod config;
pub mod engine;
pub mod error;
pub mod function_map;
pub mod graph_decomposition;
pub mod verification;

pub use binary_lifting::{BinaryLiftingEngine, TransientInfo};
pub use config::{CheckParams, GeneratorParams};
pub use engine::{steps_from_signed, IterationEngine, QueryCost};
pub use error::{IterationError, Result};
pub use function_map::{FnSelfMap, FunctionMap, SelfMap};
pub use graph_decomposition::{
    DecompositionStats, GraphDecompositionEngine, Header, Node, NodeArena, NodeHandle, NodeKind,
};
pub use verification::{compare_engines, cross_check, time_engine, time_naive, CheckReport, Mismatch, Timing};

/// Preprocesses `map` with both engines.
///
/// The engines are independent; building both is what the harness does
/// before cross-validating them.
pub fn build_engines<M: SelfMap + ?Sized>(
    map: &M,
) -> Result<(BinaryLiftingEngine, GraphDecompositionEngine)> {
    let lifting = BinaryLiftingEngine::construct(map)?;
    let graph = GraphDecompositionEngine::construct(map)?;
    Ok((lifting, graph))
}

#[cfg(test)]
mod tests;
