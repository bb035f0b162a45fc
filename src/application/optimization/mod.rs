pub mod genetic;
pub mod grid;

pub use genetic::{
    FitnessMode, GenerationResult, GeneticOptimizer, GeneticSettings, OptimizationResult,
};
pub use grid::{generate_parameter_sets, ParameterRange, ParameterSet};
