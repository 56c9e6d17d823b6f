//! Errors surfaced while configuring a GEMM.

use thiserror::Error;

/// Errors that can occur while selecting a kernel or configuring the pipeline.
#[derive(Debug, Error)]
pub enum GemmError {
    /// Every registered implementation rejected the problem.
    #[error("no GEMM implementation for {types} supports M={m} N={n} K={k} (batches={batches}, multis={multis})")]
    NoImplementation {
        types: &'static str,
        m: usize,
        n: usize,
        k: usize,
        batches: usize,
        multis: usize,
    },

    /// An operand does not match the problem shape.
    #[error("dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// One of M, N or K is zero.
    #[error("empty problem: M={m} N={n} K={k}")]
    EmptyProblem { m: usize, n: usize, k: usize },

    /// The configuration asks for something no kernel can honour.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for GEMM configuration.
pub type Result<T> = std::result::Result<T, GemmError>;
