use std::path::PathBuf;

use thiserror::Error;

pub type SimResult<T> = Result<T, SimulatorError>;

/// Top-level error type for the simulator.
#[derive(Error, Debug)]
pub enum SimulatorError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("trace error: {0}")]
    Trace(#[from] TraceError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A state was observed that no legal transition sequence can produce.
    /// Indicates a bug in the simulator itself, never in the input.
    #[error("coherence invariant violated: {0}")]
    Invariant(String),
}

/// Fatal configuration errors, reported before simulation begins.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0} must be positive")]
    NonPositive(&'static str),

    #[error(
        "cache size {cache_size} is not divisible by associativity {assoc} x block size {block_size}"
    )]
    IndivisibleGeometry {
        cache_size: u32,
        assoc: u32,
        block_size: u32,
    },

    #[error("unknown protocol '{0}', expected MESI or Dragon")]
    UnknownProtocol(String),

    #[error("expected {expected} trace files, got {got}")]
    WrongTraceCount { expected: usize, got: usize },

    #[error("missing trace file: {0}")]
    MissingTrace(PathBuf),
}

/// Fatal errors in the trace-file format.
#[derive(Error, Debug)]
pub enum TraceError {
    #[error("{path}:{line}: expected '<label> <value>'")]
    Malformed { path: String, line: usize },

    #[error("{path}:{line}: unknown label '{label}' (expected 0, 1 or 2)")]
    UnknownLabel {
        path: String,
        line: usize,
        label: String,
    },

    #[error("{path}:{line}: invalid value '{value}'")]
    BadValue {
        path: String,
        line: usize,
        value: String,
    },
}
