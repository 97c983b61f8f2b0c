// ===============================
// src/error.rs
// ===============================
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OptimizerError {
    /// Every violation found in the inputs, not only the first one.
    #[error("validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),
    #[error("invalid input: {0}")]
    InvalidInput(String),

    // Modeling bugs: the fixed category set never produces these.
    #[error("constant (degree-0) terms cannot be encoded")]
    UnsupportedTerm,
    #[error("monomial degree {degree} exceeds max degree {max}")]
    DegreeOverflow { degree: usize, max: usize },

    // External solver
    #[error("solver auth failed: {0}")]
    SolverAuth(String),
    #[error("solver upload failed: {0}")]
    SolverUpload(String),
    #[error("solver submit failed: {0}")]
    SolverSubmit(String),
    #[error("solver transport error: {0}")]
    SolverTransport(String),
    #[error("solver job {job_id} failed: {reason}")]
    SolverJobFailed { job_id: String, reason: String },
    #[error("solver job {job_id} timed out after {elapsed:?}")]
    SolverTimeout { job_id: String, elapsed: Duration },

    #[error("no feasible combination: position list is empty")]
    NoFeasibleCombination,
    #[error("optimization cancelled")]
    Cancelled,
}

impl OptimizerError {
    /// Solver-stage failures are converted into the exhaustive fallback path.
    pub fn is_fallback_eligible(&self) -> bool {
        matches!(
            self,
            OptimizerError::SolverAuth(_)
                | OptimizerError::SolverUpload(_)
                | OptimizerError::SolverSubmit(_)
                | OptimizerError::SolverTransport(_)
                | OptimizerError::SolverJobFailed { .. }
                | OptimizerError::SolverTimeout { .. }
        )
    }

    /// Short label for metrics and the result record.
    pub fn reason_label(&self) -> &'static str {
        match self {
            OptimizerError::Validation(_) => "validation",
            OptimizerError::InvalidInput(_) => "invalid_input",
            OptimizerError::UnsupportedTerm => "unsupported_term",
            OptimizerError::DegreeOverflow { .. } => "degree_overflow",
            OptimizerError::SolverAuth(_) => "auth",
            OptimizerError::SolverUpload(_) => "upload",
            OptimizerError::SolverSubmit(_) => "submit",
            OptimizerError::SolverTransport(_) => "transport",
            OptimizerError::SolverJobFailed { .. } => "job_failed",
            OptimizerError::SolverTimeout { .. } => "timeout",
            OptimizerError::NoFeasibleCombination => "no_feasible_combination",
            OptimizerError::Cancelled => "cancelled",
        }
    }
}

pub type Result<T> = std::result::Result<T, OptimizerError>;
