//! The error taxonomy from §7, upgraded to a `thiserror`-derived enum so it implements
//! `std::error::Error`/`Display` and can cross the public API boundary cleanly (the teacher's own
//! `ConstructionError`/`ScoringError` stop at `Eq`, which is fine for an internal `TryFrom` but
//! not for errors a library hands back to its caller).

use thiserror::Error;

#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum EngineError {
    #[error("invalid input in field `{field}`: {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("target score {target} is unreachable (lambda search did not bracket a root below {lambda_ceiling})")]
    UnreachableTarget { target: String, lambda_ceiling: String },

    #[error("non-finite value encountered while evaluating V_lambda at lambda={lambda}: {detail}")]
    Numeric { lambda: String, detail: String },

    #[error("compute was cancelled")]
    Cancelled,

    #[error("no solved policy is cached yet for this request; call compute_policy first")]
    NotReady,
}

impl EngineError {
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        EngineError::InvalidInput {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn unreachable_target(target: f64, lambda_ceiling: f64) -> Self {
        EngineError::UnreachableTarget {
            target: format!("{target}"),
            lambda_ceiling: format!("{lambda_ceiling}"),
        }
    }

    pub fn numeric(lambda: f64, detail: impl Into<String>) -> Self {
        EngineError::Numeric {
            lambda: format!("{lambda}"),
            detail: detail.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages_name_the_field() {
        let err = EngineError::invalid("targetScore", "must be within [0, 100]");
        assert!(err.to_string().contains("targetScore"));
    }

    #[test]
    fn unreachable_target_carries_values() {
        let err = EngineError::unreachable_target(101.0, 1e12);
        assert!(err.to_string().contains("101"));
    }
}
