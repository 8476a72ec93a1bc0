//! Error types for Tempora
//!
//! Centralized error handling using thiserror.

use thiserror::Error;

/// All error types that can occur in Tempora
#[derive(Debug, Error)]
pub enum TemporaError {
    /// Invalid configuration, fatal at setup
    #[error("Config error: {0}")]
    Config(String),

    /// A ledger-gated operation could not be paid for
    #[error("Insufficient resource for {operation}: required {required:.2}, available {available:.2}")]
    InsufficientResource {
        operation: String,
        required: f64,
        available: f64,
    },

    /// Intuition birth refused because the pattern is too weak
    #[error("Pattern strength {strength:.2} below birth threshold {threshold:.2}")]
    BelowThreshold { strength: f64, threshold: f64 },

    /// A loop missed its per-cycle deadline. Displays as the slot's
    /// degraded reason.
    #[error("deadline exceeded")]
    LoopTimeout { loop_id: String },

    /// A loop returned an error from its step
    #[error("Loop {loop_id} failed: {reason}")]
    LoopFailed { loop_id: String, reason: String },

    /// Plan state machine violation
    #[error("Plan {plan_id} cannot {action} while {from}")]
    InvalidTransition {
        plan_id: String,
        from: String,
        action: String,
    },

    /// Plan not found in tracker or storage
    #[error("Plan not found: {0}")]
    PlanNotFound(String),

    /// Storage/persistence error
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl TemporaError {
    /// True for the InsufficientResource class of refusals (ledger or threshold)
    pub fn is_resource_refusal(&self) -> bool {
        matches!(
            self,
            TemporaError::InsufficientResource { .. } | TemporaError::BelowThreshold { .. }
        )
    }

    /// True for failures that must reach the caller of a plan operation
    pub fn is_persistence(&self) -> bool {
        matches!(
            self,
            TemporaError::Persistence(_) | TemporaError::Io(_) | TemporaError::Json(_)
        )
    }
}

/// Result type alias for Tempora operations
pub type Result<T> = std::result::Result<T, TemporaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error() {
        let err = TemporaError::Config("master_hz must be > 0".to_string());
        assert_eq!(err.to_string(), "Config error: master_hz must be > 0");
    }

    #[test]
    fn test_insufficient_resource_error() {
        let err = TemporaError::InsufficientResource {
            operation: "intuition.birth".to_string(),
            required: 25.0,
            available: 3.5,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient resource for intuition.birth: required 25.00, available 3.50"
        );
        assert!(err.is_resource_refusal());
    }

    #[test]
    fn test_below_threshold_is_resource_refusal() {
        let err = TemporaError::BelowThreshold {
            strength: 0.5,
            threshold: 0.7,
        };
        assert!(err.is_resource_refusal());
        assert!(!err.is_persistence());
    }

    #[test]
    fn test_loop_timeout_reads_as_degraded_reason() {
        let err = TemporaError::LoopTimeout {
            loop_id: "context".to_string(),
        };
        assert_eq!(err.to_string(), "deadline exceeded");
        assert!(!err.is_resource_refusal());
        assert!(!err.is_persistence());
    }

    #[test]
    fn test_invalid_transition_error() {
        let err = TemporaError::InvalidTransition {
            plan_id: "plan-1".to_string(),
            from: "completed".to_string(),
            action: "resume".to_string(),
        };
        assert_eq!(err.to_string(), "Plan plan-1 cannot resume while completed");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: TemporaError = io_err.into();
        assert!(matches!(err, TemporaError::Io(_)));
        assert!(err.is_persistence());
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid").unwrap_err();
        let err: TemporaError = json_err.into();
        assert!(matches!(err, TemporaError::Json(_)));
    }

    #[test]
    fn test_result_type_alias() {
        fn returns_ok() -> Result<i32> {
            Ok(42)
        }

        fn returns_err() -> Result<i32> {
            Err(TemporaError::PlanNotFound("x".to_string()))
        }

        assert!(returns_ok().is_ok());
        assert!(returns_err().is_err());
    }
}
