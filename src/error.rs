//! Error taxonomy for the lead lifecycle core.
//!
//! Activity and journey failures propagate to the caller; workflow action
//! failures are contained per action and recorded in the execution log.

use std::collections::HashMap;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// A referenced lead, click, workflow, or preparer does not exist.
    #[error("{0} not found")]
    NotFound(String),

    /// Illegal journey transition (skip or repeat). Callers should treat
    /// this as "already advanced", not as a hard failure.
    #[error("stage violation: {reason}")]
    StageViolation { reason: String },

    /// Malformed workflow condition or action configuration.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Field-level validation failures.
    #[error("validation failed")]
    ValidationDetails { details: HashMap<String, Vec<String>> },

    /// An email/task/assignment dependency failed.
    #[error("{service} failure: {message}")]
    Collaborator { service: String, message: String },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CoreError {
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound(resource.into())
    }

    pub fn stage_violation(reason: impl Into<String>) -> Self {
        Self::StageViolation {
            reason: reason.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn collaborator(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Collaborator {
            service: service.into(),
            message: message.into(),
        }
    }

    /// Stable error code for API layers and logs.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::StageViolation { .. } => "STAGE_VIOLATION",
            Self::Validation(_) | Self::ValidationDetails { .. } => "VALIDATION_ERROR",
            Self::Collaborator { .. } => "COLLABORATOR_FAILURE",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

}

pub type CoreResult<T> = Result<T, CoreError>;

/// Accumulates field-level validation errors before a write.
#[derive(Debug, Default)]
pub struct ValidationBuilder {
    details: HashMap<String, Vec<String>>,
}

impl ValidationBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn error(mut self, field: &str, message: &str) -> Self {
        self.details
            .entry(field.to_string())
            .or_default()
            .push(message.to_string());
        self
    }

    pub fn build(self) -> Option<CoreError> {
        if self.details.is_empty() {
            None
        } else {
            Some(CoreError::ValidationDetails {
                details: self.details,
            })
        }
    }
}
