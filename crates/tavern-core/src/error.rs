//! Error types shared across the workspace.

use thiserror::Error;

/// Every fallible operation in Tavern returns this error.
#[derive(Debug, Error)]
pub enum TavernError {
    /// A module descriptor is missing required fields or is internally inconsistent.
    #[error("Module '{module}' violates the module contract, missing: {}", .missing.join(", "))]
    ContractViolation { module: String, missing: Vec<String> },

    #[error("Module already registered: {0}")]
    DuplicateRegistration(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// A module hook or handler failed.
    #[error("Module error: {0}")]
    Module(String),

    /// The chat platform rejected or failed a remote call.
    #[error("Platform error: {0}")]
    Platform(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Config error: {0}")]
    Config(String),

    /// Tenant configuration an executor needs is absent. Not fixed by retrying.
    #[error("Missing prerequisite: {0}")]
    MissingPrerequisite(String),

    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),
}

impl TavernError {
    pub fn module(msg: impl Into<String>) -> Self {
        Self::Module(msg.into())
    }

    pub fn platform(msg: impl Into<String>) -> Self {
        Self::Platform(msg.into())
    }

    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Whether the same call may succeed if attempted again later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Platform(_) | Self::Store(_) | Self::Io(_))
    }
}

pub type Result<T> = std::result::Result<T, TavernError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contract_violation_names_fields() {
        let err = TavernError::ContractViolation {
            module: "contest".into(),
            missing: vec!["version".into(), "shutdown".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("contest"));
        assert!(msg.contains("version, shutdown"));
    }

    #[test]
    fn test_retryable() {
        assert!(TavernError::platform("502").is_retryable());
        assert!(!TavernError::MissingPrerequisite("parent".into()).is_retryable());
        assert!(!TavernError::NotFound("x".into()).is_retryable());
    }
}
