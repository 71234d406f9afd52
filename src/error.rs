//! Error types for exql.

use thiserror::Error;

use crate::value::ValueType;

/// Boxed failure raised by a row source or cursor.
pub type SourceError = Box<dyn std::error::Error + Send + Sync>;

/// The main error type for exql operations.
#[derive(Debug, Error)]
pub enum ExqlError {
    /// A tree node or query operator has no translation rule.
    #[error("Unsupported expression kind: {0}")]
    UnsupportedExpressionKind(String),

    /// A recognized operator or method used in a combination that is not implemented.
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// A member referenced in the tree does not exist on the resolved value.
    #[error("Member '{member}' not found on '{type_name}'")]
    MemberNotFound { member: String, type_name: String },

    /// A row does not satisfy the detected projection shape.
    #[error("Materialization shape mismatch: {0}")]
    MaterializationShapeMismatch(String),

    /// A stored value cannot be coerced into the declared field type.
    #[error("Type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: ValueType, found: String },

    /// A lambda parameter was referenced outside of any binding.
    #[error("Unbound parameter: '{0}'")]
    UnboundParameter(String),

    /// A host value that cannot be represented.
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    /// Failed to parse a textual query.
    #[error("Parse error at position {position}: {message}")]
    Parse { position: usize, message: String },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Row-source failure, passed through unchanged.
    #[error(transparent)]
    Source(SourceError),
}

impl ExqlError {
    /// Create a member-not-found error.
    pub fn member(member: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self::MemberNotFound {
            member: member.into(),
            type_name: type_name.into(),
        }
    }

    /// Create a materialization shape mismatch error.
    pub fn shape(message: impl Into<String>) -> Self {
        Self::MaterializationShapeMismatch(message.into())
    }

    /// Create a parse error at the given position.
    pub fn parse(position: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            position,
            message: message.into(),
        }
    }

    /// Create an unsupported operation error.
    pub fn unsupported(operation: impl Into<String>) -> Self {
        Self::UnsupportedOperation(operation.into())
    }
}

/// Result type alias for exql operations.
pub type ExqlResult<T> = Result<T, ExqlError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ExqlError::member("Nickname", "Person");
        assert_eq!(err.to_string(), "Member 'Nickname' not found on 'Person'");

        let err = ExqlError::TypeMismatch {
            expected: ValueType::Int,
            found: "Text".to_string(),
        };
        assert_eq!(err.to_string(), "Type mismatch: expected Int, found Text");
    }

    #[test]
    fn test_source_error_is_transparent() {
        let inner: SourceError = "connection refused".into();
        let err = ExqlError::Source(inner);
        assert_eq!(err.to_string(), "connection refused");
    }
}
