use crate::cranelift_backend::abi;

/// Failure of a single list operation.
///
/// Generated and fallback lists report exactly the same variants, so callers
/// cannot tell the two implementation families apart by their errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ListError {
    #[error("index {index} out of bounds for size {size}")]
    Bounds { index: i32, size: i32 },
    #[error("null element rejected")]
    Null,
    #[error("expected {expected} element, found {found}")]
    Type {
        expected: &'static str,
        found: &'static str,
    },
    #[error("cannot grow list of capacity {current} to hold {requested} elements")]
    Capacity { current: i32, requested: i32 },
    #[error("generated code reported status {0} without recording an error")]
    Unreported(i32),
}

impl ListError {
    /// Status code returned by generated code when this error is raised.
    pub(crate) fn status(&self) -> i32 {
        match self {
            ListError::Bounds { .. } => abi::STATUS_BOUNDS,
            ListError::Null => abi::STATUS_NULL,
            ListError::Type { .. } => abi::STATUS_TYPE,
            ListError::Capacity { .. } => abi::STATUS_CAPACITY,
            ListError::Unreported(status) => *status,
        }
    }
}

/// Failure to generate or install a specialized list type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DefinitionError {
    #[error("inconsistent kind descriptor: {0}")]
    Descriptor(String),
    #[error("malformed unit: {0}")]
    Malformed(String),
    #[error("type {0} is already installed in this scope")]
    Redefinition(String),
    #[error("backend error: {0}")]
    Backend(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ClistError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Config error: {0}")]
    Config(String),
    #[error(transparent)]
    Definition(#[from] DefinitionError),
    #[error(transparent)]
    List(#[from] ListError),
}
