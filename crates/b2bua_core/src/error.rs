//! Core Error Types

use thiserror::Error;

/// Errors surfaced by the B2BUA core's typed command entry points.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("out of memory")]
    OutOfMemory,

    #[error("invalid sdp: {0}")]
    InvalidSdp(String),

    #[error("device name in use: {0}")]
    NameInUse(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Collapses the error to the small fixed code space a command
    /// transport surfaces to its caller. `NameInUse` is a `Conflict` one
    /// layer down (the device registry) and is folded into it here.
    pub fn kind(&self) -> &'static str {
        match self {
            CoreError::InvalidArgument(_) => "invalid_argument",
            CoreError::NotFound(_) => "not_found",
            CoreError::Conflict(_) | CoreError::NameInUse(_) => "conflict",
            CoreError::Unsupported(_) => "unsupported",
            CoreError::OutOfMemory => "out_of_memory",
            CoreError::InvalidSdp(_) => "invalid_sdp",
            CoreError::Internal(_) => "internal",
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_folds_name_in_use_into_conflict() {
        assert_eq!(CoreError::NameInUse("x".into()).kind(), "conflict");
        assert_eq!(CoreError::Conflict("x".into()).kind(), "conflict");
    }

    #[test]
    fn display_includes_detail() {
        let err = CoreError::NotFound("session 'A'".into());
        assert!(err.to_string().contains("session 'A'"));
    }
}
