use sea_orm::DbErr;
use thiserror::Error;

/// Errors surfaced by the queue core.
///
/// The CLI maps each kind onto a process exit code via [`QueueError::exit_code`]:
/// validation problems exit 2, state conflicts exit 3, everything unexpected
/// exits 1.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("no job with id '{0}'")]
    NotFound(String),

    #[error("a job with id '{0}' already exists")]
    AlreadyExists(String),

    #[error("{0}")]
    InvalidState(String),

    #[error("{0}")]
    InvalidInput(String),

    #[error("storage error: {0}")]
    Storage(#[from] DbErr),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl QueueError {
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::InvalidInput(_) => 2,
            Self::NotFound(_) | Self::AlreadyExists(_) | Self::InvalidState(_) => 3,
            Self::Storage(_) | Self::Io(_) => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, QueueError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_follow_cli_contract() {
        assert_eq!(QueueError::InvalidInput("bad".into()).exit_code(), 2);
        assert_eq!(QueueError::NotFound("x".into()).exit_code(), 3);
        assert_eq!(QueueError::AlreadyExists("x".into()).exit_code(), 3);
        assert_eq!(QueueError::InvalidState("nope".into()).exit_code(), 3);
        assert_eq!(
            QueueError::Storage(DbErr::Custom("boom".into())).exit_code(),
            1
        );
    }
}
