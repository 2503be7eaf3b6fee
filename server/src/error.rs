use shared::ResponseStatus;

/// Failures of status queries and submission operations, surfaced to the requester.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("This mission no longer accepts submissions.")]
    SubmissionClosed,

    #[error("Please upload a .{expected} file.")]
    WrongExtension { expected: String },

    #[error("The file exceeds the limit of {limit} bytes.")]
    FileTooLarge { limit: u64 },

    #[error("There is no uploaded file to lock.")]
    NothingToLock,

    #[error("Storage failure, please contact the administrator.")]
    Storage(#[from] std::io::Error),

    #[error("Finish rate is undefined for an empty roster.")]
    RosterEmpty,
}

impl Error {
    pub fn status(&self) -> ResponseStatus {
        match self {
            Error::SubmissionClosed => ResponseStatus::SubmissionClosed,
            Error::WrongExtension { .. } => ResponseStatus::WrongExtension,
            Error::FileTooLarge { .. } => ResponseStatus::FileTooLarge,
            Error::NothingToLock => ResponseStatus::NothingToLock,
            Error::Storage(_) => ResponseStatus::StorageError,
            Error::RosterEmpty => ResponseStatus::InternalError,
        }
    }
}
