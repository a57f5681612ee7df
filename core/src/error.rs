use thiserror::Error;

pub type NotesResult<T> = Result<T, NotesError>;

/// Errors surfaced by the note repository.
///
/// Attachment file-system problems are not represented here: they are logged
/// and reported through [`crate::attachments::AttachmentReport`] instead.
#[derive(Error, Debug)]
pub enum NotesError {
    /// Rejected before any mutation began.
    #[error("invalid {field}: {message}")]
    Validation { field: String, message: String },

    /// Store failure. The enclosing transaction has been rolled back.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

impl NotesError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        NotesError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        NotesError::NotFound(what.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, NotesError::NotFound(_))
    }
}
