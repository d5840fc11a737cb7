use thiserror::Error;

/// A value that reached the domain breaks a rule the rest of the pipeline relies on.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("news invariant violated: {message}")]
    Invariant { message: String },
}

impl DomainError {
    pub fn invariant(message: impl Into<String>) -> Self {
        Self::Invariant {
            message: message.into(),
        }
    }
}
