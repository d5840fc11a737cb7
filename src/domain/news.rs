//! Submission drafts and the page view derived from stored news.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::entities::NewsRecord;

/// An ordered page of news, newest first. Derived from the store and the search index.
pub type NewsPage = Vec<NewsRecord>;

/// A news item that has been submitted but not yet persisted.
///
/// The `token` travels with the draft through the queue and makes the insert idempotent:
/// redelivering the same draft resolves to the row created the first time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewsDraft {
    pub token: Uuid,
    pub author: String,
    pub body: String,
}

#[derive(Debug, Error)]
pub enum DraftDecodeError {
    #[error("draft payload is empty")]
    Empty,
    #[error("draft payload is not valid json: {0}")]
    Json(#[from] serde_json::Error),
}

impl NewsDraft {
    pub fn new(author: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            token: Uuid::new_v4(),
            author: author.into(),
            body: body.into(),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, DraftDecodeError> {
        if bytes.is_empty() {
            return Err(DraftDecodeError::Empty);
        }
        Ok(serde_json::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoding_preserves_author_and_body_exactly() {
        let draft = NewsDraft::new("Zoë \"z\" O'Neil", "line one\nline two\t✓  ");
        let bytes = draft.encode().expect("encode");
        let decoded = NewsDraft::decode(&bytes).expect("decode");

        assert_eq!(decoded, draft);
    }

    #[test]
    fn empty_payload_is_rejected() {
        assert!(matches!(
            NewsDraft::decode(&[]),
            Err(DraftDecodeError::Empty)
        ));
    }

    #[test]
    fn garbage_payload_is_rejected() {
        assert!(matches!(
            NewsDraft::decode(b"\x00\x01not-json"),
            Err(DraftDecodeError::Json(_))
        ));
    }

    #[test]
    fn each_draft_gets_its_own_token() {
        let first = NewsDraft::new("a", "b");
        let second = NewsDraft::new("a", "b");
        assert_ne!(first.token, second.token);
    }
}
