use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::news::{DraftDecodeError, NewsDraft};

/// Queue message carrying an encoded draft. The payload is opaque to the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewsMessage {
    pub payload: String,
}

#[derive(Debug, Error)]
pub enum MessageError {
    #[error("message payload is not valid base64: {0}")]
    Encoding(#[from] base64::DecodeError),
    #[error(transparent)]
    Draft(#[from] DraftDecodeError),
}

impl NewsMessage {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            payload: STANDARD.encode(bytes),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, MessageError> {
        Ok(STANDARD.decode(self.payload.as_bytes())?)
    }

    pub fn to_draft(&self) -> Result<NewsDraft, MessageError> {
        let bytes = self.to_bytes()?;
        Ok(NewsDraft::decode(&bytes)?)
    }
}
