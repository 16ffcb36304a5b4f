//! Codec error types.

use thiserror::Error;

/// Failures while signing or verifying a credential.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CodecError {
    /// The signature does not verify under the selected secret.
    #[error("Invalid signature")]
    InvalidSignature,

    /// The credential's `exp` is in the past.
    #[error("Credential expired")]
    Expired,

    /// The token is not a structurally valid signed-claims token.
    #[error("Malformed credential: {0}")]
    Malformed(String),

    /// Encoding the claims failed.
    #[error("Signing failed: {0}")]
    Signing(String),
}

impl From<jsonwebtoken::errors::Error> for CodecError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::InvalidSignature => CodecError::InvalidSignature,
            ErrorKind::ExpiredSignature => CodecError::Expired,
            _ => CodecError::Malformed(err.to_string()),
        }
    }
}
