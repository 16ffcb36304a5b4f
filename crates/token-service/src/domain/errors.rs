//! # Token Errors

use shared_crypto::CodecError;
use thiserror::Error;

/// Errors returned to callers of the token service.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TokenError {
    /// Signature, expiry or structure check failed.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// The credential's `jti` is in the revocation index.
    #[error("Credential {jti} has been revoked")]
    Revoked { jti: String },

    /// The user's token version moved on since the credential was issued.
    #[error("Token version mismatch: credential carries {presented:?}, current is {current}")]
    VersionMismatch { presented: Option<u64>, current: u64 },

    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("User directory unavailable: {0}")]
    Directory(String),

    #[error("Refresh store error: {0}")]
    Store(String),

    #[error("Unknown refresh token")]
    InvalidRefreshToken,

    #[error("Refresh token expired")]
    RefreshTokenExpired,
}

impl TokenError {
    /// Stable machine-readable code for callers across the bus.
    pub fn code(&self) -> &'static str {
        match self {
            TokenError::Codec(CodecError::InvalidSignature) => "INVALID_SIGNATURE",
            TokenError::Codec(CodecError::Expired) => "TOKEN_EXPIRED",
            TokenError::Codec(CodecError::Malformed(_)) => "MALFORMED_TOKEN",
            TokenError::Codec(CodecError::Signing(_)) => "SIGNING_FAILED",
            TokenError::Revoked { .. } => "TOKEN_REVOKED",
            TokenError::VersionMismatch { .. } => "TOKEN_VERSION_MISMATCH",
            TokenError::UserNotFound(_) => "USER_NOT_FOUND",
            TokenError::Directory(_) => "DIRECTORY_UNAVAILABLE",
            TokenError::Store(_) => "STORE_UNAVAILABLE",
            TokenError::InvalidRefreshToken => "INVALID_REFRESH_TOKEN",
            TokenError::RefreshTokenExpired => "REFRESH_TOKEN_EXPIRED",
        }
    }
}
