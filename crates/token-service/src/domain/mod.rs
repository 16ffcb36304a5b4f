//! # Domain Layer
//!
//! Pure token-service logic with no I/O.

pub mod entities;
pub mod errors;
pub mod revocation;
