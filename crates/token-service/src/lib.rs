//! # Token Service
//!
//! Issues, validates and revokes the credentials that gate the bus.
//!
//! ## Architecture
//!
//! This crate follows hexagonal architecture:
//! - **Domain Layer** (`domain/`): Revocation index, records, errors. No I/O.
//! - **Ports Layer** (`ports/`): The service API and the two collaborators it
//!   needs (user directory, refresh-credential store).
//! - **Service Layer** (`service.rs`): Wires the codec and domain to ports.
//!
//! ## Validity
//!
//! A credential validates only if its signature verifies under the secret of
//! its embedded tier, it is unexpired, its `jti` is not revoked, and (for user
//! credentials) its `tokenVersion` equals the user's current version.

pub mod domain;
pub mod ports;
pub mod service;

pub use domain::entities::{RefreshTokenRecord, UserDetails};
pub use domain::errors::TokenError;
pub use domain::revocation::RevocationIndex;
pub use ports::inbound::TokenServiceApi;
pub use ports::outbound::{DirectoryError, RefreshTokenStore, StoreError, UserDirectory};
pub use service::{TokenService, TokenServiceConfig};
