//! # Shared Crypto - Credential Codec
//!
//! ## Components
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `secret` | Zeroising secret bytes with redacted `Debug` |
//! | `policy` | Per-tier salts, default lifetimes and tier overrides |
//! | `codec` | HS256 signing, structural decode, verification |
//!
//! ## Security Properties
//!
//! - **Tier-salted secrets**: each tier verifies under `base || salt(tier)`
//! - **Signature dominates claims**: a forged `trustTier` cannot verify
//! - **Zero leeway**: expiry is checked to the second

#![warn(clippy::all)]

pub mod codec;
pub mod errors;
pub mod policy;
pub mod secret;

pub use codec::{derive_secret, encode_with_secret, CredentialCodec, SignedCredential};
pub use errors::CodecError;
pub use policy::{TierSettings, TrustTierPolicy};
pub use secret::{SecretBytes, REDACTED};
