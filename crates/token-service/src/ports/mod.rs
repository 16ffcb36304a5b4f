//! # Ports Layer
//!
//! - `inbound`: the API other modules reach through the bus
//! - `outbound`: collaborators owned by other modules

pub mod inbound;
pub mod outbound;
