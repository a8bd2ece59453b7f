//! `portico-core` — gateway foundation primitives.
//!
//! This crate contains **pure** building blocks shared by the decision engine,
//! the service registry and the HTTP adapter (no infrastructure concerns).

pub mod error;
pub mod id;
pub mod verb;

pub use error::{ErrorKind, GatewayError, GatewayResult};
pub use id::{RequestId, RoleId, ServiceId};
pub use verb::{Verb, VerbMask};
