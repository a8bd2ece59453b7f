//! `portico-auth` — request authorization for the gateway.
//!
//! This crate is intentionally decoupled from HTTP and storage: identity facts
//! arrive through [`SessionFacade`], service types through
//! [`ServiceTypeLookup`], and the outcome is a plain value.

pub mod decision;
pub mod exceptions;
pub mod gate;
pub mod session;

pub use decision::{
    AccessExplanation, AllowedBy, Decision, DecisionEngine, DenialReason, ServiceTypeLookup,
    classify_denial,
};
pub use exceptions::{ExceptionRule, ExceptionTable, ExceptionTarget};
pub use gate::{AccessDenied, AccessGate, AccessRequest, GateOutcome};
pub use session::{PermissionGrant, RequestorType, SessionFacade, SessionSnapshot};
