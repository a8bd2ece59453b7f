//! Access-check gate: the per-request entry point.
//!
//! Sequencing (first match wins):
//! trusted internal bypass → expired token → blacklisted token → invalid
//! token → decision engine. Denials never escape as errors; they become an
//! [`AccessDenied`] the transport layer renders.

use std::sync::Arc;

use serde::Serialize;

use portico_core::{ErrorKind, GatewayError, GatewayResult, Verb};

use crate::decision::{AccessExplanation, Decision, DecisionEngine, DenialReason};
use crate::exceptions::ExceptionTable;
use crate::session::SessionFacade;

/// Normalised request facts the gate needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessRequest {
    pub service: String,
    pub resource: String,
    pub verb: String,
    /// Pre-validated console/internal caller; skips every check.
    pub trusted_internal: bool,
}

impl AccessRequest {
    pub fn new(
        service: impl Into<String>,
        resource: impl Into<String>,
        verb: impl Into<String>,
    ) -> Self {
        Self {
            service: service.into(),
            resource: resource.into(),
            verb: verb.into(),
            trusted_internal: false,
        }
    }

    pub fn trusted(mut self) -> Self {
        self.trusted_internal = true;
        self
    }
}

/// Structured denial outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessDenied {
    pub kind: ErrorKind,
    pub status: u16,
    pub message: String,
    /// Set when the denial came from the decision engine's classifier.
    pub reason: Option<DenialReason>,
}

impl AccessDenied {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            status: kind.status_code(),
            message: message.into(),
            reason: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    pub fn code(&self) -> &'static str {
        self.reason.map_or_else(|| self.kind.code(), |r| r.code())
    }
}

impl From<DenialReason> for AccessDenied {
    fn from(reason: DenialReason) -> Self {
        Self {
            reason: Some(reason),
            ..AccessDenied::new(reason.kind(), reason.message())
        }
    }
}

impl From<GatewayError> for AccessDenied {
    fn from(err: GatewayError) -> Self {
        AccessDenied::new(err.kind(), err.message())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome {
    PassThrough,
    Denied(AccessDenied),
}

impl GateOutcome {
    pub fn is_pass_through(&self) -> bool {
        matches!(self, GateOutcome::PassThrough)
    }
}

#[derive(Debug, Clone)]
pub struct AccessGate {
    engine: DecisionEngine,
    open_registration: bool,
}

impl AccessGate {
    pub fn new(engine: DecisionEngine, open_registration: bool) -> Self {
        Self {
            engine,
            open_registration,
        }
    }

    pub fn engine(&self) -> &DecisionEngine {
        &self.engine
    }

    pub fn exceptions(&self) -> &Arc<ExceptionTable> {
        self.engine.exceptions()
    }

    pub fn handle(&self, identity: &dyn SessionFacade, request: &AccessRequest) -> GateOutcome {
        if request.trusted_internal {
            return GateOutcome::PassThrough;
        }

        self.install_deployment_rules();

        let outcome = self.check(identity, request);
        match &outcome {
            GateOutcome::PassThrough => tracing::debug!(
                service = %request.service,
                resource = %request.resource,
                verb = %request.verb,
                "access granted"
            ),
            GateOutcome::Denied(denied) => tracing::info!(
                service = %request.service,
                resource = %request.resource,
                verb = %request.verb,
                code = denied.code(),
                status = denied.status,
                "access denied"
            ),
        }
        outcome
    }

    /// Explain the engine's decision for `identity`, with the same
    /// deployment rules in force that [`AccessGate::handle`] applies.
    pub fn explain(
        &self,
        identity: &dyn SessionFacade,
        service: &str,
        resource: &str,
        verb: Verb,
    ) -> GatewayResult<AccessExplanation> {
        self.install_deployment_rules();
        self.engine.explain(identity, service, resource, verb)
    }

    fn install_deployment_rules(&self) {
        if self.open_registration {
            self.engine.exceptions().ensure_open_registration();
        }
    }

    fn check(&self, identity: &dyn SessionFacade, request: &AccessRequest) -> GateOutcome {
        if identity.is_token_expired() {
            return GateOutcome::Denied(AccessDenied::new(
                ErrorKind::Unauthorized,
                "Session token has expired. Please refresh your token.",
            ));
        }
        if identity.is_token_blacklisted() {
            return GateOutcome::Denied(AccessDenied::new(
                ErrorKind::Forbidden,
                "Session token has been revoked. Please log in again.",
            ));
        }
        if identity.is_token_invalid() {
            return GateOutcome::Denied(
                AccessDenied::new(ErrorKind::BadRequest, "Session token is invalid.").with_status(401),
            );
        }

        match self
            .engine
            .evaluate(identity, &request.service, &request.resource, &request.verb)
        {
            Ok(Decision::Allowed(_)) => GateOutcome::PassThrough,
            Ok(Decision::Denied(reason)) => GateOutcome::Denied(reason.into()),
            Err(err) => GateOutcome::Denied(err.into()),
        }
    }
}
