//! Authorization decision engine.
//!
//! `evaluate` decides whether the current identity may perform `verb` on
//! `(service, resource)`:
//!
//! 1. unknown verb → `MethodNotAllowed` (never masked to zero)
//! 2. role grant contains the verb bit → allowed
//! 3. empty service (root listing) → allowed
//! 4. first matching exception rule → allowed
//! 5. otherwise denied, with the single most actionable reason

use std::sync::Arc;

use serde::Serialize;

use portico_core::{ErrorKind, GatewayResult, Verb, VerbMask};

use crate::exceptions::{ExceptionRule, ExceptionTable};
use crate::session::{RequestorType, SessionFacade};

/// Resolves the type name of a configured service.
///
/// Implemented by the service registry; failures (unknown service, store
/// outage) propagate to the caller unchanged.
pub trait ServiceTypeLookup: Send + Sync {
    fn service_type(&self, service: &str) -> GatewayResult<String>;
}

impl<T> ServiceTypeLookup for Arc<T>
where
    T: ServiceTypeLookup + ?Sized,
{
    fn service_type(&self, service: &str) -> GatewayResult<String> {
        (**self).service_type(service)
    }
}

/// Why a request was denied, in classification priority order.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialReason {
    MissingCredentials,
    MissingApiKey,
    MissingSessionToken,
    NoRoleAssigned,
    RoleInactive,
    Unauthenticated,
    InsufficientPrivilege,
}

impl DenialReason {
    pub fn kind(self) -> ErrorKind {
        match self {
            DenialReason::MissingCredentials
            | DenialReason::MissingApiKey
            | DenialReason::MissingSessionToken => ErrorKind::BadRequest,
            DenialReason::NoRoleAssigned
            | DenialReason::RoleInactive
            | DenialReason::InsufficientPrivilege => ErrorKind::Forbidden,
            DenialReason::Unauthenticated => ErrorKind::Unauthorized,
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            DenialReason::MissingCredentials => {
                "No session token or API key detected in request. Send the session token \
                 and/or the API key request header."
            }
            DenialReason::MissingApiKey => "No API key provided. Please provide a valid API key.",
            DenialReason::MissingSessionToken => {
                "No session token provided. Please log in or provide a valid session token."
            }
            DenialReason::NoRoleAssigned => "No role assigned to the caller for this request.",
            DenialReason::RoleInactive => "The role assigned to the caller is not active.",
            DenialReason::Unauthenticated => "Unauthorized. User is not authenticated.",
            DenialReason::InsufficientPrivilege => "Access forbidden. Insufficient privileges.",
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            DenialReason::MissingCredentials => "missing_credentials",
            DenialReason::MissingApiKey => "missing_api_key",
            DenialReason::MissingSessionToken => "missing_session_token",
            DenialReason::NoRoleAssigned => "no_role_assigned",
            DenialReason::RoleInactive => "role_inactive",
            DenialReason::Unauthenticated => "unauthenticated",
            DenialReason::InsufficientPrivilege => "insufficient_privilege",
        }
    }
}

/// Which step let a request through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "by", content = "rule")]
pub enum AllowedBy {
    Grant,
    RootListing,
    Exception(ExceptionRule),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Allowed(AllowedBy),
    Denied(DenialReason),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed(_))
    }
}

/// Pick the single reason reported for a denial.
///
/// Only the first applicable reason is reported, even if several hold, so an
/// unauthorized caller never gets more than one hint.
pub fn classify_denial(identity: &dyn SessionFacade) -> DenialReason {
    let api_key = identity.api_key();
    let token = identity.session_token();
    let role_id = identity.role_id();

    if !identity.requestor_type().is_local() && api_key.is_none() && token.is_none() {
        return DenialReason::MissingCredentials;
    }

    match role_id {
        None if api_key.is_none() => DenialReason::MissingApiKey,
        None if token.is_none() => DenialReason::MissingSessionToken,
        None => DenialReason::NoRoleAssigned,
        Some(role_id) if !identity.is_role_active(role_id) => DenialReason::RoleInactive,
        Some(_) if !identity.is_authenticated() => DenialReason::Unauthenticated,
        Some(_) => DenialReason::InsufficientPrivilege,
    }
}

/// Detailed, serialisable account of one decision (debug/audit trail).
#[derive(Debug, Clone, Serialize)]
pub struct AccessExplanation {
    pub service: String,
    pub resource: String,
    pub verb: Verb,
    pub requestor_type: RequestorType,
    pub granted_mask: VerbMask,
    pub granted: bool,
    pub reason: String,
    pub allowed_by: Option<AllowedBy>,
    pub denial: Option<DenialReason>,
}

/// Grant + exception-table evaluation for one request.
#[derive(Clone)]
pub struct DecisionEngine {
    exceptions: Arc<ExceptionTable>,
    types: Arc<dyn ServiceTypeLookup>,
}

impl DecisionEngine {
    pub fn new(exceptions: Arc<ExceptionTable>, types: Arc<dyn ServiceTypeLookup>) -> Self {
        Self { exceptions, types }
    }

    pub fn exceptions(&self) -> &Arc<ExceptionTable> {
        &self.exceptions
    }

    /// Decide whether `identity` may perform `verb` on `(service, resource)`.
    ///
    /// Returns `Err(MethodNotAllowed)` for unrecognized verbs, and whatever
    /// error the service-type lookup produced when an exception scan needs the
    /// service's type.
    pub fn evaluate(
        &self,
        identity: &dyn SessionFacade,
        service: &str,
        resource: &str,
        verb: &str,
    ) -> GatewayResult<Decision> {
        let verb: Verb = verb.parse()?;
        self.evaluate_verb(identity, service, resource, verb)
    }

    pub fn evaluate_verb(
        &self,
        identity: &dyn SessionFacade,
        service: &str,
        resource: &str,
        verb: Verb,
    ) -> GatewayResult<Decision> {
        let action = verb.mask();
        let grant = identity.service_permissions(service, resource, identity.requestor_type());

        if grant.intersects(action) {
            return Ok(Decision::Allowed(AllowedBy::Grant));
        }

        if service.is_empty() {
            return Ok(Decision::Allowed(AllowedBy::RootListing));
        }

        let service_type = self.types.service_type(service)?;
        if let Some(rule) = self
            .exceptions
            .first_match(action, service, &service_type, resource)
        {
            return Ok(Decision::Allowed(AllowedBy::Exception(rule)));
        }

        Ok(Decision::Denied(classify_denial(identity)))
    }

    /// Evaluate and describe the decision.
    pub fn explain(
        &self,
        identity: &dyn SessionFacade,
        service: &str,
        resource: &str,
        verb: Verb,
    ) -> GatewayResult<AccessExplanation> {
        let requestor_type = identity.requestor_type();
        let granted_mask = identity.service_permissions(service, resource, requestor_type);
        let decision = self.evaluate_verb(identity, service, resource, verb)?;

        let (granted, reason, allowed_by, denial) = match decision {
            Decision::Allowed(by) => {
                let reason = match &by {
                    AllowedBy::Grant => format!(
                        "role grants {verb} on '{service}/{resource}' (mask {})",
                        granted_mask.bits()
                    ),
                    AllowedBy::RootListing => "root service listing is always permitted".to_string(),
                    AllowedBy::Exception(rule) => format!(
                        "exception rule {:?} on resource '{}' (mask {}) allows {verb}",
                        rule.target,
                        rule.resource,
                        rule.verbs.bits()
                    ),
                };
                (true, reason, Some(by), None)
            }
            Decision::Denied(reason) => (false, reason.message().to_string(), None, Some(reason)),
        };

        Ok(AccessExplanation {
            service: service.to_string(),
            resource: resource.to_string(),
            verb,
            requestor_type,
            granted_mask,
            granted,
            reason,
            allowed_by,
            denial,
        })
    }
}

impl core::fmt::Debug for DecisionEngine {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DecisionEngine")
            .field("exceptions", &self.exceptions.len())
            .finish_non_exhaustive()
    }
}
