//! Identity facts consumed per request.
//!
//! Token verification, role storage and grant resolution live outside this
//! crate; the decision engine only ever sees [`SessionFacade`].

use serde::{Deserialize, Serialize};

use portico_core::{RoleId, VerbMask};

/// Classification of the call origin.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RequestorType {
    /// Ordinary API client.
    #[default]
    Api,
    /// Trusted local/internal caller (server-side scripting).
    Script,
}

impl RequestorType {
    pub fn is_local(self) -> bool {
        self == RequestorType::Script
    }
}

/// Per-request identity facade.
///
/// Credentials that are present but empty must be reported as absent.
pub trait SessionFacade: Send + Sync {
    fn is_token_expired(&self) -> bool;
    fn is_token_blacklisted(&self) -> bool;
    fn is_token_invalid(&self) -> bool;
    fn api_key(&self) -> Option<&str>;
    fn session_token(&self) -> Option<&str>;
    fn role_id(&self) -> Option<RoleId>;
    fn requestor_type(&self) -> RequestorType;
    fn is_authenticated(&self) -> bool;

    /// Aggregated verb mask granted to the current role for the pair.
    fn service_permissions(
        &self,
        service: &str,
        resource: &str,
        requestor: RequestorType,
    ) -> VerbMask;

    fn is_role_active(&self, role_id: RoleId) -> bool;
}

/// One stored role grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionGrant {
    pub service: String,
    /// Exact resource path, or `"*"` for every resource of the service.
    pub resource: String,
    pub verbs: VerbMask,
    /// Requestor types the grant applies to (empty means API only).
    #[serde(default)]
    pub requestors: Vec<RequestorType>,
}

impl PermissionGrant {
    pub fn new(service: impl Into<String>, resource: impl Into<String>, verbs: VerbMask) -> Self {
        Self {
            service: service.into(),
            resource: resource.into(),
            verbs,
            requestors: Vec::new(),
        }
    }

    pub fn for_requestors(mut self, requestors: impl IntoIterator<Item = RequestorType>) -> Self {
        self.requestors = requestors.into_iter().collect();
        self
    }

    fn applies_to(&self, service: &str, resource: &str, requestor: RequestorType) -> bool {
        let requestor_ok = if self.requestors.is_empty() {
            requestor == RequestorType::Api
        } else {
            self.requestors.contains(&requestor)
        };

        requestor_ok
            && self.service == service
            && (self.resource == "*" || self.resource == resource)
    }
}

/// Already-resolved identity facts for one request.
///
/// This is what a token layer hands to the gateway after verifying whatever
/// credentials came with the request.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSnapshot {
    pub token_expired: bool,
    pub token_blacklisted: bool,
    pub token_invalid: bool,
    pub api_key: Option<String>,
    pub session_token: Option<String>,
    pub role_id: Option<RoleId>,
    pub role_active: bool,
    pub requestor_type: RequestorType,
    pub authenticated: bool,
    pub grants: Vec<PermissionGrant>,
}

impl SessionSnapshot {
    /// No credentials, no role, ordinary API requestor.
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_session_token(mut self, token: impl Into<String>) -> Self {
        self.session_token = Some(token.into());
        self
    }

    pub fn with_role(mut self, role_id: RoleId, active: bool) -> Self {
        self.role_id = Some(role_id);
        self.role_active = active;
        self
    }

    pub fn with_grant(mut self, grant: PermissionGrant) -> Self {
        self.grants.push(grant);
        self
    }

    pub fn authenticated(mut self) -> Self {
        self.authenticated = true;
        self
    }

    pub fn as_script(mut self) -> Self {
        self.requestor_type = RequestorType::Script;
        self
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

impl SessionFacade for SessionSnapshot {
    fn is_token_expired(&self) -> bool {
        self.token_expired
    }

    fn is_token_blacklisted(&self) -> bool {
        self.token_blacklisted
    }

    fn is_token_invalid(&self) -> bool {
        self.token_invalid
    }

    fn api_key(&self) -> Option<&str> {
        non_empty(&self.api_key)
    }

    fn session_token(&self) -> Option<&str> {
        non_empty(&self.session_token)
    }

    fn role_id(&self) -> Option<RoleId> {
        self.role_id
    }

    fn requestor_type(&self) -> RequestorType {
        self.requestor_type
    }

    fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    fn service_permissions(
        &self,
        service: &str,
        resource: &str,
        requestor: RequestorType,
    ) -> VerbMask {
        self.grants
            .iter()
            .filter(|g| g.applies_to(service, resource, requestor))
            .fold(VerbMask::NONE, |acc, g| acc | g.verbs)
    }

    fn is_role_active(&self, role_id: RoleId) -> bool {
        self.role_id == Some(role_id) && self.role_active
    }
}
