//! Static session resolver for development and demos.
//!
//! Resolves the `X-Portico-Api-Key` and `X-Portico-Session-Token` headers
//! against a roles file into a [`SessionSnapshot`]. Deployments with a real
//! token layer insert their own snapshot into request extensions instead.
//!
//! Roles file layout:
//!
//! ```json
//! {
//!   "roles": [{"id": 1, "name": "reader", "is_active": true,
//!              "grants": [{"service": "db", "resource": "*", "verbs": 1}]}],
//!   "api_keys": [{"key": "app-key", "role_id": 1}],
//!   "sessions": [{"token": "abc", "role_id": 1}]
//! }
//! ```

use std::collections::HashMap;
use std::path::Path;

use anyhow::Context;
use axum::http::HeaderMap;
use serde::Deserialize;

use portico_auth::{PermissionGrant, SessionSnapshot};
use portico_core::RoleId;

pub const API_KEY_HEADER: &str = "x-portico-api-key";
pub const SESSION_TOKEN_HEADER: &str = "x-portico-session-token";

#[derive(Debug, Clone, Deserialize)]
pub struct RoleDefinition {
    pub id: RoleId,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub grants: Vec<PermissionGrant>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiKeyDefinition {
    pub key: String,
    pub role_id: Option<RoleId>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionDefinition {
    pub token: String,
    pub role_id: Option<RoleId>,
    #[serde(default)]
    pub expired: bool,
    #[serde(default)]
    pub blacklisted: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RolesFile {
    pub roles: Vec<RoleDefinition>,
    pub api_keys: Vec<ApiKeyDefinition>,
    pub sessions: Vec<SessionDefinition>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default)]
pub struct StaticSessionResolver {
    roles: HashMap<RoleId, RoleDefinition>,
    api_keys: HashMap<String, Option<RoleId>>,
    sessions: HashMap<String, SessionDefinition>,
}

impl StaticSessionResolver {
    pub fn new(file: RolesFile) -> Self {
        Self {
            roles: file.roles.into_iter().map(|r| (r.id, r)).collect(),
            api_keys: file.api_keys.into_iter().map(|k| (k.key, k.role_id)).collect(),
            sessions: file.sessions.into_iter().map(|s| (s.token.clone(), s)).collect(),
        }
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading roles file {}", path.display()))?;
        let file: RolesFile = serde_json::from_str(&raw)
            .with_context(|| format!("parsing roles file {}", path.display()))?;
        Ok(Self::new(file))
    }

    /// Resolve request headers into identity facts.
    ///
    /// A known session's role takes precedence over the API key's role. An
    /// unknown session token marks the token invalid.
    pub fn resolve(&self, headers: &HeaderMap) -> SessionSnapshot {
        let mut snapshot = SessionSnapshot::anonymous();
        let mut role_id = None;

        if let Some(key) = header(headers, API_KEY_HEADER) {
            snapshot = snapshot.with_api_key(key);
            role_id = self.api_keys.get(key).copied().flatten();
        }

        if let Some(token) = header(headers, SESSION_TOKEN_HEADER) {
            snapshot = snapshot.with_session_token(token);
            match self.sessions.get(token) {
                Some(session) => {
                    snapshot = snapshot.authenticated();
                    snapshot.token_expired = session.expired;
                    snapshot.token_blacklisted = session.blacklisted;
                    if session.role_id.is_some() {
                        role_id = session.role_id;
                    }
                }
                None => snapshot.token_invalid = true,
            }
        }

        match role_id {
            Some(id) => self.apply_role(snapshot, id),
            None => snapshot,
        }
    }

    fn apply_role(&self, snapshot: SessionSnapshot, role_id: RoleId) -> SessionSnapshot {
        match self.roles.get(&role_id) {
            Some(role) => role
                .grants
                .iter()
                .cloned()
                .fold(snapshot.with_role(role_id, role.is_active), |s, grant| s.with_grant(grant)),
            None => {
                tracing::warn!(role_id = %role_id, "credential references an unknown role");
                snapshot.with_role(role_id, false)
            }
        }
    }
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;
    use portico_auth::SessionFacade;
    use portico_core::{RoleId, VerbMask};

    use super::*;

    fn resolver() -> StaticSessionResolver {
        let file: RolesFile = serde_json::from_value(serde_json::json!({
            "roles": [
                {"id": 1, "name": "reader", "grants": [{"service": "db", "resource": "*", "verbs": 1}]},
                {"id": 2, "name": "disabled", "is_active": false}
            ],
            "api_keys": [{"key": "app-key", "role_id": 1}, {"key": "bare-key"}],
            "sessions": [
                {"token": "admin-session", "role_id": 2},
                {"token": "old-session", "expired": true}
            ]
        }))
        .unwrap();
        StaticSessionResolver::new(file)
    }

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for &(k, v) in pairs {
            map.insert(k, HeaderValue::from_static(v));
        }
        map
    }

    #[test]
    fn no_headers_is_anonymous() {
        assert_eq!(resolver().resolve(&HeaderMap::new()), SessionSnapshot::anonymous());
    }

    #[test]
    fn api_key_brings_its_role_grants() {
        let snapshot = resolver().resolve(&headers(&[(API_KEY_HEADER, "app-key")]));
        assert_eq!(snapshot.role_id(), Some(RoleId::new(1)));
        assert_eq!(
            snapshot.service_permissions("db", "_table/x", snapshot.requestor_type()),
            VerbMask::GET
        );
    }

    #[test]
    fn key_without_role_has_no_role() {
        let snapshot = resolver().resolve(&headers(&[(API_KEY_HEADER, "bare-key")]));
        assert_eq!(snapshot.api_key(), Some("bare-key"));
        assert_eq!(snapshot.role_id(), None);
    }

    #[test]
    fn session_role_overrides_key_role() {
        let snapshot = resolver().resolve(&headers(&[
            (API_KEY_HEADER, "app-key"),
            (SESSION_TOKEN_HEADER, "admin-session"),
        ]));
        assert_eq!(snapshot.role_id(), Some(RoleId::new(2)));
        assert!(!snapshot.is_role_active(RoleId::new(2)));
    }

    #[test]
    fn session_flags_are_carried() {
        let snapshot = resolver().resolve(&headers(&[(SESSION_TOKEN_HEADER, "old-session")]));
        assert!(snapshot.is_token_expired());

        let snapshot = resolver().resolve(&headers(&[(SESSION_TOKEN_HEADER, "forged")]));
        assert!(snapshot.is_token_invalid());
    }
}
