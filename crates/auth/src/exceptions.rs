//! Allow-list overrides evaluated after a role grant misses.
//!
//! Bootstrap and public endpoints (login, password reset, environment
//! discovery, federation callbacks, API docs) must be reachable before a role
//! or session exists. They are expressed with the same verb bitmask as role
//! grants, as an ordered override list: the first matching rule wins.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use portico_core::VerbMask;

/// What an exception rule is scoped to: one named service, or every service
/// of a type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExceptionTarget {
    Service(String),
    ServiceType(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExceptionRule {
    #[serde(rename = "verb_mask")]
    pub verbs: VerbMask,
    #[serde(flatten)]
    pub target: ExceptionTarget,
    /// `"*"` matches any resource, `""` only the root resource.
    pub resource: String,
}

impl ExceptionRule {
    pub fn service(verbs: VerbMask, service: impl Into<String>, resource: impl Into<String>) -> Self {
        Self {
            verbs,
            target: ExceptionTarget::Service(service.into()),
            resource: resource.into(),
        }
    }

    pub fn service_type(
        verbs: VerbMask,
        service_type: impl Into<String>,
        resource: impl Into<String>,
    ) -> Self {
        Self {
            verbs,
            target: ExceptionTarget::ServiceType(service_type.into()),
            resource: resource.into(),
        }
    }

    pub fn matches(
        &self,
        action: VerbMask,
        service_name: &str,
        service_type: &str,
        resource: &str,
    ) -> bool {
        if !action.intersects(self.verbs) {
            return false;
        }

        let target_ok = match &self.target {
            ExceptionTarget::Service(name) => name == service_name,
            ExceptionTarget::ServiceType(ty) => ty == service_type,
        };

        target_ok && (self.resource == "*" || self.resource == resource)
    }
}

/// The rule appended when open self-registration is enabled.
pub fn open_registration_rule() -> ExceptionRule {
    ExceptionRule::service(VerbMask::POST, "user", "register")
}

/// Base rules installed at startup, in evaluation order.
pub fn base_rules() -> Vec<ExceptionRule> {
    let get = VerbMask::GET;
    let post = VerbMask::POST;

    vec![
        ExceptionRule::service(VerbMask::ALL, "system", "admin/session"),
        ExceptionRule::service(VerbMask::ALL, "user", "session"),
        ExceptionRule::service(post, "system", "admin/password"),
        ExceptionRule::service(post, "user", "password"),
        ExceptionRule::service(get, "system", "environment"),
        ExceptionRule::service_type(get, "saml", "sso"),
        ExceptionRule::service_type(post, "saml", "acs"),
        ExceptionRule::service_type(get, "saml", "metadata"),
        ExceptionRule::service_type(get, "okta_saml", "sso"),
        ExceptionRule::service_type(post, "okta_saml", "acs"),
        ExceptionRule::service_type(get, "okta_saml", "metadata"),
        ExceptionRule::service_type(get | post, "oidc", "sso"),
        ExceptionRule::service_type(get, "oauth_github", "sso"),
        ExceptionRule::service_type(get, "oauth_google", "sso"),
        ExceptionRule::service_type(get, "oauth_facebook", "sso"),
        ExceptionRule::service_type(get, "swagger", "*"),
    ]
}

/// Ordered, shared exception list.
///
/// Populated once at startup and extended at runtime only by appending, so a
/// reader either sees a rule completely or not at all.
#[derive(Debug)]
pub struct ExceptionTable {
    rules: RwLock<Vec<ExceptionRule>>,
    open_registration: AtomicBool,
}

impl ExceptionTable {
    pub fn new(rules: Vec<ExceptionRule>) -> Self {
        Self {
            rules: RwLock::new(rules),
            open_registration: AtomicBool::new(false),
        }
    }

    /// Table holding the base rules.
    pub fn seeded() -> Self {
        Self::new(base_rules())
    }

    /// First rule (in insertion order) matching the request, if any.
    pub fn first_match(
        &self,
        action: VerbMask,
        service_name: &str,
        service_type: &str,
        resource: &str,
    ) -> Option<ExceptionRule> {
        let rules = self.rules.read().unwrap_or_else(PoisonError::into_inner);
        rules
            .iter()
            .find(|r| r.matches(action, service_name, service_type, resource))
            .cloned()
    }

    pub fn push(&self, rule: ExceptionRule) {
        let mut rules = self.rules.write().unwrap_or_else(PoisonError::into_inner);
        rules.push(rule);
    }

    /// Append the open-registration rule unless this table already did.
    ///
    /// Returns `true` only for the call that performed the append.
    pub fn ensure_open_registration(&self) -> bool {
        if self.open_registration.load(Ordering::Acquire) {
            return false;
        }

        let mut rules = self.rules.write().unwrap_or_else(PoisonError::into_inner);
        if self.open_registration.load(Ordering::Acquire) {
            return false;
        }
        rules.push(open_registration_rule());
        self.open_registration.store(true, Ordering::Release);
        tracing::info!(rules = rules.len(), "open registration exception installed");
        true
    }

    pub fn rules(&self) -> Vec<ExceptionRule> {
        self.rules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.rules.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ExceptionTable {
    fn default() -> Self {
        Self::seeded()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn seed_has_sixteen_rules() {
        assert_eq!(ExceptionTable::seeded().len(), 16);
    }

    #[test]
    fn wildcard_and_root_resources() {
        let any = ExceptionRule::service(VerbMask::GET, "docs", "*");
        assert!(any.matches(VerbMask::GET, "docs", "swagger", "anything/at/all"));
        assert!(any.matches(VerbMask::GET, "docs", "swagger", ""));

        let root = ExceptionRule::service(VerbMask::GET, "docs", "");
        assert!(root.matches(VerbMask::GET, "docs", "swagger", ""));
        assert!(!root.matches(VerbMask::GET, "docs", "swagger", "x"));
    }

    #[test]
    fn service_rules_do_not_match_by_type_and_vice_versa() {
        let by_name = ExceptionRule::service(VerbMask::GET, "saml", "sso");
        assert!(!by_name.matches(VerbMask::GET, "corp-sso", "saml", "sso"));

        let by_type = ExceptionRule::service_type(VerbMask::GET, "saml", "sso");
        assert!(by_type.matches(VerbMask::GET, "corp-sso", "saml", "sso"));
        assert!(!by_type.matches(VerbMask::GET, "saml", "oidc", "sso"));
    }

    #[test]
    fn verb_must_intersect_rule_mask() {
        let rule = ExceptionRule::service(VerbMask::POST, "user", "password");
        assert!(!rule.matches(VerbMask::GET, "user", "", "password"));
        assert!(rule.matches(VerbMask::POST, "user", "", "password"));
    }

    #[test]
    fn first_inserted_rule_wins() {
        let first = ExceptionRule::service(VerbMask::GET, "db", "*");
        let second = ExceptionRule::service_type(VerbMask::ALL, "sql", "*");
        let table = ExceptionTable::new(vec![first.clone(), second]);

        let matched = table.first_match(VerbMask::GET, "db", "sql", "_table");
        assert_eq!(matched, Some(first));
    }

    #[test]
    fn open_registration_is_appended_once() {
        let table = ExceptionTable::seeded();
        assert!(table.ensure_open_registration());
        for _ in 0..5 {
            assert!(!table.ensure_open_registration());
        }

        let rules = table.rules();
        assert_eq!(rules.len(), 17);
        let count = rules.iter().filter(|r| **r == open_registration_rule()).count();
        assert_eq!(count, 1);
    }

    #[test]
    fn concurrent_open_registration_appends_once() {
        let table = Arc::new(ExceptionTable::seeded());
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let table = table.clone();
                std::thread::spawn(move || table.ensure_open_registration())
            })
            .collect();

        let appended = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|did| *did)
            .count();

        assert_eq!(appended, 1);
        assert_eq!(table.len(), 17);
    }

    #[test]
    fn rules_serialize_in_stored_format() {
        let rule = ExceptionRule::service(VerbMask::ALL, "user", "session");
        let json = serde_json::to_value(&rule).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"verb_mask": 31, "service": "user", "resource": "session"})
        );

        let typed: ExceptionRule = serde_json::from_value(
            serde_json::json!({"verb_mask": 1, "service_type": "saml", "resource": "sso"}),
        )
        .unwrap();
        assert_eq!(typed.target, ExceptionTarget::ServiceType("saml".to_string()));
    }
}
