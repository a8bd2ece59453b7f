//! Service types: factories that turn a stored descriptor into a live
//! [`Service`].
//!
//! New backends are added by registering another [`ServiceType`]; the
//! registry's dispatch logic never changes.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::Serialize;
use serde_json::{Map, Value as JsonValue, json};

use portico_core::GatewayResult;

use crate::service::{RequestContext, Service, ServiceResponse};

/// Factory and metadata for one kind of backend.
pub trait ServiceType: Send + Sync {
    fn name(&self) -> &str;
    fn label(&self) -> &str;
    fn group(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    /// Build an instance for the service `name` from its stored config.
    ///
    /// Must not mutate shared state: a failed construction leaves nothing
    /// behind.
    fn make_instance(
        &self,
        name: &str,
        config: &Map<String, JsonValue>,
    ) -> GatewayResult<Arc<dyn Service>>;
}

/// Serializable view of a registered type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceTypeInfo {
    pub name: String,
    pub label: String,
    pub group: String,
    pub description: String,
}

impl ServiceTypeInfo {
    fn of(ty: &dyn ServiceType) -> Self {
        Self {
            name: ty.name().to_string(),
            label: ty.label().to_string(),
            group: ty.group().to_string(),
            description: ty.description().to_string(),
        }
    }
}

/// Type name → factory.
#[derive(Default)]
pub struct ServiceTypeRegistry {
    types: RwLock<HashMap<String, Arc<dyn ServiceType>>>,
}

impl std::fmt::Debug for ServiceTypeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceTypeRegistry")
            .field("types", &self.names())
            .finish()
    }
}

impl ServiceTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the built-in types.
    pub fn with_builtin_types() -> Self {
        let registry = Self::new();
        registry.add_type(Arc::new(EchoServiceType));
        registry
    }

    /// Register `ty`. A later registration under the same name replaces the
    /// earlier one.
    pub fn add_type(&self, ty: Arc<dyn ServiceType>) {
        let mut types = self.types.write().unwrap_or_else(|e| e.into_inner());
        if types.insert(ty.name().to_string(), ty.clone()).is_some() {
            tracing::warn!(service_type = ty.name(), "service type re-registered; replacing");
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ServiceType>> {
        let types = self.types.read().unwrap_or_else(|e| e.into_inner());
        types.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        let types = self.types.read().unwrap_or_else(|e| e.into_inner());
        types.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let types = self.types.read().unwrap_or_else(|e| e.into_inner());
        let mut names: Vec<String> = types.keys().cloned().collect();
        names.sort();
        names
    }

    /// Metadata for every registered type, optionally restricted to a group
    /// (case-insensitive), sorted by name.
    pub fn infos(&self, group: Option<&str>) -> Vec<ServiceTypeInfo> {
        let types = self.types.read().unwrap_or_else(|e| e.into_inner());
        let mut infos: Vec<ServiceTypeInfo> = types
            .values()
            .filter(|ty| group.is_none_or(|g| ty.group().eq_ignore_ascii_case(g)))
            .map(|ty| ServiceTypeInfo::of(ty.as_ref()))
            .collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }
}

/// Built-in type whose instances reflect the request back.
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoServiceType;

impl ServiceType for EchoServiceType {
    fn name(&self) -> &str {
        "echo"
    }

    fn label(&self) -> &str {
        "Echo"
    }

    fn group(&self) -> &str {
        "Utility"
    }

    fn description(&self) -> &str {
        "Reflects the normalized request back to the caller."
    }

    fn make_instance(
        &self,
        name: &str,
        config: &Map<String, JsonValue>,
    ) -> GatewayResult<Arc<dyn Service>> {
        Ok(Arc::new(EchoService {
            name: name.to_string(),
            config: config.clone(),
        }))
    }
}

#[derive(Debug)]
struct EchoService {
    name: String,
    config: Map<String, JsonValue>,
}

impl Service for EchoService {
    fn name(&self) -> &str {
        &self.name
    }

    fn handle_request(
        &self,
        context: &RequestContext,
        resource: &str,
    ) -> GatewayResult<ServiceResponse> {
        let body = json!({
            "service": self.name,
            "resource": resource,
            "verb": context.verb,
            "query": context.query,
            "payload": context.payload,
            "format": context.format,
            "config": self.config,
        });

        Ok(ServiceResponse::ok(body).header("x-request-id", context.request_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use portico_core::Verb;

    use super::*;
    use crate::service::Payload;

    struct Labelled(&'static str, &'static str);

    impl ServiceType for Labelled {
        fn name(&self) -> &str {
            self.0
        }

        fn label(&self) -> &str {
            self.1
        }

        fn group(&self) -> &str {
            "Database"
        }

        fn make_instance(
            &self,
            name: &str,
            config: &Map<String, JsonValue>,
        ) -> GatewayResult<Arc<dyn Service>> {
            EchoServiceType.make_instance(name, config)
        }
    }

    #[test]
    fn last_registration_wins() {
        let registry = ServiceTypeRegistry::new();
        registry.add_type(Arc::new(Labelled("sql_db", "SQL v1")));
        registry.add_type(Arc::new(Labelled("sql_db", "SQL v2")));

        assert_eq!(registry.get("sql_db").unwrap().label(), "SQL v2");
        assert_eq!(registry.names(), vec!["sql_db".to_string()]);
    }

    #[test]
    fn infos_filter_by_group() {
        let registry = ServiceTypeRegistry::with_builtin_types();
        registry.add_type(Arc::new(Labelled("sql_db", "SQL")));

        let all = registry.infos(None);
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].name, "echo");

        let db = registry.infos(Some("database"));
        assert_eq!(db.len(), 1);
        assert_eq!(db[0].name, "sql_db");
        assert!(registry.infos(Some("Email")).is_empty());
    }

    #[test]
    fn echo_reflects_request() {
        let mut config = Map::new();
        config.insert("greeting".into(), json!("hi"));
        let service = EchoServiceType.make_instance("echo", &config).unwrap();

        let ctx = RequestContext::build(
            Verb::Get,
            "ping",
            BTreeMap::from([("limit".to_string(), "5".to_string())]),
            BTreeMap::new(),
            Payload::Empty,
            None,
        )
        .unwrap();

        let response = service.handle_request(&ctx, "ping").unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.body["resource"], "ping");
        assert_eq!(response.body["verb"], "GET");
        assert_eq!(response.body["query"]["limit"], "5");
        assert_eq!(response.body["config"]["greeting"], "hi");
        assert!(response.headers.contains_key("x-request-id"));
    }
}
