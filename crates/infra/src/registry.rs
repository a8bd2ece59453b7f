//! Service registry and dispatcher.
//!
//! Resolves a service name to a live instance (descriptor lookup + type
//! factory), memoizes descriptor and id/name lookups in a [`CacheStore`] and
//! routes normalized requests to the instance.
//!
//! ## Caching
//!
//! Lookups are read-through and never expire. After an administrative edit
//! of a service, call [`ServiceRegistry::purge`]; it is the only
//! invalidation path.
//!
//! Live instances are tagged with the service's version token from the
//! cache. A registry reuses an instance only while that token is current,
//! so a purge issued by any registry sharing the cache retires it.
//!
//! ## Concurrency
//!
//! Instances are built outside the instance-map lock. When two callers race
//! to build the same service, the first insert wins and both receive that
//! instance. A build that overlaps a purge is retracted and redone against
//! the edited descriptor.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use serde_json::{Map, Value as JsonValue};

use portico_auth::ServiceTypeLookup;
use portico_core::{GatewayError, GatewayResult, ServiceId, Verb};

use crate::cache::{CacheStore, current_version, keys, remember_versioned, version_is};
use crate::service::{Payload, PayloadFormat, RequestContext, Service, ServiceResponse};
use crate::store::{ServiceDescriptor, ServiceStore};
use crate::types::{ServiceType, ServiceTypeInfo, ServiceTypeRegistry};

/// Fields projected by [`ServiceRegistry::service_list`] when none are
/// requested.
pub const DEFAULT_LIST_FIELDS: [&str; 5] = ["id", "name", "label", "description", "type"];

/// Builds that keep overlapping purges give up caching after this many tries.
const MAX_BUILD_ATTEMPTS: usize = 3;

#[derive(Clone)]
struct LiveInstance {
    version: String,
    service: Arc<dyn Service>,
}

pub struct ServiceRegistry {
    store: Arc<dyn ServiceStore>,
    cache: Arc<dyn CacheStore>,
    types: Arc<ServiceTypeRegistry>,
    instances: RwLock<HashMap<String, LiveInstance>>,
}

impl std::fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let live = self.instances.read().map(|m| m.len()).unwrap_or(0);
        f.debug_struct("ServiceRegistry")
            .field("types", &self.types)
            .field("live_instances", &live)
            .finish()
    }
}

impl ServiceRegistry {
    pub fn new(
        store: Arc<dyn ServiceStore>,
        cache: Arc<dyn CacheStore>,
        types: Arc<ServiceTypeRegistry>,
    ) -> Self {
        Self {
            store,
            cache,
            types,
            instances: RwLock::new(HashMap::new()),
        }
    }

    pub fn types(&self) -> &Arc<ServiceTypeRegistry> {
        &self.types
    }

    /// Descriptor for `name`; `NotFound` when none is configured.
    pub fn service_info(&self, name: &str) -> GatewayResult<ServiceDescriptor> {
        let (key, version_key) = (keys::service_info(name), keys::service_version(name));
        remember_versioned(self.cache.as_ref(), &key, &version_key, || {
            self.store
                .find_by_name(name)?
                .ok_or_else(|| GatewayError::not_found(format!("Service '{name}' not found.")))
        })
    }

    /// Type name of the service `name`.
    pub fn service_type(&self, name: &str) -> GatewayResult<String> {
        Ok(self.service_info(name)?.service_type)
    }

    /// Live instance for `name`, building it on first use or after a purge.
    pub fn get_service(&self, name: &str) -> GatewayResult<Arc<dyn Service>> {
        let version_key = keys::service_version(name);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let version = current_version(self.cache.as_ref(), &version_key)?;
            if let Some(live) = self.cached_instance(name) {
                if live.version == version {
                    return Ok(live.service);
                }
            }

            let instance = self.publish(name, &version, self.build_instance(name)?);
            if version_is(self.cache.as_ref(), &version_key, &version)? {
                return Ok(instance);
            }

            self.retract(name, &version);
            if attempt >= MAX_BUILD_ATTEMPTS {
                tracing::warn!(
                    service = name,
                    attempts = attempt,
                    "service kept changing during construction; instance not kept"
                );
                return Ok(instance);
            }
            tracing::debug!(service = name, "service purged during construction; rebuilding");
        }
    }

    pub fn get_service_by_id(&self, id: ServiceId) -> GatewayResult<Arc<dyn Service>> {
        let name = self.service_name_by_id(id)?;
        self.get_service(&name)
    }

    fn build_instance(&self, name: &str) -> GatewayResult<Arc<dyn Service>> {
        let info = self.service_info(name)?;
        let ty = self.types.get(&info.service_type).ok_or_else(|| {
            GatewayError::unsupported_type(format!(
                "Service type '{}' of service '{name}' is not supported.",
                info.service_type
            ))
        })?;
        ty.make_instance(name, &info.config)
    }

    fn cached_instance(&self, name: &str) -> Option<LiveInstance> {
        let instances = self.instances.read().unwrap_or_else(|e| e.into_inner());
        instances.get(name).cloned()
    }

    /// Insert `built` under `version` unless an instance of that version is
    /// already live; returns whichever instance ends up published.
    fn publish(&self, name: &str, version: &str, built: Arc<dyn Service>) -> Arc<dyn Service> {
        let mut instances = self.instances.write().unwrap_or_else(|e| e.into_inner());
        match instances.get(name) {
            Some(live) if live.version == version => live.service.clone(),
            _ => {
                tracing::debug!(service = name, "service instance created");
                instances.insert(
                    name.to_string(),
                    LiveInstance {
                        version: version.to_string(),
                        service: built.clone(),
                    },
                );
                built
            }
        }
    }

    fn retract(&self, name: &str, version: &str) {
        let mut instances = self.instances.write().unwrap_or_else(|e| e.into_inner());
        if instances.get(name).is_some_and(|live| live.version == version) {
            instances.remove(name);
        }
    }

    /// `(id, name)` pairs ordered by id, optionally restricted to active
    /// services.
    pub fn service_id_name_map(&self, only_active: bool) -> GatewayResult<Vec<(ServiceId, String)>> {
        let key = if only_active {
            keys::ACTIVE_SERVICE_ID_MAP
        } else {
            keys::SERVICE_ID_MAP
        };

        remember_versioned(self.cache.as_ref(), key, keys::ID_MAP_VERSION, || {
            let mut pairs: Vec<(ServiceId, String)> = self
                .store
                .list()?
                .into_iter()
                .filter(|d| !only_active || d.is_active)
                .map(|d| (d.id, d.name))
                .collect();
            pairs.sort_by_key(|(id, _)| *id);
            Ok(pairs)
        })
    }

    pub fn service_names(&self, only_active: bool) -> GatewayResult<Vec<String>> {
        Ok(self
            .service_id_name_map(only_active)?
            .into_iter()
            .map(|(_, name)| name)
            .collect())
    }

    pub fn service_name_by_id(&self, id: ServiceId) -> GatewayResult<String> {
        self.service_id_name_map(false)?
            .into_iter()
            .find(|(candidate, _)| *candidate == id)
            .map(|(_, name)| name)
            .ok_or_else(|| GatewayError::not_found(format!("Service id {id} not found.")))
    }

    pub fn service_id_by_name(&self, name: &str) -> GatewayResult<ServiceId> {
        self.service_id_name_map(false)?
            .into_iter()
            .find(|(_, candidate)| candidate == name)
            .map(|(id, _)| id)
            .ok_or_else(|| GatewayError::not_found(format!("Service '{name}' not found.")))
    }

    /// Drop the live instance and every cached lookup touching `name`.
    ///
    /// Forgetting the version token retires instances of `name` held by
    /// every registry sharing this cache.
    pub fn purge(&self, name: &str) -> GatewayResult<()> {
        for key in keys::purge_set(name) {
            self.cache.forget(&key)?;
        }

        {
            let mut instances = self.instances.write().unwrap_or_else(|e| e.into_inner());
            instances.remove(name);
        }

        tracing::info!(service = name, "service purged");
        Ok(())
    }

    pub fn add_type(&self, ty: Arc<dyn ServiceType>) {
        self.types.add_type(ty);
    }

    pub fn service_types(&self, group: Option<&str>) -> Vec<ServiceTypeInfo> {
        self.types.infos(group)
    }

    pub fn service_type_names(&self) -> Vec<String> {
        self.types.names()
    }

    /// Project configured services into maps of the requested `fields`.
    ///
    /// `group` and `type_label` are derived from the service's registered
    /// type. When a group filter or a derived field is requested, services
    /// whose type is not registered are left out. Unknown field names are
    /// ignored.
    pub fn service_list(
        &self,
        fields: &[&str],
        only_active: bool,
        group: Option<&str>,
    ) -> GatewayResult<Vec<Map<String, JsonValue>>> {
        let fields: &[&str] = if fields.is_empty() {
            &DEFAULT_LIST_FIELDS
        } else {
            fields
        };
        let needs_type = group.is_some() || fields.iter().any(|f| matches!(*f, "group" | "type_label"));

        let mut descriptors = self.store.list()?;
        descriptors.retain(|d| !only_active || d.is_active);
        descriptors.sort_by(|a, b| a.name.cmp(&b.name));

        let mut listed = Vec::with_capacity(descriptors.len());
        for descriptor in descriptors {
            let ty = self.types.get(&descriptor.service_type);
            if needs_type && ty.is_none() {
                continue;
            }
            if let (Some(wanted), Some(ty)) = (group, ty.as_ref()) {
                if !ty.group().eq_ignore_ascii_case(wanted) {
                    continue;
                }
            }

            let mut row = Map::new();
            for field in fields {
                if let Some(value) = project_field(&descriptor, ty.as_deref(), field) {
                    row.insert((*field).to_string(), value);
                }
            }
            listed.push(row);
        }

        Ok(listed)
    }

    /// Build a fresh request context and hand it to the service's instance.
    #[allow(clippy::too_many_arguments)]
    pub fn handle_request(
        &self,
        service: &str,
        verb: Verb,
        resource: &str,
        query: BTreeMap<String, String>,
        headers: BTreeMap<String, String>,
        payload: Payload,
        format: Option<PayloadFormat>,
    ) -> GatewayResult<ServiceResponse> {
        let context = RequestContext::build(verb, resource, query, headers, payload, format)?;
        let instance = self.get_service(service)?;

        tracing::debug!(
            request_id = %context.request_id,
            service,
            verb = verb.as_str(),
            resource,
            "dispatching request"
        );

        instance.handle_request(&context, resource)
    }
}

fn project_field(
    descriptor: &ServiceDescriptor,
    ty: Option<&dyn ServiceType>,
    field: &str,
) -> Option<JsonValue> {
    let value = match field {
        "id" => JsonValue::from(descriptor.id.get()),
        "name" => JsonValue::from(descriptor.name.as_str()),
        "label" => JsonValue::from(descriptor.label.as_str()),
        "description" => JsonValue::from(descriptor.description.as_str()),
        "type" => JsonValue::from(descriptor.service_type.as_str()),
        "is_active" => JsonValue::from(descriptor.is_active),
        "config" => JsonValue::Object(descriptor.config.clone()),
        "group" => JsonValue::from(ty?.group()),
        "type_label" => JsonValue::from(ty?.label()),
        _ => return None,
    };
    Some(value)
}

impl ServiceTypeLookup for ServiceRegistry {
    fn service_type(&self, service: &str) -> GatewayResult<String> {
        ServiceRegistry::service_type(self, service)
    }
}
