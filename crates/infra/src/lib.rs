//! Infrastructure layer: caches, service stores, service types and the
//! service registry/dispatcher.

pub mod cache;
pub mod registry;
pub mod service;
pub mod store;
pub mod types;


pub use cache::{CacheStore, InMemoryCacheStore, remember, remember_versioned};
#[cfg(feature = "redis")]
pub use cache::RedisCacheStore;
pub use registry::{DEFAULT_LIST_FIELDS, ServiceRegistry};
pub use service::{Payload, PayloadFormat, RequestContext, Service, ServiceResponse};
pub use store::{InMemoryServiceStore, PostgresServiceStore, ServiceDescriptor, ServiceStore};
pub use types::{EchoServiceType, ServiceType, ServiceTypeInfo, ServiceTypeRegistry};
