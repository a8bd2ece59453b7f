//! Service descriptor storage.
//!
//! The registry only reads descriptors; writes happen through an admin path
//! (the in-memory store's `upsert`/`remove`, or direct SQL) and must be
//! followed by a registry `purge` of the edited name.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use sqlx::{PgPool, Row};

use portico_core::{GatewayError, GatewayResult, ServiceId};

/// One configured service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    pub id: ServiceId,
    pub name: String,
    #[serde(rename = "type")]
    pub service_type: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub config: Map<String, JsonValue>,
}

fn default_active() -> bool {
    true
}

impl ServiceDescriptor {
    pub fn new(id: u64, name: impl Into<String>, service_type: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: ServiceId::new(id),
            label: name.clone(),
            name,
            service_type: service_type.into(),
            description: String::new(),
            is_active: true,
            config: Map::new(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }

    pub fn with_config(mut self, key: impl Into<String>, value: JsonValue) -> Self {
        self.config.insert(key.into(), value);
        self
    }
}

/// Read access to configured services.
pub trait ServiceStore: Send + Sync {
    fn find_by_name(&self, name: &str) -> GatewayResult<Option<ServiceDescriptor>>;

    /// All descriptors, active or not.
    fn list(&self) -> GatewayResult<Vec<ServiceDescriptor>>;
}

impl<S> ServiceStore for Arc<S>
where
    S: ServiceStore + ?Sized,
{
    fn find_by_name(&self, name: &str) -> GatewayResult<Option<ServiceDescriptor>> {
        (**self).find_by_name(name)
    }

    fn list(&self) -> GatewayResult<Vec<ServiceDescriptor>> {
        (**self).list()
    }
}

/// In-memory service store, keyed by name.
#[derive(Debug, Default)]
pub struct InMemoryServiceStore {
    services: RwLock<BTreeMap<String, ServiceDescriptor>>,
}

impl InMemoryServiceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_services(
        services: impl IntoIterator<Item = ServiceDescriptor>,
    ) -> GatewayResult<Self> {
        let store = Self::new();
        for descriptor in services {
            store.upsert(descriptor)?;
        }
        Ok(store)
    }

    /// Load a JSON array of descriptors.
    pub fn from_json_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("reading {}: {e}", path.display()))?;
        let services: Vec<ServiceDescriptor> = serde_json::from_str(&raw)
            .map_err(|e| anyhow::anyhow!("parsing {}: {e}", path.display()))?;
        Self::with_services(services).map_err(|e| anyhow::anyhow!("loading {}: {e}", path.display()))
    }

    /// Insert or replace the descriptor with this name.
    ///
    /// Ids are unique across names; reusing another service's id is a
    /// `BadRequest` and leaves the store unchanged.
    pub fn upsert(&self, descriptor: ServiceDescriptor) -> GatewayResult<()> {
        let mut services = self.services.write().unwrap_or_else(|e| e.into_inner());
        if let Some(owner) = services
            .values()
            .find(|d| d.id == descriptor.id && d.name != descriptor.name)
        {
            return Err(GatewayError::bad_request(format!(
                "Service id {} is already used by '{}'.",
                descriptor.id, owner.name
            )));
        }
        services.insert(descriptor.name.clone(), descriptor);
        Ok(())
    }

    pub fn remove(&self, name: &str) -> Option<ServiceDescriptor> {
        let mut services = self.services.write().unwrap_or_else(|e| e.into_inner());
        services.remove(name)
    }
}

impl ServiceStore for InMemoryServiceStore {
    fn find_by_name(&self, name: &str) -> GatewayResult<Option<ServiceDescriptor>> {
        let services = self
            .services
            .read()
            .map_err(|_| GatewayError::store("service store lock poisoned"))?;
        Ok(services.get(name).cloned())
    }

    fn list(&self) -> GatewayResult<Vec<ServiceDescriptor>> {
        let services = self
            .services
            .read()
            .map_err(|_| GatewayError::store("service store lock poisoned"))?;
        Ok(services.values().cloned().collect())
    }
}

/// Postgres-backed service store over the `services` table:
///
/// ```sql
/// CREATE TABLE services (
///     id          BIGINT PRIMARY KEY,
///     name        TEXT NOT NULL UNIQUE,
///     type        TEXT NOT NULL,
///     label       TEXT NOT NULL DEFAULT '',
///     description TEXT NOT NULL DEFAULT '',
///     is_active   BOOLEAN NOT NULL DEFAULT TRUE,
///     config      JSONB NOT NULL DEFAULT '{}'
/// );
/// ```
///
/// Queries run on the ambient Tokio runtime via `block_in_place`, so callers
/// must be on a multi-threaded runtime.
#[derive(Debug, Clone)]
pub struct PostgresServiceStore {
    pool: PgPool,
}

const SELECT_COLUMNS: &str =
    "SELECT id, name, type, label, description, is_active, config FROM services";

impl PostgresServiceStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn block_on<F, T>(&self, fut: F) -> GatewayResult<T>
    where
        F: std::future::Future<Output = Result<T, sqlx::Error>>,
    {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|_| GatewayError::store("postgres service store used outside a tokio runtime"))?;
        tokio::task::block_in_place(|| handle.block_on(fut))
            .map_err(|e| GatewayError::store(format!("postgres: {e}")))
    }
}

fn descriptor_from_row(row: &sqlx::postgres::PgRow) -> Result<ServiceDescriptor, sqlx::Error> {
    Ok(ServiceDescriptor {
        id: decode_id(row.try_get("id")?)?,
        name: row.try_get("name")?,
        service_type: row.try_get("type")?,
        label: row.try_get("label")?,
        description: row.try_get("description")?,
        is_active: row.try_get("is_active")?,
        config: decode_config(row.try_get("config")?)?,
    })
}

fn decode_id(id: i64) -> Result<ServiceId, sqlx::Error> {
    u64::try_from(id)
        .map(ServiceId::new)
        .map_err(|_| sqlx::Error::Decode(format!("service id {id} is negative").into()))
}

fn decode_config(config: JsonValue) -> Result<Map<String, JsonValue>, sqlx::Error> {
    match config {
        JsonValue::Object(map) => Ok(map),
        other => Err(sqlx::Error::Decode(
            format!("service config must be a JSON object, got {other}").into(),
        )),
    }
}

impl ServiceStore for PostgresServiceStore {
    fn find_by_name(&self, name: &str) -> GatewayResult<Option<ServiceDescriptor>> {
        let sql = format!("{SELECT_COLUMNS} WHERE name = $1");
        self.block_on(async {
            let row = sqlx::query(&sql)
                .bind(name)
                .fetch_optional(&self.pool)
                .await?;
            row.as_ref().map(descriptor_from_row).transpose()
        })
    }

    fn list(&self) -> GatewayResult<Vec<ServiceDescriptor>> {
        let sql = format!("{SELECT_COLUMNS} ORDER BY name");
        self.block_on(async {
            let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
            rows.iter().map(descriptor_from_row).collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_replaces_by_name() {
        let store = InMemoryServiceStore::new();
        store.upsert(ServiceDescriptor::new(1, "db", "sql_db")).unwrap();
        store
            .upsert(ServiceDescriptor::new(1, "db", "sql_db").with_label("Database"))
            .unwrap();

        let all = store.list().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].label, "Database");
    }

    #[test]
    fn remove_deletes_descriptor() {
        let store =
            InMemoryServiceStore::with_services([ServiceDescriptor::new(1, "db", "sql_db")]).unwrap();
        assert!(store.remove("db").is_some());
        assert_eq!(store.find_by_name("db").unwrap(), None);
    }

    #[test]
    fn upsert_rejects_id_owned_by_another_name() {
        let store =
            InMemoryServiceStore::with_services([ServiceDescriptor::new(1, "a", "echo")]).unwrap();

        let err = store.upsert(ServiceDescriptor::new(1, "b", "echo")).unwrap_err();
        assert!(matches!(err, GatewayError::BadRequest(_)));
        assert_eq!(store.find_by_name("b").unwrap(), None);
        assert_eq!(store.list().unwrap().len(), 1);
    }

    #[test]
    fn duplicate_ids_fail_construction() {
        let built = InMemoryServiceStore::with_services([
            ServiceDescriptor::new(1, "a", "echo"),
            ServiceDescriptor::new(1, "b", "echo"),
        ]);
        assert!(matches!(built, Err(GatewayError::BadRequest(_))));
    }

    #[test]
    fn negative_row_ids_are_decode_errors() {
        assert_eq!(decode_id(7).unwrap(), ServiceId::new(7));
        assert!(matches!(decode_id(-1), Err(sqlx::Error::Decode(_))));
    }

    #[test]
    fn non_object_config_is_a_decode_error() {
        let map = decode_config(serde_json::json!({"dsn": "x"})).unwrap();
        assert_eq!(map["dsn"], "x");
        assert!(matches!(decode_config(serde_json::json!([1, 2])), Err(sqlx::Error::Decode(_))));
        assert!(matches!(decode_config(JsonValue::Null), Err(sqlx::Error::Decode(_))));
    }

    #[test]
    fn descriptor_json_uses_type_key_and_defaults() {
        let raw = r#"{"id": 4, "name": "files", "type": "local_file"}"#;
        let descriptor: ServiceDescriptor = serde_json::from_str(raw).unwrap();
        assert_eq!(descriptor.service_type, "local_file");
        assert!(descriptor.is_active);
        assert!(descriptor.config.is_empty());

        let back = serde_json::to_value(&descriptor).unwrap();
        assert_eq!(back["type"], "local_file");
    }

    #[test]
    fn loads_seed_file() {
        let path = std::env::temp_dir().join(format!(
            "portico-services-{}.json",
            std::process::id()
        ));
        std::fs::write(
            &path,
            r#"[{"id": 1, "name": "db", "type": "sql_db"}, {"id": 2, "name": "echo", "type": "echo", "is_active": false}]"#,
        )
        .unwrap();

        let store = InMemoryServiceStore::from_json_file(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(store.list().unwrap().len(), 2);
        assert!(!store.find_by_name("echo").unwrap().unwrap().is_active);
    }

    #[test]
    fn seed_file_with_duplicate_ids_is_an_error() {
        let path = std::env::temp_dir().join(format!(
            "portico-services-dup-{}.json",
            std::process::id()
        ));
        std::fs::write(
            &path,
            r#"[{"id": 1, "name": "db", "type": "sql_db"}, {"id": 1, "name": "echo", "type": "echo"}]"#,
        )
        .unwrap();

        let loaded = InMemoryServiceStore::from_json_file(&path);
        std::fs::remove_file(&path).ok();

        let err = loaded.unwrap_err().to_string();
        assert!(err.contains("already used by 'db'"), "{err}");
    }

    #[test]
    fn missing_seed_file_is_an_error() {
        assert!(InMemoryServiceStore::from_json_file("/nonexistent/portico/services.json").is_err());
    }
}
