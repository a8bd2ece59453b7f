use std::sync::Arc;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;

use portico_auth::{AccessGate, DecisionEngine, ExceptionTable};
use portico_infra::{
    CacheStore, InMemoryCacheStore, InMemoryServiceStore, PostgresServiceStore, ServiceRegistry,
    ServiceStore, ServiceTypeRegistry,
};

use crate::config::GatewayConfig;
use crate::session::StaticSessionResolver;

/// Shared state behind every route.
#[derive(Debug, Clone)]
pub struct AppServices {
    pub registry: Arc<ServiceRegistry>,
    pub gate: Arc<AccessGate>,
    pub sessions: Arc<StaticSessionResolver>,
}

impl AppServices {
    /// Wire a registry and gate over already-built stores.
    pub fn new(
        store: Arc<dyn ServiceStore>,
        cache: Arc<dyn CacheStore>,
        sessions: StaticSessionResolver,
        open_registration: bool,
    ) -> Self {
        let types = Arc::new(ServiceTypeRegistry::with_builtin_types());
        let registry = Arc::new(ServiceRegistry::new(store, cache, types));

        let engine = DecisionEngine::new(Arc::new(ExceptionTable::seeded()), registry.clone());
        let gate = Arc::new(AccessGate::new(engine, open_registration));

        Self {
            registry,
            gate,
            sessions: Arc::new(sessions),
        }
    }

    /// In-memory wiring (dev/test).
    pub fn in_memory(store: InMemoryServiceStore, sessions: StaticSessionResolver) -> Self {
        Self::new(
            Arc::new(store),
            Arc::new(InMemoryCacheStore::new()),
            sessions,
            false,
        )
    }
}

pub async fn build_services(config: &GatewayConfig) -> anyhow::Result<AppServices> {
    let store = build_store(config).await?;
    let cache = build_cache(config)?;

    let sessions = match &config.roles_file {
        Some(path) => StaticSessionResolver::from_json_file(path)?,
        None => {
            tracing::warn!("PORTICO_ROLES_FILE not set; every request is anonymous");
            StaticSessionResolver::default()
        }
    };

    Ok(AppServices::new(store, cache, sessions, config.open_registration))
}

async fn build_store(config: &GatewayConfig) -> anyhow::Result<Arc<dyn ServiceStore>> {
    if let Some(url) = &config.database_url {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(url)
            .await
            .context("connecting to PORTICO_DATABASE_URL")?;
        tracing::info!("using postgres service store");
        return Ok(Arc::new(PostgresServiceStore::new(pool)));
    }

    let store = match &config.services_file {
        Some(path) => InMemoryServiceStore::from_json_file(path)?,
        None => {
            tracing::warn!("no service source configured; registry starts empty");
            InMemoryServiceStore::new()
        }
    };
    Ok(Arc::new(store))
}

fn build_cache(config: &GatewayConfig) -> anyhow::Result<Arc<dyn CacheStore>> {
    match &config.redis_url {
        #[cfg(feature = "redis")]
        Some(url) => {
            let cache = portico_infra::RedisCacheStore::new(url, "portico:")
                .map_err(|e| anyhow::anyhow!("PORTICO_REDIS_URL: {e}"))?;
            tracing::info!("using redis cache store");
            Ok(Arc::new(cache))
        }
        #[cfg(not(feature = "redis"))]
        Some(_) => {
            tracing::warn!(
                "PORTICO_REDIS_URL set but redis feature not enabled, falling back to in-memory"
            );
            Ok(Arc::new(InMemoryCacheStore::new()))
        }
        None => Ok(Arc::new(InMemoryCacheStore::new())),
    }
}
