//! Every cache key the service registry writes.
//!
//! Purge must forget all keys touching a service; keep them here so a new
//! cached lookup cannot be added without also being purged.

/// Id → name map over every configured service.
pub const SERVICE_ID_MAP: &str = "service_mgr:id_map";

/// Id → name map over active services only.
pub const ACTIVE_SERVICE_ID_MAP: &str = "service_mgr:id_map:active";

/// Version token guarding both id/name maps.
pub const ID_MAP_VERSION: &str = "service_mgr:version:id_map";

/// Descriptor of one service, by name.
pub fn service_info(name: &str) -> String {
    format!("service_mgr:info:{name}")
}

/// Version token guarding the descriptor and live instances of `name`.
pub fn service_version(name: &str) -> String {
    format!("service_mgr:version:{name}")
}

/// Keys to forget when `name` is edited or deleted.
///
/// Version tokens come first: an entry written after its token was forgotten
/// is retracted by the writer, one written before is forgotten here.
pub fn purge_set(name: &str) -> [String; 5] {
    [
        service_version(name),
        ID_MAP_VERSION.to_string(),
        service_info(name),
        SERVICE_ID_MAP.to_string(),
        ACTIVE_SERVICE_ID_MAP.to_string(),
    ]
}
