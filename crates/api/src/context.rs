//! Per-request facts placed in request extensions.

/// Prefix under which every gated service lives.
pub const API_PREFIX: &str = "/api/v2";

/// Service/resource pair addressed by an `/api/v2/...` request.
///
/// An empty `service` is the root listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiTarget {
    service: String,
    resource: String,
}

impl ApiTarget {
    pub fn new(service: impl Into<String>, resource: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            resource: resource.into(),
        }
    }

    /// Split `/api/v2/{service}/{resource...}`. Returns `None` for paths
    /// outside the API prefix.
    pub fn from_path(path: &str) -> Option<Self> {
        let rest = path.strip_prefix(API_PREFIX)?;
        if !rest.is_empty() && !rest.starts_with('/') {
            return None;
        }

        let rest = rest.trim_matches('/');
        let (service, resource) = rest.split_once('/').unwrap_or((rest, ""));
        Some(Self::new(service, resource.trim_end_matches('/')))
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn is_root(&self) -> bool {
        self.service.is_empty()
    }
}

/// Marker inserted by an upstream layer for pre-validated internal callers.
/// Requests carrying it bypass the access gate.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct TrustedInternal;
