use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::response::IntoResponse;
use serde::Deserialize;

use portico_infra::ServiceResponse;

// -------------------------
// Request DTOs
// -------------------------

/// Query string of the root listing: `?fields=name,label&group=Database`.
#[derive(Debug, Default, Deserialize)]
pub struct ServiceListQuery {
    pub fields: Option<String>,
    pub group: Option<String>,
}

impl ServiceListQuery {
    pub fn field_list(&self) -> Vec<&str> {
        self.fields
            .as_deref()
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|f| !f.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
pub struct ExplainQuery {
    #[serde(default)]
    pub service: String,
    #[serde(default)]
    pub resource: String,
    pub verb: String,
}

// -------------------------
// Response mapping
// -------------------------

pub fn service_response_to_response(response: ServiceResponse) -> axum::response::Response {
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::OK);
    let mut http = (status, axum::Json(response.body)).into_response();

    for (name, value) in response.headers {
        match (HeaderName::try_from(name.as_str()), HeaderValue::try_from(value.as_str())) {
            (Ok(name), Ok(value)) => {
                http.headers_mut().insert(name, value);
            }
            _ => tracing::warn!(header = %name, "dropping invalid response header from service"),
        }
    }

    http
}
