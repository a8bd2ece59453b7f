use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Extension, Query},
    http::{HeaderMap, Method, header},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use portico_core::{GatewayError, GatewayResult, Verb};
use portico_infra::{Payload, PayloadFormat};

use crate::app::dto::{self, ServiceListQuery};
use crate::app::errors;
use crate::app::services::AppServices;
use crate::context::ApiTarget;
use crate::session::{API_KEY_HEADER, SESSION_TOKEN_HEADER};

/// `GET /api/v2`: active services, projected per `?fields=` and filtered
/// per `?group=`.
pub async fn root_listing(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<ServiceListQuery>,
) -> Response {
    let fields = query.field_list();
    match services
        .registry
        .service_list(&fields, true, query.group.as_deref())
    {
        Ok(rows) => Json(json!({ "services": rows })).into_response(),
        Err(e) => errors::gateway_error_to_response(e),
    }
}

/// Any verb on `/api/v2/{service}/{resource...}`.
pub async fn dispatch(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(target): Extension<ApiTarget>,
    method: Method,
    Query(query): Query<BTreeMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let result = forward(&services, &target, &method, query, &headers, body);
    match result {
        Ok(response) => dto::service_response_to_response(response),
        Err(e) => errors::gateway_error_to_response(e),
    }
}

fn forward(
    services: &AppServices,
    target: &ApiTarget,
    method: &Method,
    query: BTreeMap<String, String>,
    headers: &HeaderMap,
    body: Bytes,
) -> GatewayResult<portico_infra::ServiceResponse> {
    let verb: Verb = method.as_str().parse()?;
    let (payload, format) = payload_from(headers, &body)?;

    services.registry.handle_request(
        target.service(),
        verb,
        target.resource(),
        query,
        forwarded_headers(headers),
        payload,
        format,
    )
}

/// JSON bodies (declared, or undeclared but parseable) become structured
/// payloads; anything else is kept raw with its declared format.
fn payload_from(
    headers: &HeaderMap,
    body: &Bytes,
) -> GatewayResult<(Payload, Option<PayloadFormat>)> {
    let format = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(PayloadFormat::from_content_type);

    if body.is_empty() {
        return Ok((Payload::Empty, format));
    }

    match format {
        Some(PayloadFormat::Json) => {
            let value = serde_json::from_slice(body)
                .map_err(|e| GatewayError::bad_request(format!("Malformed JSON body: {e}")))?;
            Ok((Payload::Json(value), format))
        }
        None => match serde_json::from_slice(body) {
            Ok(value) => Ok((Payload::Json(value), None)),
            Err(_) => Ok((Payload::Raw(utf8_body(body)?), None)),
        },
        Some(_) => Ok((Payload::Raw(utf8_body(body)?), format)),
    }
}

fn utf8_body(body: &Bytes) -> GatewayResult<String> {
    String::from_utf8(body.to_vec())
        .map_err(|_| GatewayError::bad_request("Request body is not valid UTF-8."))
}

/// Request headers handed to services; credentials stay at the gateway.
fn forwarded_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .iter()
        .filter(|(name, _)| {
            let name = name.as_str();
            name != API_KEY_HEADER && name != SESSION_TOKEN_HEADER
        })
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    fn with_content_type(ct: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(ct));
        headers
    }

    #[test]
    fn declared_json_is_parsed() {
        let (payload, format) =
            payload_from(&with_content_type("application/json"), &Bytes::from_static(b"{\"a\":1}")).unwrap();
        assert_eq!(payload, Payload::Json(json!({"a": 1})));
        assert_eq!(format, Some(PayloadFormat::Json));
    }

    #[test]
    fn malformed_json_is_bad_request() {
        let err = payload_from(&with_content_type("application/json"), &Bytes::from_static(b"{"))
            .unwrap_err();
        assert!(matches!(err, GatewayError::BadRequest(_)));
    }

    #[test]
    fn undeclared_text_stays_raw_without_format() {
        let (payload, format) = payload_from(&HeaderMap::new(), &Bytes::from_static(b"a,b")).unwrap();
        assert_eq!(payload, Payload::Raw("a,b".into()));
        assert_eq!(format, None);
    }

    #[test]
    fn declared_csv_is_raw_with_format() {
        let (payload, format) =
            payload_from(&with_content_type("text/csv"), &Bytes::from_static(b"a,b")).unwrap();
        assert_eq!(payload, Payload::Raw("a,b".into()));
        assert_eq!(format, Some(PayloadFormat::Csv));
    }

    #[test]
    fn credentials_are_not_forwarded() {
        let mut headers = with_content_type("text/plain");
        headers.insert(API_KEY_HEADER, HeaderValue::from_static("secret"));
        headers.insert(SESSION_TOKEN_HEADER, HeaderValue::from_static("secret"));

        let forwarded = forwarded_headers(&headers);
        assert_eq!(forwarded.len(), 1);
        assert_eq!(forwarded["content-type"], "text/plain");
    }
}
