//! Request/response shapes exchanged with live service instances.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use portico_core::{GatewayError, GatewayResult, RequestId, Verb};

/// Request body as received by the gateway.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Payload {
    #[default]
    Empty,
    Json(JsonValue),
    Raw(String),
}

impl Payload {
    /// True for an empty body or a JSON object.
    pub fn is_structured(&self) -> bool {
        matches!(self, Payload::Empty | Payload::Json(JsonValue::Object(_)))
    }
}

/// Declared wire format of a non-JSON-object body.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadFormat {
    Json,
    Xml,
    Csv,
    Text,
}

impl PayloadFormat {
    /// Map a `Content-Type` header value; parameters such as `charset` are
    /// ignored.
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let mime = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        match mime.as_str() {
            "application/json" => Some(Self::Json),
            "application/xml" | "text/xml" => Some(Self::Xml),
            "text/csv" => Some(Self::Csv),
            "text/plain" => Some(Self::Text),
            _ if mime.ends_with("+json") => Some(Self::Json),
            _ if mime.ends_with("+xml") => Some(Self::Xml),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Xml => "xml",
            Self::Csv => "csv",
            Self::Text => "text",
        }
    }
}

/// Normalized request handed to a service instance. Built per dispatch.
#[derive(Debug, Clone, Serialize)]
pub struct RequestContext {
    pub request_id: RequestId,
    pub received_at: DateTime<Utc>,
    pub verb: Verb,
    pub resource: String,
    pub query: BTreeMap<String, String>,
    pub headers: BTreeMap<String, String>,
    pub payload: Payload,
    pub format: Option<PayloadFormat>,
}

impl RequestContext {
    /// Fails with `BadRequest` when the payload is neither structured nor
    /// accompanied by a declared format.
    pub fn build(
        verb: Verb,
        resource: impl Into<String>,
        query: BTreeMap<String, String>,
        headers: BTreeMap<String, String>,
        payload: Payload,
        format: Option<PayloadFormat>,
    ) -> GatewayResult<Self> {
        if !payload.is_structured() && format.is_none() {
            return Err(GatewayError::bad_request(
                "Request payload is not structured data and no payload format was declared.",
            ));
        }

        Ok(Self {
            request_id: RequestId::new(),
            received_at: Utc::now(),
            verb,
            resource: resource.into(),
            query,
            headers,
            payload,
            format,
        })
    }
}

/// What a service hands back to the transport layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: JsonValue,
}

impl ServiceResponse {
    pub fn ok(body: JsonValue) -> Self {
        Self::with_status(200, body)
    }

    pub fn with_status(status: u16, body: JsonValue) -> Self {
        Self {
            status,
            headers: BTreeMap::new(),
            body,
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

/// A live handler built from a service descriptor by its type's factory.
pub trait Service: Send + Sync {
    fn name(&self) -> &str;

    fn handle_request(
        &self,
        context: &RequestContext,
        resource: &str,
    ) -> GatewayResult<ServiceResponse>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn build(payload: Payload, format: Option<PayloadFormat>) -> GatewayResult<RequestContext> {
        RequestContext::build(
            Verb::Post,
            "_table/users",
            BTreeMap::new(),
            BTreeMap::new(),
            payload,
            format,
        )
    }

    #[test]
    fn structured_payloads_need_no_format() {
        assert!(build(Payload::Empty, None).is_ok());
        assert!(build(Payload::Json(json!({"a": 1})), None).is_ok());
    }

    #[test]
    fn unstructured_payload_without_format_is_bad_request() {
        for payload in [
            Payload::Raw("a,b,c".into()),
            Payload::Json(json!([1, 2, 3])),
            Payload::Json(json!("text")),
        ] {
            let err = build(payload, None).unwrap_err();
            assert!(matches!(err, GatewayError::BadRequest(_)));
        }
    }

    #[test]
    fn declared_format_admits_raw_payload() {
        let ctx = build(Payload::Raw("<a/>".into()), Some(PayloadFormat::Xml)).unwrap();
        assert_eq!(ctx.format, Some(PayloadFormat::Xml));
        assert_eq!(ctx.resource, "_table/users");
    }

    #[test]
    fn content_type_mapping() {
        assert_eq!(
            PayloadFormat::from_content_type("application/json; charset=utf-8"),
            Some(PayloadFormat::Json)
        );
        assert_eq!(PayloadFormat::from_content_type("text/xml"), Some(PayloadFormat::Xml));
        assert_eq!(
            PayloadFormat::from_content_type("application/vnd.api+json"),
            Some(PayloadFormat::Json)
        );
        assert_eq!(PayloadFormat::from_content_type("TEXT/CSV"), Some(PayloadFormat::Csv));
        assert_eq!(PayloadFormat::from_content_type("application/octet-stream"), None);
    }

    #[test]
    fn each_context_gets_its_own_request_id() {
        let a = build(Payload::Empty, None).unwrap();
        let b = build(Payload::Empty, None).unwrap();
        assert_ne!(a.request_id, b.request_id);
    }
}
