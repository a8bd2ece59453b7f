use std::sync::Arc;

use axum::{
    extract::{Extension, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use portico_auth::SessionSnapshot;
use portico_core::Verb;

use crate::app::dto::ExplainQuery;
use crate::app::errors;
use crate::app::services::AppServices;

pub async fn health() -> StatusCode {
    StatusCode::OK
}

/// `GET /system/access?service=..&resource=..&verb=..`: why the caller's
/// own session would be allowed or denied.
pub async fn explain(
    Extension(services): Extension<Arc<AppServices>>,
    session: Option<Extension<SessionSnapshot>>,
    Query(query): Query<ExplainQuery>,
) -> Response {
    let identity = session.map(|Extension(s)| s).unwrap_or_default();

    let verb = match query.verb.parse::<Verb>() {
        Ok(verb) => verb,
        Err(e) => return errors::gateway_error_to_response(e),
    };

    match services
        .gate
        .explain(&identity, &query.service, &query.resource, verb)
    {
        Ok(explanation) => Json(explanation).into_response(),
        Err(e) => errors::gateway_error_to_response(e),
    }
}
