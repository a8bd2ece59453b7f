use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use portico_auth::AccessDenied;
use portico_core::GatewayError;

fn status_from(code: u16) -> StatusCode {
    StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

pub fn gateway_error_to_response(err: GatewayError) -> axum::response::Response {
    let kind = err.kind();
    if matches!(err, GatewayError::Store(_)) {
        tracing::error!(error = %err, "store failure while serving request");
    }
    json_error(status_from(kind.status_code()), kind.code(), err.message())
}

pub fn access_denied_to_response(denied: AccessDenied) -> axum::response::Response {
    json_error(status_from(denied.status), denied.code(), denied.message)
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use portico_auth::DenialReason;
    use portico_core::ErrorKind;

    use super::*;

    #[test]
    fn gateway_errors_map_to_their_status() {
        let cases = [
            (GatewayError::not_found("x"), StatusCode::NOT_FOUND),
            (GatewayError::bad_request("x"), StatusCode::BAD_REQUEST),
            (GatewayError::method_not_allowed("x"), StatusCode::METHOD_NOT_ALLOWED),
            (GatewayError::store("x"), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(gateway_error_to_response(err).status(), status);
        }
    }

    #[test]
    fn denial_uses_its_own_status() {
        let denied = AccessDenied::new(ErrorKind::BadRequest, "bad token").with_status(401);
        assert_eq!(access_denied_to_response(denied).status(), StatusCode::UNAUTHORIZED);

        let denied = AccessDenied::from(DenialReason::InsufficientPrivilege);
        assert_eq!(access_denied_to_response(denied).status(), StatusCode::FORBIDDEN);
    }
}
