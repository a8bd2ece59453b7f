use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use portico_auth::{AccessGate, AccessRequest, GateOutcome, SessionSnapshot};

use crate::app::errors::access_denied_to_response;
use crate::context::{ApiTarget, TrustedInternal};
use crate::session::StaticSessionResolver;

#[derive(Clone)]
pub struct AccessState {
    pub gate: Arc<AccessGate>,
}

/// Resolve credentials into a [`SessionSnapshot`] unless an upstream layer
/// already supplied one.
pub async fn session_middleware(
    State(resolver): State<Arc<StaticSessionResolver>>,
    mut req: Request,
    next: Next,
) -> Response {
    if req.extensions().get::<SessionSnapshot>().is_none() {
        let snapshot = resolver.resolve(req.headers());
        req.extensions_mut().insert(snapshot);
    }
    next.run(req).await
}

/// Run the access gate for every `/api/v2` request.
///
/// On success the resolved [`ApiTarget`] is left in request extensions for
/// the dispatch handler.
pub async fn access_middleware(
    State(state): State<AccessState>,
    mut req: Request,
    next: Next,
) -> Response {
    let Some(target) = ApiTarget::from_path(req.uri().path()) else {
        return next.run(req).await;
    };

    let mut request = AccessRequest::new(target.service(), target.resource(), req.method().as_str());
    if req.extensions().get::<TrustedInternal>().is_some() {
        request = request.trusted();
    }

    let anonymous = SessionSnapshot::anonymous();
    let identity = req.extensions().get::<SessionSnapshot>().unwrap_or(&anonymous);

    match state.gate.handle(identity, &request) {
        GateOutcome::PassThrough => {
            req.extensions_mut().insert(target);
            next.run(req).await
        }
        GateOutcome::Denied(denied) => access_denied_to_response(denied),
    }
}
