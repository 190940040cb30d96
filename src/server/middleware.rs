use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use hmac::{Hmac, Mac};
use serde_json::json;
use sha2::Sha256;

use super::AppState;

const API_KEY_HEADER: &str = "x-api-key";

type HmacSha256 = Hmac<Sha256>;

/// Compare keys through their MACs so timing does not leak matching prefixes.
fn key_matches(expected: &str, presented: &str) -> bool {
    let Ok(mut reference) = HmacSha256::new_from_slice(expected.as_bytes()) else {
        return false;
    };
    reference.update(expected.as_bytes());
    let tag = reference.finalize().into_bytes();

    let Ok(mut candidate) = HmacSha256::new_from_slice(expected.as_bytes()) else {
        return false;
    };
    candidate.update(presented.as_bytes());
    candidate.verify_slice(&tag).is_ok()
}

/// Guards `/api/v1` with the configured `api.key`. Open when no key is set.
pub async fn api_key_auth(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let Some(expected) = state.settings.api.key.as_deref() else {
        return next.run(req).await;
    };

    let presented = req
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok());

    if presented.is_some_and(|key| key_matches(expected, key)) {
        return next.run(req).await;
    }

    tracing::warn!(
        path = %req.uri().path(),
        key_present = presented.is_some(),
        "Rejected request without a valid API key"
    );
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({
            "error": { "code": "UNAUTHORIZED", "message": "Missing or invalid API key" }
        })),
    )
        .into_response()
}
