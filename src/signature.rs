//! Twilio request validation.
//!
//! Twilio signs each webhook with HMAC-SHA1 keyed by the account auth token, over the full request
//! URL followed by every POST parameter as `key` + `value`, sorted by key.  The base64 digest
//! arrives in the `X-Twilio-Signature` header.

use crate::error::AppError;
use crate::types::AppState;

use axum::{body::Body, extract::State, middleware::Next};
use base64::{engine, Engine};
use hmac::{Hmac, Mac};
use http::{header, HeaderMap, Request, Uri};
use sha1::Sha1;
use std::sync::Arc;
use tracing::{trace, warn};

pub const TWILIO_SIGNATURE_HEADER: &str = "x-twilio-signature";

type HmacSha1 = Hmac<Sha1>;

fn signed_mac(auth_token: &str, url: &str, params: &[(String, String)]) -> Option<HmacSha1> {
    let mut sorted: Vec<&(String, String)> = params.iter().collect();
    sorted.sort();

    let mut mac = HmacSha1::new_from_slice(auth_token.as_bytes()).ok()?;
    mac.update(url.as_bytes());
    for (key, value) in sorted {
        mac.update(key.as_bytes());
        mac.update(value.as_bytes());
    }
    Some(mac)
}

/// The signature Twilio would send for this request.
#[cfg(test)]
pub fn compute_signature(auth_token: &str, url: &str, params: &[(String, String)]) -> Option<String> {
    let mac = signed_mac(auth_token, url, params)?;
    Some(engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes()))
}

pub fn is_valid_signature(
    auth_token: &str,
    url: &str,
    params: &[(String, String)],
    signature: &str,
) -> bool {
    let Ok(expected) = engine::general_purpose::STANDARD.decode(signature.trim()) else {
        return false;
    };
    match signed_mac(auth_token, url, params) {
        Some(mac) => mac.verify_slice(&expected).is_ok(),
        None => false,
    }
}

/// Rebuild the URL Twilio requested.  Behind a proxy the configured public base URL wins over the
/// `Host` header.
pub fn public_url(base_url: Option<&str>, headers: &HeaderMap, uri: &Uri) -> String {
    let path = uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or_else(|| uri.path());
    match base_url {
        Some(base) => format!("{base}{path}"),
        None => {
            let host = headers
                .get(header::HOST)
                .and_then(|value| value.to_str().ok())
                .unwrap_or_default();
            format!("https://{host}{path}")
        }
    }
}

/// Middleware rejecting Twilio webhooks whose signature does not match.  A no-op when no auth
/// token is configured.
pub async fn verify_twilio_signature(
    State(app_state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next<Body>,
) -> Result<axum::response::Response, AppError> {
    let Some(auth_token) = app_state.config.twilio_auth_token.as_deref() else {
        return Ok(next.run(request).await);
    };

    let signature = request
        .headers()
        .get(TWILIO_SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
        .ok_or(AppError::BadSignature)?;
    let url = public_url(
        app_state.config.public_base_url.as_deref(),
        request.headers(),
        request.uri(),
    );

    let (parts, body) = request.into_parts();
    let bytes = hyper::body::to_bytes(body)
        .await
        .map_err(|_| AppError::BadBody)?;
    let params: Vec<(String, String)> = serde_urlencoded::from_bytes(&bytes)?;

    if !is_valid_signature(auth_token, &url, &params, &signature) {
        warn!(url = %url, "rejecting webhook with bad signature");
        return Err(AppError::BadSignature);
    }
    trace!(url = %url, "webhook signature ok");

    Ok(next.run(Request::from_parts(parts, Body::from(bytes))).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> Vec<(String, String)> {
        [
            ("To", "+18005551212"),
            ("CallSid", "CA1234567890ABCDE"),
            ("From", "+14158675310"),
            ("Digits", "1234"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    const URL: &str = "https://ivr.example.com/twilio/voice/ivr?step=dob";

    #[test]
    fn accepts_own_signature() {
        let signature = compute_signature("12345", URL, &params()).unwrap();
        assert!(is_valid_signature("12345", URL, &params(), &signature));
    }

    #[test]
    fn parameter_order_does_not_matter() {
        let signature = compute_signature("12345", URL, &params()).unwrap();
        let mut reversed = params();
        reversed.reverse();
        assert!(is_valid_signature("12345", URL, &reversed, &signature));
    }

    #[test]
    fn rejects_tampering() {
        let signature = compute_signature("12345", URL, &params()).unwrap();

        let mut tampered = params();
        tampered[3].1 = "9999".to_string();
        assert!(!is_valid_signature("12345", URL, &tampered, &signature));

        let other_step = "https://ivr.example.com/twilio/voice/ivr?step=when";
        assert!(!is_valid_signature("12345", other_step, &params(), &signature));
        assert!(!is_valid_signature("54321", URL, &params(), &signature));
        assert!(!is_valid_signature("12345", URL, &params(), "not base64!"));
    }

    #[test]
    fn rebuilds_public_url() {
        let uri: Uri = "/twilio/voice/ivr?step=name".parse().unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, "abc.ngrok.io".parse().unwrap());

        assert_eq!(
            public_url(None, &headers, &uri),
            "https://abc.ngrok.io/twilio/voice/ivr?step=name"
        );
        assert_eq!(
            public_url(Some("https://ivr.example.com"), &headers, &uri),
            "https://ivr.example.com/twilio/voice/ivr?step=name"
        );
    }
}
