//! HTTP Basic authentication for the admin endpoints.

use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use sha2::{Digest, Sha256};

/// Credentials parsed from an `Authorization: Basic ...` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicCredentials {
    pub username: String,
    pub password: String,
}

/// Extract Basic credentials from the request, if present and well-formed.
pub fn extract_basic_credentials(req: &Request) -> Option<BasicCredentials> {
    let value = req.headers().get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, encoded) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some(BasicCredentials {
        username: username.to_string(),
        password: password.to_string(),
    })
}

/// Compare secrets by digest so the comparison time does not depend on
/// the length of the common prefix.
fn secrets_match(given: &str, expected: &str) -> bool {
    let given = Sha256::digest(given.as_bytes());
    let expected = Sha256::digest(expected.as_bytes());
    given
        .iter()
        .zip(expected.iter())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

/// Require the configured admin credentials. Without an `admin` section the
/// endpoints are open.
pub async fn admin_auth_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(admin) = state.config.admin.as_ref() else {
        return Ok(next.run(req).await);
    };

    let Some(creds) = extract_basic_credentials(&req) else {
        return Err(ApiError::Unauthorized("credentials required".to_string()));
    };

    let user_ok = secrets_match(&creds.username, &admin.username);
    let pass_ok = secrets_match(&creds.password, &admin.password);
    if !(user_ok && pass_ok) {
        tracing::warn!(username = %creds.username, "Rejected admin credentials");
        return Err(ApiError::Unauthorized("invalid credentials".to_string()));
    }

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn request_with(header: &str) -> Request {
        axum::http::Request::builder()
            .header(AUTHORIZATION, header)
            .body(Body::empty())
            .unwrap()
    }

    #[test]
    fn test_extract_basic_credentials() {
        let encoded = STANDARD.encode("admin:s3cr:et");
        let creds = extract_basic_credentials(&request_with(&format!("Basic {encoded}"))).unwrap();
        assert_eq!(creds.username, "admin");
        assert_eq!(creds.password, "s3cr:et");
    }

    #[test]
    fn test_rejects_other_schemes_and_garbage() {
        assert!(extract_basic_credentials(&request_with("Bearer abc")).is_none());
        assert!(extract_basic_credentials(&request_with("Basic !!!")).is_none());
        let no_colon = STANDARD.encode("admin");
        assert!(extract_basic_credentials(&request_with(&format!("Basic {no_colon}"))).is_none());
    }

    #[test]
    fn test_secrets_match() {
        assert!(secrets_match("secret", "secret"));
        assert!(!secrets_match("secret", "secreT"));
        assert!(!secrets_match("", "secret"));
    }
}
