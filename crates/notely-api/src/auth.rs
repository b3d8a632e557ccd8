use std::time::Duration;

use axum::http::HeaderMap;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: String,
    pub session_id: Option<String>,
}

/// Verifies HS256 access tokens signed with the shared `JWT_SECRET`
#[derive(Clone)]
pub struct JwtVerifier {
    key: DecodingKey,
    clock_skew: Duration,
}

impl JwtVerifier {
    pub fn new(secret: &str, clock_skew: Duration) -> Self {
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            clock_skew,
        }
    }

    pub fn verify_access_token(&self, token: &str) -> Result<AuthenticatedUser, AppError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_aud = false;
        validation.validate_exp = false;
        validation.required_spec_claims.clear();

        let decoded = decode::<AccessClaims>(token, &self.key, &validation).map_err(|error| {
            AppError::unauthorized(format!("Token validation failed: {}", sanitize(&error)))
        })?;

        let user_id = decoded
            .claims
            .sub
            .as_deref()
            .map(str::trim)
            .filter(|sub| !sub.is_empty())
            .ok_or_else(|| AppError::unauthorized("Token subject is missing"))?
            .to_string();
        validate_temporal_claims(&decoded.claims, self.clock_skew)?;

        Ok(AuthenticatedUser {
            user_id,
            session_id: decoded.claims.jti,
        })
    }
}

pub fn extract_bearer_token(headers: &HeaderMap) -> Result<&str, AppError> {
    let header = headers
        .get("authorization")
        .ok_or_else(|| AppError::unauthorized("Missing Authorization header"))?
        .to_str()
        .map_err(|_| AppError::unauthorized("Authorization header is not valid UTF-8"))?;

    let (scheme, token) = header
        .split_once(' ')
        .ok_or_else(|| AppError::unauthorized("Authorization header must be `Bearer <token>`"))?;

    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AppError::unauthorized(
            "Authorization scheme must be `Bearer`",
        ));
    }
    let token = token.trim();
    if token.is_empty() {
        return Err(AppError::unauthorized("Bearer token is empty"));
    }

    Ok(token)
}

#[derive(Debug, Deserialize)]
struct AccessClaims {
    sub: Option<String>,
    exp: Option<i64>,
    iat: Option<i64>,
    nbf: Option<i64>,
    jti: Option<String>,
}

fn validate_temporal_claims(claims: &AccessClaims, clock_skew: Duration) -> Result<(), AppError> {
    let now = chrono::Utc::now().timestamp();
    let skew = i64::try_from(clock_skew.as_secs()).unwrap_or(0);

    let exp = claims
        .exp
        .ok_or_else(|| AppError::unauthorized("Token missing `exp` claim"))?;
    if exp <= now.saturating_sub(skew) {
        return Err(AppError::unauthorized("Token is expired"));
    }

    if let Some(iat) = claims.iat {
        if iat > now.saturating_add(skew) {
            return Err(AppError::unauthorized("Token `iat` is in the future"));
        }
    }

    if let Some(nbf) = claims.nbf {
        if nbf > now.saturating_add(skew) {
            return Err(AppError::unauthorized("Token is not yet valid"));
        }
    }

    Ok(())
}

fn sanitize(error: &impl std::fmt::Display) -> String {
    error.to_string().replace('\n', " ").trim().to_string()
}

#[cfg(test)]
pub(crate) mod tests {
    use axum::http::HeaderValue;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;

    use super::*;

    pub(crate) const TEST_SECRET: &str = "test-secret-at-least-16";

    pub(crate) fn sign(claims: &serde_json::Value, secret: &str) -> String {
        encode(
            &Header::new(Algorithm::HS256),
            claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    pub(crate) fn token_for(user_id: &str) -> String {
        let now = chrono::Utc::now().timestamp();
        sign(
            &json!({ "sub": user_id, "iat": now, "exp": now + 600 }),
            TEST_SECRET,
        )
    }

    fn verifier() -> JwtVerifier {
        JwtVerifier::new(TEST_SECRET, Duration::from_secs(30))
    }

    #[test]
    fn bearer_token_extractor_accepts_standard_header() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "authorization",
            HeaderValue::from_static("Bearer abc.def.ghi"),
        );

        assert_eq!(extract_bearer_token(&headers).unwrap(), "abc.def.ghi");
    }

    #[test]
    fn bearer_token_extractor_rejects_wrong_scheme() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Basic abc"));
        assert!(extract_bearer_token(&headers).is_err());
        assert!(extract_bearer_token(&HeaderMap::new()).is_err());
    }

    #[test]
    fn verifier_accepts_valid_token() {
        let user = verifier().verify_access_token(&token_for("user-1")).unwrap();
        assert_eq!(user.user_id, "user-1");
    }

    #[test]
    fn verifier_rejects_wrong_secret() {
        let now = chrono::Utc::now().timestamp();
        let token = sign(
            &json!({ "sub": "user-1", "exp": now + 600 }),
            "some-other-secret-value",
        );
        let err = verifier().verify_access_token(&token).unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[test]
    fn verifier_requires_subject_and_expiry() {
        let now = chrono::Utc::now().timestamp();

        let no_sub = sign(&json!({ "exp": now + 600 }), TEST_SECRET);
        let err = verifier().verify_access_token(&no_sub).unwrap_err();
        assert!(err.to_string().contains("subject"));

        let no_exp = sign(&json!({ "sub": "user-1" }), TEST_SECRET);
        let err = verifier().verify_access_token(&no_exp).unwrap_err();
        assert!(err.to_string().contains("missing `exp`"));
    }

    #[test]
    fn temporal_claims_honour_clock_skew() {
        let now = chrono::Utc::now().timestamp();

        let expired = sign(&json!({ "sub": "u", "exp": now - 120 }), TEST_SECRET);
        assert!(verifier().verify_access_token(&expired).is_err());

        let recently_expired = sign(&json!({ "sub": "u", "exp": now - 10 }), TEST_SECRET);
        assert!(verifier().verify_access_token(&recently_expired).is_ok());

        let future_iat = sign(
            &json!({ "sub": "u", "exp": now + 600, "iat": now + 120 }),
            TEST_SECRET,
        );
        let err = verifier().verify_access_token(&future_iat).unwrap_err();
        assert!(err.to_string().contains("future"));
    }
}
