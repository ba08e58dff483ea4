use jsonwebtoken::TokenData;
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use crate::error::Error;

/// Sessions are valid for 30 days; there is no refresh mechanism and no
/// revocation list, expiry is the only cutoff.
pub const SESSION_LIFETIME: Duration = Duration::days(30);

#[derive(Clone)]
pub struct JwtState {
    validation: jsonwebtoken::Validation,
    header: jsonwebtoken::Header,

    encoding_key: jsonwebtoken::EncodingKey,
    decoding_key: jsonwebtoken::DecodingKey,
}

impl JwtState {
    pub fn new(secret: &[u8]) -> Self {
        let header = jsonwebtoken::Header::new(jsonwebtoken::Algorithm::HS256);
        let mut validation = jsonwebtoken::Validation::new(jsonwebtoken::Algorithm::HS256);
        // expiry is checked on the decoded claims so that the error can be
        // told apart from a bad signature
        validation.validate_exp = false;

        Self {
            header,
            validation,

            encoding_key: jsonwebtoken::EncodingKey::from_secret(secret),
            decoding_key: jsonwebtoken::DecodingKey::from_secret(secret),
        }
    }

    pub fn new_from_env() -> Self {
        let secret_key = std::env::var("JWT_SECRET_KEY")
            .expect("Cannot retreive JWT_SECRET_KEY from environment variable.");

        Self::new(secret_key.as_bytes())
    }
}

pub fn current_timestamp() -> OffsetDateTime {
    OffsetDateTime::now_utc()
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SessionClaims {
    /// email of the authenticated user
    pub sub: String,
    pub exp: i64,
}

impl SessionClaims {
    pub fn is_expired(&self) -> bool {
        self.exp < current_timestamp().unix_timestamp()
    }
}

pub fn issue_session_token(jwt_state: &JwtState, email: &str) -> Result<String, Error> {
    let expired_at = current_timestamp() + SESSION_LIFETIME;

    issue_session_token_with_exp(jwt_state, email, expired_at.unix_timestamp())
}

pub fn issue_session_token_with_exp(
    jwt_state: &JwtState,
    email: &str,
    exp: i64,
) -> Result<String, Error> {
    let claims = SessionClaims {
        sub: email.to_string(),
        exp,
    };

    jsonwebtoken::encode(&jwt_state.header, &claims, &jwt_state.encoding_key).map_err(Into::into)
}

pub fn decode_session_token(
    jwt_state: &JwtState,
    token: &str,
) -> Result<TokenData<SessionClaims>, Error> {
    jsonwebtoken::decode(token, &jwt_state.decoding_key, &jwt_state.validation).map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    pub fn test_session_token_round_trip() {
        let jwt = JwtState::new(b"test-secret");

        let token = issue_session_token(&jwt, "donor@example.com").unwrap();
        let token = decode_session_token(&jwt, &token).unwrap();

        assert_eq!(token.claims.sub, "donor@example.com");
        assert!(!token.claims.is_expired());

        // exp is fixed at issuance, 30 days out
        let leeway = 5;
        let expected = (current_timestamp() + SESSION_LIFETIME).unix_timestamp();
        assert!((token.claims.exp - expected).abs() < leeway);
    }

    #[test]
    pub fn test_expired_session_token() {
        let jwt = JwtState::new(b"test-secret");

        let token = issue_session_token_with_exp(
            &jwt,
            "donor@example.com",
            (current_timestamp() - Duration::seconds(1)).unix_timestamp(),
        )
        .unwrap();

        let token = decode_session_token(&jwt, &token).unwrap();
        assert!(token.claims.is_expired());
    }

    #[test]
    pub fn test_tampered_session_token() {
        let jwt = JwtState::new(b"test-secret");
        let other = JwtState::new(b"other-secret");

        let token = issue_session_token(&other, "donor@example.com").unwrap();
        decode_session_token(&jwt, &token).unwrap_err();

        let mut token = issue_session_token(&jwt, "donor@example.com").unwrap();
        token.push('x');
        decode_session_token(&jwt, &token).unwrap_err();
    }
}
