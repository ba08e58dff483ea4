use axum::{
    extract::{FromRef, FromRequestParts, State},
    headers::{authorization::Bearer, Authorization, Cookie, Header, SetCookie},
    http::{request::Parts, HeaderValue},
    Json, RequestPartsExt, TypedHeader,
};
use serde::{Deserialize, Serialize};
use tap::TapFallible;
use validator::Validate;

use crate::{
    error::{Error, UnauthorizedType},
    util::FormattedDateTime,
};

use super::{
    token::{
        current_timestamp, decode_session_token, issue_session_token, JwtState, SESSION_LIFETIME,
    },
    user::{UserCollection, UserModel},
};

pub const SESSION_COOKIE: &str = "session_token";

/// Authenticated caller, first stage of the gate. Carries only the email
/// claim; the role is re-derived from the stored user on every gated
/// request so role edits take effect without reissuing sessions.
#[derive(Debug, Clone)]
pub struct Session {
    pub email: String,
}

impl Session {
    pub fn from_token(jwt_state: &JwtState, token: &str) -> Result<Self, Error> {
        let token = decode_session_token(jwt_state, token)
            .map_err(|_| Error::Unauthorized(UnauthorizedType::InvalidToken))?;

        if token.claims.is_expired() {
            return Err(Error::Unauthorized(UnauthorizedType::InvalidToken));
        }

        Ok(Self {
            email: token.claims.sub,
        })
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for Session
where
    JwtState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        // bearer header wins over the cookie when both are present
        let token = match parts.extract::<TypedHeader<Authorization<Bearer>>>().await {
            Ok(TypedHeader(Authorization(bearer))) => bearer.token().to_string(),
            Err(_) => {
                let cookie = parts
                    .extract::<TypedHeader<Cookie>>()
                    .await
                    .map_err(|_| Error::Unauthorized(UnauthorizedType::MissingToken))
                    .tap_err(|_| tracing::debug!("no bearer header and no cookie"))?;

                cookie
                    .get(SESSION_COOKIE)
                    .ok_or(Error::Unauthorized(UnauthorizedType::MissingToken))
                    .tap_err(|_| tracing::debug!("session cookie not found"))?
                    .to_string()
            }
        };

        let jwt = JwtState::from_ref(state);

        Self::from_token(&jwt, &token)
    }
}

impl UserModel {
    pub async fn from_email(
        email: &str,
        UserCollection(users): &UserCollection,
    ) -> Result<Self, Error> {
        users
            .find_one(
                bson::doc! {
                    "email": email
                },
                None,
            )
            .await?
            .ok_or(Error::Unauthorized(UnauthorizedType::InvalidToken))
    }
}

/// Second stage of the gate: the live user record behind the session.
#[axum::async_trait]
impl<S> FromRequestParts<S> for UserModel
where
    JwtState: FromRef<S>,
    UserCollection: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let session = parts.extract_with_state::<Session, _>(state).await?;
        let users = UserCollection::from_ref(state);
        Self::from_email(&session.email, &users).await
    }
}

#[derive(Validate, Serialize, Deserialize, Debug, Clone)]
pub struct IssueTokenRequest {
    #[validate(email)]
    pub email: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct IssueTokenResponse {
    pub token: String,
    pub expired_at: FormattedDateTime,
}

/// `POST /jwt`. The upstream identity provider has already authenticated
/// the email; this only mints the session.
pub async fn login(
    State(jwt_state): State<JwtState>,
    Json(request): Json<IssueTokenRequest>,
) -> Result<(TypedHeader<SetCookie>, Json<IssueTokenResponse>), Error> {
    request.validate()?;

    let expired_at = current_timestamp() + SESSION_LIFETIME;
    let token = issue_session_token(&jwt_state, &request.email)?;

    let header = TypedHeader(
        SetCookie::decode(
            &mut [HeaderValue::from_str(&format!(
                "{}={}; HttpOnly; Path=/; Max-Age={}",
                SESSION_COOKIE,
                token,
                SESSION_LIFETIME.whole_seconds(),
            ))
            .unwrap()]
            .as_slice()
            .iter(),
        )
        .unwrap(),
    );

    Ok((
        header,
        Json(IssueTokenResponse {
            token,
            expired_at: expired_at.into(),
        }),
    ))
}

/// `GET /logout`: expires the session cookie. The token itself stays
/// valid until its exp; there is no revocation list.
pub async fn logout() -> (TypedHeader<SetCookie>, Json<serde_json::Value>) {
    let header = TypedHeader(
        SetCookie::decode(
            &mut [HeaderValue::from_str(&format!(
                "{}=; HttpOnly; Path=/; Max-Age=0",
                SESSION_COOKIE,
            ))
            .unwrap()]
            .as_slice()
            .iter(),
        )
        .unwrap(),
    );

    (header, Json(serde_json::json!({ "message": "logged out" })))
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use axum::{
        extract::{FromRef, FromRequestParts, State},
        Json,
    };

    use crate::{
        api::v1::token::{issue_session_token_with_exp, JwtState},
        error::{Error, UnauthorizedType},
    };

    #[derive(FromRef, Clone)]
    struct TestState {
        jwt_state: JwtState,
    }

    fn test_state() -> TestState {
        TestState {
            jwt_state: JwtState::new(b"test-secret"),
        }
    }

    #[tokio::test]
    async fn test_session_from_bearer_header() {
        let state = test_state();
        let token = super::issue_session_token(&state.jwt_state, "donor@example.com").unwrap();

        let (mut parts, _) = axum::http::request::Request::get("http://localhost")
            .header("Authorization", format!("Bearer {}", token))
            .body(())
            .unwrap()
            .into_parts();

        let session = super::Session::from_request_parts(&mut parts, &state)
            .await
            .unwrap();

        assert_eq!(session.email, "donor@example.com");
    }

    #[tokio::test]
    async fn test_session_from_cookie() {
        let state = test_state();
        let token = super::issue_session_token(&state.jwt_state, "donor@example.com").unwrap();

        let (mut parts, _) = axum::http::request::Request::get("http://localhost")
            .header("Cookie", format!("{}={}", super::SESSION_COOKIE, token))
            .body(())
            .unwrap()
            .into_parts();

        let session = super::Session::from_request_parts(&mut parts, &state)
            .await
            .unwrap();

        assert_eq!(session.email, "donor@example.com");
    }

    #[tokio::test]
    async fn test_session_missing_token() {
        let state = test_state();

        let (mut parts, _) = axum::http::request::Request::get("http://localhost")
            .body(())
            .unwrap()
            .into_parts();

        let error = super::Session::from_request_parts(&mut parts, &state)
            .await
            .unwrap_err();

        assert_matches!(error, Error::Unauthorized(UnauthorizedType::MissingToken));
    }

    #[tokio::test]
    async fn test_session_expired_token() {
        let state = test_state();
        let token =
            issue_session_token_with_exp(&state.jwt_state, "donor@example.com", 0).unwrap();

        let (mut parts, _) = axum::http::request::Request::get("http://localhost")
            .header("Authorization", format!("Bearer {}", token))
            .body(())
            .unwrap()
            .into_parts();

        let error = super::Session::from_request_parts(&mut parts, &state)
            .await
            .unwrap_err();

        assert_matches!(error, Error::Unauthorized(UnauthorizedType::InvalidToken));
    }

    #[tokio::test]
    async fn test_session_tampered_token() {
        let state = test_state();
        let other = JwtState::new(b"other-secret");
        let token = super::issue_session_token(&other, "donor@example.com").unwrap();

        let (mut parts, _) = axum::http::request::Request::get("http://localhost")
            .header("Authorization", format!("Bearer {}", token))
            .body(())
            .unwrap()
            .into_parts();

        let error = super::Session::from_request_parts(&mut parts, &state)
            .await
            .unwrap_err();

        assert_matches!(error, Error::Unauthorized(UnauthorizedType::InvalidToken));
    }

    #[tokio::test]
    async fn test_login_issues_verifiable_session() {
        let state = test_state();

        let (_, Json(response)) = super::login(
            State(state.jwt_state.clone()),
            Json(super::IssueTokenRequest {
                email: "donor@example.com".to_string(),
            }),
        )
        .await
        .unwrap();

        let session = super::Session::from_token(&state.jwt_state, &response.token).unwrap();
        assert_eq!(session.email, "donor@example.com");
    }

    #[tokio::test]
    async fn test_login_rejects_invalid_email() {
        let state = test_state();

        let error = super::login(
            State(state.jwt_state),
            Json(super::IssueTokenRequest {
                email: "not-an-email".to_string(),
            }),
        )
        .await
        .unwrap_err();

        assert_matches!(error, Error::ValidationError(_));
    }
}
