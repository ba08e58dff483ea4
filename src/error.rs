use axum::{
    http::{StatusCode, Uri},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("validation error: {0}")]
    ValidationError(#[from] validator::ValidationErrors),

    #[error("{0} not found")]
    NotFound(Uri),

    #[error("No resource found")]
    NoResource,

    #[error("{0}")]
    DatabaseError(#[from] mongodb::error::Error),

    #[error("{0}")]
    JWTError(#[from] jsonwebtoken::errors::Error),

    #[error("{0} is not a valid role")]
    InvalidRole(String),

    #[error("{0} is not a valid status")]
    InvalidStatus(String),

    #[error("{0} is not a valid payment amount")]
    InvalidAmount(String),

    #[error("{0}")]
    Unauthorized(UnauthorizedType),

    #[error("You have no permission to access this resource")]
    Forbidden,

    #[error("{0}")]
    Conflict(&'static str),

    #[error("{0}")]
    BSONSerError(#[from] bson::ser::Error),

    #[error("payment processor error: {0}")]
    PaymentError(#[from] reqwest::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum UnauthorizedType {
    #[error("Authentication required")]
    MissingToken,

    #[error("Invalid session token")]
    InvalidToken,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorJson {
    r#type: String,
    message: String,
}

impl From<Error> for ErrorJson {
    fn from(err: Error) -> Self {
        Self {
            r#type: err.to_string_variant(),
            message: err.to_string(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> axum::response::Response {
        tracing::error!("error: {:?}", self);
        let status = match self {
            Self::Unauthorized(..) => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound(..) | Self::NoResource => StatusCode::NOT_FOUND,
            Self::ValidationError(..)
            | Self::InvalidRole(..)
            | Self::InvalidStatus(..)
            | Self::InvalidAmount(..) => StatusCode::BAD_REQUEST,
            Self::Conflict(..) => StatusCode::CONFLICT,
            Self::DatabaseError(..) | Self::JWTError(..) | Self::BSONSerError(..) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::PaymentError(..) => StatusCode::BAD_GATEWAY,
        };

        let error = ErrorJson::from(self);

        (status, Json(error)).into_response()
    }
}

impl Error {
    pub fn to_string_variant(&self) -> String {
        macro_rules! match_var {
            ($id:ident !) => {
                Self::$id
            };
            ($id:ident (..)) => {
                Self::$id(..)
            };
        }

        macro_rules! variant {
            ($($name:ident $tt:tt),+) => {
                match self {
                    $(
                        match_var!($name $tt) => {
                            stringify!($name)
                       }
                    )+
                }
            };
        }

        variant! {
            NotFound(..),
            NoResource!,
            Forbidden!,
            Conflict(..),
            ValidationError(..),
            DatabaseError(..),
            JWTError(..),
            InvalidRole(..),
            InvalidStatus(..),
            InvalidAmount(..),
            BSONSerError(..),
            Unauthorized(..),
            PaymentError(..)
        }
        .to_string()
    }
}

impl From<axum::extract::rejection::PathRejection> for Error {
    fn from(_value: axum::extract::rejection::PathRejection) -> Self {
        Self::NoResource
    }
}
