#![allow(unused)]
use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use std::borrow::Cow;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Bad Request: {0}")]
    BadRequest(Cow<'static, str>),
    #[error("Forbidden: {0}")]
    Forbidden(Cow<'static, str>),
    #[error("Not Found: {0}")]
    NotFound(Cow<'static, str>),
    #[error("Service Unavailable")]
    ServiceUnavailable,
    #[error("Internal Server Error")]
    InternalServer,
}

#[derive(serde::Serialize)]
pub struct ErrorBody {
    pub error: Cow<'static, str>,
}

impl Error {
    pub fn bad_request(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn forbidden(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn not_found(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn service_unavailable() -> Self {
        Self::ServiceUnavailable
    }

    pub fn internal_server_error() -> Self {
        Self::InternalServer
    }
}

impl ResponseError for Error {
    fn status_code(&self) -> StatusCode {
        match *self {
            Error::BadRequest(_) => StatusCode::BAD_REQUEST,
            Error::Forbidden(_) => StatusCode::FORBIDDEN,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            Error::InternalServer => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let mut res = HttpResponse::build(self.status_code());

        match self {
            // Has Message
            Error::BadRequest(msg) | Error::Forbidden(msg) | Error::NotFound(msg) => {
                res.json(ErrorBody { error: msg.clone() })
            }
            // Generic message only; the detail stays in the logs
            Error::ServiceUnavailable => res.json(ErrorBody {
                error: "The generation service is temporarily unavailable, please try again later"
                    .into(),
            }),
            Error::InternalServer => res.json(ErrorBody { error: "Internal server error".into() }),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum SystemError {
    // filesystem errors
    #[error("I/O Error: {0}")]
    Io(#[from] std::io::Error),
    // reqwest errors
    #[error("HTTP Error: {0}")]
    Http(#[from] reqwest::Error),
    // serde errors
    #[error("JSON Serialization/Deserialization Error")]
    JsonError(#[from] serde_json::Error),
    // generation API reported a failure
    #[error("Generation API Error: {0}")]
    Upstream(Cow<'static, str>),
    // Custom Errors
    #[error("Bad Request: {0}")]
    BadRequest(Cow<'static, str>),
    #[error("Forbidden: {0}")]
    Forbidden(Cow<'static, str>),
    #[error("Not Found: {0}")]
    NotFound(Cow<'static, str>),
}

impl From<SystemError> for Error {
    fn from(value: SystemError) -> Self {
        match value {
            SystemError::BadRequest(msg) => Error::BadRequest(msg),
            SystemError::Forbidden(msg) => Error::Forbidden(msg),
            SystemError::NotFound(msg) => Error::NotFound(msg),
            SystemError::Upstream(msg) => {
                log::error!("Generation API error: {}", msg);
                Error::ServiceUnavailable
            }
            SystemError::Http(err) => {
                log::error!("Generation API request failed: {:?}", err);
                Error::ServiceUnavailable
            }
            _ => {
                log::error!("Internal Server Error: {:?}", value);
                Error::InternalServer
            }
        }
    }
}

impl SystemError {
    pub fn upstream(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::Upstream(msg.into())
    }

    pub fn bad_request(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn forbidden(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn not_found(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::NotFound(msg.into())
    }
}
