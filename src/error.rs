//! Error taxonomy (§7). Kinds only — each maps to one HTTP/WS outcome.

use rocket::http::Status;
use rocket::response::Responder;
use rocket::serde::json::Json;
use rocket::{Request, Response};
use std::io::Cursor;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("auth: {0}")]
    Auth(String),
    #[error("validation: {0}")]
    Validation(String),
    #[error("persistence: {0}")]
    Persistence(String),
    #[error("injection: {0}")]
    Injection(String),
    #[error("transport: {0}")]
    Transport(String),
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),
    #[error("fatal: {0}")]
    Fatal(String),
}

impl AppError {
    pub fn status(&self) -> Status {
        match self {
            AppError::Auth(_) => Status::Forbidden,
            AppError::Validation(_) => Status::BadRequest,
            AppError::Persistence(_) => Status::InternalServerError,
            AppError::Injection(_) => Status::InternalServerError,
            AppError::Transport(_) => Status::GatewayTimeout,
            AppError::ResourceExhausted(_) => Status::Conflict,
            AppError::Fatal(_) => Status::InternalServerError,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Auth(_) => "auth",
            AppError::Validation(_) => "validation",
            AppError::Persistence(_) => "persistence",
            AppError::Injection(_) => "injection",
            AppError::Transport(_) => "transport",
            AppError::ResourceExhausted(_) => "resource_exhausted",
            AppError::Fatal(_) => "fatal",
        }
    }

    pub fn body(&self) -> serde_json::Value {
        serde_json::json!({ "error": self.to_string(), "kind": self.kind() })
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(e: rusqlite::Error) -> Self {
        AppError::Persistence(e.to_string())
    }
}

impl<'r> Responder<'r, 'static> for AppError {
    fn respond_to(self, request: &'r Request<'_>) -> rocket::response::Result<'static> {
        let body = self.body().to_string();
        let status = self.status();
        Response::build_from(Json(()).respond_to(request)?)
            .status(status)
            .sized_body(body.len(), Cursor::new(body))
            .header(rocket::http::ContentType::JSON)
            .ok()
    }
}
