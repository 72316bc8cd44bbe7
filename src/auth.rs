//! Session-token security model (§4.5, §9). The token is generated once and
//! persisted flat under `data/session_token`, mirroring the trigger queue's
//! "any supervisor can consume it without opening a socket" design (§9).
//! `ACCESS_TOKEN` overrides the persisted value, matching teacher env-var
//! override conventions (`DATABASE_PATH`, `STATIC_DIR` in the original
//! `lib.rs`).

use crate::error::AppError;
use rocket::http::Status;
use rocket::request::{FromRequest, Outcome, Request};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Clone)]
pub struct SessionToken(pub String);

impl SessionToken {
    pub fn load_or_create(data_dir: &Path) -> Result<Self, AppError> {
        if let Ok(env_token) = std::env::var("ACCESS_TOKEN") {
            if !env_token.is_empty() {
                return Ok(SessionToken(env_token));
            }
        }
        let path = token_path(data_dir);
        if let Ok(existing) = fs::read_to_string(&path) {
            let trimmed = existing.trim().to_string();
            if !trimmed.is_empty() {
                return Ok(SessionToken(trimmed));
            }
        }
        let token = generate_token();
        fs::create_dir_all(data_dir)
            .map_err(|e| AppError::Fatal(format!("creating data dir: {e}")))?;
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, &token).map_err(|e| AppError::Fatal(format!("writing token: {e}")))?;
        fs::rename(&tmp, &path).map_err(|e| AppError::Fatal(format!("renaming token: {e}")))?;
        Ok(SessionToken(token))
    }

    pub fn matches(&self, candidate: &str) -> bool {
        // Constant-time-ish comparison is unnecessary here: the token never
        // leaves localhost and a timing side channel buys an attacker nothing
        // they couldn't get by just reading the flat file.
        self.0 == candidate
    }
}

fn token_path(data_dir: &Path) -> PathBuf {
    data_dir.join("session_token")
}

fn generate_token() -> String {
    format!(
        "{}{}",
        uuid::Uuid::new_v4().simple(),
        uuid::Uuid::new_v4().simple()
    )
}

/// Extracted from `?token=`, `X-Session-Token:`, or the WS query string.
pub struct PresentedToken(pub Option<String>);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for PresentedToken {
    type Error = ();

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        if let Some(header) = req.headers().get_one("X-Session-Token") {
            return Outcome::Success(PresentedToken(Some(header.to_string())));
        }
        if let Some(q) = req.uri().query() {
            for pair in q.as_str().split('&') {
                if let Some(val) = pair.strip_prefix("token=") {
                    return Outcome::Success(PresentedToken(Some(val.to_string())));
                }
            }
        }
        Outcome::Success(PresentedToken(None))
    }
}

/// Request guard that enforces the session token on every authenticated
/// endpoint (§4.5 auth middleware). Static assets are mounted outside this
/// guard's routes.
pub struct Authenticated;

#[rocket::async_trait]
impl<'r> FromRequest<'r> for Authenticated {
    type Error = AppError;

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let token = match req.guard::<&rocket::State<SessionToken>>().await {
            Outcome::Success(t) => t,
            _ => {
                return Outcome::Error((
                    Status::InternalServerError,
                    AppError::Fatal("session token not managed".into()),
                ))
            }
        };
        let presented = match req.guard::<PresentedToken>().await {
            Outcome::Success(p) => p,
            _ => PresentedToken(None),
        };
        match presented.0 {
            Some(candidate) if token.matches(&candidate) => Outcome::Success(Authenticated),
            _ => Outcome::Error((
                Status::Forbidden,
                AppError::Auth("missing or mismatched session token".into()),
            )),
        }
    }
}

/// §4.5 Origin check: browser requests must carry `http://localhost:*` or
/// `http://127.0.0.1:*`. A missing Origin header (non-browser clients) is
/// allowed through.
pub fn origin_allowed(origin: Option<&str>) -> bool {
    match origin {
        None => true,
        Some(o) => o.starts_with("http://localhost:") || o.starts_with("http://127.0.0.1:"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_check_accepts_loopback_and_missing() {
        assert!(origin_allowed(None));
        assert!(origin_allowed(Some("http://localhost:5173")));
        assert!(origin_allowed(Some("http://127.0.0.1:3000")));
        assert!(!origin_allowed(Some("http://evil.example:80")));
    }

    #[test]
    fn token_matches_exact() {
        let t = SessionToken("abc123".to_string());
        assert!(t.matches("abc123"));
        assert!(!t.matches("abc124"));
    }
}
