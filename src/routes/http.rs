//! GET `/`, file upload, and the two best-effort desktop-integration
//! endpoints (§4.5, §6). These are the only plain HTTP surface on the hub's
//! main port — everything else is WebSocket or MCP.

use crate::auth::{Authenticated, SessionToken};
use crate::config::Config;
use crate::error::AppError;
use crate::models::{FileInfo, FileUpload};
use rocket::response::content::RawHtml;
use rocket::serde::json::Json;
use rocket::{get, post, State};
use std::path::{Path, PathBuf};

const MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;

#[get("/")]
pub fn root(token: &State<SessionToken>) -> RawHtml<String> {
    // Out of scope per §1/§6: the real browser UI is an external
    // collaborator. This is a static placeholder with the token
    // interpolated so a bare `curl localhost:8300/` still works end to end.
    RawHtml(format!(
        "<!doctype html><html><head><title>agentchat-hub</title></head>\
         <body><p>agentchat-hub is running.</p>\
         <script>window.AGENTCHAT_TOKEN = \"{}\";</script></body></html>",
        token.0
    ))
}

#[post("/api/upload", format = "json", data = "<body>")]
pub fn upload(_auth: Authenticated, config: &State<std::sync::Arc<Config>>, body: Json<FileUpload>) -> Result<Json<FileInfo>, AppError> {
    use base64::Engine;
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(&body.data)
        .map_err(|e| AppError::Validation(format!("invalid base64: {e}")))?;
    if decoded.len() > MAX_UPLOAD_BYTES {
        return Err(AppError::Validation("file exceeds 5MB limit".into()));
    }
    let uploads_dir = PathBuf::from(&config.data_dir).join("uploads");
    std::fs::create_dir_all(&uploads_dir)
        .map_err(|e| AppError::Persistence(format!("creating uploads dir: {e}")))?;

    let safe_name = sanitize_filename(&body.filename);
    let stored_name = format!("{}-{}", uuid::Uuid::new_v4().simple(), safe_name);
    let path = uploads_dir.join(&stored_name);
    std::fs::write(&path, &decoded).map_err(|e| AppError::Persistence(format!("writing upload: {e}")))?;

    Ok(Json(FileInfo {
        path: path.to_string_lossy().to_string(),
        name: body.filename.clone(),
        url: format!("/uploads/{stored_name}"),
    }))
}

fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_alphanumeric() || c == '.' || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

#[derive(Debug, rocket::serde::Deserialize)]
pub struct OpenPathRequest {
    pub path: String,
}

/// §4.5, §6: accepts only paths the server can statically classify as
/// local (no scheme, no `..` traversal outside the data dir), then asks the
/// host desktop to reveal it — best-effort, platform-dependent, and never
/// fatal if the desktop has no file manager (headless CI, containers).
#[post("/api/open-path", format = "json", data = "<body>")]
pub async fn open_path(_auth: Authenticated, body: Json<OpenPathRequest>) -> Result<Json<serde_json::Value>, AppError> {
    let candidate = PathBuf::from(&body.path);
    if !is_local_path(&candidate) {
        return Err(AppError::Validation("path is not a classifiable local path".into()));
    }
    reveal_path(&candidate).await;
    Ok(Json(serde_json::json!({ "ok": true })))
}

fn is_local_path(path: &Path) -> bool {
    if path.to_string_lossy().contains("://") {
        return false;
    }
    !path.components().any(|c| matches!(c, std::path::Component::ParentDir))
}

#[cfg(target_os = "macos")]
async fn reveal_path(path: &Path) {
    let _ = tokio::process::Command::new("open").arg("-R").arg(path).status().await;
}

#[cfg(target_os = "linux")]
async fn reveal_path(path: &Path) {
    let _ = tokio::process::Command::new("xdg-open").arg(path).status().await;
}

#[cfg(target_os = "windows")]
async fn reveal_path(path: &Path) {
    let _ = tokio::process::Command::new("explorer").arg(format!("/select,{}", path.display())).status().await;
}

#[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
async fn reveal_path(_path: &Path) {}

/// Best-effort: brings an agent's `tmux` session to focus. Only meaningful
/// when the hub itself runs attached inside the same tmux server (§4.6,
/// §6 Host desktop: "accepts a single 'reveal path' operation"-style
/// best-effort contract applied to session focus).
#[post("/api/open-session/<agent>")]
pub async fn open_session(_auth: Authenticated, agent: &str) -> Json<serde_json::Value> {
    let session_name = format!("agentchattr-{agent}");
    let status = tokio::process::Command::new("tmux")
        .args(["switch-client", "-t", &session_name])
        .status()
        .await;
    Json(serde_json::json!({ "ok": matches!(status, Ok(s) if s.success()) }))
}
