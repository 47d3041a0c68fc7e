use actix_web::{web, FromRequest};
use chrono::Local;
use futures_util::future::LocalBoxFuture;
use serde::{de::Deserializer, Deserialize};
use std::path::{Component, Path, PathBuf};
use uuid::Uuid;
use validator::Validate;

use crate::api::error;

/// Deserialize a string with surrounding whitespace removed, so validation
/// limits apply to the trimmed value.
pub fn trimmed_string<'de, D>(de: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    String::deserialize(de).map(|s| s.trim().to_string())
}

/// Keep at most `max` characters of `s` (char-safe, for log lines).
pub fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// Reduce an untrusted filename to a safe single component: directory parts
/// are dropped, anything outside `[A-Za-z0-9._-]` becomes `_`, and leading
/// dots are stripped. May return an empty string.
pub fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or("");
    let cleaned: String = base
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
        .collect();
    cleaned.trim_start_matches('.').to_string()
}

/// Build a `{prefix}_{yyyymmdd_HHMMSS}_{8-hex}.png` name: sortable by
/// timestamp, collision-resistant through the random suffix.
pub fn unique_image_name(prefix: &str) -> String {
    let timestamp = Local::now().format("%Y%m%d_%H%M%S");
    let unique_id = Uuid::new_v4().simple().to_string();
    format!("{}_{}_{}.png", prefix, timestamp, &unique_id[..8])
}

/// A directory root plus the path math that keeps caller-supplied filenames
/// inside it. Constructed once per guarded directory and reused for every
/// download/delete/serve lookup.
#[derive(Debug, Clone)]
pub struct GuardedDir {
    root: PathBuf,
}

impl GuardedDir {
    /// The root must already exist; it is canonicalized so the prefix check
    /// in `resolve` compares real paths.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, error::SystemError> {
        let root = std::fs::canonicalize(root.into())?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a caller-supplied filename to a path inside the root. Names
    /// that are empty or not a single normal path component (separators,
    /// `..`, absolute paths) are Forbidden before any filesystem access.
    pub fn resolve(&self, name: &str) -> Result<PathBuf, error::SystemError> {
        let name = name.trim();
        if name.is_empty() || !is_single_component(name) {
            log::warn!("Rejected illegal file path: {}", truncate_chars(name, 128));
            return Err(error::SystemError::forbidden("Illegal file path"));
        }

        let candidate = self.root.join(name);
        if !candidate.starts_with(&self.root) {
            log::warn!("Resolved path escaped the guarded root: {}", truncate_chars(name, 128));
            return Err(error::SystemError::forbidden("Illegal file path"));
        }

        Ok(candidate)
    }
}

fn is_single_component(name: &str) -> bool {
    if name.contains('\\') {
        return false;
    }
    let mut components = Path::new(name).components();
    matches!((components.next(), components.next()), (Some(Component::Normal(_)), None))
}

pub struct ValidatedJson<T>(pub T);

impl<T> FromRequest for ValidatedJson<T>
where
    T: Validate + serde::de::DeserializeOwned + 'static,
{
    type Error = error::Error;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(
        req: &actix_web::HttpRequest,
        payload: &mut actix_web::dev::Payload,
    ) -> Self::Future {
        let fut = web::Json::<T>::from_request(req, payload);

        Box::pin(async move {
            let json = fut.await.map_err(|e| error::Error::BadRequest(e.to_string().into()))?;
            let model = json.into_inner();
            model.validate().map_err(|e| error::Error::BadRequest(e.to_string().into()))?;
            Ok(ValidatedJson(model))
        })
    }
}
