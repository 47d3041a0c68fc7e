use std::path::PathBuf;
use std::time::SystemTime;

use chrono::{DateTime, Local};

use crate::api::error;
use crate::constants::GALLERY_EXTENSIONS;
use crate::modules::gallery::model::GalleryImage;
use crate::utils::GuardedDir;

/// Lists, serves and deletes stored images. Every caller-supplied filename
/// goes through the guarded directory, so nothing outside the gallery root
/// is ever touched.
#[derive(Clone)]
pub struct GalleryService {
    images: GuardedDir,
}

impl GalleryService {
    pub fn new(images: GuardedDir) -> Self {
        Self { images }
    }

    /// List stored images newest-first. Names carry a timestamp prefix, so
    /// descending name order matches recency for generated files.
    pub async fn list(&self) -> Result<Vec<GalleryImage>, error::SystemError> {
        let mut entries = match tokio::fs::read_dir(self.images.root()).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut images = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let filename = entry.file_name().to_string_lossy().to_string();
            if !has_gallery_extension(&filename) {
                continue;
            }
            let metadata = entry.metadata().await?;
            let created = metadata
                .created()
                .or_else(|_| metadata.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            images.push(GalleryImage {
                url: format!("/static/images/{}", filename),
                created: DateTime::<Local>::from(created)
                    .format("%Y-%m-%d %H:%M:%S")
                    .to_string(),
                filename,
            });
        }

        images.sort_by(|a, b| b.filename.cmp(&a.filename));
        Ok(images)
    }

    /// Resolve a caller-supplied filename against the guard, then require
    /// that the file actually exists. Download and inline serving hand the
    /// resolved path straight to a streaming file responder.
    pub async fn locate(&self, filename: &str) -> Result<PathBuf, error::SystemError> {
        let path = self.images.resolve(filename)?;
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Err(error::SystemError::not_found("File not found"));
        }
        Ok(path)
    }

    /// Delete a stored image.
    pub async fn delete(&self, filename: &str) -> Result<(), error::SystemError> {
        let path = self.locate(filename).await?;
        tokio::fs::remove_file(&path).await?;
        log::info!("Deleted image: {}", filename);
        Ok(())
    }
}

fn has_gallery_extension(filename: &str) -> bool {
    std::path::Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            GALLERY_EXTENSIONS
                .iter()
                .any(|allowed| ext.eq_ignore_ascii_case(allowed))
        })
        .unwrap_or(false)
}
