use std::path::{Path, PathBuf};

use crate::api::error;

/// Filesystem layout the service works against: a scratch directory for
/// staged uploads and a durable directory for generated images. Prepared
/// once at startup and passed into the services that need it.
#[derive(Debug, Clone)]
pub struct Storage {
    upload_dir: PathBuf,
    generated_dir: PathBuf,
}

impl Storage {
    pub async fn prepare(
        upload_dir: impl AsRef<Path>,
        generated_dir: impl AsRef<Path>,
    ) -> Result<Self, error::SystemError> {
        tokio::fs::create_dir_all(upload_dir.as_ref()).await?;
        tokio::fs::create_dir_all(generated_dir.as_ref()).await?;

        // Canonical paths so the gallery guard compares real prefixes.
        let upload_dir = tokio::fs::canonicalize(upload_dir.as_ref()).await?;
        let generated_dir = tokio::fs::canonicalize(generated_dir.as_ref()).await?;

        Ok(Self { upload_dir, generated_dir })
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    pub fn generated_dir(&self) -> &Path {
        &self.generated_dir
    }
}
