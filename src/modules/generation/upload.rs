use std::path::{Path, PathBuf};

use actix_multipart::{Field, Multipart};
use futures_util::TryStreamExt;
use uuid::Uuid;

use crate::api::error;
use crate::constants::{ALLOWED_UPLOAD_EXTENSIONS, MAX_CONTENT_LENGTH};
use crate::modules::generation::model::Img2ImgModel;
use crate::utils::sanitize_filename;

pub const MAX_UPLOAD_IMAGES: usize = 3;

/// One source image staged on disk for the duration of a request.
#[derive(Debug)]
pub struct StagedFile {
    pub original_name: String,
    pub path: PathBuf,
}

#[derive(Debug)]
enum UploadSlot {
    Missing,
    /// The field arrived without a filename, which is what browsers send
    /// for a file input left empty.
    Unnamed,
    Staged(StagedFile),
}

/// The staged uploads of one request. The handler calls `cleanup` on its
/// way out, so staged files are gone before the response leaves on success,
/// validation failure, and upstream error alike; dropping the batch removes
/// anything still staged as a backstop. Removal problems are logged, never
/// raised.
#[derive(Debug)]
pub struct UploadBatch {
    slots: Vec<UploadSlot>,
}

impl UploadBatch {
    fn new() -> Self {
        Self {
            slots: (0..MAX_UPLOAD_IMAGES).map(|_| UploadSlot::Missing).collect(),
        }
    }

    fn is_open(&self, index: usize) -> bool {
        index < MAX_UPLOAD_IMAGES && matches!(self.slots[index], UploadSlot::Missing)
    }

    /// Select the first `count` staged files, checking that each slot was
    /// actually filled and carries an allowed extension.
    pub fn select(&self, count: usize) -> Result<Vec<&StagedFile>, error::Error> {
        let mut selected = Vec::with_capacity(count);
        for index in 0..count.min(MAX_UPLOAD_IMAGES) {
            match &self.slots[index] {
                UploadSlot::Missing => {
                    return Err(error::Error::bad_request(format!(
                        "Image {} not found",
                        index + 1
                    )));
                }
                UploadSlot::Unnamed => {
                    return Err(error::Error::bad_request(format!(
                        "Image {} is empty",
                        index + 1
                    )));
                }
                UploadSlot::Staged(file) => {
                    if !allowed_file(&file.original_name) {
                        return Err(error::Error::bad_request(format!(
                            "Image {} has an unsupported format, allowed formats are PNG, JPG, JPEG and WEBP",
                            index + 1
                        )));
                    }
                    selected.push(file);
                }
            }
        }
        Ok(selected)
    }

    /// Remove every staged file and empty the slots, so the blocking `Drop`
    /// backstop has nothing left to do on the normal request path.
    pub async fn cleanup(&mut self) {
        for slot in &mut self.slots {
            if let UploadSlot::Staged(file) = slot {
                if let Err(err) = tokio::fs::remove_file(&file.path).await {
                    if err.kind() != std::io::ErrorKind::NotFound {
                        log::warn!(
                            "Failed to remove staged upload {}: {}",
                            file.path.display(),
                            err
                        );
                    }
                }
            }
            *slot = UploadSlot::Missing;
        }
    }
}

impl Drop for UploadBatch {
    fn drop(&mut self) {
        for slot in &self.slots {
            if let UploadSlot::Staged(file) = slot {
                if let Err(err) = std::fs::remove_file(&file.path) {
                    if err.kind() != std::io::ErrorKind::NotFound {
                        log::warn!(
                            "Failed to remove staged upload {}: {}",
                            file.path.display(),
                            err
                        );
                    }
                }
            }
        }
    }
}

/// Check a filename's extension against the allowed upload set.
pub fn allowed_file(filename: &str) -> bool {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            ALLOWED_UPLOAD_EXTENSIONS
                .iter()
                .any(|allowed| ext.eq_ignore_ascii_case(allowed))
        })
        .unwrap_or(false)
}

/// Drain the multipart stream once. Text fields become the form model,
/// every `image{i}` file field with `i < 3` is staged under a unique name
/// in `upload_dir`, and anything else (unknown names, indexes past the
/// third image, duplicates) is read off the wire and ignored.
pub async fn collect(
    payload: &mut Multipart,
    upload_dir: &Path,
) -> Result<(Img2ImgModel, UploadBatch), error::Error> {
    let mut batch = UploadBatch::new();
    match collect_fields(payload, upload_dir, &mut batch).await {
        Ok(form) => Ok((form, batch)),
        Err(err) => {
            batch.cleanup().await;
            Err(err)
        }
    }
}

async fn collect_fields(
    payload: &mut Multipart,
    upload_dir: &Path,
    batch: &mut UploadBatch,
) -> Result<Img2ImgModel, error::Error> {
    let mut prompt = String::new();
    let mut model: Option<String> = None;
    let mut image_count_raw: Option<String> = None;
    let mut staged_bytes: usize = 0;

    while let Some(mut field) = payload.try_next().await.map_err(bad_payload)? {
        let (name, filename) = match field.content_disposition() {
            Some(cd) => (
                cd.get_name().unwrap_or_default().to_string(),
                cd.get_filename().map(|f| f.to_string()),
            ),
            None => (String::new(), None),
        };

        match name.as_str() {
            "prompt" => prompt = read_text(&mut field).await?.trim().to_string(),
            "model" => model = Some(read_text(&mut field).await?.trim().to_string()),
            "imageCount" => {
                image_count_raw = Some(read_text(&mut field).await?.trim().to_string())
            }
            other => match image_field_index(other) {
                Some(index) if batch.is_open(index) => {
                    let Some(original_name) = filename.filter(|f| !f.is_empty()) else {
                        drain(&mut field).await?;
                        batch.slots[index] = UploadSlot::Unnamed;
                        continue;
                    };
                    let bytes = read_bytes(&mut field).await?;
                    staged_bytes += bytes.len();
                    if staged_bytes > MAX_CONTENT_LENGTH {
                        return Err(error::Error::bad_request(
                            "Uploaded images exceed the 16MB request limit",
                        ));
                    }
                    let staged = stage_file(upload_dir, index, &original_name, &bytes).await?;
                    batch.slots[index] = UploadSlot::Staged(staged);
                }
                _ => drain(&mut field).await?,
            },
        }
    }

    let image_count = match image_count_raw.as_deref() {
        None | Some("") => 1,
        Some(raw) => raw
            .parse::<u32>()
            .map_err(|_| error::Error::bad_request("imageCount must be a number"))?,
    };

    Ok(Img2ImgModel {
        prompt,
        model: model.filter(|m| !m.is_empty()),
        image_count,
    })
}

/// Map `image0`/`image1`/... field names to their slot index.
fn image_field_index(name: &str) -> Option<usize> {
    name.strip_prefix("image")
        .and_then(|suffix| suffix.parse::<usize>().ok())
}

async fn stage_file(
    upload_dir: &Path,
    index: usize,
    original_name: &str,
    bytes: &[u8],
) -> Result<StagedFile, error::Error> {
    let staged_name = format!(
        "{}_{}_{}",
        Uuid::now_v7(),
        index,
        sanitize_filename(original_name)
    );
    let path = upload_dir.join(staged_name);
    tokio::fs::write(&path, bytes)
        .await
        .map_err(error::SystemError::from)?;
    Ok(StagedFile {
        original_name: original_name.to_string(),
        path,
    })
}

async fn read_bytes(field: &mut Field) -> Result<Vec<u8>, error::Error> {
    let mut bytes = Vec::new();
    while let Some(chunk) = field.try_next().await.map_err(bad_payload)? {
        bytes.extend_from_slice(&chunk);
        if bytes.len() > MAX_CONTENT_LENGTH {
            return Err(error::Error::bad_request(
                "Uploaded images exceed the 16MB request limit",
            ));
        }
    }
    Ok(bytes)
}

async fn read_text(field: &mut Field) -> Result<String, error::Error> {
    let bytes = read_bytes(field).await?;
    String::from_utf8(bytes)
        .map_err(|_| error::Error::bad_request("Form fields must be valid UTF-8"))
}

async fn drain(field: &mut Field) -> Result<(), error::Error> {
    while field.try_next().await.map_err(bad_payload)?.is_some() {}
    Ok(())
}

fn bad_payload(err: actix_multipart::MultipartError) -> error::Error {
    error::Error::bad_request(format!("Invalid multipart payload: {}", err))
}
