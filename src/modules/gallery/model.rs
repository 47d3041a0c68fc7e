use serde::Serialize;

/// One stored image as the gallery reports it.
#[derive(Debug, Clone, Serialize)]
pub struct GalleryImage {
    pub filename: String,
    pub url: String,
    pub created: String,
}

#[derive(Debug, Serialize)]
pub struct GalleryResponse {
    pub images: Vec<GalleryImage>,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub success: bool,
    pub message: String,
}
