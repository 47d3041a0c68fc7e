use actix_files::NamedFile;
use actix_web::http::header::ContentDisposition;
use actix_web::{delete, get, web};

use crate::api::error;
use crate::modules::gallery::model::{DeleteResponse, GalleryResponse};
use crate::modules::gallery::service::GalleryService;

#[get("/gallery")]
pub async fn list_gallery(
    gallery_service: web::Data<GalleryService>,
) -> Result<web::Json<GalleryResponse>, error::Error> {
    let images = gallery_service.list().await?;
    Ok(web::Json(GalleryResponse { images }))
}

/// Serves stored images inline; the generate responses and the gallery
/// listing both link here. `NamedFile` streams the bytes from disk and
/// picks the content type from the extension.
#[get("/static/images/{filename:.*}")]
pub async fn serve_image(
    gallery_service: web::Data<GalleryService>,
    filename: web::Path<String>,
) -> Result<NamedFile, error::Error> {
    let path = gallery_service.locate(&filename).await?;
    let file = NamedFile::open_async(&path)
        .await
        .map_err(error::SystemError::from)?;
    Ok(file.disable_content_disposition())
}

#[get("/download/{filename:.*}")]
pub async fn download_image(
    gallery_service: web::Data<GalleryService>,
    filename: web::Path<String>,
) -> Result<NamedFile, error::Error> {
    let filename = filename.into_inner();
    let path = gallery_service.locate(&filename).await?;

    let download_name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or(filename);
    let file = NamedFile::open_async(&path)
        .await
        .map_err(error::SystemError::from)?;

    Ok(file.set_content_disposition(ContentDisposition::attachment(download_name)))
}

#[delete("/delete/{filename:.*}")]
pub async fn delete_image(
    gallery_service: web::Data<GalleryService>,
    filename: web::Path<String>,
) -> Result<web::Json<DeleteResponse>, error::Error> {
    gallery_service.delete(&filename).await?;
    Ok(web::Json(DeleteResponse {
        success: true,
        message: "Image deleted successfully".to_string(),
    }))
}
