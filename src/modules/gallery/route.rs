use actix_web::web::ServiceConfig;

use crate::modules::gallery::handle::{delete_image, download_image, list_gallery, serve_image};

pub fn configure(cfg: &mut ServiceConfig) {
    cfg.service(list_gallery)
        .service(serve_image)
        .service(download_image)
        .service(delete_image);
}
