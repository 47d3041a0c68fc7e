use actix_web::{self, middleware::Logger, web, App, HttpResponse, HttpServer};
use std::sync::{Arc, LazyLock};

use crate::{
    configs::Storage,
    modules::{
        gallery::service::GalleryService,
        generation::{client_replicate::ReplicateClient, service::GenerationService},
    },
    utils::GuardedDir,
};

mod api;
mod configs;
mod constants;
mod modules;
#[cfg(test)]
mod test;
mod utils;

pub static ENV: LazyLock<constants::Env> = LazyLock::new(|| {
    dotenvy::dotenv().ok();
    let default_level = if std::env::var("APP_ENV").as_deref() == Ok("production") {
        "info"
    } else {
        "debug"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();
    log::info!("Environment variables loaded from .env file");
    constants::Env::default()
});

#[actix_web::get("/")]
async fn index() -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(include_str!("../static/index.html"))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    if !ENV.is_development() && ENV.secret_key == constants::DEV_SECRET_KEY {
        log::warn!("SECRET_KEY is the development default, set a real value in production");
    }

    let storage = Storage::prepare(constants::UPLOAD_DIR, constants::GENERATED_DIR)
        .await
        .map_err(|_| std::io::Error::other("Storage preparation error"))?;
    log::info!("Upload directory: {}", storage.upload_dir().display());
    log::info!("Generated images directory: {}", storage.generated_dir().display());

    let client = ReplicateClient::new(ENV.replicate_api_token.clone())
        .map_err(|_| std::io::Error::other("Generation client error"))?;
    let generation_service = GenerationService::new(Arc::new(client), storage.clone());

    let gallery_service = GalleryService::new(
        GuardedDir::new(storage.generated_dir())
            .map_err(|_| std::io::Error::other("Gallery guard error"))?,
    );

    println!("Starting server at http://{}:{}", ENV.ip.as_str(), ENV.port);
    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .app_data(web::Data::new(generation_service.clone()))
            .app_data(web::Data::new(gallery_service.clone()))
            .service(index)
            .configure(modules::generation::route::configure::<ReplicateClient>)
            .configure(modules::gallery::route::configure)
    })
    .bind((ENV.ip.as_str(), ENV.port))?
    .workers(2)
    .run()
    .await
}
