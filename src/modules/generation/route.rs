use actix_web::web;

// Generic handlers cannot use the route attribute macros, so the two
// generation endpoints are registered manually.
pub fn configure<C>(cfg: &mut web::ServiceConfig)
where
    C: crate::modules::generation::client::GenerationClient + Send + Sync + 'static,
{
    cfg.service(
        web::resource("/generate")
            .route(web::post().to(crate::modules::generation::handle::generate_image::<C>)),
    )
    .service(
        web::resource("/img2img")
            .route(web::post().to(crate::modules::generation::handle::image_to_image::<C>)),
    );
}
