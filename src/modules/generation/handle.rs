use actix_multipart::Multipart;
use actix_web::web;
use validator::Validate;

use crate::api::error;
use crate::constants::DEFAULT_MODEL;
use crate::modules::generation::model::{
    GenerateModel, GenerateResponse, Img2ImgModel, Img2ImgResponse, InvokeOutcome,
};
use crate::modules::generation::service::GenerationService;
use crate::modules::generation::upload;
use crate::utils::{truncate_chars, ValidatedJson};

pub async fn generate_image<C>(
    body: ValidatedJson<GenerateModel>,
    generation_service: web::Data<GenerationService<C>>,
) -> Result<web::Json<GenerateResponse>, error::Error>
where
    C: crate::modules::generation::client::GenerationClient + Send + Sync + 'static,
{
    let GenerateModel { prompt, model } = body.0;
    let model = model.unwrap_or_else(|| DEFAULT_MODEL.to_string());

    log::info!("Using model: {}", model);
    log::info!("Prompt: {}...", truncate_chars(&prompt, 100));

    let filename = generation_service.text_to_image(&prompt, &model).await?;

    Ok(web::Json(GenerateResponse {
        success: true,
        image_url: format!("/static/images/{}", filename),
        filename,
        prompt,
        model,
    }))
}

pub async fn image_to_image<C>(
    mut payload: Multipart,
    generation_service: web::Data<GenerationService<C>>,
) -> Result<web::Json<Img2ImgResponse>, error::Error>
where
    C: crate::modules::generation::client::GenerationClient + Send + Sync + 'static,
{
    let (form, mut batch) =
        upload::collect(&mut payload, generation_service.upload_dir()).await?;
    let model = form
        .model
        .clone()
        .unwrap_or_else(|| DEFAULT_MODEL.to_string());

    log::info!("Using model: {}", model);
    log::info!("Prompt: {}...", truncate_chars(&form.prompt, 100));

    // Staged files are removed before the response leaves, whatever the
    // outcome; dropping `batch` is only the backstop.
    let result = run_generation(&form, &batch, &model, generation_service.get_ref()).await;
    batch.cleanup().await;
    let (filename, outcome) = result?;

    if outcome == InvokeOutcome::DegradedToSingle {
        log::warn!("Multi-image request was degraded to a single-image call");
    }

    Ok(web::Json(Img2ImgResponse {
        success: true,
        image_url: format!("/static/images/{}", filename),
        filename,
        prompt: form.prompt,
        model,
        input_images: form.image_count,
    }))
}

async fn run_generation<C>(
    form: &Img2ImgModel,
    batch: &upload::UploadBatch,
    model: &str,
    generation_service: &GenerationService<C>,
) -> Result<(String, InvokeOutcome), error::Error>
where
    C: crate::modules::generation::client::GenerationClient + Send + Sync + 'static,
{
    form.validate()
        .map_err(|e| error::Error::bad_request(e.to_string()))?;
    let sources = batch.select(form.image_count as usize)?;
    log::info!("Input images: {}", sources.len());

    Ok(generation_service
        .image_to_image(&form.prompt, model, &sources)
        .await?)
}
