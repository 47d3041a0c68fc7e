use std::path::Path;
use std::sync::Arc;

use base64::Engine as _;

use crate::api::error;
use crate::configs::Storage;
use crate::modules::generation::model::{InvokeOutcome, PredictionInput};
use crate::modules::generation::upload::StagedFile;
use crate::utils::unique_image_name;

/// Runs generations against the API client and persists the outputs into
/// the gallery directory.
#[derive(Clone)]
pub struct GenerationService<C>
where
    C: crate::modules::generation::client::GenerationClient + Send + Sync,
{
    client: Arc<C>,
    storage: Storage,
}

impl<C> GenerationService<C>
where
    C: crate::modules::generation::client::GenerationClient + Send + Sync,
{
    pub fn new(client: Arc<C>, storage: Storage) -> Self {
        Self { client, storage }
    }

    pub fn upload_dir(&self) -> &Path {
        self.storage.upload_dir()
    }

    /// Generate from a prompt alone and persist the first output.
    pub async fn text_to_image(
        &self,
        prompt: &str,
        model: &str,
    ) -> Result<String, error::SystemError> {
        let (urls, _) = self.run_with_fallback(model, prompt, &[]).await?;
        self.persist_first(&urls, "text2img").await
    }

    /// Generate from a prompt plus staged source images and persist the
    /// first output. Returns the stored filename together with how the
    /// invocation concluded, full or degraded.
    pub async fn image_to_image(
        &self,
        prompt: &str,
        model: &str,
        sources: &[&StagedFile],
    ) -> Result<(String, InvokeOutcome), error::SystemError> {
        let images = encode_sources(sources).await?;
        let (urls, outcome) = self.run_with_fallback(model, prompt, &images).await?;
        let prefix = format!("img2img_{}imgs", sources.len());
        let filename = self.persist_first(&urls, &prefix).await?;
        Ok((filename, outcome))
    }

    /// Invoke the generation API. Two or three images go out in a single
    /// call first; if that call fails the request is retried with just the
    /// first image, since not every model accepts the extra image keys.
    async fn run_with_fallback(
        &self,
        model: &str,
        prompt: &str,
        images: &[String],
    ) -> Result<(Vec<String>, InvokeOutcome), error::SystemError> {
        let input = PredictionInput::with_images(prompt, images);
        if images.len() <= 1 {
            let urls = self.client.run(model, &input).await?;
            return Ok((urls, InvokeOutcome::Full { images: images.len() }));
        }

        match self.client.run(model, &input).await {
            Ok(urls) => Ok((urls, InvokeOutcome::Full { images: images.len() })),
            Err(err) => {
                log::warn!(
                    "Multi-image call failed, retrying with the first image only: {}",
                    err
                );
                let retry = PredictionInput::with_images(prompt, &images[..1]);
                let urls = self.client.run(model, &retry).await?;
                Ok((urls, InvokeOutcome::DegradedToSingle))
            }
        }
    }

    /// Download the first output and write it into the gallery directory
    /// under a fresh timestamped name.
    async fn persist_first(
        &self,
        urls: &[String],
        prefix: &str,
    ) -> Result<String, error::SystemError> {
        let first = urls.first().ok_or_else(|| {
            error::SystemError::upstream("prediction returned no output images")
        })?;
        let bytes = self.client.fetch(first).await?;

        let filename = unique_image_name(prefix);
        tokio::fs::write(self.storage.generated_dir().join(&filename), &bytes).await?;
        Ok(filename)
    }
}

/// Encode staged files as data URLs for the API's image inputs.
async fn encode_sources(sources: &[&StagedFile]) -> Result<Vec<String>, error::SystemError> {
    let mut images = Vec::with_capacity(sources.len());
    for source in sources {
        let bytes = tokio::fs::read(&source.path).await?;
        let mime = mime_guess::from_path(&source.path).first_or_octet_stream();
        images.push(format!(
            "data:{};base64,{}",
            mime.essence_str(),
            base64::engine::general_purpose::STANDARD.encode(&bytes)
        ));
    }
    Ok(images)
}
