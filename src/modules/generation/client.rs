use crate::api::error;
use crate::modules::generation::model::PredictionInput;

/// Seam to the hosted generation API: `run` resolves a model and input
/// mapping to output image URLs, `fetch` pulls the bytes of one output.
#[async_trait::async_trait]
pub trait GenerationClient {
    async fn run(
        &self,
        model: &str,
        input: &PredictionInput,
    ) -> Result<Vec<String>, error::SystemError>;

    async fn fetch(&self, url: &str) -> Result<Vec<u8>, error::SystemError>;
}
