use serde::{Deserialize, Serialize};
use validator::Validate;

/// JSON body of `POST /generate`.
#[derive(Debug, Deserialize, Validate)]
pub struct GenerateModel {
    #[serde(default, deserialize_with = "crate::utils::trimmed_string")]
    #[validate(length(
        min = 1,
        max = 1000,
        message = "Prompt must be between 1 and 1000 characters"
    ))]
    pub prompt: String,
    pub model: Option<String>,
}

/// Text fields of the `POST /img2img` multipart form, validated with the
/// same rules as the JSON route once the stream has been drained.
#[derive(Debug, Validate)]
pub struct Img2ImgModel {
    #[validate(length(
        min = 1,
        max = 1000,
        message = "Prompt must be between 1 and 1000 characters"
    ))]
    pub prompt: String,
    pub model: Option<String>,
    #[validate(range(min = 1, max = 3, message = "Image count must be between 1 and 3"))]
    pub image_count: u32,
}

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub success: bool,
    pub image_url: String,
    pub filename: String,
    pub prompt: String,
    pub model: String,
}

#[derive(Debug, Serialize)]
pub struct Img2ImgResponse {
    pub success: bool,
    pub image_url: String,
    pub filename: String,
    pub prompt: String,
    pub model: String,
    pub input_images: u32,
}

/// Input mapping sent to the generation API. Multi-image models read the
/// `image`/`image2`/`image3` keys; absent keys are left out of the payload
/// entirely so single-image models see the plain shape they expect.
#[derive(Debug, Clone, Serialize)]
pub struct PredictionInput {
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image2: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image3: Option<String>,
}

impl PredictionInput {
    pub fn from_prompt(prompt: &str) -> Self {
        Self {
            prompt: prompt.to_string(),
            image: None,
            image2: None,
            image3: None,
        }
    }

    /// Attach up to three data-URL images to the prompt.
    pub fn with_images(prompt: &str, images: &[String]) -> Self {
        let mut input = Self::from_prompt(prompt);
        input.image = images.first().cloned();
        input.image2 = images.get(1).cloned();
        input.image3 = images.get(2).cloned();
        input
    }

    pub fn image_count(&self) -> usize {
        [&self.image, &self.image2, &self.image3]
            .iter()
            .filter(|image| image.is_some())
            .count()
    }
}

/// How a generation call concluded. Degradation is reported instead of
/// being swallowed so callers can log it or surface it later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvokeOutcome {
    /// The call went through with every requested image attached.
    Full { images: usize },
    /// The multi-image call failed and the retry used only the first image.
    DegradedToSingle,
}
