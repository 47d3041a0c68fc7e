pub const DEFAULT_MODEL: &str = "google/nano-banana";

pub const UPLOAD_DIR: &str = "uploads";
pub const GENERATED_DIR: &str = "static/images";

/// Extensions accepted for uploaded source images.
pub const ALLOWED_UPLOAD_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "webp"];
/// Extensions the gallery lists (generated output is always png).
pub const GALLERY_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// Aggregate size cap for the staged uploads of one request.
pub const MAX_CONTENT_LENGTH: usize = 16 * 1024 * 1024; // 16MB

pub const DEV_SECRET_KEY: &str = "dev-secret-key-change-in-production";

pub struct Env {
    pub replicate_api_token: String,
    pub secret_key: String,
    pub environment: String,
    pub ip: String,
    pub port: u16,
}

impl Env {
    fn new() -> Self {
        let replicate_api_token = std::env::var("REPLICATE_API_TOKEN")
            .expect("REPLICATE_API_TOKEN must be set in .env file or environment variable");

        let secret_key =
            std::env::var("SECRET_KEY").unwrap_or_else(|_| DEV_SECRET_KEY.to_string());
        let environment =
            std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let ip = std::env::var("IP").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = std::env::var("PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse::<u16>()
            .expect("PORT must be a valid u16 integer");

        Env { replicate_api_token, secret_key, environment, ip, port }
    }

    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }
}

impl Default for Env {
    fn default() -> Self {
        Self::new()
    }
}
