#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use actix_web::http::header;
use actix_web::http::StatusCode;
use actix_web::{test, web, App};

use crate::api::error;
use crate::configs::Storage;
use crate::modules::gallery::service::GalleryService;
use crate::modules::generation::client::GenerationClient;
use crate::modules::generation::model::PredictionInput;
use crate::modules::generation::service::GenerationService;
use crate::utils::GuardedDir;

pub const STUB_IMAGE_BYTES: &[u8] = b"stub-image-bytes";
const BOUNDARY: &str = "----test-boundary-0a1b2c3d";

/// In-process stand-in for the generation API. Records the image count of
/// every `run` call so tests can assert on the fallback sequence.
#[derive(Clone)]
pub struct StubClient {
    fail_multi: bool,
    fail_all: bool,
    calls: Arc<Mutex<Vec<usize>>>,
}

impl StubClient {
    pub fn ok() -> Self {
        Self {
            fail_multi: false,
            fail_all: false,
            calls: Arc::default(),
        }
    }

    pub fn failing_multi() -> Self {
        Self {
            fail_multi: true,
            ..Self::ok()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_all: true,
            ..Self::ok()
        }
    }

    pub fn calls(&self) -> Arc<Mutex<Vec<usize>>> {
        Arc::clone(&self.calls)
    }
}

#[async_trait::async_trait]
impl GenerationClient for StubClient {
    async fn run(
        &self,
        _model: &str,
        input: &PredictionInput,
    ) -> Result<Vec<String>, error::SystemError> {
        let images = input.image_count();
        self.calls.lock().unwrap().push(images);
        if self.fail_all || (self.fail_multi && images > 1) {
            return Err(error::SystemError::upstream("stub rejected the call"));
        }
        Ok(vec!["https://stub.invalid/output_0.png".to_string()])
    }

    async fn fetch(&self, _url: &str) -> Result<Vec<u8>, error::SystemError> {
        Ok(STUB_IMAGE_BYTES.to_vec())
    }
}

pub struct TestContext {
    pub dir: tempfile::TempDir,
    pub storage: Storage,
    pub generation: GenerationService<StubClient>,
    pub gallery: GalleryService,
}

pub async fn test_context(stub: StubClient) -> TestContext {
    let dir = tempfile::tempdir().unwrap();
    let storage = Storage::prepare(dir.path().join("uploads"), dir.path().join("static/images"))
        .await
        .unwrap();
    let generation = GenerationService::new(Arc::new(stub), storage.clone());
    let gallery = GalleryService::new(GuardedDir::new(storage.generated_dir()).unwrap());
    TestContext {
        dir,
        storage,
        generation,
        gallery,
    }
}

pub enum Part<'a> {
    Text(&'a str, &'a str),
    File {
        name: &'a str,
        filename: &'a str,
        bytes: &'a [u8],
    },
}

/// Assemble a multipart/form-data body by hand; returns the content type
/// header value and the raw payload.
pub fn multipart_body(parts: &[Part<'_>]) -> (String, Vec<u8>) {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match part {
            Part::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name)
                        .as_bytes(),
                );
                body.extend_from_slice(value.as_bytes());
            }
            Part::File {
                name,
                filename,
                bytes,
            } => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
                        name, filename
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(bytes);
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    (format!("multipart/form-data; boundary={}", BOUNDARY), body)
}

fn dir_is_empty(path: &std::path::Path) -> bool {
    std::fs::read_dir(path)
        .map(|mut entries| entries.next().is_none())
        .unwrap_or(true)
}

macro_rules! init_app {
    ($ctx:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new($ctx.generation.clone()))
                .app_data(web::Data::new($ctx.gallery.clone()))
                .configure(crate::modules::generation::route::configure::<StubClient>)
                .configure(crate::modules::gallery::route::configure),
        )
        .await
    };
}

#[actix_web::test]
async fn test_generate_stores_and_reports_the_image() {
    let stub = StubClient::ok();
    let calls = stub.calls();
    let ctx = test_context(stub).await;
    let app = init_app!(ctx);

    let req = test::TestRequest::post()
        .uri("/generate")
        .set_json(serde_json::json!({ "prompt": "  a cat in a hat  " }))
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::OK);

    let body: serde_json::Value = test::read_body_json(res).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["model"], "google/nano-banana");
    assert_eq!(body["prompt"], "a cat in a hat");

    let filename = body["filename"].as_str().unwrap();
    assert!(filename.starts_with("text2img_"));
    assert!(filename.ends_with(".png"));
    assert_eq!(body["image_url"], format!("/static/images/{}", filename));

    let stored = ctx.storage.generated_dir().join(filename);
    assert_eq!(std::fs::read(stored).unwrap(), STUB_IMAGE_BYTES);
    assert_eq!(calls.lock().unwrap().as_slice(), &[0]);
}

#[actix_web::test]
async fn test_generate_honors_the_model_field() {
    let ctx = test_context(StubClient::ok()).await;
    let app = init_app!(ctx);

    let req = test::TestRequest::post()
        .uri("/generate")
        .set_json(serde_json::json!({ "prompt": "a cat", "model": "some/other-model" }))
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::OK);

    let body: serde_json::Value = test::read_body_json(res).await;
    assert_eq!(body["model"], "some/other-model");
}

#[actix_web::test]
async fn test_generate_rejects_blank_and_missing_prompts() {
    let stub = StubClient::ok();
    let calls = stub.calls();
    let ctx = test_context(stub).await;
    let app = init_app!(ctx);

    for payload in [
        serde_json::json!({ "prompt": "   " }),
        serde_json::json!({}),
    ] {
        let req = test::TestRequest::post()
            .uri("/generate")
            .set_json(payload)
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);

        let body: serde_json::Value = test::read_body_json(res).await;
        assert!(body["error"].as_str().unwrap().contains("Prompt"));
    }
    assert!(calls.lock().unwrap().is_empty());
}

#[actix_web::test]
async fn test_generate_rejects_an_overlong_prompt() {
    let stub = StubClient::ok();
    let calls = stub.calls();
    let ctx = test_context(stub).await;
    let app = init_app!(ctx);

    let req = test::TestRequest::post()
        .uri("/generate")
        .set_json(serde_json::json!({ "prompt": "p".repeat(1001) }))
        .to_request();
    let res = test::call_service(&app, req).await;

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert!(calls.lock().unwrap().is_empty());
}

#[actix_web::test]
async fn test_img2img_sends_the_full_batch_and_cleans_up() {
    let stub = StubClient::ok();
    let calls = stub.calls();
    let ctx = test_context(stub).await;
    let app = init_app!(ctx);

    let (content_type, body) = multipart_body(&[
        Part::Text("prompt", "restyle these"),
        Part::Text("imageCount", "3"),
        Part::Text("unrelated", "ignored"),
        Part::File { name: "image0", filename: "a.png", bytes: b"a-bytes" },
        Part::File { name: "image1", filename: "b.jpg", bytes: b"b-bytes" },
        Part::File { name: "image2", filename: "c.webp", bytes: b"c-bytes" },
    ]);
    let req = test::TestRequest::post()
        .uri("/img2img")
        .insert_header((header::CONTENT_TYPE, content_type))
        .set_payload(body)
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::OK);

    let body: serde_json::Value = test::read_body_json(res).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["input_images"], 3);
    assert!(body["filename"].as_str().unwrap().starts_with("img2img_3imgs_"));

    assert_eq!(calls.lock().unwrap().as_slice(), &[3]);
    assert!(dir_is_empty(ctx.storage.upload_dir()));
}

#[actix_web::test]
async fn test_img2img_degrades_to_a_single_image_call() {
    let stub = StubClient::failing_multi();
    let calls = stub.calls();
    let ctx = test_context(stub).await;
    let app = init_app!(ctx);

    let (content_type, body) = multipart_body(&[
        Part::Text("prompt", "restyle these"),
        Part::Text("imageCount", "3"),
        Part::File { name: "image0", filename: "a.png", bytes: b"a-bytes" },
        Part::File { name: "image1", filename: "b.png", bytes: b"b-bytes" },
        Part::File { name: "image2", filename: "c.png", bytes: b"c-bytes" },
    ]);
    let req = test::TestRequest::post()
        .uri("/img2img")
        .insert_header((header::CONTENT_TYPE, content_type))
        .set_payload(body)
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::OK);

    let body: serde_json::Value = test::read_body_json(res).await;
    // The response still reports what the caller submitted.
    assert_eq!(body["input_images"], 3);
    assert_eq!(calls.lock().unwrap().as_slice(), &[3, 1]);
    assert!(dir_is_empty(ctx.storage.upload_dir()));
}

#[actix_web::test]
async fn test_img2img_upstream_failure_is_hidden_and_cleaned_up() {
    let ctx = test_context(StubClient::failing()).await;
    let app = init_app!(ctx);

    let (content_type, body) = multipart_body(&[
        Part::Text("prompt", "restyle this"),
        Part::Text("imageCount", "1"),
        Part::File { name: "image0", filename: "a.png", bytes: b"a-bytes" },
    ]);
    let req = test::TestRequest::post()
        .uri("/img2img")
        .insert_header((header::CONTENT_TYPE, content_type))
        .set_payload(body)
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);

    let body: serde_json::Value = test::read_body_json(res).await;
    assert_eq!(
        body["error"],
        "The generation service is temporarily unavailable, please try again later"
    );
    assert!(dir_is_empty(ctx.storage.upload_dir()));
    assert!(dir_is_empty(ctx.storage.generated_dir()));
}

#[actix_web::test]
async fn test_img2img_rejects_blank_and_overlong_prompts() {
    let stub = StubClient::ok();
    let calls = stub.calls();
    let ctx = test_context(stub).await;
    let app = init_app!(ctx);

    let overlong = "p".repeat(1001);
    for prompt in ["   ", overlong.as_str()] {
        let (content_type, body) = multipart_body(&[
            Part::Text("prompt", prompt),
            Part::Text("imageCount", "1"),
            Part::File { name: "image0", filename: "a.png", bytes: b"a-bytes" },
        ]);
        let req = test::TestRequest::post()
            .uri("/img2img")
            .insert_header((header::CONTENT_TYPE, content_type))
            .set_payload(body)
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);

        let body: serde_json::Value = test::read_body_json(res).await;
        assert!(body["error"].as_str().unwrap().contains("Prompt"));
    }
    assert!(calls.lock().unwrap().is_empty());
    assert!(dir_is_empty(ctx.storage.upload_dir()));
}

#[actix_web::test]
async fn test_img2img_rejects_disallowed_extensions() {
    let stub = StubClient::ok();
    let calls = stub.calls();
    let ctx = test_context(stub).await;
    let app = init_app!(ctx);

    let (content_type, body) = multipart_body(&[
        Part::Text("prompt", "restyle this"),
        Part::Text("imageCount", "1"),
        Part::File { name: "image0", filename: "script.exe", bytes: b"mz" },
    ]);
    let req = test::TestRequest::post()
        .uri("/img2img")
        .insert_header((header::CONTENT_TYPE, content_type))
        .set_payload(body)
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let body: serde_json::Value = test::read_body_json(res).await;
    assert!(body["error"].as_str().unwrap().contains("unsupported format"));
    assert!(calls.lock().unwrap().is_empty());
    assert!(dir_is_empty(ctx.storage.upload_dir()));
}

#[actix_web::test]
async fn test_img2img_rejects_a_missing_image_slot() {
    let ctx = test_context(StubClient::ok()).await;
    let app = init_app!(ctx);

    let (content_type, body) = multipart_body(&[
        Part::Text("prompt", "restyle these"),
        Part::Text("imageCount", "2"),
        Part::File { name: "image0", filename: "a.png", bytes: b"a-bytes" },
    ]);
    let req = test::TestRequest::post()
        .uri("/img2img")
        .insert_header((header::CONTENT_TYPE, content_type))
        .set_payload(body)
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let body: serde_json::Value = test::read_body_json(res).await;
    assert_eq!(body["error"], "Image 2 not found");
    assert!(dir_is_empty(ctx.storage.upload_dir()));
}

#[actix_web::test]
async fn test_img2img_rejects_an_out_of_range_image_count() {
    let stub = StubClient::ok();
    let calls = stub.calls();
    let ctx = test_context(stub).await;
    let app = init_app!(ctx);

    for count in ["0", "4"] {
        let (content_type, body) = multipart_body(&[
            Part::Text("prompt", "restyle these"),
            Part::Text("imageCount", count),
            Part::File { name: "image0", filename: "a.png", bytes: b"a-bytes" },
        ]);
        let req = test::TestRequest::post()
            .uri("/img2img")
            .insert_header((header::CONTENT_TYPE, content_type))
            .set_payload(body)
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST, "imageCount={}", count);
    }
    assert!(calls.lock().unwrap().is_empty());
    assert!(dir_is_empty(ctx.storage.upload_dir()));
}

#[actix_web::test]
async fn test_img2img_defaults_to_a_single_image() {
    let stub = StubClient::ok();
    let calls = stub.calls();
    let ctx = test_context(stub).await;
    let app = init_app!(ctx);

    let (content_type, body) = multipart_body(&[
        Part::Text("prompt", "restyle this"),
        Part::File { name: "image0", filename: "a.png", bytes: b"a-bytes" },
    ]);
    let req = test::TestRequest::post()
        .uri("/img2img")
        .insert_header((header::CONTENT_TYPE, content_type))
        .set_payload(body)
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::OK);

    let body: serde_json::Value = test::read_body_json(res).await;
    assert_eq!(body["input_images"], 1);
    assert_eq!(calls.lock().unwrap().as_slice(), &[1]);
}

#[actix_web::test]
async fn test_delete_traversal_is_forbidden() {
    let ctx = test_context(StubClient::ok()).await;
    std::fs::write(ctx.storage.generated_dir().join("keep.png"), b"keep").unwrap();
    let app = init_app!(ctx);

    let req = test::TestRequest::delete()
        .uri("/delete/../../etc/passwd")
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let body: serde_json::Value = test::read_body_json(res).await;
    assert_eq!(body["error"], "Illegal file path");
    assert!(ctx.storage.generated_dir().join("keep.png").exists());
}

#[actix_web::test]
async fn test_download_traversal_is_forbidden() {
    let ctx = test_context(StubClient::ok()).await;
    let app = init_app!(ctx);

    let req = test::TestRequest::get()
        .uri("/download/../../etc/passwd")
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

#[actix_web::test]
async fn test_download_returns_the_stored_bytes_as_attachment() {
    let ctx = test_context(StubClient::ok()).await;
    let name = "text2img_20250101_000000_aaaaaaaa.png";
    std::fs::write(ctx.storage.generated_dir().join(name), b"png-bytes").unwrap();
    let app = init_app!(ctx);

    let req = test::TestRequest::get()
        .uri(&format!("/download/{}", name))
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::OK);

    let disposition = res
        .headers()
        .get(header::CONTENT_DISPOSITION)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(disposition.contains("attachment"));
    assert!(disposition.contains(name));

    let body = test::read_body(res).await;
    assert_eq!(&body[..], b"png-bytes");
}

#[actix_web::test]
async fn test_download_of_a_missing_file_is_not_found() {
    let ctx = test_context(StubClient::ok()).await;
    let app = init_app!(ctx);

    let req = test::TestRequest::get()
        .uri("/download/missing.png")
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let body: serde_json::Value = test::read_body_json(res).await;
    assert_eq!(body["error"], "File not found");
}

#[actix_web::test]
async fn test_gallery_lists_images_newest_first() {
    let ctx = test_context(StubClient::ok()).await;
    let older = "text2img_20240101_000000_aaaaaaaa.png";
    let newer = "text2img_20250101_000000_bbbbbbbb.png";
    std::fs::write(ctx.storage.generated_dir().join(older), b"old").unwrap();
    std::fs::write(ctx.storage.generated_dir().join(newer), b"new").unwrap();
    std::fs::write(ctx.storage.generated_dir().join("readme.txt"), b"skip").unwrap();
    let app = init_app!(ctx);

    let req = test::TestRequest::get().uri("/gallery").to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::OK);

    let body: serde_json::Value = test::read_body_json(res).await;
    let images = body["images"].as_array().unwrap();
    assert_eq!(images.len(), 2);
    assert_eq!(images[0]["filename"], newer);
    assert_eq!(images[1]["filename"], older);
    assert_eq!(images[0]["url"], format!("/static/images/{}", newer));
    assert_eq!(images[0]["created"].as_str().unwrap().len(), 19);
}

#[actix_web::test]
async fn test_delete_removes_the_image_then_reports_not_found() {
    let ctx = test_context(StubClient::ok()).await;
    let name = "text2img_20250101_000000_aaaaaaaa.png";
    let stored = ctx.storage.generated_dir().join(name);
    std::fs::write(&stored, b"png-bytes").unwrap();
    let app = init_app!(ctx);

    let req = test::TestRequest::delete()
        .uri(&format!("/delete/{}", name))
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::OK);

    let body: serde_json::Value = test::read_body_json(res).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "Image deleted successfully");
    assert!(!stored.exists());

    let req = test::TestRequest::delete()
        .uri(&format!("/delete/{}", name))
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn test_generated_images_are_served_inline() {
    let ctx = test_context(StubClient::ok()).await;
    let name = "text2img_20250101_000000_aaaaaaaa.png";
    std::fs::write(ctx.storage.generated_dir().join(name), b"png-bytes").unwrap();
    let app = init_app!(ctx);

    let req = test::TestRequest::get()
        .uri(&format!("/static/images/{}", name))
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert!(res.headers().get(header::CONTENT_DISPOSITION).is_none());
    assert_eq!(
        res.headers().get(header::CONTENT_TYPE).unwrap(),
        "image/png"
    );

    let body = test::read_body(res).await;
    assert_eq!(&body[..], b"png-bytes");
}
