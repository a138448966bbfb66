use image::{Rgba, RgbaImage};
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use text_to_image_rust::codec;
use text_to_image_rust::overlay::{FontHandle, FontResolver};
use text_to_image_rust::providers::{GenerationRequest, ImageGenerationProvider, ProviderFuture};
use text_to_image_rust::server::{ServerState, router};
use text_to_image_rust::settings::Settings;
use text_to_image_rust::ImageApiError;

#[derive(Default)]
struct FakeProvider {
    calls: AtomicUsize,
    upstream_status: Option<u16>,
}

impl ImageGenerationProvider for FakeProvider {
    fn name(&self) -> &str {
        "fake"
    }

    fn generate<'a>(&'a self, request: &'a GenerationRequest) -> ProviderFuture<'a> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let result = match self.upstream_status {
            Some(status) => Err(ImageApiError::ProviderResponse {
                status,
                message: "upstream said no".to_string(),
            }),
            None => Ok((0..request.n())
                .map(|index| format!("https://images.test/{}/{}.png", request.size(), index))
                .collect()),
        };
        Box::pin(async move { result })
    }
}

struct TestServer {
    base: String,
    client: reqwest::Client,
    provider: Arc<FakeProvider>,
    background: Vec<u8>,
}

impl TestServer {
    async fn start(provider: FakeProvider) -> Self {
        let provider = Arc::new(provider);
        let fonts = FontResolver::new(vec![Box::new(FontHandle::Bitmap)]);
        let state =
            ServerState::with_fonts(Settings::default(), provider.clone(), fonts).expect("state");
        let background = state.default_background().to_vec();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            axum::serve(listener, router(Arc::new(state)))
                .await
                .expect("serve");
        });
        Self {
            base: format!("http://{}", addr),
            client: reqwest::Client::builder().no_proxy().build().expect("client"),
            provider,
            background,
        }
    }

    async fn post(&self, path: &str, body: Value) -> (u16, Value) {
        let response = self
            .client
            .post(format!("{}{}", self.base, path))
            .json(&body)
            .send()
            .await
            .expect("request");
        let status = response.status().as_u16();
        (status, response.json().await.expect("json body"))
    }

    fn provider_calls(&self) -> usize {
        self.provider.calls.load(Ordering::SeqCst)
    }
}

fn png_base64(image: RgbaImage) -> String {
    codec::to_base64(&codec::encode_png(image).unwrap())
}

#[tokio::test]
async fn health_reports_healthy_with_cors_headers() {
    let server = TestServer::start(FakeProvider::default()).await;
    let response = server
        .client
        .get(format!("{}/health", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(response.headers()["access-control-allow-origin"], "*");
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({"status": "healthy"}));
}

#[tokio::test]
async fn preflight_requests_are_answered_without_a_body() {
    let server = TestServer::start(FakeProvider::default()).await;
    let response = server
        .client
        .request(
            reqwest::Method::OPTIONS,
            format!("{}/images/add-text", server.base),
        )
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 204);
    assert!(response.headers().contains_key("access-control-allow-methods"));
}

#[tokio::test]
async fn root_names_the_app() {
    let server = TestServer::start(FakeProvider::default()).await;
    let body: Value = server
        .client
        .get(&server.base)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let message = body["message"].as_str().unwrap();
    assert!(message.contains("Text to Image API"), "{}", message);
}

#[tokio::test]
async fn too_many_images_is_rejected_before_the_provider() {
    let server = TestServer::start(FakeProvider::default()).await;
    let (status, body) = server
        .post("/images/generate", json!({"prompt": "a fox", "n": 11}))
        .await;
    assert_eq!(status, 400);
    assert!(body["detail"].as_str().unwrap().contains("between 1 and 10"));

    let (status, _) = server
        .post("/images/generate", json!({"prompt": "a fox", "size": "640x480"}))
        .await;
    assert_eq!(status, 400);
    assert_eq!(server.provider_calls(), 0);
}

#[tokio::test]
async fn prompts_are_forwarded_to_the_provider() {
    let server = TestServer::start(FakeProvider::default()).await;
    let (status, body) = server
        .post(
            "/images/generate",
            json!({"prompt": "a fox", "n": 2, "size": "512x512"}),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["prompt"], "a fox");
    assert_eq!(
        body["images"],
        json!([
            "https://images.test/512x512/0.png",
            "https://images.test/512x512/1.png"
        ])
    );
    assert_eq!(server.provider_calls(), 1);
}

#[tokio::test]
async fn provider_status_is_passed_through() {
    let server = TestServer::start(FakeProvider {
        upstream_status: Some(429),
        ..FakeProvider::default()
    })
    .await;
    let (status, body) = server
        .post("/images/generate", json!({"prompt": "a fox"}))
        .await;
    assert_eq!(status, 429);
    assert!(body["detail"].as_str().unwrap().contains("upstream said no"));
}

#[tokio::test]
async fn empty_prompt_without_text_returns_the_background_unmodified() {
    let server = TestServer::start(FakeProvider::default()).await;
    let (status, body) = server
        .post("/images/generate", json!({"prompt": ""}))
        .await;
    assert_eq!(status, 200);
    let images = body["images"].as_array().unwrap();
    assert_eq!(images.len(), 1);
    let bytes = codec::from_base64(images[0].as_str().unwrap()).unwrap();
    assert_eq!(bytes, server.background);
    assert_eq!(server.provider_calls(), 0);
}

#[tokio::test]
async fn empty_prompt_with_text_overlays_the_background() {
    let server = TestServer::start(FakeProvider::default()).await;
    let (status, body) = server
        .post("/images/generate", json!({"prompt": "", "text": "HELLO"}))
        .await;
    assert_eq!(status, 200);
    let bytes = codec::from_base64(body["images"][0].as_str().unwrap()).unwrap();
    assert_ne!(bytes, server.background);
    let rendered = codec::decode(&bytes).unwrap();
    let background = codec::decode(&server.background).unwrap();
    assert_eq!(rendered.dimensions(), background.dimensions());
    assert_ne!(rendered, background);
    assert_eq!(server.provider_calls(), 0);
}

#[tokio::test]
async fn add_text_draws_panel_and_text() {
    let server = TestServer::start(FakeProvider::default()).await;
    let source = png_base64(RgbaImage::from_pixel(200, 120, Rgba([0, 0, 0, 255])));
    let (status, body) = server
        .post(
            "/images/add-text",
            json!({
                "image_source": source,
                "text": "HI",
                "font_size": 20,
                "position": [30, 30],
                "align": "left",
                "opacity": 1.0,
                "bg_color": [255, 0, 0],
                "bg_opacity": 1.0,
                "border_radius": 0
            }),
        )
        .await;
    assert_eq!(status, 200, "{}", body);
    assert_eq!(body["text"], "HI");

    let bytes = codec::from_base64(body["image"].as_str().unwrap()).unwrap();
    let image = codec::decode(&bytes).unwrap();
    assert_eq!(image.dimensions(), (200, 120));
    assert_eq!(image.get_pixel(15, 15).0, [255, 0, 0, 255]);
    assert_eq!(image.get_pixel(190, 110).0, [0, 0, 0, 255]);
    let white = image.pixels().filter(|pixel| pixel.0 == [255, 255, 255, 255]).count();
    assert!(white > 0);
}

#[tokio::test]
async fn add_text_rejects_bad_input_with_detail() {
    let server = TestServer::start(FakeProvider::default()).await;
    let source = png_base64(RgbaImage::from_pixel(8, 8, Rgba([0, 0, 0, 255])));

    let (status, body) = server
        .post(
            "/images/add-text",
            json!({"image_source": "%%% not base64 %%%", "text": "x"}),
        )
        .await;
    assert_eq!(status, 400);
    assert!(body["detail"].is_string());

    let (status, _) = server
        .post(
            "/images/add-text",
            json!({"image_source": source, "text": "x", "align": "justify"}),
        )
        .await;
    assert_eq!(status, 400);

    let (status, _) = server
        .post(
            "/images/add-text",
            json!({"image_source": source, "text": "x", "font_size": 500}),
        )
        .await;
    assert_eq!(status, 400);

    let (status, body) = server
        .post("/images/add-text", json!({"text": "missing source"}))
        .await;
    assert_eq!(status, 400);
    assert!(body["detail"].is_string());
}
