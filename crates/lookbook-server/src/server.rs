use std::fs;
use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post};
use axum::{Json, Router};
use lookbook_contracts::classification::ClassificationResult;
use lookbook_engine::{
    Classifier, ClassifyError, HeadSwapRequest, HeadSwapService, HttpHeadSwap, OpenAiVision,
    UpstreamError,
};
use serde::Serialize;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::error::ApiError;
use crate::paths::{
    derived_reference_path, file_data_uri, has_parent_reference, public_url, resolve_within,
    sanitize_reference_path, upload_data_uri,
};
use crate::upload::{read_form, validate_upload};

pub const FALLBACK_WARNING: &str =
    "HeadSwapper API is currently unavailable. Showing reference image as fallback.";

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub classifier: Arc<Classifier>,
    pub headswap: Arc<dyn HeadSwapService>,
}

impl AppState {
    pub fn new(
        config: ServerConfig,
        classifier: Classifier,
        headswap: Arc<dyn HeadSwapService>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            classifier: Arc::new(classifier),
            headswap,
        }
    }

    /// Wires the real OpenAI vision transport and head-swap client.
    pub fn from_config(config: ServerConfig) -> anyhow::Result<Self> {
        let vision = OpenAiVision::new(&config.engine)?;
        let classifier = Classifier::new(Arc::new(vision), config.engine.retry);
        let headswap = HttpHeadSwap::new(config.headswap_url.clone())?;
        Ok(Self::new(config, classifier, Arc::new(headswap)))
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: &'static str,
    message: &'static str,
}

#[derive(Debug, Serialize)]
pub struct SwapResponse {
    pub output_image: String,
    pub analysis: ClassificationResult,
    pub pregenerated_image_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.cors_origins);
    let images = ServeDir::new(&state.config.images_dir);
    let body_limit = state.config.max_body_bytes;

    Router::new()
        .route("/", get(health))
        .route("/api/analyze-user-image", post(analyze_user_image))
        .route("/api/swap-head", post(swap_head))
        .nest_service("/images", images)
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(%origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
        .allow_credentials(true)
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        message: "Server is running",
    })
}

async fn analyze_user_image(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<ClassificationResult>, ApiError> {
    let form = read_form(multipart).await?;
    let upload = validate_upload(form.image)?;
    info!(file = %upload.file_name, bytes = upload.bytes.len(), "analyzing upload");

    let classifier = state.classifier.clone();
    let result = tokio::task::spawn_blocking(move || classifier.classify(&upload.bytes))
        .await
        .map_err(|err| ApiError::internal("analysis task", err))?
        .map_err(classify_error)?;
    Ok(Json(result))
}

async fn swap_head(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<SwapResponse>, ApiError> {
    let form = read_form(multipart).await?;
    let upload = validate_upload(form.image)?;
    let override_path = form.reference_image;
    if override_path.as_deref().is_some_and(has_parent_reference) {
        warn!(path = ?override_path, "rejected reference path with parent segments");
        return Err(ApiError::InvalidReferencePath);
    }
    info!(file = %upload.file_name, bytes = upload.bytes.len(), "head swap requested");

    let response = tokio::task::spawn_blocking(move || {
        swap_blocking(&state, &upload.bytes, override_path.as_deref())
    })
    .await
    .map_err(|err| ApiError::internal("head-swap task", err))??;
    Ok(Json(response))
}

/// Classify, resolve the pregenerated target, then swap or fall back.
fn swap_blocking(
    state: &AppState,
    image: &[u8],
    override_path: Option<&str>,
) -> Result<SwapResponse, ApiError> {
    let analysis = state.classifier.classify(image).map_err(classify_error)?;
    if !analysis.person_detected() {
        warn!(message = %analysis.message, "no person detected in upload");
    }

    let relative = match override_path {
        Some(raw) => sanitize_reference_path(raw),
        None => derived_reference_path(&analysis.metadata.body_type, &analysis.metadata.skin_color),
    };
    let images_dir = &state.config.images_dir;
    let Some(reference_path) = resolve_within(images_dir, &relative) else {
        warn!(%relative, "reference path escapes the images directory");
        return Err(ApiError::InvalidReferencePath);
    };
    if !reference_path.is_file() {
        warn!(path = %reference_path.display(), "reference image not found");
        return Err(ApiError::ReferenceNotFound);
    }
    let pregenerated_image_url =
        public_url(images_dir, &reference_path).ok_or(ApiError::InvalidReferencePath)?;
    let reference_bytes = fs::read(&reference_path)
        .map_err(|err| ApiError::internal("read reference image", err))?;
    let reference_uri = file_data_uri(&reference_path, &reference_bytes);

    if let Err(err) = state.headswap.check_reachable() {
        warn!(error = %err, "head-swap service unreachable, returning the reference image");
        return Ok(SwapResponse {
            output_image: reference_uri,
            analysis,
            pregenerated_image_url,
            warning: Some(FALLBACK_WARNING.to_string()),
        });
    }

    let request = HeadSwapRequest::new(
        upload_data_uri(image),
        reference_uri,
        &analysis.metadata,
        state.config.headswap_owner_id.clone(),
    );
    let output_image = state.headswap.swap(&request).map_err(headswap_error)?;
    info!(url = %pregenerated_image_url, "head swap finished");
    Ok(SwapResponse {
        output_image,
        analysis,
        pregenerated_image_url,
        warning: None,
    })
}

fn classify_error(err: ClassifyError) -> ApiError {
    match err {
        ClassifyError::Decode(source) => {
            warn!(error = %source, "upload is not a decodable image");
            ApiError::InvalidFileType
        }
        other => ApiError::internal("image analysis", other),
    }
}

fn headswap_error(err: UpstreamError) -> ApiError {
    tracing::error!(error = %err, "head-swap call failed");
    match err {
        UpstreamError::Connection(_)
        | UpstreamError::Status { .. }
        | UpstreamError::RateLimited { .. } => ApiError::HeadSwapUnavailable,
        UpstreamError::MalformedResponse(_) => ApiError::HeadSwapInvalidResponse,
        UpstreamError::Other(_) => ApiError::HeadSwapFailed,
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::response::Response;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use lookbook_engine::{EngineConfig, Jitter, RetryPolicy, Sleeper, VisionApi};
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;

    const BOUNDARY: &str = "lookbook-test-boundary";
    const OLIVE_ATHLETE: &str = r#"{"metadata":{"gender":"male","body_type":"athletic","skin_color":"Olive"},"success":true,"message":"Person detected"}"#;

    struct FixedVision {
        reply: Result<String, UpstreamError>,
        calls: AtomicUsize,
    }

    impl FixedVision {
        fn replying(reply: Result<String, UpstreamError>) -> Arc<Self> {
            Arc::new(Self {
                reply,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl VisionApi for FixedVision {
        fn describe_json(&self, _: &str, _: &str, _: &str) -> Result<String, UpstreamError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.reply.clone()
        }
    }

    struct NoSleep;

    impl Sleeper for NoSleep {
        fn sleep(&self, _: Duration) {}
    }

    struct Midpoint;

    impl Jitter for Midpoint {
        fn uniform(&self, low: f64, high: f64) -> f64 {
            (low + high) / 2.0
        }
    }

    struct FakeHeadSwap {
        reachable: bool,
        reply: Result<String, UpstreamError>,
        requests: Mutex<Vec<HeadSwapRequest>>,
    }

    impl FakeHeadSwap {
        fn new(reachable: bool, reply: Result<String, UpstreamError>) -> Arc<Self> {
            Arc::new(Self {
                reachable,
                reply,
                requests: Mutex::new(Vec::new()),
            })
        }

        fn requests(&self) -> Vec<HeadSwapRequest> {
            self.requests.lock().map(|seen| seen.clone()).unwrap_or_default()
        }
    }

    impl HeadSwapService for FakeHeadSwap {
        fn check_reachable(&self) -> Result<u16, UpstreamError> {
            if self.reachable {
                Ok(405)
            } else {
                Err(UpstreamError::Connection("connection refused".to_string()))
            }
        }

        fn swap(&self, request: &HeadSwapRequest) -> Result<String, UpstreamError> {
            if let Ok(mut seen) = self.requests.lock() {
                seen.push(request.clone());
            }
            self.reply.clone()
        }
    }

    fn app(images_dir: &Path, vision: Arc<FixedVision>, headswap: Arc<FakeHeadSwap>) -> Router {
        let config = ServerConfig::new(EngineConfig::new("sk-test"), images_dir);
        let classifier = Classifier::new(vision, RetryPolicy::new(Duration::from_secs(10), 3))
            .with_sleeper(Arc::new(NoSleep))
            .with_jitter(Arc::new(Midpoint));
        build_router(AppState::new(config, classifier, headswap))
    }

    fn jpeg(width: u32, height: u32) -> anyhow::Result<Vec<u8>> {
        let image = RgbImage::from_pixel(width, height, Rgb([180, 140, 110]));
        let mut bytes = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(image).write_to(&mut bytes, ImageFormat::Jpeg)?;
        Ok(bytes.into_inner())
    }

    fn multipart(image: Option<(&str, &[u8])>, reference_image: Option<&str>) -> Vec<u8> {
        let mut body = Vec::new();
        if let Some((file_name, bytes)) = image {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(bytes);
            body.extend_from_slice(b"\r\n");
        }
        if let Some(path) = reference_image {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"reference_image\"\r\n\r\n{path}\r\n"
                )
                .as_bytes(),
            );
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    async fn post(app: Router, uri: &str, body: Vec<u8>) -> anyhow::Result<Response> {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))?;
        Ok(app.oneshot(request).await?)
    }

    async fn json_body(response: Response) -> anyhow::Result<Value> {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn write_reference(images_dir: &Path, relative: &str, bytes: &[u8]) -> anyhow::Result<()> {
        let path = images_dir.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, bytes)?;
        Ok(())
    }

    #[tokio::test]
    async fn health_reports_ok() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let app = app(
            temp.path(),
            FixedVision::replying(Ok(OLIVE_ATHLETE.to_string())),
            FakeHeadSwap::new(true, Ok(String::new())),
        );
        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty())?)
            .await?;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::X_CONTENT_TYPE_OPTIONS),
            Some(&HeaderValue::from_static("nosniff"))
        );
        let body = json_body(response).await?;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["message"], "Server is running");
        Ok(())
    }

    #[tokio::test]
    async fn analyze_returns_canonical_skin_color() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let vision = FixedVision::replying(Ok(OLIVE_ATHLETE.to_string()));
        let app = app(temp.path(), vision.clone(), FakeHeadSwap::new(true, Ok(String::new())));
        let photo = jpeg(500, 500)?;

        let response = post(
            app,
            "/api/analyze-user-image",
            multipart(Some(("me.jpg", photo.as_slice())), None),
        )
        .await?;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await?;
        assert_eq!(body["metadata"]["skin_color"], "olive");
        assert_eq!(body["metadata"]["body_type"], "athletic");
        assert_eq!(body["metadata"]["gender"], "male");
        assert_eq!(body["success"], true);
        assert_eq!(vision.calls(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn oversized_upload_is_rejected() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let vision = FixedVision::replying(Ok(OLIVE_ATHLETE.to_string()));
        let app = app(temp.path(), vision.clone(), FakeHeadSwap::new(true, Ok(String::new())));
        let huge = vec![0xAB; 15 * 1024 * 1024];

        let response = post(
            app,
            "/api/analyze-user-image",
            multipart(Some(("huge.jpg", huge.as_slice())), None),
        )
        .await?;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await?;
        assert!(body["error"]
            .as_str()
            .is_some_and(|message| message.contains("File too large")));
        assert_eq!(vision.calls(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn upload_validation_errors_are_client_errors() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let cases: [(Vec<u8>, &str); 3] = [
            (multipart(None, None), "No image file provided"),
            (
                multipart(Some(("notes.txt", &b"hello"[..])), None),
                "Invalid file type. Please upload an image.",
            ),
            (multipart(Some(("empty.png", &b""[..])), None), "Empty file"),
        ];
        for (body, expected) in cases {
            let app = app(
                temp.path(),
                FixedVision::replying(Ok(OLIVE_ATHLETE.to_string())),
                FakeHeadSwap::new(true, Ok(String::new())),
            );
            let response = post(app, "/api/analyze-user-image", body).await?;
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
            assert_eq!(json_body(response).await?["error"], expected);
        }
        Ok(())
    }

    #[tokio::test]
    async fn classifier_failure_is_a_generic_500() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let vision = FixedVision::replying(Err(UpstreamError::Status {
            code: 401,
            message: "invalid api key".to_string(),
        }));
        let app = app(temp.path(), vision, FakeHeadSwap::new(true, Ok(String::new())));
        let photo = jpeg(64, 64)?;

        let response = post(
            app,
            "/api/analyze-user-image",
            multipart(Some(("me.png", photo.as_slice())), None),
        )
        .await?;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            json_body(response).await?["error"],
            "Internal server error. Please try again."
        );
        Ok(())
    }

    #[tokio::test]
    async fn unreachable_headswap_falls_back_to_reference() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let relative = derived_reference_path("athletic", "olive");
        write_reference(temp.path(), &relative, b"pregenerated")?;
        let headswap = FakeHeadSwap::new(false, Ok("unused".to_string()));
        let app = app(
            temp.path(),
            FixedVision::replying(Ok(OLIVE_ATHLETE.to_string())),
            headswap.clone(),
        );
        let photo = jpeg(120, 200)?;

        let response = post(app, "/api/swap-head", multipart(Some(("me.jpg", photo.as_slice())), None)).await?;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await?;
        assert_eq!(body["warning"], FALLBACK_WARNING);
        assert_eq!(
            body["output_image"],
            file_data_uri(&temp.path().join(&relative), b"pregenerated")
        );
        assert_eq!(body["pregenerated_image_url"], format!("/images/{relative}"));
        assert_eq!(body["analysis"]["metadata"]["skin_color"], "olive");
        assert!(headswap.requests().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn pregenerated_url_is_served_from_images_dir() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let relative = derived_reference_path("athletic", "olive");
        write_reference(temp.path(), &relative, b"pregenerated-bytes")?;
        let app = app(
            temp.path(),
            FixedVision::replying(Ok(OLIVE_ATHLETE.to_string())),
            FakeHeadSwap::new(false, Ok(String::new())),
        );
        let photo = jpeg(40, 40)?;

        let swapped = post(
            app.clone(),
            "/api/swap-head",
            multipart(Some(("me.jpg", photo.as_slice())), None),
        )
        .await?;
        let url = json_body(swapped).await?["pregenerated_image_url"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| anyhow::anyhow!("swap response has no image url"))?;

        let served = app
            .clone()
            .oneshot(Request::builder().uri(&url).body(Body::empty())?)
            .await?;
        assert_eq!(served.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(served.into_body(), usize::MAX).await?;
        assert_eq!(&bytes[..], b"pregenerated-bytes");

        let missing = app
            .oneshot(
                Request::builder()
                    .uri("/images/bodytypes/headswapper/slim/missing.png")
                    .body(Body::empty())?,
            )
            .await?;
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
        Ok(())
    }

    #[tokio::test]
    async fn successful_swap_sends_inverted_fields() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        write_reference(temp.path(), "looks/red.png", b"target")?;
        let headswap = FakeHeadSwap::new(true, Ok("data:image/png;base64,T1VU".to_string()));
        let app = app(
            temp.path(),
            FixedVision::replying(Ok(OLIVE_ATHLETE.to_string())),
            headswap.clone(),
        );
        let photo = jpeg(80, 80)?;

        let response = post(
            app,
            "/api/swap-head",
            multipart(Some(("me.jpg", photo.as_slice())), Some("//looks/red.png/")),
        )
        .await?;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await?;
        assert_eq!(body["output_image"], "data:image/png;base64,T1VU");
        assert_eq!(body["pregenerated_image_url"], "/images/looks/red.png");
        assert!(body.get("warning").is_none());

        let sent = headswap.requests();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].reference_image, upload_data_uri(photo.as_slice()));
        assert_eq!(
            sent[0].edit_image,
            file_data_uri(&temp.path().join("looks/red.png"), b"target")
        );
        assert_eq!(sent[0].gender.as_deref(), Some("MALE"));
        assert_eq!(sent[0].owner_id, "gazman_tryon");
        Ok(())
    }

    #[tokio::test]
    async fn traversal_is_rejected_before_classification() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let vision = FixedVision::replying(Ok(OLIVE_ATHLETE.to_string()));
        let headswap = FakeHeadSwap::new(true, Ok(String::new()));
        let app = app(temp.path(), vision.clone(), headswap.clone());
        let photo = jpeg(32, 32)?;

        let response = post(
            app,
            "/api/swap-head",
            multipart(Some(("me.jpg", photo.as_slice())), Some("../../etc/passwd")),
        )
        .await?;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            json_body(response).await?["error"],
            "Invalid reference image path"
        );
        assert_eq!(vision.calls(), 0);
        assert!(headswap.requests().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn missing_reference_is_404() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let app = app(
            temp.path(),
            FixedVision::replying(Ok(OLIVE_ATHLETE.to_string())),
            FakeHeadSwap::new(true, Ok(String::new())),
        );
        let photo = jpeg(32, 32)?;

        let response = post(app, "/api/swap-head", multipart(Some(("me.jpg", photo.as_slice())), None)).await?;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(response).await?["error"], "Reference image not found");
        Ok(())
    }

    #[tokio::test]
    async fn headswap_failures_map_to_safe_messages() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        write_reference(
            temp.path(),
            &derived_reference_path("athletic", "olive"),
            b"pregenerated",
        )?;
        let cases = [
            (
                UpstreamError::Connection("reset by peer".to_string()),
                StatusCode::SERVICE_UNAVAILABLE,
                "Failed to connect to HeadSwapper service",
            ),
            (
                UpstreamError::MalformedResponse("status=error".to_string()),
                StatusCode::INTERNAL_SERVER_ERROR,
                "Invalid response from HeadSwapper service",
            ),
        ];
        let photo = jpeg(32, 32)?;
        for (failure, status, message) in cases {
            let app = app(
                temp.path(),
                FixedVision::replying(Ok(OLIVE_ATHLETE.to_string())),
                FakeHeadSwap::new(true, Err(failure)),
            );
            let response =
                post(app, "/api/swap-head", multipart(Some(("me.jpg", photo.as_slice())), None)).await?;
            assert_eq!(response.status(), status);
            assert_eq!(json_body(response).await?["error"], message);
        }
        Ok(())
    }
}
