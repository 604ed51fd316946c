use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use futures_util::stream::{self, BoxStream};
use futures_util::StreamExt;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::attachment::Attachment;
use crate::config::ApiConfig;
use crate::error::CapabilityError;
use crate::stream::SseDecoder;

const NO_KEY: &str = "No API key configured. Set GEMINI_API_KEY or add your key to folio.toml.";
const NO_VIDEO_KEY: &str = "An API key is required for video generation.";

/// Ordered text fragments of one streaming response.
pub type ChunkStream = BoxStream<'static, Result<String, CapabilityError>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AspectRatio {
    #[default]
    #[serde(rename = "16:9")]
    Landscape,
    #[serde(rename = "9:16")]
    Portrait,
}

impl AspectRatio {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Landscape => "16:9",
            Self::Portrait => "9:16",
        }
    }
}

impl std::fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AspectRatio {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "16:9" | "landscape" => Ok(Self::Landscape),
            "9:16" | "portrait" => Ok(Self::Portrait),
            other => Err(format!("unsupported aspect ratio '{other}' (expected 16:9 or 9:16)")),
        }
    }
}

/// Where a finished video can be fetched from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoHandle {
    pub uri: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditedImage {
    pub mime_type: String,
    pub data: Vec<u8>,
}

/// The generative capabilities the panels are wired to.
///
/// Implementations hold no per-request state: no retries, no caching.
#[async_trait]
pub trait AiCapability: Send + Sync {
    async fn generate_text(&self, prompt: &str) -> Result<String, CapabilityError>;

    /// Long-running. Fails with `CredentialMissing` when the provider does not
    /// recognise the selected key for the video model.
    async fn generate_video(
        &self,
        prompt: &str,
        aspect_ratio: AspectRatio,
    ) -> Result<VideoHandle, CapabilityError>;

    /// Not cancellable; callers drop the stream to stop listening.
    async fn stream_text(&self, prompt: &str) -> Result<ChunkStream, CapabilityError>;

    async fn analyze_video(
        &self,
        video: &Attachment,
        prompt: &str,
    ) -> Result<String, CapabilityError>;

    async fn edit_image(
        &self,
        image: &Attachment,
        prompt: &str,
    ) -> Result<EditedImage, CapabilityError>;

    async fn has_credential(&self) -> bool;

    async fn select_credential(&self, key: String) -> Result<(), CapabilityError>;
}

// --- Gemini API request structs ---

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Serialize)]
struct Content {
    role: &'static str,
    parts: Vec<Part>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Part {
    Text { text: String },
    InlineData { inline_data: InlineData },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Serialize, Default)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    response_modalities: Vec<&'static str>,
}

#[derive(Serialize)]
struct PredictRequest {
    instances: Vec<VideoInstance>,
    parameters: VideoParameters,
}

#[derive(Serialize)]
struct VideoInstance {
    prompt: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VideoParameters {
    aspect_ratio: &'static str,
}

// --- Gemini API response structs ---

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponsePart {
    text: Option<String>,
    #[serde(alias = "inline_data")]
    inline_data: Option<ResponseInlineData>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponseInlineData {
    #[serde(alias = "mime_type")]
    mime_type: String,
    data: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Deserialize, Debug, Clone)]
struct ErrorDetail {
    code: Option<i64>,
    message: Option<String>,
    status: Option<String>,
}

impl ErrorDetail {
    /// Structured status; long-running operations only carry the numeric rpc code.
    fn status_code(&self) -> Option<String> {
        self.status.clone().or_else(|| match self.code {
            Some(5) => Some("NOT_FOUND".into()),
            Some(7) => Some("PERMISSION_DENIED".into()),
            Some(8) => Some("RESOURCE_EXHAUSTED".into()),
            _ => None,
        })
    }
}

#[derive(Deserialize)]
struct Operation {
    name: String,
    #[serde(default)]
    done: bool,
    error: Option<ErrorDetail>,
    response: Option<VideoResponse>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoResponse {
    generate_video_response: Option<GeneratedVideos>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeneratedVideos {
    #[serde(default)]
    generated_samples: Vec<GeneratedSample>,
    #[serde(default)]
    rai_media_filtered_reasons: Vec<String>,
}

#[derive(Deserialize)]
struct GeneratedSample {
    video: Option<VideoRef>,
}

#[derive(Deserialize)]
struct VideoRef {
    uri: Option<String>,
}

impl GenerateResponse {
    fn parts(&self) -> impl Iterator<Item = &ResponsePart> {
        self.candidates
            .iter()
            .filter_map(|c| c.content.as_ref())
            .flat_map(|c| c.parts.iter())
    }

    fn text(&self) -> String {
        self.parts().filter_map(|p| p.text.as_deref()).collect()
    }

    fn block_reason(&self) -> Option<&str> {
        self.prompt_feedback.as_ref()?.block_reason.as_deref()
    }
}

// --- Response interpretation ---

fn empty_response(body: &GenerateResponse) -> CapabilityError {
    match body.block_reason() {
        Some(reason) => CapabilityError::service(format!("Prompt blocked by safety filters ({reason}).")),
        None => CapabilityError::service("Empty response from API."),
    }
}

fn extract_text(body: &GenerateResponse) -> Result<String, CapabilityError> {
    let text = body.text();
    if text.is_empty() {
        Err(empty_response(body))
    } else {
        Ok(text)
    }
}

fn extract_image(body: &GenerateResponse) -> Result<EditedImage, CapabilityError> {
    if let Some(inline) = body.parts().find_map(|p| p.inline_data.as_ref()) {
        let data = STANDARD
            .decode(inline.data.as_bytes())
            .map_err(|e| CapabilityError::service(format!("Malformed image data: {e}")))?;
        return Ok(EditedImage {
            mime_type: inline.mime_type.clone(),
            data,
        });
    }
    let text = body.text();
    if text.is_empty() {
        Err(empty_response(body))
    } else {
        Err(CapabilityError::service(format!("No image returned: {text}")))
    }
}

/// Text carried by one streamed event. Events without text yield "".
fn parse_stream_event(payload: &str) -> Result<String, CapabilityError> {
    if let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(payload) {
        return Err(detail_error(None, envelope.error));
    }
    let body: GenerateResponse = serde_json::from_str(payload)
        .map_err(|e| CapabilityError::service(format!("Unexpected stream event: {e}")))?;
    Ok(body.text())
}

/// None while the operation is still running.
fn operation_outcome(op: &Operation) -> Option<Result<VideoHandle, CapabilityError>> {
    if let Some(ref error) = op.error {
        return Some(Err(detail_error(None, error.clone())));
    }
    if !op.done {
        return None;
    }

    let videos = op.response.as_ref().and_then(|r| r.generate_video_response.as_ref());
    let uri = videos
        .and_then(|v| v.generated_samples.first())
        .and_then(|s| s.video.as_ref())
        .and_then(|v| v.uri.clone());

    Some(match (uri, videos) {
        (Some(uri), _) => Ok(VideoHandle { uri }),
        (None, Some(v)) if !v.rai_media_filtered_reasons.is_empty() => Err(CapabilityError::service(
            format!("Video was filtered: {}", v.rai_media_filtered_reasons.join("; ")),
        )),
        (None, _) => Err(CapabilityError::service("Operation finished without a video.")),
    })
}

fn detail_error(status: Option<u16>, detail: ErrorDetail) -> CapabilityError {
    let code = detail.status_code();
    CapabilityError::Service {
        status,
        code,
        message: detail.message.unwrap_or_else(|| "API error.".into()),
    }
}

/// Map a non-success HTTP response to a user-facing error, keeping the
/// provider's structured status when the body has one.
fn api_error(status: u16, body: &str) -> CapabilityError {
    let detail = serde_json::from_str::<ErrorEnvelope>(body).ok().map(|e| e.error);
    let code = detail.as_ref().and_then(ErrorDetail::status_code);
    let provider_message = detail.and_then(|d| d.message).filter(|m| !m.trim().is_empty());

    let summary = match status {
        400 => "Bad request",
        401 | 403 => "Invalid API key",
        404 => "Not found",
        429 => "Rate limited",
        500 | 503 => "API server error",
        _ => "API error",
    };
    let message = match provider_message {
        Some(m) => format!("{summary} (HTTP {status}): {m}"),
        None => format!("{summary} (HTTP {status})."),
    };
    CapabilityError::Service {
        status: Some(status),
        code,
        message,
    }
}

/// Video only: the provider answers entity-not-found when the selected key
/// has no access to the model.
fn credential_error(e: CapabilityError) -> CapabilityError {
    if e.is_entity_not_found() {
        warn!("Video model rejected the selected key: {e}");
        CapabilityError::CredentialMissing(e.to_string())
    } else {
        e
    }
}

fn network_error(e: reqwest::Error) -> CapabilityError {
    if e.is_timeout() {
        CapabilityError::service("Request timed out. Try again.")
    } else if e.is_connect() {
        CapabilityError::service(format!("Cannot reach the API: {e}"))
    } else {
        CapabilityError::service(format!("Network error: {e}"))
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, CapabilityError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(api_error(status.as_u16(), &body))
}

async fn read_json<T: for<'de> Deserialize<'de>>(
    response: reqwest::Response,
) -> Result<T, CapabilityError> {
    response
        .json()
        .await
        .map_err(|e| CapabilityError::service(format!("Unexpected API response: {e}")))
}

fn user_content(parts: Vec<Part>) -> Vec<Content> {
    vec![Content { role: "user", parts }]
}

fn inline_part(attachment: &Attachment) -> Part {
    Part::InlineData {
        inline_data: InlineData {
            mime_type: attachment.mime_type.clone(),
            data: STANDARD.encode(&attachment.data[..]),
        },
    }
}

// --- Gemini REST client ---

/// REST client for the Gemini API.
pub struct GeminiClient {
    http: reqwest::Client,
    config: ApiConfig,
    key: RwLock<String>,
}

impl GeminiClient {
    pub fn new(config: &ApiConfig) -> Result<Self, CapabilityError> {
        // No client-wide timeout: it would cut long streams off mid-body.
        // Unary calls set their own via `request_timeout`; the read timeout
        // bounds the gap between body bytes, so a stalled stream fails.
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(15))
            .read_timeout(config.request_timeout())
            .build()
            .map_err(|e| CapabilityError::service(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            key: RwLock::new(config.key.trim().to_string()),
            config: config.clone(),
        })
    }

    fn key(&self) -> Result<String, CapabilityError> {
        let key = self.key.read().clone();
        if key.is_empty() {
            Err(CapabilityError::service(NO_KEY))
        } else {
            Ok(key)
        }
    }

    fn base_url(&self) -> &str {
        self.config.base_url.trim_end_matches('/')
    }

    fn model_url(&self, model: &str, method: &str) -> String {
        format!("{}/models/{model}:{method}", self.base_url())
    }

    async fn generate_content(
        &self,
        model: &str,
        request: &GenerateRequest,
    ) -> Result<GenerateResponse, CapabilityError> {
        let key = self.key()?;
        let url = self.model_url(model, "generateContent");
        debug!("POST {url}");

        let response = self
            .http
            .post(&url)
            .timeout(self.config.request_timeout())
            .header("x-goog-api-key", key)
            .json(request)
            .send()
            .await
            .map_err(network_error)?;
        read_json(check_status(response).await?).await
    }

    /// Fetch the bytes of a generated video.
    pub async fn download_video(&self, handle: &VideoHandle) -> Result<Vec<u8>, CapabilityError> {
        let key = self.key()?;
        let response = self
            .http
            .get(&handle.uri)
            .timeout(self.config.request_timeout())
            .header("x-goog-api-key", key)
            .send()
            .await
            .map_err(network_error)?;
        let bytes = check_status(response)
            .await?
            .bytes()
            .await
            .map_err(network_error)?;
        Ok(bytes.to_vec())
    }

    async fn run_video_operation(
        &self,
        prompt: &str,
        aspect_ratio: AspectRatio,
    ) -> Result<VideoHandle, CapabilityError> {
        let key = self
            .key()
            .map_err(|_| CapabilityError::CredentialMissing(NO_VIDEO_KEY.into()))?;
        let request = PredictRequest {
            instances: vec![VideoInstance { prompt: prompt.to_string() }],
            parameters: VideoParameters { aspect_ratio: aspect_ratio.as_str() },
        };

        let response = self
            .http
            .post(self.model_url(&self.config.video_model, "predictLongRunning"))
            .timeout(self.config.request_timeout())
            .header("x-goog-api-key", &key)
            .json(&request)
            .send()
            .await
            .map_err(network_error)?;
        let mut op: Operation = read_json(check_status(response).await?).await?;
        info!("Video operation {} started ({aspect_ratio})", op.name);

        let deadline = Instant::now() + self.config.video_deadline();
        loop {
            if let Some(outcome) = operation_outcome(&op) {
                return outcome;
            }
            if Instant::now() >= deadline {
                return Err(CapabilityError::service("Video generation timed out."));
            }
            tokio::time::sleep(self.config.video_poll_interval()).await;

            let url = format!("{}/{}", self.base_url(), op.name);
            debug!("Polling {url}");
            let response = self
                .http
                .get(&url)
                .timeout(self.config.request_timeout())
                .header("x-goog-api-key", &key)
                .send()
                .await
                .map_err(network_error)?;
            op = read_json(check_status(response).await?).await?;
        }
    }
}

#[async_trait]
impl AiCapability for GeminiClient {
    async fn generate_text(&self, prompt: &str) -> Result<String, CapabilityError> {
        let request = GenerateRequest {
            contents: user_content(vec![Part::Text { text: prompt.to_string() }]),
            generation_config: Some(GenerationConfig {
                max_output_tokens: Some(self.config.max_tokens),
                ..Default::default()
            }),
        };
        let body = self.generate_content(&self.config.text_model, &request).await?;
        extract_text(&body)
    }

    async fn generate_video(
        &self,
        prompt: &str,
        aspect_ratio: AspectRatio,
    ) -> Result<VideoHandle, CapabilityError> {
        self.run_video_operation(prompt, aspect_ratio)
            .await
            .map_err(credential_error)
    }

    async fn stream_text(&self, prompt: &str) -> Result<ChunkStream, CapabilityError> {
        let key = self.key()?;
        let url = format!(
            "{}?alt=sse",
            self.model_url(&self.config.stream_model, "streamGenerateContent")
        );
        let request = GenerateRequest {
            contents: user_content(vec![Part::Text { text: prompt.to_string() }]),
            generation_config: Some(GenerationConfig {
                max_output_tokens: Some(self.config.max_tokens),
                ..Default::default()
            }),
        };

        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", key)
            .json(&request)
            .send()
            .await
            .map_err(network_error)?;
        let response = check_status(response).await?;

        let state = (
            response.bytes_stream().boxed(),
            SseDecoder::default(),
            VecDeque::new(),
            false,
        );
        let chunks = stream::unfold(state, |(mut body, mut decoder, mut pending, mut done)| async move {
            loop {
                if let Some(item) = pending.pop_front() {
                    return Some((item, (body, decoder, pending, done)));
                }
                if done {
                    return None;
                }
                let events = match body.next().await {
                    Some(Ok(bytes)) => decoder.push(&bytes),
                    Some(Err(e)) => {
                        done = true;
                        pending.push_back(Err(network_error(e)));
                        continue;
                    }
                    None => {
                        done = true;
                        decoder.finish()
                    }
                };
                for event in events {
                    match parse_stream_event(&event) {
                        Ok(text) if text.is_empty() => {}
                        other => pending.push_back(other),
                    }
                }
            }
        });
        Ok(chunks.boxed())
    }

    async fn analyze_video(
        &self,
        video: &Attachment,
        prompt: &str,
    ) -> Result<String, CapabilityError> {
        let request = GenerateRequest {
            contents: user_content(vec![
                inline_part(video),
                Part::Text { text: prompt.to_string() },
            ]),
            generation_config: None,
        };
        let body = self
            .generate_content(&self.config.analysis_model, &request)
            .await?;
        extract_text(&body)
    }

    async fn edit_image(
        &self,
        image: &Attachment,
        prompt: &str,
    ) -> Result<EditedImage, CapabilityError> {
        let request = GenerateRequest {
            contents: user_content(vec![
                inline_part(image),
                Part::Text { text: prompt.to_string() },
            ]),
            generation_config: Some(GenerationConfig {
                response_modalities: vec!["IMAGE", "TEXT"],
                ..Default::default()
            }),
        };
        let body = self.generate_content(&self.config.image_model, &request).await?;
        extract_image(&body)
    }

    async fn has_credential(&self) -> bool {
        !self.key.read().is_empty()
    }

    async fn select_credential(&self, key: String) -> Result<(), CapabilityError> {
        let key = key.trim();
        if key.is_empty() {
            return Err(CapabilityError::validation("API key cannot be empty."));
        }
        *self.key.write() = key.to_string();
        info!("API key selected");
        Ok(())
    }
}
