use std::future::Future;
use std::sync::Arc;

use futures_util::StreamExt;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::api::{AiCapability, AspectRatio, EditedImage, VideoHandle};
use crate::attachment::{Attachment, AttachmentKind, PreviewHandle, PreviewStore};
use crate::content::FALLBACK_ABOUT_TEXT;
use crate::error::CapabilityError;
use crate::state::{GenerationState, RequestSlot, StreamAccumulator, SubmitOutcome};

const EMPTY_PROMPT: &str = "Enter a prompt first.";
const NO_VIDEO_FILE: &str = "Please upload a video file first.";
const NO_IMAGE_FILE: &str = "Please upload an image first.";
const NEEDS_KEY: &str = "An API key is required for video generation.";

/// Called with each streamed fragment as it is accepted.
pub type ChunkListener = Arc<dyn Fn(&str) + Send + Sync>;

// --- Shared controller plumbing ---

struct Shared<T, X> {
    slot: RequestSlot<T>,
    prompt: String,
    /// Message of the last local rejection. Shown beside the state, which it
    /// never replaces.
    validation: Option<String>,
    extra: X,
}

type SharedCell<T, X> = Arc<Mutex<Shared<T, X>>>;

/// The part every panel has in common: one capability, one request slot, a
/// prompt, and feature-specific fields in `X`. Spawned tasks hold a clone of
/// the cell and check their sequence token before writing to it.
struct Controller<T, X> {
    name: &'static str,
    client: Arc<dyn AiCapability>,
    shared: SharedCell<T, X>,
}

impl<T, X> Controller<T, X>
where
    T: Clone + Send + 'static,
    X: Send + 'static,
{
    fn new(name: &'static str, client: Arc<dyn AiCapability>, prompt: String, extra: X) -> Self {
        Self {
            name,
            client,
            shared: Arc::new(Mutex::new(Shared {
                slot: RequestSlot::default(),
                prompt,
                validation: None,
                extra,
            })),
        }
    }

    fn set_prompt(&self, prompt: String) {
        self.shared.lock().prompt = prompt;
    }

    fn prompt(&self) -> String {
        self.shared.lock().prompt.clone()
    }

    fn state(&self) -> GenerationState<T> {
        self.shared.lock().slot.state().clone()
    }

    fn validation(&self) -> Option<String> {
        self.shared.lock().validation.clone()
    }

    fn is_loading(&self) -> bool {
        self.shared.lock().slot.state().is_loading()
    }

    fn cancel(&self) {
        let mut s = self.shared.lock();
        if s.slot.state().is_loading() {
            s.slot.invalidate();
            info!("{}: request cancelled", self.name);
        }
    }

    /// Guard and begin a request. `check` runs local validation; `prepare`
    /// resets per-request fields under the same lock as `begin`.
    fn start(
        &self,
        check: impl FnOnce(&X) -> Result<(), String>,
        prepare: impl FnOnce(&mut X),
    ) -> Result<(u64, String), SubmitOutcome> {
        let mut s = self.shared.lock();
        if s.slot.state().is_loading() {
            return Err(SubmitOutcome::Busy);
        }
        let validation = if s.prompt.trim().is_empty() {
            Err(EMPTY_PROMPT.to_string())
        } else {
            check(&s.extra)
        };
        if let Err(message) = validation {
            debug!("{}: rejected locally: {message}", self.name);
            s.validation = Some(message.clone());
            return Err(SubmitOutcome::Rejected(message));
        }

        let Some(generation) = s.slot.begin() else {
            return Err(SubmitOutcome::Busy);
        };
        s.validation = None;
        prepare(&mut s.extra);
        info!("{}: request #{generation} started", self.name);
        Ok((generation, s.prompt.clone()))
    }

    fn spawn<F, Fut>(&self, work: F) -> SubmitOutcome
    where
        F: FnOnce(Arc<dyn AiCapability>, SharedCell<T, X>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let fut = work(Arc::clone(&self.client), Arc::clone(&self.shared));
        SubmitOutcome::Started(tokio::spawn(fut))
    }
}

/// Apply a completion if `generation` is still current. Returns false for stale ones.
fn settle<T, X>(
    name: &str,
    shared: &SharedCell<T, X>,
    generation: u64,
    result: Result<T, String>,
) -> bool {
    let mut s = shared.lock();
    if let Err(ref message) = result {
        if s.slot.is_current(generation) {
            warn!("{name}: request #{generation} failed: {message}");
        }
    }
    s.slot.finish(generation, result)
}

// --- Bio text ---

/// About-section bio generator. The displayed text falls back to a fixed bio
/// whenever generation fails.
pub struct BioPanel {
    core: Controller<String, String>,
}

impl BioPanel {
    pub fn new(client: Arc<dyn AiCapability>, prompt: impl Into<String>) -> Self {
        Self {
            core: Controller::new("bio", client, prompt.into(), FALLBACK_ABOUT_TEXT.to_string()),
        }
    }

    pub fn set_prompt(&self, prompt: impl Into<String>) {
        self.core.set_prompt(prompt.into());
    }

    pub fn prompt(&self) -> String {
        self.core.prompt()
    }

    pub fn state(&self) -> GenerationState<String> {
        self.core.state()
    }

    /// Bio currently shown: the last generated text, or the fallback.
    pub fn text(&self) -> String {
        self.core.shared.lock().extra.clone()
    }

    pub fn can_submit(&self) -> bool {
        !self.core.is_loading()
    }

    /// Why the last submit was refused locally, if it was.
    pub fn validation_error(&self) -> Option<String> {
        self.core.validation()
    }

    pub fn cancel(&self) {
        self.core.cancel();
    }

    pub fn submit(&self) -> SubmitOutcome {
        let (generation, prompt) = match self.core.start(|_| Ok(()), |_| {}) {
            Ok(started) => started,
            Err(outcome) => return outcome,
        };
        self.core.spawn(move |client, shared| async move {
            let result = client.generate_text(&prompt).await;
            let mut s = shared.lock();
            if !s.slot.is_current(generation) {
                debug!("bio: discarding stale result #{generation}");
                return;
            }
            match result {
                Ok(text) => {
                    s.extra = text.clone();
                    s.slot.finish(generation, Ok(text));
                }
                Err(e) => {
                    warn!("bio: request #{generation} failed: {e}");
                    s.extra = FALLBACK_ABOUT_TEXT.to_string();
                    s.slot.finish(
                        generation,
                        Err(format!("Generation failed: {e}. Using fallback text.")),
                    );
                }
            }
        })
    }
}

// --- Video generation ---

struct VideoExtra {
    aspect_ratio: AspectRatio,
    /// Set when the credential is absent or was rejected.
    credential_reason: Option<String>,
}

/// What the video generation panel shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VideoStatus {
    /// The normal flow is suspended until a credential is selected.
    NeedsCredential { reason: String },
    Generation(GenerationState<VideoHandle>),
}

pub struct VideoGenerationPanel {
    core: Controller<VideoHandle, VideoExtra>,
}

impl VideoGenerationPanel {
    pub fn new(client: Arc<dyn AiCapability>, prompt: impl Into<String>) -> Self {
        let extra = VideoExtra {
            aspect_ratio: AspectRatio::default(),
            credential_reason: None,
        };
        Self {
            core: Controller::new("video", client, prompt.into(), extra),
        }
    }

    /// Query the credential once, as the panel is shown.
    pub async fn mount(&self) {
        if !self.core.client.has_credential().await {
            info!("video: no credential selected");
            self.core.shared.lock().extra.credential_reason = Some(NEEDS_KEY.to_string());
        }
    }

    pub fn status(&self) -> VideoStatus {
        let s = self.core.shared.lock();
        match s.extra.credential_reason {
            Some(ref reason) => VideoStatus::NeedsCredential { reason: reason.clone() },
            None => VideoStatus::Generation(s.slot.state().clone()),
        }
    }

    pub fn needs_credential(&self) -> bool {
        self.core.shared.lock().extra.credential_reason.is_some()
    }

    /// Hand a credential to the capability; on success the panel returns to Idle.
    pub async fn select_credential(&self, key: impl Into<String>) -> Result<(), CapabilityError> {
        self.core.client.select_credential(key.into()).await?;
        let mut s = self.core.shared.lock();
        s.extra.credential_reason = None;
        s.validation = None;
        if !s.slot.state().is_loading() {
            s.slot.invalidate();
        }
        Ok(())
    }

    pub fn set_aspect_ratio(&self, aspect_ratio: AspectRatio) {
        self.core.shared.lock().extra.aspect_ratio = aspect_ratio;
    }

    pub fn aspect_ratio(&self) -> AspectRatio {
        self.core.shared.lock().extra.aspect_ratio
    }

    pub fn set_prompt(&self, prompt: impl Into<String>) {
        self.core.set_prompt(prompt.into());
    }

    pub fn prompt(&self) -> String {
        self.core.prompt()
    }

    pub fn can_submit(&self) -> bool {
        !self.core.is_loading() && !self.needs_credential()
    }

    /// Why the last submit was refused locally, if it was.
    pub fn validation_error(&self) -> Option<String> {
        self.core.validation()
    }

    pub fn cancel(&self) {
        self.core.cancel();
    }

    pub fn submit(&self) -> SubmitOutcome {
        let mut aspect_ratio = AspectRatio::default();
        let started = self.core.start(
            |extra| match extra.credential_reason {
                Some(_) => Err(NEEDS_KEY.to_string()),
                None => Ok(()),
            },
            |extra| aspect_ratio = extra.aspect_ratio,
        );
        let (generation, prompt) = match started {
            Ok(started) => started,
            Err(outcome) => return outcome,
        };

        self.core.spawn(move |client, shared| async move {
            let result = client.generate_video(&prompt, aspect_ratio).await;
            match result {
                Ok(handle) => {
                    settle("video", &shared, generation, Ok(handle));
                }
                Err(CapabilityError::CredentialMissing(reason)) => {
                    let mut s = shared.lock();
                    if !s.slot.is_current(generation) {
                        return;
                    }
                    warn!("video: credential rejected: {reason}");
                    s.extra.credential_reason = Some(reason);
                    s.slot.invalidate();
                }
                Err(e) => {
                    settle("video", &shared, generation, Err(format!("Generation failed: {e}")));
                }
            }
        })
    }
}

// --- Low-latency streaming text ---

pub struct StreamPanel {
    core: Controller<String, StreamAccumulator>,
    listener: Option<ChunkListener>,
}

impl StreamPanel {
    pub fn new(client: Arc<dyn AiCapability>, prompt: impl Into<String>) -> Self {
        Self {
            core: Controller::new("stream", client, prompt.into(), StreamAccumulator::default()),
            listener: None,
        }
    }

    /// Observe fragments of the current request as they are appended.
    pub fn with_listener(mut self, listener: ChunkListener) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn set_prompt(&self, prompt: impl Into<String>) {
        self.core.set_prompt(prompt.into());
    }

    pub fn prompt(&self) -> String {
        self.core.prompt()
    }

    pub fn state(&self) -> GenerationState<String> {
        self.core.state()
    }

    /// Text streamed so far for the latest request, partial while loading.
    pub fn text(&self) -> String {
        self.core.shared.lock().extra.text()
    }

    pub fn can_submit(&self) -> bool {
        !self.core.is_loading()
    }

    /// Why the last submit was refused locally, if it was.
    pub fn validation_error(&self) -> Option<String> {
        self.core.validation()
    }

    pub fn cancel(&self) {
        self.core.cancel();
    }

    pub fn submit(&self) -> SubmitOutcome {
        let (generation, prompt) = match self.core.start(|_| Ok(()), StreamAccumulator::reset) {
            Ok(started) => started,
            Err(outcome) => return outcome,
        };
        let listener = self.listener.clone();

        self.core.spawn(move |client, shared| async move {
            let mut chunks = match client.stream_text(&prompt).await {
                Ok(chunks) => chunks,
                Err(e) => {
                    settle("stream", &shared, generation, Err(format!("Streaming failed: {e}")));
                    return;
                }
            };

            while let Some(item) = chunks.next().await {
                let chunk = {
                    let mut s = shared.lock();
                    if !s.slot.is_current(generation) {
                        debug!("stream: dropping chunks of stale request #{generation}");
                        return;
                    }
                    match item {
                        Ok(chunk) => {
                            s.extra.push(chunk.as_str());
                            chunk
                        }
                        Err(e) => {
                            drop(s);
                            settle("stream", &shared, generation, Err(format!("Streaming failed: {e}")));
                            return;
                        }
                    }
                };
                if let Some(ref listener) = listener {
                    listener(&chunk);
                }
            }

            let text = shared.lock().extra.text();
            settle("stream", &shared, generation, Ok(text));
        })
    }
}

// --- Attachment intake ---

/// Holds the preview of the current selection. The preview is released
/// before a replacement is created, and when the owning panel is dropped.
struct AttachmentIntake {
    kind: AttachmentKind,
    previews: Arc<PreviewStore>,
    preview: Mutex<Option<PreviewHandle>>,
}

impl AttachmentIntake {
    fn new(kind: AttachmentKind, previews: Arc<PreviewStore>) -> Self {
        Self {
            kind,
            previews,
            preview: Mutex::new(None),
        }
    }

    fn accept(&self, attachment: &Attachment) -> Result<(), CapabilityError> {
        if attachment.kind != self.kind {
            return Err(CapabilityError::validation(format!(
                "{} is not a {} file.",
                attachment.name, self.kind
            )));
        }
        let mut preview = self.preview.lock();
        drop(preview.take());
        *preview = Some(self.previews.create(attachment));
        Ok(())
    }

    fn preview_uri(&self) -> Option<String> {
        self.preview.lock().as_ref().map(|p| p.uri().to_string())
    }

    fn preview_description(&self) -> Option<String> {
        self.preview.lock().as_ref().map(|p| p.description().to_string())
    }
}

// --- Video analysis ---

pub struct VideoAnalysisPanel {
    core: Controller<String, Option<Attachment>>,
    intake: AttachmentIntake,
}

impl VideoAnalysisPanel {
    pub fn new(
        client: Arc<dyn AiCapability>,
        previews: Arc<PreviewStore>,
        prompt: impl Into<String>,
    ) -> Self {
        Self {
            core: Controller::new("analysis", client, prompt.into(), None),
            intake: AttachmentIntake::new(AttachmentKind::Video, previews),
        }
    }

    /// Replace the selected video. Clears the previous result or error and
    /// orphans any analysis still in flight.
    pub fn select_attachment(&self, attachment: Attachment) -> Result<(), CapabilityError> {
        self.intake.accept(&attachment)?;
        let mut s = self.core.shared.lock();
        s.slot.invalidate();
        s.validation = None;
        s.extra = Some(attachment);
        Ok(())
    }

    pub fn attachment_name(&self) -> Option<String> {
        self.core.shared.lock().extra.as_ref().map(|a| a.name.clone())
    }

    pub fn preview_uri(&self) -> Option<String> {
        self.intake.preview_uri()
    }

    pub fn preview_description(&self) -> Option<String> {
        self.intake.preview_description()
    }

    pub fn set_prompt(&self, prompt: impl Into<String>) {
        self.core.set_prompt(prompt.into());
    }

    pub fn prompt(&self) -> String {
        self.core.prompt()
    }

    pub fn state(&self) -> GenerationState<String> {
        self.core.state()
    }

    pub fn can_submit(&self) -> bool {
        let s = self.core.shared.lock();
        !s.slot.state().is_loading() && s.extra.is_some()
    }

    /// Why the last submit was refused locally, if it was.
    pub fn validation_error(&self) -> Option<String> {
        self.core.validation()
    }

    pub fn cancel(&self) {
        self.core.cancel();
    }

    pub fn submit(&self) -> SubmitOutcome {
        let mut video = None;
        let started = self.core.start(
            |extra| extra.as_ref().map(|_| ()).ok_or_else(|| NO_VIDEO_FILE.to_string()),
            |extra| video = extra.clone(),
        );
        let (generation, prompt) = match started {
            Ok(started) => started,
            Err(outcome) => return outcome,
        };
        let Some(video) = video else {
            return SubmitOutcome::Rejected(NO_VIDEO_FILE.to_string());
        };

        self.core.spawn(move |client, shared| async move {
            let result = client
                .analyze_video(&video, &prompt)
                .await
                .map_err(|e| format!("Analysis failed: {e}"));
            settle("analysis", &shared, generation, result);
        })
    }
}

// --- Image editing ---

pub struct ImageEditPanel {
    core: Controller<EditedImage, Option<Attachment>>,
    intake: AttachmentIntake,
}

impl ImageEditPanel {
    pub fn new(
        client: Arc<dyn AiCapability>,
        previews: Arc<PreviewStore>,
        prompt: impl Into<String>,
    ) -> Self {
        Self {
            core: Controller::new("edit", client, prompt.into(), None),
            intake: AttachmentIntake::new(AttachmentKind::Image, previews),
        }
    }

    /// Replace the source image. Clears the previous edit or error and
    /// orphans any edit still in flight.
    pub fn select_attachment(&self, attachment: Attachment) -> Result<(), CapabilityError> {
        self.intake.accept(&attachment)?;
        let mut s = self.core.shared.lock();
        s.slot.invalidate();
        s.validation = None;
        s.extra = Some(attachment);
        Ok(())
    }

    pub fn attachment_name(&self) -> Option<String> {
        self.core.shared.lock().extra.as_ref().map(|a| a.name.clone())
    }

    pub fn preview_uri(&self) -> Option<String> {
        self.intake.preview_uri()
    }

    pub fn preview_description(&self) -> Option<String> {
        self.intake.preview_description()
    }

    pub fn set_prompt(&self, prompt: impl Into<String>) {
        self.core.set_prompt(prompt.into());
    }

    pub fn prompt(&self) -> String {
        self.core.prompt()
    }

    pub fn state(&self) -> GenerationState<EditedImage> {
        self.core.state()
    }

    pub fn can_submit(&self) -> bool {
        let s = self.core.shared.lock();
        !s.slot.state().is_loading() && s.extra.is_some()
    }

    /// Why the last submit was refused locally, if it was.
    pub fn validation_error(&self) -> Option<String> {
        self.core.validation()
    }

    pub fn cancel(&self) {
        self.core.cancel();
    }

    pub fn submit(&self) -> SubmitOutcome {
        let mut image = None;
        let started = self.core.start(
            |extra| extra.as_ref().map(|_| ()).ok_or_else(|| NO_IMAGE_FILE.to_string()),
            |extra| image = extra.clone(),
        );
        let (generation, prompt) = match started {
            Ok(started) => started,
            Err(outcome) => return outcome,
        };
        let Some(image) = image else {
            return SubmitOutcome::Rejected(NO_IMAGE_FILE.to_string());
        };

        self.core.spawn(move |client, shared| async move {
            let result = client
                .edit_image(&image, &prompt)
                .await
                .map_err(|e| format!("Editing failed: {e}"));
            settle("edit", &shared, generation, result);
        })
    }
}
