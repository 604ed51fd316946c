//! Scripted stand-in for the generative service.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};

use crate::api::{AiCapability, AspectRatio, ChunkStream, EditedImage, VideoHandle};
use crate::attachment::Attachment;
use crate::error::CapabilityError;

type Reply = Result<String, CapabilityError>;

/// Answers are keyed by prompt. `gate` holds a call open until the test
/// releases it; `feed` backs `stream_text` with a channel.
pub(crate) struct FakeCapability {
    calls: AtomicUsize,
    credential: AtomicBool,
    replies: Mutex<HashMap<String, oneshot::Receiver<Reply>>>,
    streams: Mutex<HashMap<String, mpsc::UnboundedReceiver<Reply>>>,
    last_attachment: Mutex<Option<String>>,
    last_aspect_ratio: Mutex<Option<AspectRatio>>,
}

impl FakeCapability {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::with_credential(true))
    }

    pub fn without_credential() -> Arc<Self> {
        Arc::new(Self::with_credential(false))
    }

    fn with_credential(present: bool) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            credential: AtomicBool::new(present),
            replies: Mutex::new(HashMap::new()),
            streams: Mutex::new(HashMap::new()),
            last_attachment: Mutex::new(None),
            last_aspect_ratio: Mutex::new(None),
        }
    }

    /// Answer `prompt` immediately.
    pub fn reply(&self, prompt: &str, result: Result<&str, CapabilityError>) {
        let tx = self.gate(prompt);
        let _ = tx.send(result.map(str::to_string));
    }

    /// Answer `prompt` whenever the returned sender fires.
    pub fn gate(&self, prompt: &str) -> oneshot::Sender<Reply> {
        let (tx, rx) = oneshot::channel();
        self.replies.lock().insert(prompt.to_string(), rx);
        tx
    }

    /// Stream chunks for `prompt`; dropping the sender ends the stream.
    pub fn feed(&self, prompt: &str) -> mpsc::UnboundedSender<Reply> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.streams.lock().insert(prompt.to_string(), rx);
        tx
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_attachment(&self) -> Option<String> {
        self.last_attachment.lock().clone()
    }

    pub fn last_aspect_ratio(&self) -> Option<AspectRatio> {
        *self.last_aspect_ratio.lock()
    }

    async fn answer(&self, prompt: &str) -> Reply {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let pending = self.replies.lock().remove(prompt);
        match pending {
            Some(rx) => rx
                .await
                .unwrap_or_else(|_| Err(CapabilityError::service("reply dropped"))),
            None => Err(CapabilityError::service(format!("no reply scripted for {prompt:?}"))),
        }
    }
}

#[async_trait]
impl AiCapability for FakeCapability {
    async fn generate_text(&self, prompt: &str) -> Result<String, CapabilityError> {
        self.answer(prompt).await
    }

    async fn generate_video(
        &self,
        prompt: &str,
        aspect_ratio: AspectRatio,
    ) -> Result<VideoHandle, CapabilityError> {
        *self.last_aspect_ratio.lock() = Some(aspect_ratio);
        self.answer(prompt).await.map(|uri| VideoHandle { uri })
    }

    async fn stream_text(&self, prompt: &str) -> Result<ChunkStream, CapabilityError> {
        let fed = self.streams.lock().remove(prompt);
        match fed {
            Some(rx) => {
                self.calls.fetch_add(1, Ordering::SeqCst);
                let chunks = stream::unfold(rx, |mut rx| async move {
                    rx.recv().await.map(|item| (item, rx))
                });
                Ok(chunks.boxed())
            }
            None => {
                let text = self.answer(prompt).await?;
                Ok(stream::iter(vec![Ok(text)]).boxed())
            }
        }
    }

    async fn analyze_video(
        &self,
        video: &Attachment,
        prompt: &str,
    ) -> Result<String, CapabilityError> {
        *self.last_attachment.lock() = Some(video.name.clone());
        self.answer(prompt).await
    }

    async fn edit_image(
        &self,
        image: &Attachment,
        prompt: &str,
    ) -> Result<EditedImage, CapabilityError> {
        *self.last_attachment.lock() = Some(image.name.clone());
        let text = self.answer(prompt).await?;
        Ok(EditedImage {
            mime_type: "image/png".to_string(),
            data: text.into_bytes(),
        })
    }

    async fn has_credential(&self) -> bool {
        self.credential.load(Ordering::SeqCst)
    }

    async fn select_credential(&self, key: String) -> Result<(), CapabilityError> {
        if key.trim().is_empty() {
            return Err(CapabilityError::validation("API key must not be empty"));
        }
        self.credential.store(true, Ordering::SeqCst);
        Ok(())
    }
}
