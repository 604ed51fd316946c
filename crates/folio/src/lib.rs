//! Portfolio site core: static content, navigation, the persisted theme and
//! five AI panels sharing one generative capability.

pub mod api;
pub mod attachment;
pub mod config;
pub mod content;
pub mod error;
pub mod logging;
pub mod navigation;
pub mod panels;
pub mod state;
pub mod stream;
pub mod theme;

#[cfg(test)]
mod testing;

pub use api::{AiCapability, AspectRatio, EditedImage, GeminiClient, VideoHandle};
pub use attachment::{Attachment, AttachmentKind, PreviewStore};
pub use config::Config;
pub use error::{AttachmentError, CapabilityError, PreferenceError};
pub use panels::{
    BioPanel, ImageEditPanel, StreamPanel, VideoAnalysisPanel, VideoGenerationPanel, VideoStatus,
};
pub use state::{GenerationState, SubmitOutcome};
pub use theme::{Theme, ThemeStore};
