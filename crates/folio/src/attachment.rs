use std::collections::HashMap;
use std::io::Cursor;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::error::AttachmentError;

/// Inline-data ceiling of the capability endpoints.
pub const MAX_ATTACHMENT_BYTES: usize = 20 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentKind {
    Image,
    Video,
}

impl std::fmt::Display for AttachmentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Image => write!(f, "image"),
            Self::Video => write!(f, "video"),
        }
    }
}

/// A user-selected file, held in memory for the lifetime of the selection.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub name: String,
    pub kind: AttachmentKind,
    pub mime_type: String,
    pub data: Arc<[u8]>,
}

impl Attachment {
    pub fn from_path(path: &Path) -> Result<Self, AttachmentError> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        let size = std::fs::metadata(path)
            .map_err(|source| AttachmentError::Io { path: path.to_path_buf(), source })?
            .len() as usize;
        if size > MAX_ATTACHMENT_BYTES {
            return Err(AttachmentError::TooLarge { name, size, limit: MAX_ATTACHMENT_BYTES });
        }

        let data = std::fs::read(path)
            .map_err(|source| AttachmentError::Io { path: path.to_path_buf(), source })?;
        Self::from_bytes(name, data)
    }

    /// Classify `data`: images by content sniffing, videos by file extension.
    pub fn from_bytes(name: impl Into<String>, data: Vec<u8>) -> Result<Self, AttachmentError> {
        let name = name.into();
        if data.is_empty() {
            return Err(AttachmentError::Empty { name });
        }
        if data.len() > MAX_ATTACHMENT_BYTES {
            return Err(AttachmentError::TooLarge {
                name,
                size: data.len(),
                limit: MAX_ATTACHMENT_BYTES,
            });
        }

        let (kind, mime_type) = if let Ok(format) = image::guess_format(&data) {
            (AttachmentKind::Image, format.to_mime_type().to_string())
        } else if let Some(mime) = video_mime_type(&name) {
            (AttachmentKind::Video, mime.to_string())
        } else {
            return Err(AttachmentError::Unsupported { name });
        };

        Ok(Self { name, kind, mime_type, data: data.into() })
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

fn video_mime_type(name: &str) -> Option<&'static str> {
    let ext = Path::new(name).extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "mp4" | "m4v" => Some("video/mp4"),
        "webm" => Some("video/webm"),
        "mov" => Some("video/quicktime"),
        "mkv" => Some("video/x-matroska"),
        "avi" => Some("video/x-msvideo"),
        "mpeg" | "mpg" => Some("video/mpeg"),
        "3gp" => Some("video/3gpp"),
        _ => None,
    }
}

/// Issues locally addressable preview URIs for selected attachments.
///
/// Every [`PreviewHandle`] stays registered until dropped, so a holder that
/// forgets to let go of superseded previews shows up in [`PreviewStore::live`].
#[derive(Debug, Default)]
pub struct PreviewStore {
    next_id: AtomicU64,
    live: Mutex<HashMap<u64, String>>,
}

impl PreviewStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn create(self: &Arc<Self>, attachment: &Attachment) -> PreviewHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let uri = format!("blob:folio/{id}");
        self.live.lock().insert(id, attachment.name.clone());
        debug!("Preview {uri} created for {}", attachment.name);
        PreviewHandle {
            id,
            uri,
            description: describe(attachment),
            store: Arc::clone(self),
        }
    }

    /// Number of previews not yet released.
    pub fn live(&self) -> usize {
        self.live.lock().len()
    }

    fn release(&self, id: u64) {
        if let Some(name) = self.live.lock().remove(&id) {
            debug!("Preview blob:folio/{id} released ({name})");
        }
    }
}

/// A registered preview. Dropping it releases the URI.
#[derive(Debug)]
pub struct PreviewHandle {
    id: u64,
    uri: String,
    description: String,
    store: Arc<PreviewStore>,
}

impl PreviewHandle {
    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn description(&self) -> &str {
        &self.description
    }
}

impl Drop for PreviewHandle {
    fn drop(&mut self) {
        self.store.release(self.id);
    }
}

fn describe(attachment: &Attachment) -> String {
    let size = human_size(attachment.len());
    if attachment.kind == AttachmentKind::Image {
        let dims = image::ImageReader::new(Cursor::new(&attachment.data[..]))
            .with_guessed_format()
            .ok()
            .and_then(|r| r.into_dimensions().ok());
        if let Some((w, h)) = dims {
            return format!("{} ({}, {w}x{h}, {size})", attachment.name, attachment.mime_type);
        }
    }
    format!("{} ({}, {size})", attachment.name, attachment.mime_type)
}

fn human_size(bytes: usize) -> String {
    const KIB: f64 = 1024.0;
    let b = bytes as f64;
    if b >= KIB * KIB {
        format!("{:.1} MiB", b / (KIB * KIB))
    } else if b >= KIB {
        format!("{:.1} KiB", b / KIB)
    } else {
        format!("{bytes} B")
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use std::io::Cursor;

    use super::Attachment;

    pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbaImage::from_pixel(width, height, image::Rgba([200, 40, 40, 255]));
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, image::ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    pub fn png(name: &str) -> Attachment {
        Attachment::from_bytes(name, png_bytes(4, 3)).unwrap()
    }

    pub fn video(name: &str) -> Attachment {
        Attachment::from_bytes(name, vec![0, 0, 0, 24, b'f', b't', b'y', b'p']).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn image_kind_comes_from_content() {
        // extension lies; content wins
        let att = Attachment::from_bytes("holiday.mp4", png_bytes(2, 2)).unwrap();
        assert_eq!(att.kind, AttachmentKind::Image);
        assert_eq!(att.mime_type, "image/png");
    }

    #[test]
    fn video_kind_comes_from_extension() {
        let att = video("Clip.MOV");
        assert_eq!(att.kind, AttachmentKind::Video);
        assert_eq!(att.mime_type, "video/quicktime");
    }

    #[test]
    fn unknown_and_empty_files_are_rejected() {
        assert!(matches!(
            Attachment::from_bytes("notes.txt", b"hello".to_vec()),
            Err(AttachmentError::Unsupported { .. })
        ));
        assert!(matches!(
            Attachment::from_bytes("a.mp4", Vec::new()),
            Err(AttachmentError::Empty { .. })
        ));
    }

    #[test]
    fn oversized_file_is_rejected_before_reading() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.mp4");
        let file = std::fs::File::create(&path).unwrap();
        file.set_len(MAX_ATTACHMENT_BYTES as u64 + 1).unwrap();
        assert!(matches!(
            Attachment::from_path(&path),
            Err(AttachmentError::TooLarge { .. })
        ));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = Attachment::from_path(Path::new("/nonexistent/clip.mp4")).unwrap_err();
        assert!(matches!(err, AttachmentError::Io { .. }));
    }

    #[test]
    fn dropping_a_handle_releases_it() {
        let store = PreviewStore::new();
        let a = store.create(&png("a.png"));
        let b = store.create(&video("b.mp4"));
        assert_eq!(store.live(), 2);
        assert_ne!(a.uri(), b.uri());
        drop(a);
        assert_eq!(store.live(), 1);
        drop(b);
        assert_eq!(store.live(), 0);
    }

    #[test]
    fn image_preview_reports_dimensions() {
        let store = PreviewStore::new();
        let handle = store.create(&png("shot.png"));
        assert!(handle.description().starts_with("shot.png (image/png, 4x3, "));
        assert!(handle.uri().starts_with("blob:folio/"));
    }
}
