//! Preview renderer selection.
//!
//! [`select_renderer`] is a pure function of its inputs. Structured content
//! wins over the MIME type; otherwise the MIME type's [`FileCategory`]
//! decides.

use std::fmt;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::Serialize;

use crate::mime::category::essence;
use crate::mime::FileCategory;
use crate::model::attachment::ClientAttachment;
use crate::model::payload::PayloadEncoding;

/// Video types browsers cannot play inline.
pub const UNSUPPORTED_VIDEO_FORMATS: &[&str] = &[
    "video/x-msvideo",
    "video/avi",
    "video/x-ms-wmv",
    "video/x-flv",
    "video/x-matroska",
    "video/3gpp",
];

/// Content that is previewed by kind rather than by MIME type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructuredContent {
    Pdf,
    RichText,
    Folder,
}

/// The renderer chosen for a preview.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PreviewRenderer {
    Image,
    Icon,
    Pdf,
    Code,
    Video,
    Audio,
    Word,
    Sheet,
    Markdown,
    Text,
    RichText,
    Folder,
    /// A known category with no inline renderer; offers download.
    Unknown,
    /// No usable type information at all.
    Fallback,
}

impl PreviewRenderer {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Icon => "icon",
            Self::Pdf => "pdf",
            Self::Code => "code",
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Word => "word",
            Self::Sheet => "sheet",
            Self::Markdown => "markdown",
            Self::Text => "text",
            Self::RichText => "rich_text",
            Self::Folder => "folder",
            Self::Unknown => "unknown",
            Self::Fallback => "fallback",
        }
    }
}

impl fmt::Display for PreviewRenderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pick the renderer for `content` / `mime`.
pub fn select_renderer(content: Option<StructuredContent>, mime: Option<&str>) -> PreviewRenderer {
    match content {
        Some(StructuredContent::Pdf) => return PreviewRenderer::Pdf,
        Some(StructuredContent::RichText) => return PreviewRenderer::RichText,
        Some(StructuredContent::Folder) => return PreviewRenderer::Folder,
        None => {}
    }

    let Some(mime) = mime.filter(|m| !m.trim().is_empty()) else {
        return PreviewRenderer::Fallback;
    };
    if UNSUPPORTED_VIDEO_FORMATS.contains(&essence(mime).as_str()) {
        return PreviewRenderer::Fallback;
    }

    match FileCategory::from_mime(mime) {
        FileCategory::Image => PreviewRenderer::Image,
        FileCategory::Icon => PreviewRenderer::Icon,
        FileCategory::Pdf => PreviewRenderer::Pdf,
        FileCategory::Code => PreviewRenderer::Code,
        FileCategory::Video => PreviewRenderer::Video,
        FileCategory::Audio => PreviewRenderer::Audio,
        FileCategory::Word => PreviewRenderer::Word,
        FileCategory::Sheet => PreviewRenderer::Sheet,
        FileCategory::Markdown => PreviewRenderer::Markdown,
        FileCategory::Text => PreviewRenderer::Text,
        FileCategory::Zip
        | FileCategory::Ebook
        | FileCategory::Calendar
        | FileCategory::Presentation
        | FileCategory::Chart
        | FileCategory::Postscript => PreviewRenderer::Unknown,
        FileCategory::Unknown => PreviewRenderer::Fallback,
    }
}

/// Read-only projection of a ready attachment, handed to a renderer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreviewObject {
    /// Base64 bytes.
    pub data: String,
    pub content_type: String,
    pub filename: String,
    pub size: u64,
    pub inline: bool,
    pub content_id: Option<String>,
}

impl PreviewObject {
    /// Project a ready attachment. `None` until content is available.
    pub fn from_attachment(attachment: &ClientAttachment) -> Option<Self> {
        let content = attachment.content()?;
        let data = match content.encoding() {
            PayloadEncoding::Base64 => content.as_str().to_string(),
            PayloadEncoding::Text(_) => BASE64.encode(content.to_bytes().ok()?),
        };
        Some(Self {
            data,
            content_type: attachment.content_type.clone(),
            filename: attachment.name.clone(),
            size: attachment.size,
            inline: attachment.inline,
            content_id: attachment.content_id.clone(),
        })
    }

    /// Renderer for this object.
    pub fn renderer(&self) -> PreviewRenderer {
        select_renderer(None, Some(self.content_type.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::attachment::{AttachmentId, AttachmentMeta, AttachmentState};
    use crate::model::payload::Payload;

    #[test]
    fn test_structured_content_wins() {
        assert_eq!(
            select_renderer(Some(StructuredContent::RichText), Some("image/png")),
            PreviewRenderer::RichText
        );
        assert_eq!(
            select_renderer(Some(StructuredContent::Folder), None),
            PreviewRenderer::Folder
        );
        assert_eq!(
            select_renderer(Some(StructuredContent::Pdf), Some("text/plain")),
            PreviewRenderer::Pdf
        );
    }

    #[test]
    fn test_mime_dispatch() {
        assert_eq!(select_renderer(None, Some("image/png")), PreviewRenderer::Image);
        assert_eq!(select_renderer(None, Some("image/x-icon")), PreviewRenderer::Icon);
        assert_eq!(
            select_renderer(None, Some("application/pdf")),
            PreviewRenderer::Pdf
        );
        assert_eq!(select_renderer(None, Some("video/mp4")), PreviewRenderer::Video);
        assert_eq!(select_renderer(None, Some("audio/mpeg")), PreviewRenderer::Audio);
        assert_eq!(select_renderer(None, Some("text/csv")), PreviewRenderer::Sheet);
        assert_eq!(
            select_renderer(None, Some("text/markdown")),
            PreviewRenderer::Markdown
        );
        assert_eq!(
            select_renderer(None, Some("text/plain; charset=utf-8")),
            PreviewRenderer::Text
        );
        assert_eq!(
            select_renderer(None, Some("application/json")),
            PreviewRenderer::Code
        );
    }

    #[test]
    fn test_unsupported_video_falls_back() {
        assert_eq!(
            select_renderer(None, Some("video/x-msvideo")),
            PreviewRenderer::Fallback
        );
        assert_eq!(
            select_renderer(None, Some("Video/X-Matroska")),
            PreviewRenderer::Fallback
        );
    }

    #[test]
    fn test_unknown_and_fallback() {
        assert_eq!(
            select_renderer(None, Some("application/zip")),
            PreviewRenderer::Unknown
        );
        assert_eq!(
            select_renderer(None, Some("application/x-whatever")),
            PreviewRenderer::Fallback
        );
        assert_eq!(select_renderer(None, None), PreviewRenderer::Fallback);
        assert_eq!(select_renderer(None, Some("  ")), PreviewRenderer::Fallback);
    }

    #[test]
    fn test_preview_object_needs_content() {
        let meta = AttachmentMeta {
            id: AttachmentId::from("a"),
            name: "notes.txt".into(),
            content_type: "text/plain".into(),
            size: 2,
            content_id: None,
            inline: false,
        };
        let mut att = ClientAttachment::remote(&meta);
        assert!(PreviewObject::from_attachment(&att).is_none());

        att.state = AttachmentState::RemoteFetched {
            content: Payload::from_bytes(b"hi"),
        };
        let preview = PreviewObject::from_attachment(&att).unwrap();
        assert_eq!(preview.data, "aGk=");
        assert_eq!(preview.renderer(), PreviewRenderer::Text);
    }

    #[test]
    fn test_text_payload_is_rebased() {
        let meta = AttachmentMeta {
            id: AttachmentId::from("a"),
            name: "notes.txt".into(),
            content_type: "text/plain".into(),
            size: 2,
            content_id: None,
            inline: false,
        };
        let mut att = ClientAttachment::remote(&meta);
        let utf8 = PayloadEncoding::from_label("utf-8").unwrap();
        att.state = AttachmentState::RemoteFetched {
            content: Payload::encode(b"hi", utf8),
        };
        assert_eq!(PreviewObject::from_attachment(&att).unwrap().data, "aGk=");
    }
}
