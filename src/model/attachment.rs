//! Attachment records and their lifecycle states.
//!
//! Content, progress and error text live inside the [`AttachmentState`]
//! variant they belong to, so a record can never carry content while it is
//! still uploading or fetching.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::payload::Payload;

/// Opaque attachment identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttachmentId(String);

impl AttachmentId {
    /// Generate a fresh ID for a locally created attachment.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// The raw ID string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for AttachmentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for AttachmentId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for AttachmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Server-side metadata for one attachment of an existing message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentMeta {
    /// Attachment ID as known by the backend.
    pub id: AttachmentId,
    /// Filename shown to the user.
    pub name: String,
    /// MIME content type (e.g. `"image/jpeg"`, `"application/pdf"`).
    pub content_type: String,
    /// Plaintext size in bytes.
    pub size: u64,
    /// Content-ID for inline attachments referenced from HTML (`cid:`).
    #[serde(default)]
    pub content_id: Option<String>,
    /// `true` if the attachment is embedded in the message body.
    #[serde(default)]
    pub inline: bool,
}

/// Lifecycle state of a [`ClientAttachment`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachmentState {
    /// A local file is being read; `progress` is 0–100.
    LocalUploading { progress: u8 },
    /// A local file was read successfully.
    Local { content: Payload },
    /// A local file was rejected or could not be read.
    LocalError { message: String },
    /// Known from message metadata, content not yet retrieved.
    Remote,
    /// Ciphertext is being retrieved and decrypted; `progress` is 0–100.
    RemoteFetching { progress: u8 },
    /// Decrypted content is available.
    RemoteFetched { content: Payload },
    /// Retrieval or decryption failed.
    RemoteError { message: String },
}

impl AttachmentState {
    /// Short state name for logs and CLI output.
    pub fn name(&self) -> &'static str {
        match self {
            Self::LocalUploading { .. } => "local-uploading",
            Self::Local { .. } => "local",
            Self::LocalError { .. } => "local-error",
            Self::Remote => "remote",
            Self::RemoteFetching { .. } => "remote-fetching",
            Self::RemoteFetched { .. } => "remote-fetched",
            Self::RemoteError { .. } => "remote-error",
        }
    }

    /// Readable content, present only in `Local` and `RemoteFetched`.
    pub fn content(&self) -> Option<&Payload> {
        match self {
            Self::Local { content } | Self::RemoteFetched { content } => Some(content),
            _ => None,
        }
    }

    /// Progress percentage while uploading or fetching.
    pub fn progress(&self) -> Option<u8> {
        match self {
            Self::LocalUploading { progress } | Self::RemoteFetching { progress } => {
                Some(*progress)
            }
            _ => None,
        }
    }

    /// Error message for failed attachments.
    pub fn error(&self) -> Option<&str> {
        match self {
            Self::LocalError { message } | Self::RemoteError { message } => Some(message),
            _ => None,
        }
    }

    /// `true` while a read or fetch is running.
    pub fn in_progress(&self) -> bool {
        self.progress().is_some()
    }

    /// Whether moving from `self` to `next` keeps the lifecycle monotonic.
    ///
    /// `Local`, `LocalError` and `RemoteFetched` are terminal. `RemoteError`
    /// may be retried.
    pub fn can_transition_to(&self, next: &AttachmentState) -> bool {
        use AttachmentState::*;
        matches!(
            (self, next),
            (
                LocalUploading { .. },
                LocalUploading { .. } | Local { .. } | LocalError { .. }
            ) | (
                Remote | RemoteFetching { .. },
                RemoteFetching { .. } | RemoteFetched { .. } | RemoteError { .. }
            ) | (
                RemoteError { .. },
                RemoteFetching { .. } | RemoteFetched { .. }
            )
        )
    }
}

/// One attachment instance, local or remote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientAttachment {
    /// Attachment ID.
    pub id: AttachmentId,
    /// Filename.
    pub name: String,
    /// MIME content type.
    pub content_type: String,
    /// Size in bytes.
    pub size: u64,
    /// Content-ID for inline (`cid:`) references.
    pub content_id: Option<String>,
    /// Embedded in the message body rather than listed as a file.
    pub inline: bool,
    /// Current lifecycle state.
    pub state: AttachmentState,
}

impl ClientAttachment {
    /// A record for server metadata, in the `Remote` state.
    pub fn remote(meta: &AttachmentMeta) -> Self {
        Self {
            id: meta.id.clone(),
            name: meta.name.clone(),
            content_type: meta.content_type.clone(),
            size: meta.size,
            content_id: meta.content_id.clone(),
            inline: meta.inline,
            state: AttachmentState::Remote,
        }
    }

    /// Decoded content if the attachment is ready.
    pub fn content(&self) -> Option<&Payload> {
        self.state.content()
    }

    /// Metadata view of this record.
    pub fn meta(&self) -> AttachmentMeta {
        AttachmentMeta {
            id: self.id.clone(),
            name: self.name.clone(),
            content_type: self.content_type.clone(),
            size: self.size,
            content_id: self.content_id.clone(),
            inline: self.inline,
        }
    }
}
