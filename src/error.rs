//! Centralized error types for mailattach.

use std::path::PathBuf;
use thiserror::Error;

use crate::i18n;
use crate::model::attachment::AttachmentId;

/// All errors produced by the mailattach library.
#[derive(Error, Debug)]
pub enum AttachmentError {
    /// I/O error with the associated file path.
    #[error("I/O error reading '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The specified file does not exist.
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// A single file exceeds the per-attachment ceiling.
    #[error("Attachment '{name}' is {size} bytes, limit is {limit}")]
    TooLarge { name: String, size: u64, limit: u64 },

    /// Adding the file would push the whole message over its byte budget.
    #[error("Message would be {total} bytes, limit is {limit}")]
    MessageTooLarge { total: u64, limit: u64 },

    /// The MIME type or extension is on the banned list.
    #[error("File type not supported: '{name}' ({content_type})")]
    BannedType { name: String, content_type: String },

    /// SVG images cannot be inlined into message markup.
    #[error("Inline SVG is not allowed: '{0}'")]
    InlineSvg(String),

    /// Reading a local file failed part-way.
    #[error("Failed to read '{name}': {reason}")]
    Read { name: String, reason: String },

    /// Stored content could not be decoded back to bytes.
    #[error("Content decoding error: {0}")]
    Decode(String),

    /// The batch "get download data" request failed.
    #[error("Backend request failed: {0}")]
    Backend(String),

    /// Retrieving ciphertext for one attachment failed.
    #[error("Failed to fetch attachment {id}: {reason}")]
    Network { id: AttachmentId, reason: String },

    /// The backend returned no download data for an attachment.
    #[error("No download data returned for attachment {0}")]
    MissingDownloadData(AttachmentId),

    /// Client-side decryption of one attachment failed.
    #[error("Failed decrypting attachment {id}: {reason}")]
    Decrypt { id: AttachmentId, reason: String },

    /// Building the zip archive failed.
    #[error("Archive error: {0}")]
    Archive(String),

    /// The attachment manifest is malformed.
    #[error("Invalid manifest '{path}': {reason}")]
    InvalidManifest { path: PathBuf, reason: String },

    /// A state change that would move an attachment backwards.
    #[error("Invalid transition for attachment {id}: {from} -> {to}")]
    InvalidTransition {
        id: AttachmentId,
        from: &'static str,
        to: &'static str,
    },

    /// No attachment with this ID is registered.
    #[error("Unknown attachment: {0}")]
    UnknownAttachment(AttachmentId),

    /// Nothing was selected for download.
    #[error("No attachments to download")]
    NothingToDownload,

    /// The owning scope was torn down while work was in flight.
    #[error("Operation cancelled")]
    Cancelled,
}

/// Convenience alias for `Result<T, AttachmentError>`.
pub type Result<T> = std::result::Result<T, AttachmentError>;

impl AttachmentError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Short, localized text suitable for an attachment error state or a toast.
    pub fn user_message(&self) -> String {
        match self {
            Self::TooLarge { limit, .. } | Self::MessageTooLarge { limit, .. } => format!(
                "{} ({})",
                i18n::err_too_large(),
                humansize::format_size(*limit, humansize::BINARY)
            ),
            Self::BannedType { .. } => i18n::err_file_type_not_supported().to_string(),
            Self::InlineSvg(_) => i18n::err_inline_svg().to_string(),
            Self::Io { .. } | Self::FileNotFound(_) | Self::Read { .. } => {
                i18n::err_read_failed().to_string()
            }
            Self::Decrypt { .. } => i18n::err_failed_decrypting().to_string(),
            Self::Network { .. } | Self::MissingDownloadData(_) | Self::Backend(_) => {
                i18n::err_failed_fetching().to_string()
            }
            Self::Cancelled => i18n::err_cancelled().to_string(),
            other => other.to_string(),
        }
    }
}

/// Allow `?` on `std::io::Error` when no path context is available
/// (rare, prefer `AttachmentError::io`).
impl From<std::io::Error> for AttachmentError {
    fn from(source: std::io::Error) -> Self {
        Self::Io {
            path: PathBuf::from("<unknown>"),
            source,
        }
    }
}
