//! Local attachment intake: validation, reading and hand-off for encryption.

use std::sync::Arc;

use futures::future::join_all;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::config::LimitsConfig;
use crate::error::{AttachmentError, Result};
use crate::i18n;
use crate::mime::{is_banned, is_inline_svg};
use crate::model::attachment::{AttachmentId, AttachmentState, ClientAttachment};
use crate::model::payload::{Payload, PayloadEncoding};
use crate::notify::{Toast, Toaster};
use crate::reader::{read_file_limited, FileSource};
use crate::store::AttachmentStore;

/// A local file that was read successfully and is ready to be encrypted
/// and sent.
#[derive(Debug, Clone)]
pub struct UploadedAttachment {
    pub id: AttachmentId,
    pub name: String,
    pub content_type: String,
    pub size: u64,
    pub inline: bool,
    /// Generated for inline attachments so the body can reference `cid:`.
    pub content_id: Option<String>,
    pub content: Payload,
    /// Lowercase hex SHA-256 of the raw bytes.
    pub checksum: String,
    /// Value for the part's `Content-Disposition` header.
    pub content_disposition: String,
}

/// Adds local files to a draft's attachment list.
pub struct Uploader {
    store: AttachmentStore,
    limits: LimitsConfig,
    toaster: Arc<dyn Toaster>,
}

impl Uploader {
    pub fn new(store: AttachmentStore, limits: LimitsConfig, toaster: Arc<dyn Toaster>) -> Self {
        Self {
            store,
            limits,
            toaster,
        }
    }

    pub fn store(&self) -> &AttachmentStore {
        &self.store
    }

    /// Validate and read one file.
    ///
    /// Banned types and inline SVG always end in `LocalError`, whatever
    /// their size. Other oversize files are rejected before anything is
    /// added to the store. All failures raise a toast.
    pub async fn upload_attachment(
        &self,
        source: FileSource,
        inline: bool,
        encoding: Option<PayloadEncoding>,
    ) -> Result<UploadedAttachment> {
        // Checked and inserted before the first await, so uploads polled
        // together see each other's reservations.
        let id = AttachmentId::generate();
        let content_id = inline.then(|| format!("{id}@mailattach"));

        let rejected = if is_banned(&source.name, &source.content_type) {
            Some(AttachmentError::BannedType {
                name: source.name.clone(),
                content_type: source.content_type.clone(),
            })
        } else if is_inline_svg(&source.content_type, inline) {
            Some(AttachmentError::InlineSvg(source.name.clone()))
        } else {
            None
        };
        if let Some(err) = rejected {
            self.reserve(&id, &source, inline, content_id);
            return Err(self.fail(&id, err));
        }

        self.check_size(&source)?;
        self.reserve(&id, &source, inline, content_id.clone());
        let limit = self.read_limit(source.size);

        let encoding = encoding.unwrap_or(PayloadEncoding::Base64);
        let store = self.store.clone();
        let progress_id = id.clone();
        let progress = move |pct: u8| {
            let _ = store.transition(&progress_id, AttachmentState::LocalUploading { progress: pct });
        };
        let (content, bytes) = match read_file_limited(&source, encoding, limit, &progress).await {
            Ok(read) => read,
            Err(e) => return Err(self.fail(&id, e)),
        };

        self.store.transition(
            &id,
            AttachmentState::Local {
                content: content.clone(),
            },
        )?;

        let checksum = format!("{:x}", Sha256::digest(&bytes));
        info!(id = %id, name = %source.name, size = bytes.len(), inline, "Attachment ready");

        Ok(UploadedAttachment {
            content_disposition: content_disposition(&source.name, inline),
            id,
            name: source.name,
            content_type: source.content_type,
            size: bytes.len() as u64,
            inline,
            content_id,
            content,
            checksum,
        })
    }

    /// Upload several files concurrently.
    ///
    /// Returns one result per input, in input order. A failing file never
    /// stops its siblings.
    pub async fn upload_attachments(
        &self,
        sources: Vec<FileSource>,
        inline: bool,
    ) -> Vec<Result<UploadedAttachment>> {
        debug!(count = sources.len(), inline, "Uploading attachments");
        join_all(
            sources
                .into_iter()
                .map(|source| self.upload_attachment(source, inline, None)),
        )
        .await
    }

    fn reserve(
        &self,
        id: &AttachmentId,
        source: &FileSource,
        inline: bool,
        content_id: Option<String>,
    ) {
        self.store.insert(ClientAttachment {
            id: id.clone(),
            name: source.name.clone(),
            content_type: source.content_type.clone(),
            size: source.size,
            content_id,
            inline,
            state: AttachmentState::LocalUploading { progress: 0 },
        });
    }

    /// Bytes this file may actually occupy: the per-file ceiling or what
    /// is left of the message budget, whichever is smaller. Must be called
    /// after the record is reserved.
    fn read_limit(&self, declared: u64) -> u64 {
        let others = self.store.total_size().saturating_sub(declared);
        self.limits
            .max_attachment_bytes
            .min(self.limits.max_message_bytes.saturating_sub(others))
    }

    fn check_size(&self, source: &FileSource) -> Result<()> {
        let limits = self.limits;
        let err = if source.size > limits.max_attachment_bytes {
            Some(AttachmentError::TooLarge {
                name: source.name.clone(),
                size: source.size,
                limit: limits.max_attachment_bytes,
            })
        } else {
            let total = self.store.total_size().saturating_add(source.size);
            (total > limits.max_message_bytes).then(|| AttachmentError::MessageTooLarge {
                total,
                limit: limits.max_message_bytes,
            })
        };
        match err {
            Some(err) => {
                warn!(name = %source.name, error = %err, "Attachment rejected");
                self.toast(&err);
                Err(err)
            }
            None => Ok(()),
        }
    }

    fn fail(&self, id: &AttachmentId, err: AttachmentError) -> AttachmentError {
        warn!(id = %id, error = %err, "Attachment failed");
        let _ = self.store.transition(
            id,
            AttachmentState::LocalError {
                message: err.user_message(),
            },
        );
        self.toast(&err);
        err
    }

    fn toast(&self, err: &AttachmentError) {
        self.toaster.show(Toast::error(
            i18n::toast_upload_rejected(),
            Some(err.user_message()),
        ));
    }
}

/// Build a `Content-Disposition` value, using the RFC 2231 `filename*`
/// form when the name is not plain ASCII.
pub fn content_disposition(name: &str, inline: bool) -> String {
    let kind = if inline { "inline" } else { "attachment" };
    if name.is_ascii() && !name.chars().any(|c| c.is_ascii_control()) {
        let escaped = name.replace('\\', "\\\\").replace('"', "\\\"");
        format!("{kind}; filename=\"{escaped}\"")
    } else {
        format!("{kind}; filename*=UTF-8''{}", percent_encode(name))
    }
}

fn percent_encode(value: &str) -> String {
    let mut out = String::with_capacity(value.len() * 3);
    for b in value.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(b as char)
            }
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}
