//! Backend seam: download descriptors and ciphertext retrieval.

pub mod manifest;

use async_trait::async_trait;

use crate::crypto::SessionKey;
use crate::error::Result;
use crate::model::attachment::AttachmentId;

pub use manifest::{Manifest, ManifestBackend, ManifestEntry};

/// Progress callback for ciphertext retrieval: `(received, total)`.
pub type TransferProgress<'a> = &'a (dyn Fn(u64, Option<u64>) + Send + Sync);

/// A short-lived download descriptor for one attachment.
///
/// Not `Clone`: a descriptor is consumed by the single fetch it was issued
/// for.
#[derive(Debug)]
pub struct AttachmentData {
    pub id: AttachmentId,
    /// Signed link to the ciphertext.
    pub link: String,
    /// Session key, already unwrapped for this user.
    pub session_key: SessionKey,
}

/// The remote side of the attachment pipeline.
#[async_trait]
pub trait AttachmentBackend: Send + Sync {
    /// Issue download descriptors for `ids` in one request.
    ///
    /// An `Err` means the whole request failed. IDs the backend does not
    /// know are simply absent from the result.
    async fn get_download_data(&self, ids: &[AttachmentId]) -> Result<Vec<AttachmentData>>;

    /// Retrieve the ciphertext behind `data.link`.
    async fn fetch_ciphertext(
        &self,
        data: &AttachmentData,
        progress: TransferProgress<'_>,
    ) -> Result<Vec<u8>>;
}
