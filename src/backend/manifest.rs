//! JSON manifest backend.
//!
//! A manifest lists attachment metadata together with a link to each
//! ciphertext and its session key. Links are plain or `file://` paths
//! (relative to the manifest's directory) or `http(s)://` URLs.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncReadExt;
use tracing::{debug, info, warn};

use super::{AttachmentBackend, AttachmentData, TransferProgress};
use crate::crypto::SessionKey;
use crate::error::{AttachmentError, Result};
use crate::model::attachment::{AttachmentId, AttachmentMeta};

const READ_CHUNK: usize = 64 * 1024;

/// One manifest record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestEntry {
    #[serde(flatten)]
    pub meta: AttachmentMeta,
    /// Location of the ciphertext.
    pub link: String,
    /// Base64 session key.
    pub session_key: String,
}

/// On-disk list of attachments.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub attachments: Vec<ManifestEntry>,
}

impl Manifest {
    /// Load a manifest from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| AttachmentError::io(path, e))?;
        serde_json::from_str(&text).map_err(|e| AttachmentError::InvalidManifest {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Load a manifest, or start an empty one if the file does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Write the manifest as pretty JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        let text = serde_json::to_string_pretty(self).map_err(|e| {
            AttachmentError::InvalidManifest {
                path: path.to_path_buf(),
                reason: e.to_string(),
            }
        })?;
        std::fs::write(path, text).map_err(|e| AttachmentError::io(path, e))?;
        info!(path = %path.display(), count = self.attachments.len(), "Saved manifest");
        Ok(())
    }

    /// Add an entry, replacing one with the same ID.
    pub fn upsert(&mut self, entry: ManifestEntry) {
        match self
            .attachments
            .iter_mut()
            .find(|e| e.meta.id == entry.meta.id)
        {
            Some(existing) => *existing = entry,
            None => self.attachments.push(entry),
        }
    }

    /// Attachment metadata, in manifest order.
    pub fn metas(&self) -> Vec<AttachmentMeta> {
        self.attachments.iter().map(|e| e.meta.clone()).collect()
    }
}

/// [`AttachmentBackend`] backed by a [`Manifest`].
pub struct ManifestBackend {
    manifest: Manifest,
    base_dir: PathBuf,
    http: reqwest::Client,
}

impl ManifestBackend {
    /// Open the manifest at `path`.
    pub fn open(path: &Path, http_timeout: Duration) -> Result<Self> {
        let manifest = Manifest::load(path)?;
        let base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Self::new(manifest, base_dir, http_timeout)
    }

    /// Wrap an in-memory manifest; relative links resolve against `base_dir`.
    pub fn new(manifest: Manifest, base_dir: PathBuf, http_timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(http_timeout)
            .build()
            .map_err(|e| AttachmentError::Backend(e.to_string()))?;
        Ok(Self {
            manifest,
            base_dir,
            http,
        })
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    fn resolve(&self, link: &str) -> PathBuf {
        let raw = link.strip_prefix("file://").unwrap_or(link);
        let path = Path::new(raw);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    async fn fetch_http(
        &self,
        data: &AttachmentData,
        progress: TransferProgress<'_>,
    ) -> Result<Vec<u8>> {
        let network = |reason: String| AttachmentError::Network {
            id: data.id.clone(),
            reason,
        };
        let mut response = self
            .http
            .get(&data.link)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| network(e.to_string()))?;
        let total = response.content_length();
        let mut buf = Vec::with_capacity(total.unwrap_or(0) as usize);
        while let Some(chunk) = response.chunk().await.map_err(|e| network(e.to_string()))? {
            buf.extend_from_slice(&chunk);
            progress(buf.len() as u64, total);
        }
        Ok(buf)
    }

    async fn fetch_file(
        &self,
        data: &AttachmentData,
        progress: TransferProgress<'_>,
    ) -> Result<Vec<u8>> {
        let path = self.resolve(&data.link);
        let network = |e: std::io::Error| AttachmentError::Network {
            id: data.id.clone(),
            reason: format!("{}: {e}", path.display()),
        };
        let mut file = tokio::fs::File::open(&path).await.map_err(network)?;
        let total = file.metadata().await.map(|m| m.len()).ok();
        let mut buf = Vec::with_capacity(total.unwrap_or(0) as usize);
        let mut chunk = vec![0u8; READ_CHUNK];
        loop {
            let n = file.read(&mut chunk).await.map_err(network)?;
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            progress(buf.len() as u64, total);
        }
        Ok(buf)
    }
}

#[async_trait]
impl AttachmentBackend for ManifestBackend {
    async fn get_download_data(&self, ids: &[AttachmentId]) -> Result<Vec<AttachmentData>> {
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            let Some(entry) = self.manifest.attachments.iter().find(|e| &e.meta.id == id) else {
                debug!(id = %id, "Attachment not in manifest");
                continue;
            };
            // A bad key only costs its own attachment.
            let session_key = match SessionKey::from_base64(&entry.session_key) {
                Ok(key) => key,
                Err(e) => {
                    warn!(id = %id, error = %e, "Invalid session key in manifest");
                    continue;
                }
            };
            out.push(AttachmentData {
                id: id.clone(),
                link: entry.link.clone(),
                session_key,
            });
        }
        Ok(out)
    }

    async fn fetch_ciphertext(
        &self,
        data: &AttachmentData,
        progress: TransferProgress<'_>,
    ) -> Result<Vec<u8>> {
        if data.link.starts_with("http://") || data.link.starts_with("https://") {
            self.fetch_http(data, progress).await
        } else {
            self.fetch_file(data, progress).await
        }
    }
}
