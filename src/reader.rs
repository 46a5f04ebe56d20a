//! Local file reader: turns a selected file (or pasted bytes) into an
//! encoded [`Payload`], reporting progress as it goes.

use std::path::{Path, PathBuf};

use tokio::io::AsyncReadExt;
use tracing::debug;

use crate::error::{AttachmentError, Result};
use crate::model::payload::{Payload, PayloadEncoding};

/// Read buffer size for local files (64 KB).
const READ_CHUNK: usize = 64 * 1024;

/// Where the bytes of a [`FileSource`] come from.
#[derive(Debug, Clone)]
pub enum FileData {
    /// A file on disk, read lazily.
    Path(PathBuf),
    /// Bytes already in memory (pasted or generated images).
    Bytes(Vec<u8>),
}

/// A file-like object selected for upload.
#[derive(Debug, Clone)]
pub struct FileSource {
    /// Filename.
    pub name: String,
    /// Declared MIME type.
    pub content_type: String,
    /// Size in bytes.
    pub size: u64,
    pub data: FileData,
}

impl FileSource {
    /// Describe a file on disk, guessing its MIME type from the extension.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let meta = tokio::fs::metadata(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                AttachmentError::FileNotFound(path.to_path_buf())
            } else {
                AttachmentError::io(path, e)
            }
        })?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".to_string());
        let content_type = mime_guess::from_path(path)
            .first_or_octet_stream()
            .essence_str()
            .to_string();
        Ok(Self {
            name,
            content_type,
            size: meta.len(),
            data: FileData::Path(path.to_path_buf()),
        })
    }

    /// Describe in-memory bytes.
    pub fn from_bytes(
        name: impl Into<String>,
        content_type: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            size: bytes.len() as u64,
            data: FileData::Bytes(bytes),
        }
    }
}

/// Read `source` fully and encode it.
///
/// `progress` receives a percentage (0–100) after every chunk. It is called
/// at least once, with 100, on success.
pub async fn read_file(
    source: &FileSource,
    encoding: PayloadEncoding,
    progress: &(dyn Fn(u8) + Send + Sync),
) -> Result<(Payload, Vec<u8>)> {
    read_file_limited(source, encoding, u64::MAX, progress).await
}

/// Like [`read_file`], but fails with `TooLarge` as soon as more than
/// `limit` bytes have been read, whatever `source.size` claims.
pub async fn read_file_limited(
    source: &FileSource,
    encoding: PayloadEncoding,
    limit: u64,
    progress: &(dyn Fn(u8) + Send + Sync),
) -> Result<(Payload, Vec<u8>)> {
    let bytes = match &source.data {
        FileData::Bytes(bytes) => {
            if bytes.len() as u64 > limit {
                return Err(too_large(source, bytes.len() as u64, limit));
            }
            bytes.clone()
        }
        FileData::Path(path) => read_path(path, source, limit, progress).await?,
    };
    progress(100);
    debug!(
        name = %source.name,
        bytes = bytes.len(),
        encoding = encoding.label(),
        "Read local file"
    );
    Ok((Payload::encode(&bytes, encoding), bytes))
}

async fn read_path(
    path: &Path,
    source: &FileSource,
    limit: u64,
    progress: &(dyn Fn(u8) + Send + Sync),
) -> Result<Vec<u8>> {
    let expected = source.size;
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|e| AttachmentError::io(path, e))?;
    let mut buf = Vec::with_capacity(expected.min(limit) as usize);
    let mut chunk = vec![0u8; READ_CHUNK];
    loop {
        let n = file
            .read(&mut chunk)
            .await
            .map_err(|e| AttachmentError::io(path, e))?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        if buf.len() as u64 > limit {
            return Err(too_large(source, buf.len() as u64, limit));
        }
        if expected > 0 {
            let pct = (buf.len() as u64 * 100 / expected).min(99);
            progress(pct as u8);
        }
    }
    Ok(buf)
}

fn too_large(source: &FileSource, size: u64, limit: u64) -> AttachmentError {
    AttachmentError::TooLarge {
        name: source.name.clone(),
        size,
        limit,
    }
}
