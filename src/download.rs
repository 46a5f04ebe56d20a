//! Save attachments: one file directly, several as a zip archive.

use std::collections::HashMap;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{Datelike, Local, Timelike};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use zip::write::SimpleFileOptions;

use crate::bridge::{BridgeMessage, NativeBridge};
use crate::error::{AttachmentError, Result};
use crate::fetch::{no_progress, DecryptPipeline, FetchProgress};
use crate::i18n;
use crate::model::attachment::{AttachmentId, AttachmentMeta};
use crate::notify::{Toast, Toaster};

/// Where a download ends up.
#[derive(Clone)]
pub enum SaveTarget {
    /// Write into a local directory, never overwriting.
    Directory(PathBuf),
    /// Hand the file to a native host.
    NativeBridge(Arc<dyn NativeBridge>),
}

/// The file produced by a download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SavedFile {
    Path { path: PathBuf },
    Bridge { filename: String },
}

/// Outcome of [`BulkDownloader::download`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct DownloadReport {
    /// `None` when every attachment failed.
    pub saved: Option<SavedFile>,
    /// Names inside the archive, or the single saved name.
    pub entries: Vec<String>,
    pub failed: Vec<AttachmentId>,
}

/// Decrypts attachments of a message and saves them.
pub struct BulkDownloader {
    pipeline: Arc<DecryptPipeline>,
    toaster: Arc<dyn Toaster>,
    progress: FetchProgress,
}

impl BulkDownloader {
    pub fn new(pipeline: Arc<DecryptPipeline>, toaster: Arc<dyn Toaster>) -> Self {
        Self {
            pipeline,
            toaster,
            progress: no_progress(),
        }
    }

    /// Report per-attachment retrieval progress.
    pub fn with_progress(mut self, progress: FetchProgress) -> Self {
        self.progress = progress;
        self
    }

    /// Save `attachments`.
    ///
    /// A single attachment is saved under its own name. Two or more are
    /// packed into `<filename>.zip`; attachments that fail are left out of
    /// the archive and each raises a toast. Fails only when nothing was
    /// selected, the batch request fails, or the result cannot be written.
    pub async fn download(
        &self,
        attachments: &[AttachmentMeta],
        filename: &str,
        target: &SaveTarget,
        token: &CancellationToken,
    ) -> Result<DownloadReport> {
        if attachments.is_empty() {
            return Err(AttachmentError::NothingToDownload);
        }
        let ids: Vec<_> = attachments.iter().map(|a| a.id.clone()).collect();

        let outcomes = match self
            .pipeline
            .retrieve(&ids, token, Arc::clone(&self.progress))
            .await
        {
            Ok(outcomes) => outcomes,
            Err(AttachmentError::Cancelled) => return Err(AttachmentError::Cancelled),
            Err(e) => {
                self.toaster.show(Toast::error(
                    i18n::toast_download_failed(),
                    Some(e.user_message()),
                ));
                return Err(e);
            }
        };
        if token.is_cancelled() {
            return Err(AttachmentError::Cancelled);
        }
        let mut outcomes: HashMap<_, _> = outcomes.into_iter().collect();

        let mut report = DownloadReport::default();
        let mut files = Vec::with_capacity(attachments.len());
        for meta in attachments {
            let bytes = match outcomes.remove(&meta.id) {
                Some(Ok(content)) => content.to_bytes(),
                Some(Err(e)) => Err(e),
                None => Err(AttachmentError::MissingDownloadData(meta.id.clone())),
            };
            match bytes {
                Ok(bytes) => files.push((meta, bytes)),
                Err(e) => {
                    warn!(id = %meta.id, name = %meta.name, error = %e, "Attachment left out of download");
                    self.toaster.show(Toast::error(
                        i18n::toast_download_failed(),
                        Some(format!("{}: {}", meta.name, e.user_message())),
                    ));
                    report.failed.push(meta.id.clone());
                }
            }
        }
        if files.is_empty() {
            return Ok(report);
        }

        let (name, content_type, data) = if attachments.len() == 1 {
            let (meta, bytes) = files.remove(0);
            report.entries.push(meta.name.clone());
            (meta.name.clone(), meta.content_type.clone(), bytes)
        } else {
            let entries: Vec<(String, Vec<u8>)> = unique_entry_names(&files)
                .into_iter()
                .zip(files.into_iter().map(|(_, bytes)| bytes))
                .collect();
            report.entries = entries.iter().map(|(n, _)| n.clone()).collect();
            let archive = tokio::task::spawn_blocking(move || build_zip(entries))
                .await
                .map_err(|e| AttachmentError::Archive(e.to_string()))??;
            (
                archive_name(filename),
                "application/zip".to_string(),
                archive,
            )
        };

        report.saved = Some(save(target, &name, &content_type, &data).await?);
        info!(
            name = %name,
            entries = report.entries.len(),
            failed = report.failed.len(),
            "Download saved"
        );
        Ok(report)
    }
}

async fn save(target: &SaveTarget, name: &str, content_type: &str, data: &[u8]) -> Result<SavedFile> {
    match target {
        SaveTarget::Directory(dir) => {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| AttachmentError::io(dir, e))?;
            let path = unique_path(&dir.join(sanitize_filename(name, 150)));
            tokio::fs::write(&path, data)
                .await
                .map_err(|e| AttachmentError::io(&path, e))?;
            Ok(SavedFile::Path { path })
        }
        SaveTarget::NativeBridge(bridge) => {
            bridge.send(BridgeMessage::SaveFile {
                filename: name.to_string(),
                content_type: content_type.to_string(),
                data: BASE64.encode(data),
            });
            Ok(SavedFile::Bridge {
                filename: name.to_string(),
            })
        }
    }
}

/// Archive entry names: `a.txt`, `a (1).txt`, `a (2).txt`, …
fn unique_entry_names(files: &[(&AttachmentMeta, Vec<u8>)]) -> Vec<String> {
    let mut taken: Vec<String> = Vec::with_capacity(files.len());
    for (meta, _) in files {
        let base = sanitize_filename(&meta.name, 150);
        let mut name = base.clone();
        let mut n = 1;
        while taken.contains(&name) {
            name = with_suffix(&base, &format!(" ({n})"));
            n += 1;
        }
        taken.push(name);
    }
    taken
}

fn with_suffix(name: &str, suffix: &str) -> String {
    let path = Path::new(name);
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or(name);
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{stem}{suffix}.{ext}"),
        None => format!("{stem}{suffix}"),
    }
}

/// `<filename>.zip`, without doubling an extension the caller already gave.
fn archive_name(filename: &str) -> String {
    let stem = match filename.len().checked_sub(4) {
        Some(cut)
            if filename.is_char_boundary(cut) && filename[cut..].eq_ignore_ascii_case(".zip") =>
        {
            &filename[..cut]
        }
        _ => filename,
    };
    format!("{stem}.zip")
}

fn build_zip(entries: Vec<(String, Vec<u8>)>) -> Result<Vec<u8>> {
    let archive = |e: zip::result::ZipError| AttachmentError::Archive(e.to_string());
    let now = Local::now();
    let modified = zip::DateTime::from_date_and_time(
        u16::try_from(now.year()).unwrap_or(1980),
        now.month() as u8,
        now.day() as u8,
        now.hour() as u8,
        now.minute() as u8,
        now.second() as u8,
    )
    .unwrap_or_default();
    let options = SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated)
        .last_modified_time(modified);

    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, bytes) in &entries {
        zip.start_file(name.as_str(), options).map_err(archive)?;
        zip.write_all(bytes)
            .map_err(|e| AttachmentError::Archive(e.to_string()))?;
    }
    Ok(zip.finish().map_err(archive)?.into_inner())
}

/// Replace characters that are unsafe in filenames.
pub fn sanitize_filename(s: &str, max_len: usize) -> String {
    let sanitized: String = s
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '-' | '.' | '_' | '@' | ' ' | '(' | ')') {
                c
            } else {
                '_'
            }
        })
        .take(max_len)
        .collect();
    let trimmed = sanitized.trim().trim_start_matches('.');

    if trimmed.is_empty() {
        "unknown".to_string()
    } else {
        trimmed.to_string()
    }
}

/// If `path` already exists, append a counter to make it unique.
fn unique_path(path: &Path) -> PathBuf {
    if !path.exists() {
        return path.to_path_buf();
    }

    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("file");
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    let parent = path.parent().unwrap_or(Path::new("."));

    for i in 1..1000 {
        let candidate = if ext.is_empty() {
            parent.join(format!("{stem}_{i}"))
        } else {
            parent.join(format!("{stem}_{i}.{ext}"))
        };
        if !candidate.exists() {
            return candidate;
        }
    }

    parent.join(format!("{stem}_{}.{ext}", uuid::Uuid::new_v4()))
}
