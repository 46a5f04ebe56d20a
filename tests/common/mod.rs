//! Shared fixtures: an in-memory backend with failure injection.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use mailattach::backend::{AttachmentBackend, AttachmentData, TransferProgress};
use mailattach::bridge::{BridgeMessage, NativeBridge};
use mailattach::crypto::{AesGcmCipher, SessionCipher, SessionKey};
use mailattach::error::{AttachmentError, Result};
use mailattach::fetch::DecryptPipeline;
use mailattach::model::attachment::{AttachmentId, AttachmentMeta};
use mailattach::store::FetchedAttachmentCache;

pub fn id(s: &str) -> AttachmentId {
    AttachmentId::from(s)
}

pub fn meta(id: &str, name: &str, content_type: &str, size: u64) -> AttachmentMeta {
    AttachmentMeta {
        id: AttachmentId::from(id),
        name: name.into(),
        content_type: content_type.into(),
        size,
        content_id: None,
        inline: false,
    }
}

/// Backend serving AES-GCM ciphertext from memory.
pub struct MockBackend {
    key: SessionKey,
    blobs: Mutex<HashMap<AttachmentId, Vec<u8>>>,
    corrupt: Mutex<HashSet<AttachmentId>>,
    pub batch_calls: AtomicUsize,
    fetch_calls: Mutex<HashMap<AttachmentId, usize>>,
    pub fail_batch: AtomicBool,
    delay: Duration,
    active: AtomicUsize,
    pub peak: AtomicUsize,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::with_delay(Duration::ZERO)
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            key: SessionKey::generate(),
            blobs: Mutex::new(HashMap::new()),
            corrupt: Mutex::new(HashSet::new()),
            batch_calls: AtomicUsize::new(0),
            fetch_calls: Mutex::new(HashMap::new()),
            fail_batch: AtomicBool::new(false),
            delay,
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    /// Register plaintext for `id`; it is stored encrypted.
    pub fn add(&self, id: &str, plaintext: &[u8]) {
        let ct = AesGcmCipher.encrypt(&self.key, plaintext).unwrap();
        self.blobs.lock().unwrap().insert(AttachmentId::from(id), ct);
    }

    /// Serve ciphertext for `id` that fails authentication.
    pub fn corrupt(&self, id: &str) {
        self.corrupt.lock().unwrap().insert(AttachmentId::from(id));
    }

    pub fn fetches_of(&self, id: &str) -> usize {
        self.fetch_calls
            .lock()
            .unwrap()
            .get(&AttachmentId::from(id))
            .copied()
            .unwrap_or(0)
    }

    pub fn batches(&self) -> usize {
        self.batch_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AttachmentBackend for MockBackend {
    async fn get_download_data(&self, ids: &[AttachmentId]) -> Result<Vec<AttachmentData>> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_batch.load(Ordering::SeqCst) {
            return Err(AttachmentError::Backend("service unavailable".into()));
        }
        // Every requested ID gets a descriptor; unknown blobs fail at fetch time.
        Ok(ids
            .iter()
            .map(|id| AttachmentData {
                id: id.clone(),
                link: format!("mem://{id}"),
                session_key: self.key.clone(),
            })
            .collect())
    }

    async fn fetch_ciphertext(
        &self,
        data: &AttachmentData,
        progress: TransferProgress<'_>,
    ) -> Result<Vec<u8>> {
        *self
            .fetch_calls
            .lock()
            .unwrap()
            .entry(data.id.clone())
            .or_insert(0) += 1;

        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        let blob = self.blobs.lock().unwrap().get(&data.id).cloned();
        let mut blob = blob.ok_or_else(|| AttachmentError::Network {
            id: data.id.clone(),
            reason: "404".into(),
        })?;
        if self.corrupt.lock().unwrap().contains(&data.id) {
            let last = blob.len() - 1;
            blob[last] ^= 0xFF;
        }
        progress(blob.len() as u64, Some(blob.len() as u64));
        Ok(blob)
    }
}

pub fn pipeline(backend: Arc<MockBackend>, max_concurrency: usize) -> Arc<DecryptPipeline> {
    Arc::new(DecryptPipeline::new(
        backend,
        Arc::new(AesGcmCipher),
        Arc::new(FetchedAttachmentCache::unbounded()),
        max_concurrency,
    ))
}

/// Bridge that keeps every message.
#[derive(Default)]
pub struct RecordingBridge {
    pub messages: Mutex<Vec<BridgeMessage>>,
}

impl NativeBridge for RecordingBridge {
    fn send(&self, message: BridgeMessage) {
        self.messages.lock().unwrap().push(message);
    }
}
