//! Retrieve-and-decrypt pipeline shared by view fetches and bulk downloads.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::backend::{AttachmentBackend, AttachmentData};
use crate::crypto::SessionCipher;
use crate::error::{AttachmentError, Result};
use crate::model::attachment::AttachmentId;
use crate::model::payload::Payload;
use crate::store::FetchedAttachmentCache;

/// Per-attachment progress observer: `(id, percent)`.
pub type FetchProgress = Arc<dyn Fn(&AttachmentId, u8) + Send + Sync>;

/// Result for one attachment of a batch.
pub type Outcome = (AttachmentId, Result<Payload>);

/// Observer that ignores progress.
pub fn no_progress() -> FetchProgress {
    Arc::new(|_: &AttachmentId, _: u8| {})
}

/// Fetches ciphertext, decrypts it off the async runtime and caches the
/// plaintext.
///
/// At most `max_concurrency` attachments are retrieved and decrypted at
/// once across every batch sharing this pipeline.
pub struct DecryptPipeline {
    backend: Arc<dyn AttachmentBackend>,
    cipher: Arc<dyn SessionCipher>,
    cache: Arc<FetchedAttachmentCache>,
    permits: Arc<Semaphore>,
    max_concurrency: usize,
}

impl DecryptPipeline {
    pub fn new(
        backend: Arc<dyn AttachmentBackend>,
        cipher: Arc<dyn SessionCipher>,
        cache: Arc<FetchedAttachmentCache>,
        max_concurrency: usize,
    ) -> Self {
        let max_concurrency = max_concurrency.max(1);
        Self {
            backend,
            cipher,
            cache,
            permits: Arc::new(Semaphore::new(max_concurrency)),
            max_concurrency,
        }
    }

    pub fn cache(&self) -> &Arc<FetchedAttachmentCache> {
        &self.cache
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Content for every ID, from the cache where possible.
    ///
    /// Returns `Err` only when the batch download-data request fails;
    /// per-attachment failures are reported in the outcomes.
    pub async fn retrieve(
        &self,
        ids: &[AttachmentId],
        token: &CancellationToken,
        progress: FetchProgress,
    ) -> Result<Vec<Outcome>> {
        let mut outcomes = Vec::with_capacity(ids.len());
        let mut misses = Vec::new();
        for id in ids {
            match self.cache.get(id) {
                Some(content) => outcomes.push((id.clone(), Ok(content))),
                None => misses.push(id.clone()),
            }
        }
        if !misses.is_empty() {
            outcomes.extend(self.fetch_uncached(&misses, token, progress).await?);
        }
        Ok(outcomes)
    }

    /// Fetch and decrypt `ids` without consulting the cache.
    ///
    /// Issues exactly one `get_download_data` call for the whole batch.
    pub async fn fetch_uncached(
        &self,
        ids: &[AttachmentId],
        token: &CancellationToken,
        progress: FetchProgress,
    ) -> Result<Vec<Outcome>> {
        let descriptors = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(AttachmentError::Cancelled),
            r = self.backend.get_download_data(ids) => r,
        };
        let descriptors = descriptors.inspect_err(|e| {
            warn!(count = ids.len(), error = %e, "Download data request failed");
        })?;
        debug!(
            requested = ids.len(),
            returned = descriptors.len(),
            "Received download data"
        );

        let mut by_id: HashMap<AttachmentId, AttachmentData> = descriptors
            .into_iter()
            .map(|d| (d.id.clone(), d))
            .collect();
        let mut outcomes = Vec::with_capacity(ids.len());
        let mut tasks = JoinSet::new();

        for id in ids {
            let Some(data) = by_id.remove(id) else {
                warn!(id = %id, "No download data for attachment");
                outcomes.push((id.clone(), Err(AttachmentError::MissingDownloadData(id.clone()))));
                continue;
            };
            let job = Job {
                backend: Arc::clone(&self.backend),
                cipher: Arc::clone(&self.cipher),
                cache: Arc::clone(&self.cache),
                permits: Arc::clone(&self.permits),
                token: token.clone(),
                progress: Arc::clone(&progress),
            };
            tasks.spawn(job.run(data));
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => error!(error = %e, "Attachment task failed to complete"),
            }
        }

        // A task that panicked produced no outcome.
        for id in ids {
            if !outcomes.iter().any(|(done, _)| done == id) {
                outcomes.push((
                    id.clone(),
                    Err(AttachmentError::Network {
                        id: id.clone(),
                        reason: "task aborted".into(),
                    }),
                ));
            }
        }

        let failed = outcomes.iter().filter(|(_, r)| r.is_err()).count();
        info!(
            total = ids.len(),
            failed,
            cancelled = token.is_cancelled(),
            "Attachment batch finished"
        );
        Ok(outcomes)
    }
}

/// Owned handles for one spawned attachment task.
struct Job {
    backend: Arc<dyn AttachmentBackend>,
    cipher: Arc<dyn SessionCipher>,
    cache: Arc<FetchedAttachmentCache>,
    permits: Arc<Semaphore>,
    token: CancellationToken,
    progress: FetchProgress,
}

impl Job {
    async fn run(self, data: AttachmentData) -> Outcome {
        let id = data.id.clone();
        let result = tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(AttachmentError::Cancelled),
            r = self.retrieve(data) => r,
        };
        if let Err(ref e) = result {
            debug!(id = %id, error = %e, "Attachment retrieval failed");
        }
        (id, result)
    }

    async fn retrieve(&self, data: AttachmentData) -> Result<Payload> {
        let _permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| AttachmentError::Cancelled)?;
        let id = data.id.clone();

        let report = |received: u64, total: Option<u64>| {
            if let Some(total) = total.filter(|t| *t > 0) {
                // 100 is reserved for "decrypted".
                let pct = (received.saturating_mul(100) / total).min(99) as u8;
                (self.progress)(&id, pct);
            }
        };
        let ciphertext = self.backend.fetch_ciphertext(&data, &report).await?;

        let cipher = Arc::clone(&self.cipher);
        let key = data.session_key;
        let plaintext = tokio::task::spawn_blocking(move || cipher.decrypt(&key, &ciphertext))
            .await
            .map_err(|e| AttachmentError::Decrypt {
                id: id.clone(),
                reason: e.to_string(),
            })?
            .map_err(|e| AttachmentError::Decrypt {
                id: id.clone(),
                reason: e.to_string(),
            })?;

        let content = Payload::from_bytes(&plaintext);
        self.cache.set(id.clone(), content.clone());
        (self.progress)(&id, 100);
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::TransferProgress;
    use crate::crypto::{AesGcmCipher, SessionKey};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    struct CountingBackend {
        key: SessionKey,
        blobs: HashMap<AttachmentId, Vec<u8>>,
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    impl CountingBackend {
        fn new(n: usize) -> Self {
            let key = SessionKey::generate();
            let blobs = (0..n)
                .map(|i| {
                    let ct = AesGcmCipher.encrypt(&key, format!("body {i}").as_bytes()).unwrap();
                    (AttachmentId::from(format!("a{i}")), ct)
                })
                .collect();
            Self {
                key,
                blobs,
                active: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl AttachmentBackend for CountingBackend {
        async fn get_download_data(&self, ids: &[AttachmentId]) -> Result<Vec<AttachmentData>> {
            Ok(ids
                .iter()
                .filter(|id| self.blobs.contains_key(*id))
                .map(|id| AttachmentData {
                    id: id.clone(),
                    link: id.to_string(),
                    session_key: self.key.clone(),
                })
                .collect())
        }

        async fn fetch_ciphertext(
            &self,
            data: &AttachmentData,
            progress: TransferProgress<'_>,
        ) -> Result<Vec<u8>> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            let blob = self.blobs[&data.id].clone();
            progress(blob.len() as u64 / 2, Some(blob.len() as u64));
            Ok(blob)
        }
    }

    fn pipeline(backend: Arc<CountingBackend>, max: usize) -> DecryptPipeline {
        DecryptPipeline::new(
            backend,
            Arc::new(AesGcmCipher),
            Arc::new(FetchedAttachmentCache::unbounded()),
            max,
        )
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let backend = Arc::new(CountingBackend::new(10));
        let p = pipeline(Arc::clone(&backend), 3);
        let ids: Vec<_> = (0..10).map(|i| AttachmentId::from(format!("a{i}"))).collect();
        let outcomes = p
            .retrieve(&ids, &CancellationToken::new(), no_progress())
            .await
            .unwrap();
        assert_eq!(outcomes.len(), 10);
        assert!(outcomes.iter().all(|(_, r)| r.is_ok()));
        assert!(backend.peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(p.cache().len(), 10);
    }

    #[tokio::test]
    async fn test_missing_descriptor_fails_only_that_id() {
        let backend = Arc::new(CountingBackend::new(1));
        let p = pipeline(backend, 2);
        let ids = [AttachmentId::from("a0"), AttachmentId::from("ghost")];
        let outcomes = p
            .retrieve(&ids, &CancellationToken::new(), no_progress())
            .await
            .unwrap();
        let ghost = outcomes.iter().find(|(id, _)| id.as_str() == "ghost").unwrap();
        assert!(matches!(ghost.1, Err(AttachmentError::MissingDownloadData(_))));
        let ok = outcomes.iter().find(|(id, _)| id.as_str() == "a0").unwrap();
        assert_eq!(ok.1.as_ref().unwrap().to_bytes().unwrap(), b"body 0");
    }

    #[tokio::test]
    async fn test_progress_ends_at_100() {
        let backend = Arc::new(CountingBackend::new(1));
        let p = pipeline(backend, 1);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let progress: FetchProgress =
            Arc::new(move |_: &AttachmentId, pct: u8| sink.lock().unwrap().push(pct));
        p.retrieve(&[AttachmentId::from("a0")], &CancellationToken::new(), progress)
            .await
            .unwrap();
        let seen = seen.lock().unwrap().clone();
        assert_eq!(seen, vec![50, 100]);
    }

    #[tokio::test]
    async fn test_cancelled_before_batch() {
        let backend = Arc::new(CountingBackend::new(1));
        let p = pipeline(backend, 1);
        let token = CancellationToken::new();
        token.cancel();
        let err = p
            .retrieve(&[AttachmentId::from("a0")], &token, no_progress())
            .await
            .unwrap_err();
        assert!(matches!(err, AttachmentError::Cancelled));
    }
}
