//! Bulk fetch of remote attachments into the attachment store.
//!
//! [`AttachmentFetcher::fetch`] drives each requested attachment through
//! `Remote → RemoteFetching → RemoteFetched | RemoteError`, serving cache
//! hits without touching the backend. Work belongs to a [`ViewScope`]: when
//! the scope is dropped, outstanding retrievals are abandoned and their
//! results are never written to the store.

pub mod pipeline;

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, warn};

use crate::i18n;
use crate::model::attachment::{AttachmentId, AttachmentState};
use crate::notify::{Toast, Toaster};
use crate::store::AttachmentStore;

pub use pipeline::{no_progress, DecryptPipeline, FetchProgress, Outcome};

/// Options for [`AttachmentFetcher::fetch`].
#[derive(Debug, Clone, Copy, Default)]
pub struct FetchOptions {
    /// Retry attachments currently in `RemoteError`.
    pub fetch_failed: bool,
}

/// What happened to each requested ID.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FetchReport {
    /// Retrieved from the backend and decrypted.
    pub fetched: Vec<AttachmentId>,
    /// Served from the session cache.
    pub from_cache: Vec<AttachmentId>,
    /// Ended in `RemoteError`.
    pub failed: Vec<AttachmentId>,
    /// Not eligible (unknown, ready, local, failed without `fetch_failed`,
    /// or already being fetched by another call).
    pub skipped: Vec<AttachmentId>,
    /// The owning scope went away before the batch finished.
    pub cancelled: bool,
}

/// Cancellation scope tied to the lifetime of a view.
///
/// Dropping the scope cancels its token, and with it every fetch started
/// under that token.
pub struct ViewScope {
    token: CancellationToken,
    _guard: DropGuard,
}

impl ViewScope {
    pub fn new() -> Self {
        let token = CancellationToken::new();
        let guard = token.clone().drop_guard();
        Self {
            token,
            _guard: guard,
        }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl Default for ViewScope {
    fn default() -> Self {
        Self::new()
    }
}

/// IDs claimed by a running fetch; released when dropped.
struct InFlight<'a> {
    set: &'a Mutex<HashSet<AttachmentId>>,
    ids: Vec<AttachmentId>,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut set = self.set.lock().unwrap_or_else(PoisonError::into_inner);
        for id in &self.ids {
            set.remove(id);
        }
    }
}

/// Fetches remote attachments on behalf of message views.
pub struct AttachmentFetcher {
    pipeline: Arc<DecryptPipeline>,
    store: AttachmentStore,
    toaster: Arc<dyn Toaster>,
    in_flight: Mutex<HashSet<AttachmentId>>,
}

impl AttachmentFetcher {
    pub fn new(
        pipeline: Arc<DecryptPipeline>,
        store: AttachmentStore,
        toaster: Arc<dyn Toaster>,
    ) -> Self {
        Self {
            pipeline,
            store,
            toaster,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn store(&self) -> &AttachmentStore {
        &self.store
    }

    /// Fetch every attachment currently in the store.
    pub async fn fetch_all(&self, options: FetchOptions, token: &CancellationToken) -> FetchReport {
        let ids: Vec<_> = self.store.snapshot().into_iter().map(|a| a.id).collect();
        self.fetch(&ids, options, token).await
    }

    /// Retrieve and decrypt `ids`, updating their states in the store.
    ///
    /// Never fails: per-attachment problems end in `RemoteError`, and a
    /// failed batch request additionally raises one toast.
    pub async fn fetch(
        &self,
        ids: &[AttachmentId],
        options: FetchOptions,
        token: &CancellationToken,
    ) -> FetchReport {
        let mut report = FetchReport::default();
        let claimed = self.claim(ids, options, &mut report.skipped);
        if claimed.ids.is_empty() {
            return report;
        }

        let mut misses = Vec::new();
        for id in &claimed.ids {
            match self.pipeline.cache().get(id) {
                Some(content) => {
                    if self
                        .store
                        .transition(id, AttachmentState::RemoteFetched { content })
                        .is_ok()
                    {
                        report.from_cache.push(id.clone());
                    }
                }
                None => misses.push(id.clone()),
            }
        }
        if misses.is_empty() {
            return report;
        }
        if token.is_cancelled() {
            report.cancelled = true;
            return report;
        }

        for id in &misses {
            let _ = self
                .store
                .transition(id, AttachmentState::RemoteFetching { progress: 0 });
        }
        info!(count = misses.len(), cached = report.from_cache.len(), "Fetching attachments");

        let store = self.store.clone();
        let progress_token = token.clone();
        let progress: FetchProgress = Arc::new(move |id: &AttachmentId, pct: u8| {
            if !progress_token.is_cancelled() {
                let _ = store.transition(id, AttachmentState::RemoteFetching { progress: pct });
            }
        });

        let outcomes = match self.pipeline.fetch_uncached(&misses, token, progress).await {
            Ok(outcomes) => outcomes,
            Err(_) if token.is_cancelled() => {
                report.cancelled = true;
                return report;
            }
            Err(e) => {
                let message = e.user_message();
                for id in &misses {
                    self.fail(id, &message);
                }
                report.failed = misses;
                self.toaster.show(Toast::error(
                    i18n::toast_fetch_failed(),
                    Some(message),
                ));
                return report;
            }
        };

        if token.is_cancelled() {
            debug!("View closed, discarding fetch results");
            report.cancelled = true;
            return report;
        }

        for (id, result) in outcomes {
            match result {
                Ok(content) => {
                    if self
                        .store
                        .transition(&id, AttachmentState::RemoteFetched { content })
                        .is_ok()
                    {
                        report.fetched.push(id);
                    }
                }
                Err(e) => {
                    warn!(id = %id, error = %e, "Attachment fetch failed");
                    self.fail(&id, &e.user_message());
                    report.failed.push(id);
                }
            }
        }
        report
    }

    /// Pick eligible IDs and mark them in flight under one lock.
    ///
    /// A `RemoteFetching` record that no running call owns was left behind
    /// by a cancelled fetch and is eligible again.
    fn claim(
        &self,
        ids: &[AttachmentId],
        options: FetchOptions,
        skipped: &mut Vec<AttachmentId>,
    ) -> InFlight<'_> {
        let mut set = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        let mut claimed = Vec::new();
        for id in ids {
            let eligible = match self.store.state_of(id) {
                Some(AttachmentState::Remote | AttachmentState::RemoteFetching { .. }) => true,
                Some(AttachmentState::RemoteError { .. }) => options.fetch_failed,
                _ => false,
            };
            if eligible && !claimed.contains(id) && set.insert(id.clone()) {
                claimed.push(id.clone());
            } else {
                skipped.push(id.clone());
            }
        }
        InFlight {
            set: &self.in_flight,
            ids: claimed,
        }
    }

    fn fail(&self, id: &AttachmentId, message: &str) {
        let _ = self.store.transition(
            id,
            AttachmentState::RemoteError {
                message: message.to_string(),
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{AttachmentBackend, AttachmentData, TransferProgress};
    use crate::crypto::{AesGcmCipher, SessionCipher, SessionKey};
    use crate::error::{AttachmentError, Result};
    use crate::model::attachment::AttachmentMeta;
    use crate::model::payload::Payload;
    use crate::notify::ToastRecorder;
    use crate::store::FetchedAttachmentCache;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct OneBlob {
        key: SessionKey,
        blob: Vec<u8>,
        calls: AtomicUsize,
        fail_batch: bool,
    }

    #[async_trait]
    impl AttachmentBackend for OneBlob {
        async fn get_download_data(&self, ids: &[AttachmentId]) -> Result<Vec<AttachmentData>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_batch {
                return Err(AttachmentError::Backend("503".into()));
            }
            Ok(ids
                .iter()
                .map(|id| AttachmentData {
                    id: id.clone(),
                    link: String::new(),
                    session_key: self.key.clone(),
                })
                .collect())
        }

        async fn fetch_ciphertext(
            &self,
            _data: &AttachmentData,
            _progress: TransferProgress<'_>,
        ) -> Result<Vec<u8>> {
            Ok(self.blob.clone())
        }
    }

    fn setup(fail_batch: bool) -> (AttachmentFetcher, Arc<OneBlob>, Arc<ToastRecorder>) {
        let key = SessionKey::generate();
        let blob = AesGcmCipher.encrypt(&key, b"hello").unwrap();
        let backend = Arc::new(OneBlob {
            key,
            blob,
            calls: AtomicUsize::new(0),
            fail_batch,
        });
        let pipeline = Arc::new(DecryptPipeline::new(
            Arc::clone(&backend) as Arc<dyn AttachmentBackend>,
            Arc::new(AesGcmCipher),
            Arc::new(FetchedAttachmentCache::unbounded()),
            4,
        ));
        let toasts = Arc::new(ToastRecorder::new());
        let store = AttachmentStore::new();
        store.register_remote(&[AttachmentMeta {
            id: AttachmentId::from("a"),
            name: "a.txt".into(),
            content_type: "text/plain".into(),
            size: 5,
            content_id: None,
            inline: false,
        }]);
        let fetcher = AttachmentFetcher::new(pipeline, store, Arc::clone(&toasts) as Arc<dyn Toaster>);
        (fetcher, backend, toasts)
    }

    #[tokio::test]
    async fn test_fetch_then_skip_when_ready() {
        let (fetcher, backend, _) = setup(false);
        let ids = [AttachmentId::from("a")];
        let scope = ViewScope::new();
        let report = fetcher.fetch(&ids, FetchOptions::default(), scope.token()).await;
        assert_eq!(report.fetched, ids);
        let again = fetcher.fetch(&ids, FetchOptions::default(), scope.token()).await;
        assert_eq!(again.skipped, ids);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
        let state = fetcher.store().state_of(&ids[0]).unwrap();
        assert_eq!(state.content(), Some(&Payload::from_bytes(b"hello")));
    }

    #[tokio::test]
    async fn test_batch_failure_then_retry_needs_flag() {
        let (fetcher, backend, toasts) = setup(true);
        let ids = [AttachmentId::from("a")];
        let token = CancellationToken::new();
        let report = fetcher.fetch(&ids, FetchOptions::default(), &token).await;
        assert_eq!(report.failed, ids);
        assert_eq!(toasts.toasts().len(), 1);

        let report = fetcher.fetch(&ids, FetchOptions::default(), &token).await;
        assert_eq!(report.skipped, ids);
        let report = fetcher
            .fetch(&ids, FetchOptions { fetch_failed: true }, &token)
            .await;
        assert_eq!(report.failed, ids);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_dropped_scope_applies_nothing() {
        let (fetcher, backend, _) = setup(false);
        let ids = [AttachmentId::from("a")];
        let scope = ViewScope::new();
        let token = scope.token().clone();
        drop(scope);
        let report = fetcher.fetch(&ids, FetchOptions::default(), &token).await;
        assert!(report.cancelled);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
        assert_eq!(fetcher.store().state_of(&ids[0]), Some(AttachmentState::Remote));
        assert!(fetcher.in_flight.lock().unwrap().is_empty());
    }
}
