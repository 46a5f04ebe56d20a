//! Session wiring: one store, one cache and one decrypt pipeline shared by
//! every upload, fetch and download.

use std::sync::Arc;

use crate::backend::AttachmentBackend;
use crate::config::Config;
use crate::crypto::SessionCipher;
use crate::download::BulkDownloader;
use crate::fetch::{AttachmentFetcher, DecryptPipeline};
use crate::notify::Toaster;
use crate::store::{AttachmentStore, FetchedAttachmentCache};
use crate::upload::Uploader;

/// Per-session attachment services.
///
/// The fetched-attachment cache lives as long as the session; dropping the
/// session drops every cached plaintext.
pub struct Session {
    config: Config,
    store: AttachmentStore,
    pipeline: Arc<DecryptPipeline>,
    fetcher: Arc<AttachmentFetcher>,
    toaster: Arc<dyn Toaster>,
}

impl Session {
    pub fn new(
        config: Config,
        backend: Arc<dyn AttachmentBackend>,
        cipher: Arc<dyn SessionCipher>,
        toaster: Arc<dyn Toaster>,
    ) -> Self {
        let cache = Arc::new(FetchedAttachmentCache::from_config(&config.cache));
        let pipeline = Arc::new(DecryptPipeline::new(
            backend,
            cipher,
            cache,
            config.fetch.max_concurrency,
        ));
        tracing::debug!(
            max_concurrency = pipeline.max_concurrency(),
            cache = ?config.cache.policy,
            "Attachment session started"
        );
        let store = AttachmentStore::new();
        let fetcher = Arc::new(AttachmentFetcher::new(
            Arc::clone(&pipeline),
            store.clone(),
            Arc::clone(&toaster),
        ));
        Self {
            config,
            store,
            pipeline,
            fetcher,
            toaster,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &AttachmentStore {
        &self.store
    }

    pub fn cache(&self) -> &Arc<FetchedAttachmentCache> {
        self.pipeline.cache()
    }

    pub fn uploader(&self) -> Uploader {
        Uploader::new(
            self.store.clone(),
            self.config.limits,
            Arc::clone(&self.toaster),
        )
    }

    /// The session's fetcher. Shared, so concurrent fetches of the same
    /// IDs see each other.
    pub fn fetcher(&self) -> Arc<AttachmentFetcher> {
        Arc::clone(&self.fetcher)
    }

    pub fn downloader(&self) -> BulkDownloader {
        BulkDownloader::new(Arc::clone(&self.pipeline), Arc::clone(&self.toaster))
    }
}
