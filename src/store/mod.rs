//! Shared attachment state: the attachment list and the fetched-content cache.

pub mod attachments;
pub mod cache;

pub use attachments::AttachmentStore;
pub use cache::FetchedAttachmentCache;
