//! In-memory attachment list with observable, checked state transitions.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, warn};

use crate::error::{AttachmentError, Result};
use crate::model::attachment::{AttachmentId, AttachmentMeta, AttachmentState, ClientAttachment};

/// The attachment list of one draft or message view.
///
/// Cloning is cheap and every clone shares the same list. Subscribers get a
/// [`watch::Receiver`] that sees each mutation. Every update is applied by
/// ID in a single critical section, so completions that race each other
/// never clobber a sibling's state.
#[derive(Clone)]
pub struct AttachmentStore {
    tx: Arc<watch::Sender<Vec<ClientAttachment>>>,
}

impl Default for AttachmentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl AttachmentStore {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Vec::new());
        Self { tx: Arc::new(tx) }
    }

    /// Observe the list. The receiver starts at the current snapshot.
    pub fn subscribe(&self) -> watch::Receiver<Vec<ClientAttachment>> {
        self.tx.subscribe()
    }

    /// Copy of the whole list, in insertion order.
    pub fn snapshot(&self) -> Vec<ClientAttachment> {
        self.tx.borrow().clone()
    }

    /// Copy of one record.
    pub fn get(&self, id: &AttachmentId) -> Option<ClientAttachment> {
        self.tx.borrow().iter().find(|a| &a.id == id).cloned()
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.tx.borrow().len()
    }

    /// `true` if the list is empty.
    pub fn is_empty(&self) -> bool {
        self.tx.borrow().is_empty()
    }

    /// Add a record, replacing any existing record with the same ID.
    pub fn insert(&self, attachment: ClientAttachment) {
        debug!(id = %attachment.id, state = attachment.state.name(), "Insert attachment");
        self.tx.send_modify(|list| {
            match list.iter_mut().find(|a| a.id == attachment.id) {
                Some(existing) => *existing = attachment,
                None => list.push(attachment),
            }
        });
    }

    /// Add records for server metadata that are not known yet. Existing
    /// records (and their states) are left untouched.
    pub fn register_remote<'a>(
        &self,
        metas: impl IntoIterator<Item = &'a AttachmentMeta>,
    ) {
        let metas: Vec<_> = metas.into_iter().collect();
        self.tx.send_if_modified(|list| {
            let mut changed = false;
            for meta in &metas {
                if !list.iter().any(|a| a.id == meta.id) {
                    list.push(ClientAttachment::remote(meta));
                    changed = true;
                }
            }
            changed
        });
    }

    /// Remove a record (draft removal). Returns it if it existed.
    pub fn remove(&self, id: &AttachmentId) -> Option<ClientAttachment> {
        let mut removed = None;
        self.tx.send_if_modified(|list| {
            if let Some(pos) = list.iter().position(|a| &a.id == id) {
                removed = Some(list.remove(pos));
                true
            } else {
                false
            }
        });
        removed
    }

    /// Drop every record (owner teardown).
    pub fn clear(&self) {
        self.tx.send_if_modified(|list| {
            let changed = !list.is_empty();
            list.clear();
            changed
        });
    }

    /// Move an attachment to `next`.
    ///
    /// Fails without touching the list when the ID is unknown or the move
    /// would regress the lifecycle (see [`AttachmentState::can_transition_to`]).
    pub fn transition(&self, id: &AttachmentId, next: AttachmentState) -> Result<()> {
        let mut outcome = Ok(());
        self.tx.send_if_modified(|list| {
            let Some(record) = list.iter_mut().find(|a| &a.id == id) else {
                outcome = Err(AttachmentError::UnknownAttachment(id.clone()));
                return false;
            };
            if !record.state.can_transition_to(&next) {
                outcome = Err(AttachmentError::InvalidTransition {
                    id: id.clone(),
                    from: record.state.name(),
                    to: next.name(),
                });
                return false;
            }
            if record.state == next {
                return false;
            }
            record.state = next;
            true
        });
        if let Err(ref e) = outcome {
            warn!(error = %e, "Rejected attachment state change");
        }
        outcome
    }

    /// Current state of one attachment.
    pub fn state_of(&self, id: &AttachmentId) -> Option<AttachmentState> {
        self.tx
            .borrow()
            .iter()
            .find(|a| &a.id == id)
            .map(|a| a.state.clone())
    }

    /// Total size of the attachments that count against the message budget
    /// (everything except failed records).
    pub fn total_size(&self) -> u64 {
        self.tx
            .borrow()
            .iter()
            .filter(|a| a.state.error().is_none())
            .map(|a| a.size)
            .sum()
    }

    /// Aggregate progress across `ids`, weighted by size.
    ///
    /// Ready and failed attachments count as complete. Returns `None` when
    /// none of the IDs is known.
    pub fn aggregate_progress(&self, ids: &[AttachmentId]) -> Option<u8> {
        let list = self.tx.borrow();
        let mut total: u128 = 0;
        let mut done: u128 = 0;
        let mut known = false;
        for att in list.iter().filter(|a| ids.contains(&a.id)) {
            known = true;
            let weight = u128::from(att.size.max(1));
            let pct = match &att.state {
                AttachmentState::Remote => 0,
                state => u128::from(state.progress().unwrap_or(100)),
            };
            total += weight * 100;
            done += weight * pct;
        }
        if !known || total == 0 {
            return None;
        }
        Some(((done * 100) / total) as u8)
    }
}
