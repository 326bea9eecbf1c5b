use crate::encoder::EncodedDocument;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Bulk request body taken out of a [`BulkBuffer`] by a flush.
///
/// Holds whole action/document pairs only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkSnapshot {
    body: Vec<u8>,
    documents: usize,
}

impl BulkSnapshot {
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn len(&self) -> usize {
        self.body.len()
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    /// Number of documents in the body.
    pub fn documents(&self) -> usize {
        self.documents
    }

    pub fn into_body(self) -> Vec<u8> {
        self.body
    }
}

#[derive(Default)]
struct Pending {
    body: Vec<u8>,
    documents: usize,
    closed: bool,
}

impl Pending {
    fn take(&mut self) -> Option<BulkSnapshot> {
        if self.body.is_empty() {
            return None;
        }
        let documents = std::mem::take(&mut self.documents);
        Some(BulkSnapshot {
            body: std::mem::take(&mut self.body),
            documents,
        })
    }
}

/// Append-only NDJSON accumulator for one `_bulk` request.
///
/// Producers append from any thread; the flush scheduler swaps the contents
/// out with [`snapshot_and_reset`](Self::snapshot_and_reset). Both go
/// through the same lock, so a document is either entirely in a snapshot or
/// entirely left for the next one.
///
/// The final flush uses [`snapshot_and_close`](Self::snapshot_and_close):
/// appends racing with it either make it into that last body or are
/// refused, never left behind.
pub struct BulkBuffer {
    action: Vec<u8>,
    pending: Mutex<Pending>,
}

impl BulkBuffer {
    /// Create an empty buffer whose action lines target `index`.
    pub fn new(index: &str) -> Self {
        let action = format!(
            "{{\"index\":{{\"_index\":{}}}}}\n",
            serde_json::Value::from(index)
        );
        BulkBuffer {
            action: action.into_bytes(),
            pending: Mutex::new(Pending::default()),
        }
    }

    // A panic while holding the lock leaves whole pairs behind (the body is
    // only extended, never partially rewritten), so poisoning is ignored.
    fn lock(&self) -> MutexGuard<'_, Pending> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append the action line, `doc` and a newline.
    ///
    /// **Returns** the buffer size in bytes after the append, so the caller
    /// can compare it against its flush threshold, or `None` if the buffer
    /// was already closed and `doc` was not taken.
    pub fn append(&self, doc: &EncodedDocument) -> Option<usize> {
        let mut pending = self.lock();
        if pending.closed {
            return None;
        }
        pending
            .body
            .reserve(self.action.len() + doc.len() + 1);
        pending.body.extend_from_slice(&self.action);
        pending.body.extend_from_slice(doc.as_bytes());
        pending.body.push(b'\n');
        pending.documents += 1;
        Some(pending.body.len())
    }

    /// Current size in bytes.
    pub fn len(&self) -> usize {
        self.lock().body.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Take the buffered body and leave an empty one in its place.
    ///
    /// **Returns** `None` if nothing was buffered.
    pub fn snapshot_and_reset(&self) -> Option<BulkSnapshot> {
        self.lock().take()
    }

    /// Take the buffered body and refuse every later append.
    ///
    /// **Returns** `None` if nothing was buffered. Calling it again yields
    /// `None`.
    pub fn snapshot_and_close(&self) -> Option<BulkSnapshot> {
        let mut pending = self.lock();
        pending.closed = true;
        pending.take()
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Put a snapshot that failed to ship back in front of the buffered
    /// documents, keeping their original order.
    ///
    /// **Returns** `false` (and drops the snapshot) if the buffer is closed
    /// or the result would exceed `max_bytes`.
    pub fn requeue(&self, snapshot: BulkSnapshot, max_bytes: usize) -> bool {
        let mut pending = self.lock();
        if pending.closed || snapshot.body.len() + pending.body.len() > max_bytes {
            return false;
        }
        let mut body = snapshot.body;
        body.extend_from_slice(&pending.body);
        pending.body = body;
        pending.documents += snapshot.documents;
        true
    }
}
