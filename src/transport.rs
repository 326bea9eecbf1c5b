use crate::buffer::BulkSnapshot;
use crate::error::TransportError;
use async_trait::async_trait;

/// Destination for finished bulk request bodies.
///
/// The flush scheduler calls `send` from its background task only, never
/// from an application thread. Implementations should use async I/O and
/// report every failure through the returned error; the scheduler decides
/// what happens to the snapshot afterwards.
#[async_trait]
pub trait BulkTransport: Send + Sync {
    /// Deliver one bulk body to the backend.
    ///
    /// **Returns**
    /// - `Ok(())` if the backend accepted every document.
    /// - `Err(..)` on network failure, non-success status, or documents
    ///   rejected inside an otherwise successful response.
    async fn send(&self, snapshot: &BulkSnapshot) -> Result<(), TransportError>;
}
