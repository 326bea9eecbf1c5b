use crate::buffer::BulkSnapshot;
use crate::error::TransportError;
use crate::transport::BulkTransport;
use async_trait::async_trait;

/// A transport that accepts and drops every bulk body.
///
/// Useful for measuring the overhead of the logging path itself without
/// any network I/O.
#[derive(Clone, Default)]
pub struct NoopTransport;

#[async_trait]
impl BulkTransport for NoopTransport {
    async fn send(&self, _snapshot: &BulkSnapshot) -> Result<(), TransportError> {
        Ok(())
    }
}
