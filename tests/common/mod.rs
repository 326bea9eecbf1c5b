use async_trait::async_trait;
use std::sync::Mutex;
use tracing_bulk_sink::buffer::BulkSnapshot;
use tracing_bulk_sink::error::TransportError;
use tracing_bulk_sink::transport::BulkTransport;

/// Transport that keeps every bulk body it receives.
#[derive(Default)]
pub struct RecordingTransport {
    bodies: Mutex<Vec<Vec<u8>>>,
}

impl RecordingTransport {
    pub fn calls(&self) -> usize {
        self.bodies.lock().unwrap().len()
    }

    pub fn bodies(&self) -> Vec<Vec<u8>> {
        self.bodies.lock().unwrap().clone()
    }

    /// Documents (every second line) of every body received so far.
    pub fn documents(&self) -> Vec<serde_json::Value> {
        self.bodies()
            .iter()
            .flat_map(|body| {
                String::from_utf8(body.clone())
                    .unwrap()
                    .lines()
                    .skip(1)
                    .step_by(2)
                    .map(|line| serde_json::from_str(line).unwrap())
                    .collect::<Vec<_>>()
            })
            .collect()
    }
}

#[async_trait]
impl BulkTransport for RecordingTransport {
    async fn send(&self, snapshot: &BulkSnapshot) -> Result<(), TransportError> {
        self.bodies.lock().unwrap().push(snapshot.body().to_vec());
        Ok(())
    }
}
