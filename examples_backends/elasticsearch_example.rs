use tracing::{error, info};
use tracing_bulk_sink::init::init_tracing;

#[tokio::main]
async fn main() {
    // Configure through the environment, e.g.
    //   ELASTIC_ENABLED=true ELASTIC_ADDRESSES=http://localhost:9200 ELASTIC_INDEX=logs
    let logger = init_tracing().expect("no other global subscriber installed");

    info!("elasticsearch backend example started");
    error!(index = "logs", "simulated error sent via the bulk API");

    logger.stop().await;
}
