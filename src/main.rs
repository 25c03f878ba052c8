/// Entry point of the `creo-stats` sampler.
///
/// # Examples
///
/// ```bash
/// CREO_STATS_WORKLOADS=web=4242 CREO_STATS_INTERVAL_MS=500 cargo run
/// ```
#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    creo_stats::run().await
}
