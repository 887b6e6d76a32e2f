mod config;
mod driver;
mod reference;
mod search;
mod stats;
mod transport;

use anyhow::{Context, Result};
use clap::Parser;
use config::{BenchConfig, Config};
use driver::{Collector, Driver};
use reference::ReferenceData;
use search::ConditionGenerator;
use stats::Aggregator;
use std::sync::Arc;
use tracing::{info, warn};
use transport::TwirpClient;

/// Empties the timed-out buffer, logging each payload when asked to.
fn drain_timed_out(collector: &mut Collector, log_payloads: bool) -> Result<usize> {
    let mut drained = 0;
    while let Ok(request) = collector.timed_out.try_recv() {
        drained += 1;
        if log_payloads {
            let json = sonic_rs::to_string(&request).context("Failed to encode timed-out request")?;
            info!("Timed-out request: {}", json);
        }
    }
    Ok(drained)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Config::parse();
    let config = Arc::new(BenchConfig::from_config(&args).context("Invalid benchmark configuration")?);

    // Print banner
    info!("════════════════════════════════════════════════════════════");
    info!("              SEARCH SERVICE BENCHMARK");
    info!("════════════════════════════════════════════════════════════");
    info!("Search Type: {}", config.search_type);
    info!("QPS: {}", config.qps);
    info!("Page Size: {}", config.page_size);
    info!("Time Limit: {}ms", config.time_limit_ms);
    info!("Conditions: {}", config.condition_count);
    info!("Duration: {}s", config.seconds());
    info!("Requests: {}", config.req_count());

    // Load reference data
    let reference = ReferenceData::load(&args.investors, &args.verticals, &args.industries)?;

    let client = TwirpClient::new(&args.endpoint, &args.service_path)
        .context("Failed to build search client")?;
    info!("Endpoint: {}", client.url());
    info!("════════════════════════════════════════════════════════════");

    let generator = ConditionGenerator::new(&config, Arc::new(reference));
    let (driver, mut collector) =
        Driver::new(Arc::clone(&config), Arc::new(client), Arc::new(generator));

    // Run test
    let report = driver.run().await;
    info!("Dispatch finished after {:.2?}", report.elapsed);
    if report.dispatched != config.req_count() {
        warn!(
            "Dispatched {} requests, expected {}",
            report.dispatched,
            config.req_count()
        );
    }

    info!("Waiting for {} results", report.dispatched);
    let summary = Aggregator::new(Arc::clone(&config), report.dispatched)
        .collect(&mut collector.results)
        .await?;

    let timed_out = drain_timed_out(&mut collector, config.log_timed_out)?;
    info!("Timed-out request payloads: {}", timed_out);

    // Print summary
    summary.print();

    info!("════════════════════════════════════════════════════════════");
    info!("                 BENCHMARK COMPLETE");
    info!("════════════════════════════════════════════════════════════");

    Ok(())
}
