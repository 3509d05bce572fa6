//! Serves a burst of concurrent requests through an emulated accelerator pool.
//!
//! ```text
//! RUST_LOG=debug cargo run -p emulated-dispatch -- [deployment.json]
//! ```
//!
//! Without a config file the default deployment is used. If the model
//! artifact it names cannot be read, fixed exponents stand in for it.

use std::sync::Arc;
use std::time::{Duration, Instant};
use futures::future::join_all;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use teppan::accelerator::EmulatedFactory;
use teppan::config::{DeploymentConfig, ModelConfig};
use teppan::encoder::SequenceEncoder;
use teppan::service::EncoderService;
use teppan::tensor::Sequence;

const REQUESTS: usize = 24;
const FALLBACK_MODEL: ModelConfig = ModelConfig { input_exponent: 6, output_exponent: 6 };

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer())
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => DeploymentConfig::load(path)?,
        None => DeploymentConfig::default(),
    };
    let model = config.model_config().unwrap_or_else(|e| {
        warn!(error = %e, "model artifact unavailable, using fallback exponents");
        FALLBACK_MODEL
    });

    // first engine is twice the size of the rest so remainders exercise the greedy fill
    let capacities = (0..config.pool.instances)
        .map(|i| if i == 0 { 8 } else { 4 })
        .collect();
    let factory = EmulatedFactory::new(
        capacities,
        config.layout.padded_width(),
        config.layout.output_width,
    ).with_latency(Duration::from_millis(5));

    let encoder = Arc::new(SequenceEncoder::with_model(&config, &model, &factory)?);
    let service = EncoderService::new(encoder, &config.serving);
    info!(
        instances = config.pool.instances,
        max_batch = config.serving.max_batch,
        "service started"
    );

    let width = config.layout.model_input_width;
    let started = Instant::now();
    let requests = (0..REQUESTS).map(|i| {
        let frames = 1 + (i * 7) % 13;
        let values = (0..frames * width)
            .map(|k| ((i + k) % 17) as f32 / 16.0)
            .collect();
        let service = &service;
        async move {
            let sequence = Sequence::new(width, values)?;
            service.submit(sequence).await.await
        }
    });
    let results = join_all(requests).await;

    let mut failed = 0;
    for (i, result) in results.iter().enumerate() {
        match result {
            Ok(encoded) => info!(request = i, frames = encoded.len(), width = encoded.width(), "encoded"),
            Err(e) => {
                failed += 1;
                warn!(request = i, error = %e, "request failed");
            }
        }
    }

    info!(
        requests = REQUESTS,
        failed,
        device_calls = factory.log().len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "burst finished"
    );
    Ok(())
}
