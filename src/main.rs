use std::sync::Arc;

use anyhow::{Context, Result};
use facematch::{
    FacadeMetrics, FaceMatchConfig, Record, build_service, service_from_file, set_match_metrics,
};
use tracing_subscriber::EnvFilter;

/// Embedding width used by the bundled demo corpus.
const DEMO_DIMENSION: usize = 128;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("FACEMATCH_LOG_FORMAT").is_ok_and(|v| v == "json");
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn demo_vector(seed: usize) -> Vec<f32> {
    (0..DEMO_DIMENSION)
        .map(|i| (((i + 1) * (seed + 3)) % 17) as f32 / 40.0)
        .collect()
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    set_match_metrics(Some(Arc::new(FacadeMetrics)));

    let service = match std::env::args().nth(1) {
        Some(path) => service_from_file(&path)
            .with_context(|| format!("failed to start from config {path}"))?,
        None => {
            let mut cfg = FaceMatchConfig::default();
            cfg.apply_env_overrides()?;
            build_service(&cfg)?
        }
    };

    for seed in 0..4 {
        service
            .register(Record::user(format!("user-{seed}"), demo_vector(seed)))
            .await?;
    }
    service
        .register(Record::missing_person("missing-7", demo_vector(7)))
        .await?;

    // A query close to missing-7: the first match flips it to found, the
    // second no longer sees it as a candidate.
    let mut query = demo_vector(7);
    query[0] += 0.05;
    for attempt in 1..=2 {
        let result = service.match_embedding(&query).await?;
        println!(
            "attempt {attempt}: matched={} record={:?} distance={:.4} confidence={:.4} transitioned={}",
            result.matched,
            result.record_id(),
            result.distance,
            result.confidence(),
            result.transitioned,
        );
    }

    for record in service.missing_persons(None).await? {
        println!("{} status={:?}", record.id, record.status());
    }
    Ok(())
}
