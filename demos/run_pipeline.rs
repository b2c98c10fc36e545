use border_flows::{MigrationPipeline, PipelineConfig, PipelineError};
use log::LevelFilter;
use simple_logger::SimpleLogger;
use std::env;
use std::path::Path;

/// Usage: `cargo run --example run_pipeline [config.json]`
#[tokio::main]
async fn main() -> Result<(), PipelineError> {
    SimpleLogger::new()
        .with_level(LevelFilter::Info)
        .init()
        .ok();

    let config = match env::args().nth(1) {
        Some(path) => PipelineConfig::from_json_file(Path::new(&path))?,
        None => PipelineConfig::default(),
    };
    let pipeline = MigrationPipeline::new().await?.with_config(config);
    let report = pipeline.run().await?;

    if let Some(halt) = &report.halted {
        println!("Stopped at {} stage: {}", halt.stage, halt.reason);
    }
    println!(
        "{} observations, {} nationalities, {} feature rows",
        report.observations, report.nationalities, report.feature_rows
    );
    for horizon in &report.models.direct {
        println!("Random forest t+{}: {}", horizon.horizon, horizon.metrics);
    }
    if let Some(hybrid) = &report.models.hybrid {
        println!("SARIMAX{} + RF (AIC {:.1}): {}", hybrid.order, hybrid.aic, hybrid.metrics);
    }
    for path in &report.artifacts {
        println!("wrote {}", path.display());
    }
    Ok(())
}
