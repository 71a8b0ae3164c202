use anyhow::Context;
use tracing::{debug, info};
use wear_boost::{config::Config, pipeline};

const CONFIG_PATH: &str = "wear_boost.toml";

fn main() -> anyhow::Result<()> {
    let config = Config::load_or_default(CONFIG_PATH)
        .with_context(|| format!("Failed to load config from {CONFIG_PATH}"))?;

    tracing_subscriber::fmt()
        .with_max_level(config.log_level()?)
        .init();

    info!("Starting wear_boost training run");
    debug!(?config, "Config loaded");

    let summary = pipeline::run(&config).with_context(|| {
        format!("Training run on {} failed", config.data_path.display())
    })?;

    println!("error rate{:.6}", summary.error_rate);
    println!("  RMSE: {}", summary.metrics.rmse);
    println!("  MAE: {}", summary.metrics.mae);
    println!("  R2: {}", summary.metrics.r2);

    info!(
        run_id = %summary.run_id,
        experiment_id = %summary.experiment_id,
        "Training complete! Model logged as \"{}\"",
        pipeline::MODEL_ARTIFACT
    );
    Ok(())
}
