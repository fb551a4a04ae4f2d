use anyhow::{Context, Result};
use energy_demand_pipeline::{config, pipeline::Pipeline, telemetry};
use config::Config;
use telemetry::init_tracing;
use tracing::info;

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cfg = Config::load()?;
    let pipeline = Pipeline::new(cfg);
    info!(run_id = %pipeline.run_id(), "starting energy demand pipeline");

    let report = pipeline.run().context("training pipeline failed")?;
    info!(
        best_model = %report.best_model,
        rmse = report.best_scores.rmse,
        mae = report.best_scores.mae,
        r2 = report.best_scores.r2,
        model = %report.training.model.display(),
        "training finished"
    );

    if pipeline.config().tuning.enabled {
        let tuning = pipeline.tune().context("hyperparameter search failed")?;
        info!(
            best_value = tuning.best_value,
            finished_trials = tuning.finished_trials,
            "tuning finished"
        );
    }

    Ok(())
}
