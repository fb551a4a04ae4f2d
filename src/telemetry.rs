use tracing::{info_span, Span};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use crate::error::Stage;

pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,smartcore=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();
}

/// Logging context handed to each stage explicitly.
///
/// Every stage enters its own span so log lines carry the stage name and
/// the id of the run that produced them.
#[derive(Debug, Clone)]
pub struct StageContext {
    run_id: Uuid,
    stage: Stage,
    span: Span,
}

impl StageContext {
    pub fn new(run_id: Uuid, stage: Stage) -> Self {
        let span = info_span!("stage", stage = %stage, run_id = %run_id);
        Self { run_id, stage, span }
    }

    /// Context for a stage run on its own, outside a pipeline run
    pub fn standalone(stage: Stage) -> Self {
        Self::new(Uuid::new_v4(), stage)
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn span(&self) -> &Span {
        &self.span
    }
}
