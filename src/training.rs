//! Fare model training: build samples, ask the collaborator to fit them,
//! validate the answer and install it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tracing::{error, info};

use crate::error::FareError;
use crate::llm::Collaborator;
use crate::model::{parse_fare_model, FareModel};
use crate::normalize::LineAliases;
use crate::samples::{build_training_set, FareTable, SkipReason, Station, TrainingSet};
use crate::store::FareModelStore;

/// Outcome of a successful training run.
#[derive(Debug, Clone)]
pub struct TrainingReport {
    pub model: Arc<FareModel>,
    pub lines_trained: usize,
    pub samples: usize,
    pub skipped: Vec<SkipReason>,
}

/// The only writer of the fare model store.
pub struct FareTrainer {
    store: Arc<FareModelStore>,
    collaborator: Arc<dyn Collaborator>,
    aliases: LineAliases,
    stations_path: PathBuf,
    fares_path: PathBuf,
    run_lock: Mutex<()>,
}

impl FareTrainer {
    pub fn new(
        store: Arc<FareModelStore>,
        collaborator: Arc<dyn Collaborator>,
        aliases: LineAliases,
        stations_path: impl Into<PathBuf>,
        fares_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            store,
            collaborator,
            aliases,
            stations_path: stations_path.into(),
            fares_path: fares_path.into(),
            run_lock: Mutex::new(()),
        }
    }

    pub fn aliases(&self) -> &LineAliases {
        &self.aliases
    }

    /// Run one training pass. Concurrent calls queue behind each other.
    ///
    /// On any error the store is left as it was. A failed write of the model
    /// file after a successful install is logged and does not fail the run.
    pub async fn train(&self) -> Result<TrainingReport, FareError> {
        let _run = self.run_lock.lock().await;

        let stations: Vec<Station> = load_json(&self.stations_path).await?;
        let fares: FareTable = load_json(&self.fares_path).await?;

        let build = build_training_set(&fares, &stations, &self.aliases);
        let samples = build.sample_count();
        info!(
            "Built {} training samples across {} lines ({} entries skipped)",
            samples,
            build.set.len(),
            build.skipped.len()
        );
        if build.set.is_empty() {
            return Err(FareError::NoSamples);
        }

        let prompt = training_prompt(&build.set)?;
        let reply = self.collaborator.complete(&prompt).await?;
        let model = parse_fare_model(&reply)?;

        let model = self.store.replace(model);
        info!("Installed fare model with {} lines", model.lines.len());
        if let Err(e) = self.store.persist(&model).await {
            error!("{}; keeping in-memory model", e);
        }

        Ok(TrainingReport {
            lines_trained: model.lines.len(),
            model,
            samples,
            skipped: build.skipped,
        })
    }
}

async fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T, FareError> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| FareError::data_load(path.display(), e))?;
    serde_json::from_str(&text).map_err(|e| FareError::data_load(path.display(), e))
}

/// Instruction asking the collaborator to fit one linear fare per line.
pub fn training_prompt(set: &TrainingSet) -> Result<String, FareError> {
    let samples = serde_json::to_string(set)?;
    Ok(format!(
        "You are fitting fare models for an urban rail network in Malaysia.\n\
         For every line below you get observed trips as {{from, to, distance_km, fare}}.\n\
         Fit fare = base + per_km * distance_km for each line, and infer min_fare and \
         max_fare from the observed fares.\n\
         Respond with ONLY one JSON object, no prose and no markdown, shaped like:\n\
         {{\"currency\": \"MYR\", \"lines\": {{\"<LINE>\": {{\"base\": 0.0, \"per_km\": 0.0, \
         \"min_fare\": 0.0, \"max_fare\": 0.0}}}}}}\n\
         Use the line ids exactly as given. All values are numbers in MYR.\n\n\
         Training data:\n{samples}"
    ))
}
