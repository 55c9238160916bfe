//! In-memory fare model cache backed by a JSON file.

use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{info, warn};

use crate::error::FareError;
use crate::model::{parse_fare_model, FareModel};

/// Holds the last installed fare model.
///
/// Readers get an `Arc` snapshot; `replace` swaps the whole model, so a
/// reader never observes a half-written one.
#[derive(Debug)]
pub struct FareModelStore {
    current: RwLock<Option<Arc<FareModel>>>,
    path: PathBuf,
}

impl FareModelStore {
    /// Empty store persisting to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            current: RwLock::new(None),
            path: path.into(),
        }
    }

    /// Store seeded from the file at `path`.
    ///
    /// A missing file is the normal untrained state. An unreadable or invalid
    /// file is logged and treated the same way.
    pub async fn load(path: impl Into<PathBuf>) -> Self {
        let store = Self::new(path);
        match tokio::fs::read_to_string(&store.path).await {
            Ok(text) => match parse_fare_model(&text) {
                Ok(model) => {
                    info!(
                        "Loaded fare model with {} lines from {}",
                        model.lines.len(),
                        store.path.display()
                    );
                    *store.current.write() = Some(Arc::new(model));
                }
                Err(e) => warn!(
                    "Ignoring persisted fare model at {}: {}",
                    store.path.display(),
                    e
                ),
            },
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("No persisted fare model at {}", store.path.display());
            }
            Err(e) => warn!(
                "Failed to read fare model at {}: {}",
                store.path.display(),
                e
            ),
        }
        store
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self) -> Option<Arc<FareModel>> {
        self.current.read().clone()
    }

    /// Install `model`, dropping whatever was there before.
    pub fn replace(&self, model: FareModel) -> Arc<FareModel> {
        let model = Arc::new(model);
        *self.current.write() = Some(model.clone());
        model
    }

    /// Write `model` to the backing file via a temp file and rename.
    pub async fn persist(&self, model: &FareModel) -> Result<(), FareError> {
        let json =
            serde_json::to_vec_pretty(model).map_err(|e| FareError::Persist(e.to_string()))?;

        let mut tmp = OsString::from(self.path.as_os_str());
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, &json)
            .await
            .map_err(|e| FareError::Persist(format!("write {}: {e}", tmp.display())))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| FareError::Persist(format!("rename to {}: {e}", self.path.display())))?;
        Ok(())
    }
}
