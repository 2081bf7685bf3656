//! JSON state file kept between reconciliation passes.

use std::path::Path;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// What the previous pass left behind for one resource.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum StateRecord<T> {
    /// The resource exists; this is its last observed state.
    Observed { observed: T },
    /// A create was submitted but its task was not seen to finish.
    PendingCreate { task_id: String },
}

/// Load a state file. A missing file means no record.
pub async fn load<T: DeserializeOwned>(path: &Path) -> Result<Option<StateRecord<T>>> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("No state file at {}", path.display());
            return Ok(None);
        }
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to read {}", path.display()));
        }
    };
    let record = serde_json::from_slice(&bytes)
        .with_context(|| format!("Failed to parse state file {}", path.display()))?;
    Ok(Some(record))
}

/// Write a state file, replacing the previous one atomically.
pub async fn save<T: Serialize>(path: &Path, record: &StateRecord<T>) -> Result<()> {
    let json = serde_json::to_vec_pretty(record).context("Failed to serialize state")?;
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, json)
        .await
        .with_context(|| format!("Failed to write {}", tmp.display()))?;
    tokio::fs::rename(&tmp, path)
        .await
        .with_context(|| format!("Failed to replace {}", path.display()))?;
    debug!("Saved state to {}", path.display());
    Ok(())
}

/// Drop the record of a resource that no longer exists.
pub async fn remove(path: &Path) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            info!("Removed state file {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("Failed to remove {}", path.display())),
    }
}
