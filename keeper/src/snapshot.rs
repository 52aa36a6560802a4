//! Engine state persisted as JSON between ticks

use anyhow::{Context, Result};
use ballast_core::State;
use std::path::Path;

pub fn load(path: &str) -> Result<State> {
    let text = std::fs::read_to_string(path)
        .context(format!("Failed to read snapshot {}", path))?;
    let state: State = serde_json::from_str(&text)
        .context(format!("Failed to parse snapshot {}", path))?;
    state.params().validate().context("Snapshot carries invalid parameters")?;
    Ok(state)
}

/// Write to a sibling temp file first so a crash never leaves half a snapshot
pub fn save(path: &str, state: &State) -> Result<()> {
    let json = serde_json::to_string(state).context("Failed to serialize snapshot")?;
    let tmp = format!("{}.tmp", path);
    std::fs::write(&tmp, json).context(format!("Failed to write snapshot {}", tmp))?;
    std::fs::rename(&tmp, Path::new(path)).context(format!("Failed to replace snapshot {}", path))?;
    Ok(())
}
