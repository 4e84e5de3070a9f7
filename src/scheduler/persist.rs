use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::scheduler::state::PlacementEntry;
use crate::scheduler::workload::Workload;

/// On-disk snapshot of the scheduler's workload table and desired
/// placement. Unknown fields in an existing file are ignored on load.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct PersistedState {
    #[serde(default)]
    pub workloads: Vec<Workload>,
    #[serde(default)]
    pub desired: Vec<PlacementEntry>,
}

/// Write the snapshot as a whole file.
///
/// The write goes to a temp file first and is renamed into place, so a
/// crash mid-write leaves the previous valid file intact.
pub fn save_state(path: &Path, state: &PersistedState) -> Result<()> {
    let json = serde_json::to_vec_pretty(state)?;
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, &json)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Load a previously saved snapshot. A missing file yields empty state.
pub fn load_state(path: &Path) -> Result<PersistedState> {
    if !path.exists() {
        return Ok(PersistedState::default());
    }
    let contents = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}
