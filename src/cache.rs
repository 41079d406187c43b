// The aggregate artifact is the only persisted state. It is rebuilt
// wholesale and never patched in place.
use crate::config::AggregateConfig;
use crate::error::{ReportError, Result};
use crate::output::write_json;
use crate::reports::build_from_sources;
use crate::types::{AggregatedData, YearSummary};
use std::fs;
use tracing::{info, warn};

pub fn write_artifact(config: &AggregateConfig, data: &AggregatedData) -> Result<()> {
    let path = config.paths.artifact();
    write_json(&path, data)?;
    info!(path = %path.display(), "wrote aggregate artifact");
    Ok(())
}

pub fn read_artifact(config: &AggregateConfig) -> Result<AggregatedData> {
    let path = config.paths.artifact();
    let content = fs::read_to_string(&path).map_err(|e| ReportError::io(&path, e))?;
    serde_json::from_str(&content).map_err(|e| ReportError::json(&path, e))
}

/// Recompute everything from the raw files and overwrite the artifact.
pub fn rebuild(config: &AggregateConfig) -> Result<AggregatedData> {
    let data = build_from_sources(config)?;
    write_artifact(config, &data)?;
    Ok(data)
}

/// Return the cached aggregate, rebuilding it when it is missing or
/// unreadable. Build failures propagate; no partial aggregate is returned.
pub fn load_or_build(config: &AggregateConfig) -> Result<AggregatedData> {
    match read_artifact(config) {
        Ok(data) => Ok(data),
        Err(e) => {
            warn!(error = %e, "aggregate cache unusable, rebuilding");
            rebuild(config)
        }
    }
}

/// A single year's summary, or `None` when that year was never reported.
pub fn year_summary(config: &AggregateConfig, year: i32) -> Result<Option<YearSummary>> {
    let data = load_or_build(config)?;
    Ok(data.year(year).cloned())
}
