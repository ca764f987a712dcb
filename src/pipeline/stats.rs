use crate::core::error::PipelineError;
use crate::core::model::Dataset;
use crate::core::settings::Settings;
use crate::core::stats::write_stats;
use anyhow::Result;
use log::info;
use std::path::PathBuf;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StatsStage {
    Pre,
    Post,
}

impl StatsStage {
    pub fn suffix(self) -> &'static str {
        match self {
            StatsStage::Pre => "",
            StatsStage::Post => "_post_filtering",
        }
    }
}

/// Statistics files written for one stage.
#[derive(Clone, Debug, PartialEq)]
pub struct StatsOutput {
    pub aggregate: PathBuf,
    /// Per-barcode breakdown, barcode mode only.
    pub barcoded: Option<PathBuf>,
}

/// Writes `NanoStats{suffix}.txt` and, in barcode mode, the per-label table
/// `NanoStats{suffix}_barcoded.txt` covering every label.
pub fn compute_all(ds: &Dataset, settings: &Settings, stage: StatsStage) -> Result<StatsOutput> {
    let aggregate = settings.prefixed(&format!("NanoStats{}.txt", stage.suffix()));
    write_stats(
        std::slice::from_ref(ds),
        &["dataset".to_string()],
        &aggregate,
    )?;

    let barcoded = if settings.barcoded {
        if ds.barcode.is_none() {
            return Err(PipelineError::DataShape(
                "barcode mode requested but the data has no barcode column".into(),
            )
            .into());
        }
        let groups = ds.barcode_groups();
        let names: Vec<String> = groups.iter().map(|(label, _)| label.clone()).collect();
        let parts: Vec<Dataset> = groups.iter().map(|(_, idx)| ds.subset(idx)).collect();
        let path = settings.prefixed(&format!("NanoStats{}_barcoded.txt", stage.suffix()));
        write_stats(&parts, &names, &path)?;
        Some(path)
    } else {
        None
    };

    info!("Calculated statistics");
    Ok(StatsOutput {
        aggregate,
        barcoded,
    })
}
