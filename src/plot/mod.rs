pub mod backend;
pub mod color;
pub mod export;
#[cfg(test)]
pub mod recording;
pub mod select;
pub mod svg;

use crate::core::settings::UnitContext;
use anyhow::Result;
use std::path::PathBuf;

/// Logical plot family; one selector step produces one family.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum PlotFamily {
    ReadLength,
    LengthVsQuality,
    ActivityMap,
    TimeSeries,
    AlignedVsSequenced,
    MapqVsBaseQuality,
    LengthVsMapq,
    IdentityVsBaseQuality,
    LengthVsIdentity,
}

impl PlotFamily {
    pub fn name(self) -> &'static str {
        match self {
            PlotFamily::ReadLength => "Read length",
            PlotFamily::LengthVsQuality => "Length vs Quality",
            PlotFamily::ActivityMap => "Activity Map",
            PlotFamily::TimeSeries => "Time series",
            PlotFamily::AlignedVsSequenced => "Aligned length vs sequenced length",
            PlotFamily::MapqVsBaseQuality => "MapQ vs Base Quality",
            PlotFamily::LengthVsMapq => "Read length vs MapQ",
            PlotFamily::IdentityVsBaseQuality => "Percent Identity vs Base Quality",
            PlotFamily::LengthVsIdentity => "Aligned length vs Percent Identity",
        }
    }
}

/// A rendered artifact as referenced by the report.
#[derive(Clone, Debug, PartialEq)]
pub struct Plot {
    pub family: PlotFamily,
    pub title: String,
    pub path: PathBuf,
}

/// Two numeric columns to draw against each other.
#[derive(Clone, Debug)]
pub struct ScatterSpec {
    pub family: PlotFamily,
    /// File stem, extended per plot kind (`<stem>_dot`, `<stem>_kde`, ...).
    pub stem: &'static str,
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub names: [&'static str; 2],
    /// Log-transform the x axis (read lengths).
    pub log: bool,
    /// Annotate the Pearson correlation.
    pub pearson: bool,
    pub min_x: Option<f64>,
    pub min_y: Option<f64>,
}

/// Per-read columns the time series plots draw from.
#[derive(Clone, Copy, Debug)]
pub struct TimeSeriesInput<'a> {
    pub start_time: &'a [f64],
    pub lengths: &'a [u64],
    pub quals: Option<&'a [f64]>,
    pub channels: Option<&'a [u32]>,
    pub log_length: bool,
}

/// Rendering seam between plot selection and the artifacts on disk.
pub trait PlotBackend {
    fn length_plots(
        &mut self,
        unit: &UnitContext,
        lengths: &[u64],
        n50: Option<u64>,
    ) -> Result<Vec<Plot>>;

    fn scatter(&mut self, unit: &UnitContext, spec: &ScatterSpec) -> Result<Vec<Plot>>;

    fn spatial_heatmap(&mut self, unit: &UnitContext, channels: &[u32]) -> Result<Vec<Plot>>;

    fn time_plots(&mut self, unit: &UnitContext, input: &TimeSeriesInput) -> Result<Vec<Plot>>;
}
