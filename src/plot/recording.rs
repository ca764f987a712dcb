use super::{Plot, PlotBackend, PlotFamily, ScatterSpec, TimeSeriesInput};
use crate::core::settings::UnitContext;
use anyhow::Result;

/// One backend call as seen by [`RecordingBackend`].
#[derive(Clone, Debug, PartialEq)]
pub struct Call {
    pub family: PlotFamily,
    pub prefix: String,
    pub points: usize,
    pub log: bool,
    pub min_x: Option<f64>,
    pub min_y: Option<f64>,
}

/// Backend that writes nothing and records what it was asked to draw.
#[derive(Default)]
pub struct RecordingBackend {
    pub calls: Vec<Call>,
}

impl RecordingBackend {
    pub fn families(&self) -> Vec<PlotFamily> {
        self.calls.iter().map(|c| c.family).collect()
    }

    fn record(&mut self, unit: &UnitContext, call: Call, stem: &str) -> Vec<Plot> {
        let plot = Plot {
            family: call.family,
            title: unit.heading(call.family.name()),
            path: unit.artifact(stem).with_extension("svg"),
        };
        self.calls.push(call);
        vec![plot]
    }
}

impl PlotBackend for RecordingBackend {
    fn length_plots(
        &mut self,
        unit: &UnitContext,
        lengths: &[u64],
        _n50: Option<u64>,
    ) -> Result<Vec<Plot>> {
        let call = Call {
            family: PlotFamily::ReadLength,
            prefix: unit.prefix.clone(),
            points: lengths.len(),
            log: false,
            min_x: None,
            min_y: None,
        };
        Ok(self.record(unit, call, "HistogramReadlength"))
    }

    fn scatter(&mut self, unit: &UnitContext, spec: &ScatterSpec) -> Result<Vec<Plot>> {
        let call = Call {
            family: spec.family,
            prefix: unit.prefix.clone(),
            points: spec.x.len(),
            log: spec.log,
            min_x: spec.min_x,
            min_y: spec.min_y,
        };
        Ok(self.record(unit, call, spec.stem))
    }

    fn spatial_heatmap(&mut self, unit: &UnitContext, channels: &[u32]) -> Result<Vec<Plot>> {
        let call = Call {
            family: PlotFamily::ActivityMap,
            prefix: unit.prefix.clone(),
            points: channels.len(),
            log: false,
            min_x: None,
            min_y: None,
        };
        Ok(self.record(unit, call, "ActivityMap_ReadsPerChannel"))
    }

    fn time_plots(&mut self, unit: &UnitContext, input: &TimeSeriesInput) -> Result<Vec<Plot>> {
        let call = Call {
            family: PlotFamily::TimeSeries,
            prefix: unit.prefix.clone(),
            points: input.start_time.len(),
            log: input.log_length,
            min_x: None,
            min_y: None,
        };
        Ok(self.record(unit, call, "CumulativeYieldPlot_Gigabases"))
    }
}
