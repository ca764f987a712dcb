use crate::core::model::LengthColumn;
use std::path::PathBuf;

pub const DEFAULT_COLOR: &str = "#4CB391";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PlotFormat {
    Svg,
    Svgz,
    Pdf,
    Png,
    Jpeg,
    Jpg,
    Tiff,
    Tif,
    /// `raw` and `rgba` both write the bare RGBA pixel buffer.
    Raw,
    Rgba,
}

impl PlotFormat {
    pub fn extension(self) -> &'static str {
        match self {
            PlotFormat::Svg => "svg",
            PlotFormat::Svgz => "svgz",
            PlotFormat::Pdf => "pdf",
            PlotFormat::Png => "png",
            PlotFormat::Jpeg => "jpeg",
            PlotFormat::Jpg => "jpg",
            PlotFormat::Tiff => "tiff",
            PlotFormat::Tif => "tif",
            PlotFormat::Raw => "raw",
            PlotFormat::Rgba => "rgba",
        }
    }
}

/// Bivariate plot kinds requested with `--plots`.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct PlotKinds {
    pub dot: bool,
    pub hex: bool,
    pub kde: bool,
    pub pauvre: bool,
}

/// Run-wide plotting configuration. Built once by the CLI layer; per-label
/// output paths and titles are carried separately in [`UnitContext`].
#[derive(Clone, Debug)]
pub struct Settings {
    pub outdir: PathBuf,
    pub prefix: String,
    pub format: PlotFormat,
    pub color: String,
    pub kinds: PlotKinds,
    pub n50: bool,
    pub log_length: bool,
    pub font_scale: f64,
    pub dpi: u32,
    pub title: Option<String>,
    pub barcoded: bool,
    pub lengths_pointer: LengthColumn,
}

impl Settings {
    pub fn new(outdir: impl Into<PathBuf>) -> Self {
        Self {
            outdir: outdir.into(),
            prefix: String::new(),
            format: PlotFormat::Svg,
            color: DEFAULT_COLOR.to_string(),
            kinds: PlotKinds {
                kde: true,
                dot: true,
                ..Default::default()
            },
            n50: false,
            log_length: false,
            font_scale: 1.0,
            dpi: 100,
            title: None,
            barcoded: false,
            lengths_pointer: LengthColumn::Sequenced,
        }
    }

    /// `<outdir>/<prefix><name>`
    pub fn prefixed(&self, name: &str) -> PathBuf {
        self.outdir.join(format!("{}{}", self.prefix, name))
    }

    pub fn with_lengths_pointer(self, lengths_pointer: LengthColumn) -> Self {
        Self {
            lengths_pointer,
            ..self
        }
    }

    /// Output context for plotting the whole dataset.
    pub fn unit(&self) -> UnitContext {
        UnitContext {
            outdir: self.outdir.clone(),
            prefix: self.prefix.clone(),
            title: self.title.clone(),
            label: None,
        }
    }

    /// Output context for one barcode: files get `<prefix><label>_`, plots
    /// are titled with the label.
    pub fn barcode_unit(&self, label: &str) -> UnitContext {
        UnitContext {
            outdir: self.outdir.clone(),
            prefix: format!("{}{}_", self.prefix, label),
            title: Some(label.to_string()),
            label: Some(label.to_string()),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct UnitContext {
    pub outdir: PathBuf,
    pub prefix: String,
    /// Figure title drawn on every plot of this unit.
    pub title: Option<String>,
    /// Barcode label, also used to keep report headings unique.
    pub label: Option<String>,
}

impl UnitContext {
    /// Artifact path without extension.
    pub fn artifact(&self, stem: &str) -> PathBuf {
        self.outdir.join(format!("{}{}", self.prefix, stem))
    }

    /// Report heading for a plot of this unit.
    pub fn heading(&self, title: &str) -> String {
        match &self.label {
            Some(label) => format!("{}: {}", label, title),
            None => title.to_string(),
        }
    }
}
