use super::color::{self, Rgb, WHITE};
use super::export;
use super::svg::{Axis, Canvas, min_max};
use super::{Plot, PlotBackend, PlotFamily, ScatterSpec, TimeSeriesInput};
use crate::core::settings::{PlotFormat, PlotKinds, Settings, UnitContext};
use crate::core::stats::{self, fmt_int};
use anyhow::Result;
use log::debug;
use std::collections::{BTreeMap, HashMap};

const MAX_DOTS: usize = 20_000;
const HEX_COLUMNS: f64 = 40.0;
const KDE_GRID: (usize, usize) = (80, 60);
const KDE_SIGMA: f64 = 2.5;
const COUNT_BUCKET_SECS: f64 = 900.0;
const SPREAD_BUCKET_SECS: f64 = 3_600.0;

/// Plot appearance shared by every plot of a run.
#[derive(Clone, Debug)]
pub struct PlotStyle {
    pub color: Rgb,
    pub format: PlotFormat,
    pub font_scale: f64,
    pub dpi: u32,
    pub kinds: PlotKinds,
}

impl PlotStyle {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            color: color::resolve(&settings.color),
            format: settings.format,
            font_scale: settings.font_scale,
            dpi: settings.dpi,
            kinds: settings.kinds,
        }
    }
}

/// Renders plots as SVG documents and saves them in the configured format.
pub struct SvgBackend {
    style: PlotStyle,
}

impl SvgBackend {
    pub fn new(style: PlotStyle) -> Self {
        Self { style }
    }

    fn canvas(&self) -> Result<Canvas> {
        Canvas::new(self.style.font_scale, self.style.dpi)
    }

    fn save(
        &self,
        unit: &UnitContext,
        family: PlotFamily,
        stem: &str,
        title: &str,
        canvas: Canvas,
    ) -> Result<Plot> {
        let svg = canvas.finish()?;
        let path = export::save(&svg, &unit.artifact(stem), self.style.format)?;
        debug!("Saved {}", path.display());
        Ok(Plot {
            family,
            title: unit.heading(title),
            path,
        })
    }

    fn histogram_plot(
        &self,
        unit: &UnitContext,
        lengths: &[f64],
        weighted: bool,
        log: bool,
        n50: Option<u64>,
    ) -> Result<Plot> {
        let (title, stem) = match (weighted, log) {
            (false, false) => (
                "Histogram of read lengths",
                "Non_weightedHistogramReadlength",
            ),
            (true, false) => (
                "Weighted histogram of read lengths",
                "WeightedHistogramReadlength",
            ),
            (false, true) => (
                "Log-transformed histogram of read lengths",
                "Non_weightedLogTransformed_HistogramReadlength",
            ),
            (true, true) => (
                "Weighted log-transformed histogram of read lengths",
                "WeightedLogTransformed_HistogramReadlength",
            ),
        };
        let (lo, hi) = min_max(lengths.iter().copied());
        let x = if log {
            Axis::log10(lo, hi)
        } else {
            Axis::linear(0.0, hi.max(1.0))
        };
        let bins = if log {
            80
        } else {
            ((hi / 500.0).round() as usize).clamp(10, 400)
        };
        let weights: Option<&[f64]> = weighted.then_some(lengths);
        let counts = histogram(lengths, weights, &x, bins);
        let max_count = counts.iter().copied().fold(0.0, f64::max);
        let y = Axis::linear(0.0, (max_count * 1.05).max(1.0));

        let mut c = self.canvas()?;
        c.title(title, unit.title.as_deref())?;
        let x_label = if log {
            "Read length (log scale)"
        } else {
            "Read length"
        };
        let y_label = if weighted {
            "Number of bases"
        } else {
            "Number of reads"
        };
        c.axes(&x, &y, x_label, y_label)?;
        let fill = self.style.color.hex();
        let bin_w = c.plot_w / bins as f64;
        for (i, &count) in counts.iter().enumerate() {
            if count <= 0.0 {
                continue;
            }
            let y0 = c.y(&y, count);
            let h = c.top + c.plot_h - y0;
            c.rect(c.left + i as f64 * bin_w, y0, bin_w.max(1.0), h, &fill, 1.0)?;
        }
        if let Some(n50) = n50 {
            let xpos = c.x(&x, n50 as f64);
            c.vline(xpos, "#8B0000", true)?;
            c.note(xpos + 4.0, c.top + 14.0, 11.0, &format!("N50: {}", fmt_int(n50)))?;
        }
        self.save(unit, PlotFamily::ReadLength, stem, title, c)
    }

    fn scatter_kind(
        &self,
        unit: &UnitContext,
        spec: &ScatterSpec,
        points: &[(f64, f64)],
        kind: ScatterKind,
    ) -> Result<Plot> {
        let [x_name, y_name] = spec.names;
        let mut title = format!("{} vs {} plot using {}", x_name, y_name, kind.phrase());
        let mut stem = format!("{}_{}", spec.stem, kind.suffix());
        if spec.log {
            title.push_str(" after log transformation of read lengths");
            stem = format!("{}_loglength", stem);
        }
        let (x, y) = scatter_axes(spec, points);

        let mut c = self.canvas()?;
        if kind == ScatterKind::Pauvre {
            // room for the marginal histograms
            let margin_h = c.plot_h * 0.2;
            let margin_w = c.plot_w * 0.2;
            c.top += margin_h;
            c.plot_h -= margin_h;
            c.plot_w -= margin_w;
        }
        c.title(&title, unit.title.as_deref())?;
        let x_label = if spec.log {
            format!("{} (log scale)", x_name)
        } else {
            x_name.to_string()
        };
        c.axes(&x, &y, &x_label, y_name)?;
        match kind {
            ScatterKind::Dot | ScatterKind::Pauvre => self.draw_dots(&mut c, &x, &y, points)?,
            ScatterKind::Hex => self.draw_hexbins(&mut c, &x, &y, points)?,
            ScatterKind::Kde => self.draw_density(&mut c, &x, &y, points)?,
        }
        if kind == ScatterKind::Pauvre {
            self.draw_marginals(&mut c, &x, &y, points)?;
        }
        if spec.pearson
            && let Some(r) = stats::pearson(
                &points.iter().map(|p| p.0).collect::<Vec<_>>(),
                &points.iter().map(|p| p.1).collect::<Vec<_>>(),
            )
        {
            c.note(c.left + 8.0, c.top + 16.0, 11.0, &format!("Pearson r = {:.3}", r))?;
        }
        self.save(unit, spec.family, &stem, &title, c)
    }

    fn draw_dots(&self, c: &mut Canvas, x: &Axis, y: &Axis, points: &[(f64, f64)]) -> Result<()> {
        let stride = points.len().div_ceil(MAX_DOTS).max(1);
        let fill = self.style.color.hex();
        for &(px, py) in points.iter().step_by(stride) {
            if !inside(x, y, px, py) {
                continue;
            }
            c.circle(c.x(x, px), c.y(y, py), 1.5, &fill, 0.5)?;
        }
        Ok(())
    }

    fn draw_hexbins(
        &self,
        c: &mut Canvas,
        x: &Axis,
        y: &Axis,
        points: &[(f64, f64)],
    ) -> Result<()> {
        let s = c.plot_w / (HEX_COLUMNS * 3f64.sqrt());
        let mut bins: BTreeMap<(i64, i64), u32> = BTreeMap::new();
        for &(px, py) in points.iter().filter(|p| inside(x, y, p.0, p.1)) {
            let dx = c.x(x, px) - c.left;
            let dy = c.y(y, py) - c.top;
            *bins.entry(hex_round(dx, dy, s)).or_insert(0) += 1;
        }
        let max = bins.values().copied().max().unwrap_or(1) as f64;
        for (&(q, r), &count) in &bins {
            let (hx, hy) = hex_center(q, r, s);
            if hx < 0.0 || hy < 0.0 || hx > c.plot_w || hy > c.plot_h {
                continue;
            }
            let t = (count as f64).ln_1p() / max.ln_1p();
            let fill = WHITE.mix(self.style.color, 0.15 + 0.85 * t).hex();
            let corners: Vec<(f64, f64)> = (0..6)
                .map(|k| {
                    let a = std::f64::consts::PI / 180.0 * (60.0 * k as f64 - 30.0);
                    (c.left + hx + s * a.cos(), c.top + hy + s * a.sin())
                })
                .collect();
            c.polygon(&corners, &fill, 1.0)?;
        }
        Ok(())
    }

    fn draw_density(
        &self,
        c: &mut Canvas,
        x: &Axis,
        y: &Axis,
        points: &[(f64, f64)],
    ) -> Result<()> {
        let (gw, gh) = KDE_GRID;
        let density = density_grid(x, y, points, gw, gh);
        let max = density.iter().copied().fold(0.0, f64::max);
        if max <= 0.0 {
            return Ok(());
        }
        let cw = c.plot_w / gw as f64;
        let ch = c.plot_h / gh as f64;
        for row in 0..gh {
            for col in 0..gw {
                let t = density[row * gw + col] / max;
                if t < 0.02 {
                    continue;
                }
                // quantize so neighbouring cells form visible contour bands
                let level = (t * 8.0).ceil() / 8.0;
                let fill = WHITE.mix(self.style.color, level).hex();
                let top = c.top + c.plot_h - (row + 1) as f64 * ch;
                c.rect(c.left + col as f64 * cw, top, cw + 0.3, ch + 0.3, &fill, 1.0)?;
            }
        }
        Ok(())
    }

    fn draw_marginals(
        &self,
        c: &mut Canvas,
        x: &Axis,
        y: &Axis,
        points: &[(f64, f64)],
    ) -> Result<()> {
        const BINS: usize = 50;
        let fill = self.style.color.hex();
        let xs: Vec<f64> = points.iter().map(|p| p.0).collect();
        let ys: Vec<f64> = points.iter().map(|p| p.1).collect();

        let top_counts = histogram(&xs, None, x, BINS);
        let top_max = top_counts.iter().copied().fold(1.0, f64::max);
        let band = c.plot_h * 0.25;
        let bin_w = c.plot_w / BINS as f64;
        for (i, &n) in top_counts.iter().enumerate() {
            let h = n / top_max * (band - 4.0);
            c.rect(c.left + i as f64 * bin_w, c.top - 2.0 - h, bin_w, h, &fill, 0.8)?;
        }

        let right_counts = histogram(&ys, None, y, BINS);
        let right_max = right_counts.iter().copied().fold(1.0, f64::max);
        let bin_h = c.plot_h / BINS as f64;
        let x0 = c.left + c.plot_w + 2.0;
        for (i, &n) in right_counts.iter().enumerate() {
            let w = n / right_max * (c.plot_w * 0.25 - 4.0);
            let top = c.top + c.plot_h - (i + 1) as f64 * bin_h;
            c.rect(x0, top, w, bin_h, &fill, 0.8)?;
        }
        Ok(())
    }

    fn time_plot(
        &self,
        unit: &UnitContext,
        title: &str,
        stem: &str,
        y_label: &str,
        series: &[(f64, f64)],
        band: Option<&[(f64, f64, f64)]>,
    ) -> Result<Plot> {
        let x = Axis::linear(0.0, series.last().map(|p| p.0).unwrap_or(1.0).max(1.0));
        let band_values = band.unwrap_or_default().iter().flat_map(|b| [b.1, b.2]);
        let (_, y_max) = min_max(series.iter().map(|p| p.1).chain(band_values));
        let y = Axis::linear(0.0, (y_max * 1.05).max(1.0));
        let mut c = self.canvas()?;
        c.title(title, unit.title.as_deref())?;
        c.axes(&x, &y, "Run time (hours)", y_label)?;
        let color = self.style.color;
        if let Some(band) = band {
            let mut poly: Vec<(f64, f64)> = band.iter().map(|b| (c.x(&x, b.0), c.y(&y, b.2))).collect();
            poly.extend(band.iter().rev().map(|b| (c.x(&x, b.0), c.y(&y, b.1))));
            c.polygon(&poly, &WHITE.mix(color, 0.45).hex(), 0.8)?;
        }
        let line: Vec<(f64, f64)> = series.iter().map(|p| (c.x(&x, p.0), c.y(&y, p.1))).collect();
        c.path(&line, &color.hex(), 2.0)?;
        self.save(unit, PlotFamily::TimeSeries, stem, title, c)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum ScatterKind {
    Dot,
    Hex,
    Kde,
    Pauvre,
}

impl ScatterKind {
    fn phrase(self) -> &'static str {
        match self {
            ScatterKind::Dot => "dots",
            ScatterKind::Hex => "hexagonal bins",
            ScatterKind::Kde => "a kernel density estimation",
            ScatterKind::Pauvre => "marginal histograms",
        }
    }

    fn suffix(self) -> &'static str {
        match self {
            ScatterKind::Dot => "dot",
            ScatterKind::Hex => "hex",
            ScatterKind::Kde => "kde",
            ScatterKind::Pauvre => "pauvre",
        }
    }
}

impl PlotBackend for SvgBackend {
    fn length_plots(
        &mut self,
        unit: &UnitContext,
        lengths: &[u64],
        n50: Option<u64>,
    ) -> Result<Vec<Plot>> {
        let values: Vec<f64> = lengths.iter().map(|&l| l as f64).collect();
        let mut plots = Vec::with_capacity(4);
        for log in [false, true] {
            for weighted in [false, true] {
                plots.push(self.histogram_plot(unit, &values, weighted, log, n50)?);
            }
        }
        Ok(plots)
    }

    fn scatter(&mut self, unit: &UnitContext, spec: &ScatterSpec) -> Result<Vec<Plot>> {
        let points: Vec<(f64, f64)> = spec
            .x
            .iter()
            .zip(&spec.y)
            .filter(|(x, y)| x.is_finite() && y.is_finite())
            .map(|(&x, &y)| (x, y))
            .collect();
        let kinds = self.style.kinds;
        let mut wanted = Vec::new();
        if kinds.dot {
            wanted.push(ScatterKind::Dot);
        }
        if kinds.hex {
            wanted.push(ScatterKind::Hex);
        }
        if kinds.kde {
            wanted.push(ScatterKind::Kde);
        }
        if kinds.pauvre && spec.family == PlotFamily::LengthVsQuality && !spec.log {
            wanted.push(ScatterKind::Pauvre);
        }
        let mut plots = Vec::with_capacity(wanted.len());
        for kind in wanted {
            plots.push(self.scatter_kind(unit, spec, &points, kind)?);
        }
        Ok(plots)
    }

    fn spatial_heatmap(&mut self, unit: &UnitContext, channels: &[u32]) -> Result<Vec<Plot>> {
        let title = "Number of reads generated per channel";
        let layout = Layout::for_channels(channels.iter().copied().max().unwrap_or(0));
        let mut counts: HashMap<u32, u64> = HashMap::new();
        for &ch in channels {
            *counts.entry(ch).or_insert(0) += 1;
        }
        let max = counts.values().copied().max().unwrap_or(0);

        let mut c = self.canvas()?;
        c.title(title, unit.title.as_deref())?;
        let x = Axis::linear(0.5, layout.cols as f64 + 0.5);
        let y = Axis::linear(0.5, layout.rows as f64 + 0.5);
        c.axes(&x, &y, "Channel column", "Channel row")?;
        let cw = c.plot_w / layout.cols as f64;
        let ch = c.plot_h / layout.rows as f64;
        for row in 0..layout.rows {
            for col in 0..layout.cols {
                let channel = layout.channel(row, col);
                let n = counts.get(&channel).copied().unwrap_or(0);
                let t = if max == 0 { 0.0 } else { n as f64 / max as f64 };
                let top = c.top + c.plot_h - (row + 1) as f64 * ch;
                c.rect(
                    c.left + col as f64 * cw,
                    top,
                    cw - 0.5,
                    ch - 0.5,
                    &color::greens(t).hex(),
                    1.0,
                )?;
            }
        }
        c.note(
            c.left,
            c.top - 4.0,
            10.0,
            &format!("max {} reads per channel", fmt_int(max)),
        )?;
        Ok(vec![self.save(
            unit,
            PlotFamily::ActivityMap,
            "ActivityMap_ReadsPerChannel",
            title,
            c,
        )?])
    }

    fn time_plots(&mut self, unit: &UnitContext, input: &TimeSeriesInput) -> Result<Vec<Plot>> {
        let mut order: Vec<usize> = (0..input.start_time.len())
            .filter(|&i| input.start_time[i].is_finite())
            .collect();
        order.sort_by(|&a, &b| input.start_time[a].total_cmp(&input.start_time[b]));
        let hours = |i: usize| input.start_time[i] / 3_600.0;
        let mut plots = Vec::new();

        let mut acc = 0.0;
        let cumulative: Vec<(f64, f64)> = std::iter::once((0.0, 0.0))
            .chain(order.iter().map(|&i| {
                acc += input.lengths[i] as f64 / 1e9;
                (hours(i), acc)
            }))
            .collect();
        plots.push(self.time_plot(
            unit,
            "Cumulative yield",
            "CumulativeYieldPlot_Gigabases",
            "Cumulative yield (gigabase)",
            &cumulative,
            None,
        )?);

        let per_bucket = bucket_counts(input.start_time, &order, COUNT_BUCKET_SECS);
        plots.push(self.time_plot(
            unit,
            "Number of reads over time",
            "NumberOfReads_Over_Time",
            "Number of reads per 15 minutes",
            &per_bucket,
            None,
        )?);

        let lengths: Vec<f64> = input
            .lengths
            .iter()
            .map(|&l| {
                if input.log_length {
                    (l as f64).max(1.0).log10()
                } else {
                    l as f64
                }
            })
            .collect();
        let (title, stem, label) = if input.log_length {
            (
                "Log-transformed read length over time",
                "TimeLogLengthViolinPlot",
                "Read length (log10)",
            )
        } else {
            ("Read length over time", "TimeLengthViolinPlot", "Read length")
        };
        let (median, band) = spread(input.start_time, &order, &lengths);
        plots.push(self.time_plot(unit, title, stem, label, &median, Some(&band))?);

        if let Some(quals) = input.quals {
            let (median, band) = spread(input.start_time, &order, quals);
            plots.push(self.time_plot(
                unit,
                "Base call quality over time",
                "TimeQualityViolinPlot",
                "Average base call quality",
                &median,
                Some(&band),
            )?);
        }

        if let Some(channels) = input.channels {
            let active = active_channels(input.start_time, &order, channels);
            plots.push(self.time_plot(
                unit,
                "Number of active pores over time",
                "ActivePores_Over_Time",
                "Active pores per 15 minutes",
                &active,
                None,
            )?);
        }
        Ok(plots)
    }
}

fn scatter_axes(spec: &ScatterSpec, points: &[(f64, f64)]) -> (Axis, Axis) {
    let (x_lo, x_hi) = min_max(points.iter().map(|p| p.0));
    let mut x = if spec.log {
        Axis::log10(x_lo, x_hi)
    } else {
        Axis::fit(points.iter().map(|p| p.0))
    };
    let mut y = Axis::fit(points.iter().map(|p| p.1));
    if let Some(min) = spec.min_x.filter(|m| m.is_finite()) {
        x = Axis::linear(x.transform(min), x.max);
        x.log = spec.log;
    }
    if let Some(min) = spec.min_y.filter(|m| m.is_finite()) {
        y = Axis::linear(min, y.max);
    }
    (x, y)
}

fn inside(x: &Axis, y: &Axis, px: f64, py: f64) -> bool {
    (0.0..=1.0).contains(&x.fraction(px)) && (0.0..=1.0).contains(&y.fraction(py))
}

/// Bin counts (or weight sums) over `axis` split into `bins` equal parts.
fn histogram(values: &[f64], weights: Option<&[f64]>, axis: &Axis, bins: usize) -> Vec<f64> {
    let mut counts = vec![0.0; bins];
    for (i, &v) in values.iter().enumerate() {
        if !v.is_finite() {
            continue;
        }
        let f = axis.fraction(v);
        if !(0.0..=1.0).contains(&f) {
            continue;
        }
        let bin = ((f * bins as f64) as usize).min(bins - 1);
        counts[bin] += weights.map_or(1.0, |w| w[i]);
    }
    counts
}

// Pointy-top hexagon grid in pixel space, axial coordinates.
fn hex_round(px: f64, py: f64, s: f64) -> (i64, i64) {
    let q = (3f64.sqrt() / 3.0 * px - py / 3.0) / s;
    let r = (2.0 / 3.0 * py) / s;
    let cz = -q - r;
    let (mut rq, mut rr, rz) = (q.round(), r.round(), cz.round());
    let (dq, dr, dz) = ((rq - q).abs(), (rr - r).abs(), (rz - cz).abs());
    if dq > dr && dq > dz {
        rq = -rr - rz;
    } else if dr > dz {
        rr = -rq - rz;
    }
    (rq as i64, rr as i64)
}

fn hex_center(q: i64, r: i64, s: f64) -> (f64, f64) {
    let (q, r) = (q as f64, r as f64);
    (s * (3f64.sqrt() * q + 3f64.sqrt() / 2.0 * r), s * 1.5 * r)
}

/// Point counts on a `gw`×`gh` grid smoothed with a separable Gaussian kernel.
fn density_grid(x: &Axis, y: &Axis, points: &[(f64, f64)], gw: usize, gh: usize) -> Vec<f64> {
    let mut grid = vec![0.0; gw * gh];
    for &(px, py) in points {
        let fx = x.fraction(px);
        let fy = y.fraction(py);
        if !(0.0..=1.0).contains(&fx) || !(0.0..=1.0).contains(&fy) {
            continue;
        }
        let col = ((fx * gw as f64) as usize).min(gw - 1);
        let row = ((fy * gh as f64) as usize).min(gh - 1);
        grid[row * gw + col] += 1.0;
    }
    let radius = (KDE_SIGMA * 3.0).ceil() as isize;
    let kernel: Vec<f64> = (-radius..=radius)
        .map(|d| (-(d as f64).powi(2) / (2.0 * KDE_SIGMA * KDE_SIGMA)).exp())
        .collect();
    let blur = |src: &[f64], horizontal: bool| -> Vec<f64> {
        let mut out = vec![0.0; gw * gh];
        for row in 0..gh {
            for col in 0..gw {
                let mut acc = 0.0;
                for (k, w) in kernel.iter().enumerate() {
                    let d = k as isize - radius;
                    let (r, c) = if horizontal {
                        (row as isize, col as isize + d)
                    } else {
                        (row as isize + d, col as isize)
                    };
                    if r >= 0 && c >= 0 && (r as usize) < gh && (c as usize) < gw {
                        acc += w * src[r as usize * gw + c as usize];
                    }
                }
                out[row * gw + col] = acc;
            }
        }
        out
    };
    let pass = blur(&grid, true);
    blur(&pass, false)
}

/// Reads per bucket, x at the bucket end in hours.
fn bucket_counts(times: &[f64], order: &[usize], secs: f64) -> Vec<(f64, f64)> {
    let mut counts: BTreeMap<i64, f64> = BTreeMap::new();
    for &i in order {
        *counts.entry((times[i] / secs).floor() as i64).or_insert(0.0) += 1.0;
    }
    fill_buckets(counts, secs)
}

fn active_channels(times: &[f64], order: &[usize], channels: &[u32]) -> Vec<(f64, f64)> {
    let mut seen: BTreeMap<i64, std::collections::HashSet<u32>> = BTreeMap::new();
    for &i in order {
        let b = (times[i] / COUNT_BUCKET_SECS).floor() as i64;
        seen.entry(b).or_default().insert(channels[i]);
    }
    fill_buckets(
        seen.into_iter().map(|(b, s)| (b, s.len() as f64)).collect(),
        COUNT_BUCKET_SECS,
    )
}

fn fill_buckets(counts: BTreeMap<i64, f64>, secs: f64) -> Vec<(f64, f64)> {
    let Some(&last) = counts.keys().next_back() else {
        return Vec::new();
    };
    (0..=last.max(0))
        .map(|b| {
            let x = (b + 1) as f64 * secs / 3_600.0;
            (x, counts.get(&b).copied().unwrap_or(0.0))
        })
        .collect()
}

/// Hourly median with the interquartile band of `values`.
fn spread(
    times: &[f64],
    order: &[usize],
    values: &[f64],
) -> (Vec<(f64, f64)>, Vec<(f64, f64, f64)>) {
    let mut groups: BTreeMap<i64, Vec<f64>> = BTreeMap::new();
    for &i in order {
        if values[i].is_finite() {
            let b = (times[i] / SPREAD_BUCKET_SECS).floor() as i64;
            groups.entry(b).or_default().push(values[i]);
        }
    }
    let mut median = Vec::with_capacity(groups.len());
    let mut band = Vec::with_capacity(groups.len());
    for (b, v) in groups {
        let x = (b as f64 + 0.5) * SPREAD_BUCKET_SECS / 3_600.0;
        median.push((x, stats::median(&v)));
        band.push((x, stats::percentile(&v, 25.0), stats::percentile(&v, 75.0)));
    }
    (median, band)
}

/// Flow cell channel arrangement: MinION 16×32, larger devices 25×120.
struct Layout {
    rows: usize,
    cols: usize,
    structure: Vec<u32>,
}

impl Layout {
    fn for_channels(max_channel: u32) -> Self {
        if max_channel > 512 {
            let structure = (0..300u32)
                .flat_map(|i| (10 * i + 1)..=(10 * i + 10))
                .collect();
            return Self {
                rows: 25,
                cols: 120,
                structure,
            };
        }
        // 32 columns of 16 channels; stored row-major after transposing
        let mut columns: Vec<Vec<u32>> = Vec::with_capacity(32);
        for (i, j) in [33, 481, 417, 353, 289, 225, 161, 97]
            .into_iter()
            .zip([8, 456, 392, 328, 264, 200, 136, 72])
        {
            for n in 0..4 {
                let up = (0..8).map(|k| i + n * 8 + k);
                let down = (0..8).map(|k| j + n * 8 - k);
                columns.push(up.chain(down).collect());
            }
        }
        let mut structure = Vec::with_capacity(16 * 32);
        for row in 0..16 {
            for col in &columns {
                structure.push(col[row]);
            }
        }
        Self {
            rows: 16,
            cols: 32,
            structure,
        }
    }

    fn channel(&self, row: usize, col: usize) -> u32 {
        self.structure[row * self.cols + col]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn backend(dir: &std::path::Path, kinds: PlotKinds) -> (SvgBackend, UnitContext) {
        let mut settings = Settings::new(dir);
        settings.kinds = kinds;
        settings.prefix = "t_".into();
        (
            SvgBackend::new(PlotStyle::from_settings(&settings)),
            settings.unit(),
        )
    }

    #[test]
    fn minion_layout_covers_every_channel_once() {
        let layout = Layout::for_channels(512);
        assert_eq!((layout.rows, layout.cols), (16, 32));
        let set: HashSet<u32> = layout.structure.iter().copied().collect();
        assert_eq!(set.len(), 512);
        assert_eq!(set.iter().min(), Some(&1));
        assert_eq!(set.iter().max(), Some(&512));
        assert_eq!(layout.channel(0, 0), 33);
        assert_eq!(layout.channel(8, 0), 8);

        let big = Layout::for_channels(2_000);
        assert_eq!((big.rows, big.cols), (25, 120));
        assert_eq!(big.channel(24, 119), 3_000);
    }

    #[test]
    fn length_plots_write_four_histograms() {
        let dir = tempfile::tempdir().unwrap();
        let (mut b, unit) = backend(dir.path(), PlotKinds::default());
        let lengths: Vec<u64> = (1..=500).map(|i| i * 37).collect();
        let plots = b.length_plots(&unit, &lengths, Some(12_000)).unwrap();
        let titles: Vec<&str> = plots.iter().map(|p| p.title.as_str()).collect();
        assert_eq!(
            titles,
            vec![
                "Histogram of read lengths",
                "Weighted histogram of read lengths",
                "Log-transformed histogram of read lengths",
                "Weighted log-transformed histogram of read lengths",
            ]
        );
        for p in &plots {
            assert!(p.path.is_file());
            assert!(p.path.file_name().unwrap().to_string_lossy().starts_with("t_"));
        }
        let svg = std::fs::read_to_string(&plots[0].path).unwrap();
        assert!(svg.contains("N50: 12,000"));
    }

    #[test]
    fn scatter_emits_one_plot_per_kind_in_fixed_order() {
        let dir = tempfile::tempdir().unwrap();
        let kinds = PlotKinds {
            dot: true,
            hex: true,
            kde: true,
            pauvre: true,
        };
        let (mut b, unit) = backend(dir.path(), kinds);
        let spec = ScatterSpec {
            family: PlotFamily::LengthVsQuality,
            stem: "LengthvsQualityScatterPlot",
            x: (0..300).map(|i| 500.0 + i as f64 * 20.0).collect(),
            y: (0..300).map(|i| 5.0 + (i % 10) as f64).collect(),
            names: ["Read lengths", "Average read quality"],
            log: false,
            pearson: true,
            min_x: None,
            min_y: None,
        };
        let plots = b.scatter(&unit, &spec).unwrap();
        let names: Vec<String> = plots
            .iter()
            .map(|p| p.path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec![
                "t_LengthvsQualityScatterPlot_dot.svg",
                "t_LengthvsQualityScatterPlot_hex.svg",
                "t_LengthvsQualityScatterPlot_kde.svg",
                "t_LengthvsQualityScatterPlot_pauvre.svg",
            ]
        );

        let log_spec = ScatterSpec { log: true, ..spec };
        let plots = b.scatter(&unit, &log_spec).unwrap();
        assert_eq!(plots.len(), 3);
        assert!(plots[0].title.ends_with("after log transformation of read lengths"));
    }

    #[test]
    fn time_plots_follow_available_columns() {
        let dir = tempfile::tempdir().unwrap();
        let (mut b, unit) = backend(dir.path(), PlotKinds::default());
        let start: Vec<f64> = (0..400).map(|i| i as f64 * 60.0).collect();
        let lengths: Vec<u64> = (0..400).map(|i| 1_000 + i).collect();
        let quals = vec![10.0; 400];
        let channels: Vec<u32> = (0..400).map(|i| i % 50 + 1).collect();
        let plots = b
            .time_plots(
                &unit,
                &TimeSeriesInput {
                    start_time: &start,
                    lengths: &lengths,
                    quals: Some(quals.as_slice()),
                    channels: Some(channels.as_slice()),
                    log_length: false,
                },
            )
            .unwrap();
        assert_eq!(plots.len(), 5);
        let plots = b
            .time_plots(
                &unit,
                &TimeSeriesInput {
                    start_time: &start,
                    lengths: &lengths,
                    quals: None,
                    channels: None,
                    log_length: true,
                },
            )
            .unwrap();
        assert_eq!(plots.len(), 3);
        assert_eq!(plots[2].title, "Log-transformed read length over time");
    }

    #[test]
    fn bucket_counts_fill_gaps() {
        let times = [0.0, 10.0, 2_000.0];
        let got = bucket_counts(&times, &[0, 1, 2], COUNT_BUCKET_SECS);
        assert_eq!(got, vec![(0.25, 2.0), (0.5, 0.0), (0.75, 1.0)]);
    }

    #[test]
    fn heatmap_is_written() {
        let dir = tempfile::tempdir().unwrap();
        let (mut b, unit) = backend(dir.path(), PlotKinds::default());
        let plots = b.spatial_heatmap(&unit, &[1, 1, 2, 511]).unwrap();
        assert_eq!(plots[0].title, "Number of reads generated per channel");
        assert!(dir.path().join("t_ActivityMap_ReadsPerChannel.svg").is_file());
    }
}
