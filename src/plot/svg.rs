use anyhow::Result;
use std::fmt::Write;

pub const WIDTH: f64 = 720.0;
pub const HEIGHT: f64 = 480.0;

const LEFT: f64 = 70.0;
const RIGHT: f64 = 24.0;
const TOP: f64 = 44.0;
const BOTTOM: f64 = 52.0;

/// Linear or log10 axis range. Log axes store their bounds as exponents.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Axis {
    pub min: f64,
    pub max: f64,
    pub log: bool,
}

impl Axis {
    pub fn linear(min: f64, max: f64) -> Self {
        let (min, max) = widen(min, max);
        Self {
            min,
            max,
            log: false,
        }
    }

    /// Log10 axis over positive values in `min..=max`.
    pub fn log10(min: f64, max: f64) -> Self {
        let lo = min.max(1.0).log10().floor();
        let hi = max.max(1.0).log10().ceil();
        let (min, max) = widen(lo, hi);
        Self {
            min,
            max,
            log: true,
        }
    }

    /// Linear axis covering `values` with a small margin.
    pub fn fit<I: IntoIterator<Item = f64>>(values: I) -> Self {
        let (lo, hi) = min_max(values);
        let pad = (hi - lo) * 0.04;
        Self::linear(lo - pad, hi + pad)
    }

    pub fn transform(&self, v: f64) -> f64 {
        if self.log { v.max(1.0).log10() } else { v }
    }

    /// Position of `v` in `0..=1` along the axis.
    pub fn fraction(&self, v: f64) -> f64 {
        (self.transform(v) - self.min) / (self.max - self.min)
    }
}

/// An SVG document with one plot area, axes and a title.
pub struct Canvas {
    out: String,
    pub left: f64,
    pub top: f64,
    pub plot_w: f64,
    pub plot_h: f64,
    font_scale: f64,
}

impl Canvas {
    pub fn new(font_scale: f64, dpi: u32) -> Result<Self> {
        Self::with_size(WIDTH, HEIGHT, font_scale, dpi)
    }

    /// `w`/`h` are in user units; the rendered size scales with `dpi`
    /// relative to 100.
    pub fn with_size(w: f64, h: f64, font_scale: f64, dpi: u32) -> Result<Self> {
        let scale = dpi.max(10) as f64 / 100.0;
        let mut out = String::with_capacity(64 * 1024);
        writeln!(
            out,
            "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{}\" height=\"{}\" viewBox=\"0 0 {} {}\" font-family=\"Arial,Helvetica,sans-serif\">",
            (w * scale).round(),
            (h * scale).round(),
            w,
            h
        )?;
        writeln!(
            out,
            "<rect x=\"0\" y=\"0\" width=\"{}\" height=\"{}\" fill=\"#fff\"/>",
            w, h
        )?;
        Ok(Self {
            out,
            left: LEFT,
            top: TOP,
            plot_w: w - LEFT - RIGHT,
            plot_h: h - TOP - BOTTOM,
            font_scale: font_scale.max(0.1),
        })
    }

    fn font(&self, size: f64) -> f64 {
        (size * self.font_scale * 10.0).round() / 10.0
    }

    pub fn x(&self, axis: &Axis, v: f64) -> f64 {
        self.left + axis.fraction(v) * self.plot_w
    }

    pub fn y(&self, axis: &Axis, v: f64) -> f64 {
        self.top + self.plot_h - axis.fraction(v) * self.plot_h
    }

    /// Plot title, with the figure title above it when given.
    pub fn title(&mut self, title: &str, figure_title: Option<&str>) -> Result<()> {
        let cx = self.left + self.plot_w / 2.0;
        let size = self.font(14.0);
        match figure_title {
            Some(fig) => {
                writeln!(
                    self.out,
                    "<text x=\"{}\" y=\"16\" font-size=\"{}\" font-weight=\"bold\" fill=\"#222\" text-anchor=\"middle\">{}</text>",
                    cx,
                    size,
                    escape(fig)
                )?;
                writeln!(
                    self.out,
                    "<text x=\"{}\" y=\"34\" font-size=\"{}\" fill=\"#333\" text-anchor=\"middle\">{}</text>",
                    cx,
                    self.font(12.0),
                    escape(title)
                )?;
            }
            None => writeln!(
                self.out,
                "<text x=\"{}\" y=\"26\" font-size=\"{}\" fill=\"#222\" text-anchor=\"middle\">{}</text>",
                cx,
                size,
                escape(title)
            )?,
        }
        Ok(())
    }

    pub fn frame(&mut self) -> Result<()> {
        writeln!(
            self.out,
            "<rect x=\"{}\" y=\"{}\" width=\"{}\" height=\"{}\" fill=\"#fff\" stroke=\"#ddd\"/>",
            self.left, self.top, self.plot_w, self.plot_h
        )?;
        Ok(())
    }

    /// Grid lines, tick labels and axis names.
    pub fn axes(&mut self, x: &Axis, y: &Axis, x_label: &str, y_label: &str) -> Result<()> {
        self.frame()?;
        self.y_ticks(y, 5)?;
        self.x_ticks(x, 6)?;
        self.axis_labels(x_label, y_label)
    }

    fn y_ticks(&mut self, axis: &Axis, ticks: usize) -> Result<()> {
        for v in tick_values(axis, ticks) {
            let y = self.top + self.plot_h - (v - axis.min) / (axis.max - axis.min) * self.plot_h;
            writeln!(
                self.out,
                "<line x1=\"{:.2}\" y1=\"{:.2}\" x2=\"{:.2}\" y2=\"{:.2}\" stroke=\"#eee\"/>",
                self.left,
                y,
                self.left + self.plot_w,
                y
            )?;
            writeln!(
                self.out,
                "<text x=\"{:.2}\" y=\"{:.2}\" font-size=\"{}\" fill=\"#666\" text-anchor=\"end\" dominant-baseline=\"middle\">{}</text>",
                self.left - 4.0,
                y,
                self.font(10.0),
                tick_label(axis, v)
            )?;
        }
        Ok(())
    }

    fn x_ticks(&mut self, axis: &Axis, ticks: usize) -> Result<()> {
        for v in tick_values(axis, ticks) {
            let x = self.left + (v - axis.min) / (axis.max - axis.min) * self.plot_w;
            writeln!(
                self.out,
                "<line x1=\"{:.2}\" y1=\"{:.2}\" x2=\"{:.2}\" y2=\"{:.2}\" stroke=\"#eee\"/>",
                x,
                self.top,
                x,
                self.top + self.plot_h
            )?;
            writeln!(
                self.out,
                "<text x=\"{:.2}\" y=\"{:.2}\" font-size=\"{}\" fill=\"#666\" text-anchor=\"middle\" dominant-baseline=\"hanging\">{}</text>",
                x,
                self.top + self.plot_h + 4.0,
                self.font(10.0),
                tick_label(axis, v)
            )?;
        }
        Ok(())
    }

    fn axis_labels(&mut self, x_label: &str, y_label: &str) -> Result<()> {
        let x = self.left + self.plot_w / 2.0;
        let y = self.top + self.plot_h + 34.0;
        writeln!(
            self.out,
            "<text x=\"{}\" y=\"{}\" font-size=\"{}\" fill=\"#444\" text-anchor=\"middle\">{}</text>",
            x,
            y,
            self.font(12.0),
            escape(x_label)
        )?;
        let yx = self.left - 48.0;
        let yy = self.top + self.plot_h / 2.0;
        writeln!(
            self.out,
            "<text x=\"{}\" y=\"{}\" font-size=\"{}\" fill=\"#444\" text-anchor=\"middle\" transform=\"rotate(-90 {} {})\">{}</text>",
            yx,
            yy,
            self.font(12.0),
            yx,
            yy,
            escape(y_label)
        )?;
        Ok(())
    }

    pub fn rect(&mut self, x: f64, y: f64, w: f64, h: f64, fill: &str, opacity: f64) -> Result<()> {
        writeln!(
            self.out,
            "<rect x=\"{:.2}\" y=\"{:.2}\" width=\"{:.2}\" height=\"{:.2}\" fill=\"{}\" fill-opacity=\"{:.3}\"/>",
            x, y, w, h, fill, opacity
        )?;
        Ok(())
    }

    pub fn circle(&mut self, cx: f64, cy: f64, r: f64, fill: &str, opacity: f64) -> Result<()> {
        writeln!(
            self.out,
            "<circle cx=\"{:.2}\" cy=\"{:.2}\" r=\"{}\" fill=\"{}\" fill-opacity=\"{:.2}\"/>",
            cx, cy, r, fill, opacity
        )?;
        Ok(())
    }

    pub fn polygon(&mut self, points: &[(f64, f64)], fill: &str, opacity: f64) -> Result<()> {
        let mut pts = String::new();
        for (i, (x, y)) in points.iter().enumerate() {
            if i > 0 {
                pts.push(' ');
            }
            write!(pts, "{:.2},{:.2}", x, y)?;
        }
        writeln!(
            self.out,
            "<polygon points=\"{}\" fill=\"{}\" fill-opacity=\"{:.3}\"/>",
            pts, fill, opacity
        )?;
        Ok(())
    }

    /// Polyline through pixel coordinates.
    pub fn path(&mut self, points: &[(f64, f64)], stroke: &str, width: f64) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }
        let mut d = String::new();
        for (i, (x, y)) in points.iter().enumerate() {
            if i == 0 {
                write!(d, "M {:.2} {:.2}", x, y)?;
            } else {
                write!(d, " L {:.2} {:.2}", x, y)?;
            }
        }
        writeln!(
            self.out,
            "<path d=\"{}\" fill=\"none\" stroke=\"{}\" stroke-width=\"{}\"/>",
            d, stroke, width
        )?;
        Ok(())
    }

    pub fn vline(&mut self, x: f64, stroke: &str, dashed: bool) -> Result<()> {
        writeln!(
            self.out,
            "<line x1=\"{:.2}\" y1=\"{:.2}\" x2=\"{:.2}\" y2=\"{:.2}\" stroke=\"{}\" stroke-width=\"1.5\"{}/>",
            x,
            self.top,
            x,
            self.top + self.plot_h,
            stroke,
            if dashed { " stroke-dasharray=\"6 4\"" } else { "" }
        )?;
        Ok(())
    }

    /// Text at a pixel position, anchored at its start.
    pub fn note(&mut self, x: f64, y: f64, size: f64, text: &str) -> Result<()> {
        writeln!(
            self.out,
            "<text x=\"{:.2}\" y=\"{:.2}\" font-size=\"{}\" fill=\"#333\">{}</text>",
            x,
            y,
            self.font(size),
            escape(text)
        )?;
        Ok(())
    }

    pub fn finish(mut self) -> Result<String> {
        writeln!(self.out, "</svg>")?;
        Ok(self.out)
    }
}

pub fn nice_ticks(min: f64, max: f64, ticks: usize) -> (f64, f64, usize) {
    let range = (max - min).abs().max(1e-9);
    let rough = range / (ticks as f64 - 1.0);
    let mag = 10f64.powf(rough.abs().log10().floor());
    let norm = rough / mag;
    let step = if norm <= 1.0 {
        1.0
    } else if norm <= 2.0 {
        2.0
    } else if norm <= 5.0 {
        5.0
    } else {
        10.0
    } * mag;
    let start = (min / step).ceil() * step;
    let end = (max / step).floor() * step;
    let count = (((end - start) / step).round() as i64 + 1).max(0) as usize;
    (start, step, count)
}

fn tick_values(axis: &Axis, ticks: usize) -> Vec<f64> {
    if axis.log {
        let lo = axis.min.ceil() as i64;
        let hi = axis.max.floor() as i64;
        return (lo..=hi).map(|e| e as f64).collect();
    }
    let (start, step, count) = nice_ticks(axis.min, axis.max, ticks);
    (0..count).map(|i| start + step * i as f64).collect()
}

fn tick_label(axis: &Axis, v: f64) -> String {
    if axis.log {
        fmt_tick(10f64.powf(v))
    } else {
        fmt_tick(v)
    }
}

pub fn fmt_tick(v: f64) -> String {
    if v.abs() >= 1e6 && (v - v.round()).abs() < 0.001 {
        format!("{:.0e}", v)
    } else if (v - v.round()).abs() < 0.001 {
        format!("{}", v.round() as i64)
    } else if v.abs() < 10.0 {
        format!("{:.2}", v)
    } else {
        format!("{:.1}", v)
    }
}

pub fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Finite min and max of `values`; `(0, 1)` when there are none.
pub fn min_max<I: IntoIterator<Item = f64>>(values: I) -> (f64, f64) {
    let mut lo = f64::INFINITY;
    let mut hi = f64::NEG_INFINITY;
    for v in values {
        if v.is_finite() {
            lo = lo.min(v);
            hi = hi.max(v);
        }
    }
    if lo.is_finite() { (lo, hi) } else { (0.0, 1.0) }
}

fn widen(min: f64, max: f64) -> (f64, f64) {
    if (max - min).abs() < 1e-9 {
        (min - 0.5, max + 0.5)
    } else {
        (min, max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticks_stay_inside_the_range() {
        let (start, step, count) = nice_ticks(0.0, 100.0, 6);
        assert_eq!((start, step, count), (0.0, 20.0, 6));
        let (start, step, count) = nice_ticks(3.0, 97.0, 6);
        assert_eq!((start, step, count), (20.0, 20.0, 4));
    }

    #[test]
    fn log_axis_maps_decades() {
        let axis = Axis::log10(120.0, 45_000.0);
        assert_eq!((axis.min, axis.max), (2.0, 5.0));
        assert!((axis.fraction(1_000.0) - 1.0 / 3.0).abs() < 1e-9);
        assert_eq!(tick_values(&axis, 5), vec![2.0, 3.0, 4.0, 5.0]);
        assert_eq!(tick_label(&axis, 3.0), "1000");
    }

    #[test]
    fn degenerate_ranges_are_widened() {
        let axis = Axis::fit([5.0, 5.0]);
        assert!(axis.max > axis.min);
        assert_eq!(min_max(Vec::<f64>::new()), (0.0, 1.0));
    }

    #[test]
    fn canvas_produces_a_closed_document() {
        let mut c = Canvas::new(1.0, 200).unwrap();
        c.title("A & B", Some("Run <1>")).unwrap();
        c.axes(&Axis::linear(0.0, 10.0), &Axis::linear(0.0, 1.0), "x", "y")
            .unwrap();
        let svg = c.finish().unwrap();
        assert!(svg.starts_with("<svg xmlns="));
        assert!(svg.contains("width=\"1440\" height=\"960\" viewBox=\"0 0 720 480\""));
        assert!(svg.trim_end().ends_with("</svg>"));
        assert!(svg.contains("A &amp; B"));
        assert!(svg.contains("Run &lt;1&gt;"));
    }
}
