use crate::core::settings::Settings;
use crate::plot::Plot;
use anyhow::{Context, Result};
use log::{info, warn};
use std::collections::HashSet;
use std::fmt::Write;
use std::fs;
use std::path::{Path, PathBuf};

const STYLE: &[&str] = &[
    "body{font-family:Arial,Helvetica,sans-serif;margin:0;background:#eee;color:#222;}",
    ".page{display:flex;align-items:flex-start;gap:16px;padding:16px;}",
    ".sidebar{width:280px;position:sticky;top:16px;align-self:flex-start;max-height:90vh;overflow-y:auto;background:#f6f6f6;border:1px solid #ddd;border-radius:4px;padding:10px;}",
    ".sidebar h2{margin:4px 0 8px 0;font-size:16px;}",
    ".sidebar ul{list-style:none;margin:0;padding:0;}",
    ".sidebar li{padding:4px 0;font-size:13px;}",
    ".sidebar li.sub{padding-left:12px;}",
    ".sidebar a{color:#003366;text-decoration:none;}",
    ".sidebar a:hover{text-decoration:underline;}",
    ".main{flex:1;min-width:0;background:#fff;border:1px solid #ddd;border-radius:4px;box-shadow:0 1px 3px rgba(0,0,0,0.08);padding:16px 20px;}",
    "h1{margin:0 0 6px 0;font-size:22px;}",
    "h2{margin:20px 0 6px 0;font-size:18px;}",
    "h3{margin:18px 0 6px 0;font-size:15px;}",
    ".module{padding:8px 0 14px 0;border-bottom:1px solid #eee;}",
    ".module:last-child{border-bottom:none;}",
    ".plot{margin:8px 0 6px 0;max-width:100%;}",
    ".plot svg,.plot img,.plot embed{max-width:100%;height:auto;}",
    ".table{border-collapse:collapse;font-size:12px;}",
    ".table th{background:#3b6ea5;color:#fff;text-align:left;padding:4px 6px;border:1px solid #2f5a86;}",
    ".table td{border:1px solid #ddd;padding:4px 6px;text-align:right;}",
    ".table td:first-child{text-align:left;}",
];

/// How a plot artifact appears in the document.
#[derive(Clone, Debug, PartialEq)]
enum Artifact {
    InlineSvg(String),
    Image(String),
    Embed(String),
}

#[derive(Clone, Debug, PartialEq)]
struct Table {
    header: Vec<String>,
    rows: Vec<Vec<String>>,
}

#[derive(Clone, Debug, PartialEq)]
enum Body {
    Stats(Table),
    Plot(Artifact),
}

#[derive(Clone, Debug, PartialEq)]
struct Section {
    anchor: String,
    heading: String,
    body: Body,
}

#[derive(Clone, Debug, PartialEq)]
struct TocEntry {
    anchor: String,
    label: String,
    nested: bool,
}

/// Ordered report content, serialized once by [`Document::render`].
#[derive(Debug, Default)]
struct Document {
    title: String,
    toc: Vec<TocEntry>,
    stats: Vec<Section>,
    plots: Vec<Section>,
}

/// Hands out unique HTML ids derived from headings.
#[derive(Default)]
struct Anchors {
    used: HashSet<String>,
}

impl Anchors {
    fn reserve(&mut self, id: &str) -> String {
        self.used.insert(id.to_string());
        id.to_string()
    }

    fn claim(&mut self, heading: &str) -> String {
        let base = sanitize(heading);
        if self.used.insert(base.clone()) {
            return base;
        }
        let mut n = 2;
        loop {
            let candidate = format!("{}_{}", base, n);
            if self.used.insert(candidate.clone()) {
                return candidate;
            }
            n += 1;
        }
    }
}

/// Spaces and every other non-alphanumeric character become underscores.
pub fn sanitize(heading: &str) -> String {
    let s: String = heading
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    if s.is_empty() { "plot".to_string() } else { s }
}

/// Builds `<prefix>NanoPlot-report.html` from the statistics tables and the
/// plots in production order. Overwrites an existing report.
pub fn assemble(plots: &[Plot], stats_files: &[PathBuf], settings: &Settings) -> Result<PathBuf> {
    let doc = build(plots, stats_files, settings)?;
    let html = doc.render()?;
    let path = settings.prefixed("NanoPlot-report.html");
    fs::write(&path, html).with_context(|| format!("failed to write {}", path.display()))?;
    info!("Wrote report {}", path.display());
    Ok(path)
}

fn build(plots: &[Plot], stats_files: &[PathBuf], settings: &Settings) -> Result<Document> {
    let mut anchors = Anchors::default();
    let mut doc = Document {
        title: match &settings.title {
            Some(t) => format!("NanoPlot report: {}", t),
            None => "NanoPlot report".to_string(),
        },
        ..Default::default()
    };

    let labels: Vec<&str> = if stats_files.len() == 2 {
        vec![
            "Summary Statistics prior to filtering",
            "Summary Statistics after filtering",
        ]
    } else {
        vec!["Summary Statistics"; stats_files.len()]
    };
    for (i, (file, label)) in stats_files.iter().zip(labels).enumerate() {
        let anchor = anchors.reserve(&format!("stats{}", i));
        doc.toc.push(TocEntry {
            anchor: anchor.clone(),
            label: label.to_string(),
            nested: false,
        });
        doc.stats.push(Section {
            anchor,
            heading: label.to_string(),
            body: Body::Stats(read_table(file)?),
        });
    }

    let plots_anchor = anchors.reserve("plots");
    doc.toc.push(TocEntry {
        anchor: plots_anchor,
        label: "Plots".to_string(),
        nested: false,
    });
    for plot in plots {
        let anchor = anchors.claim(&plot.title);
        doc.toc.push(TocEntry {
            anchor: anchor.clone(),
            label: plot.title.clone(),
            nested: true,
        });
        doc.plots.push(Section {
            anchor,
            heading: plot.title.clone(),
            body: Body::Plot(artifact(&plot.path, &settings.outdir)),
        });
    }
    Ok(doc)
}

fn read_table(path: &Path) -> Result<Table> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read statistics {}", path.display()))?;
    let mut lines = text.lines().filter(|l| !l.is_empty());
    let header = lines
        .next()
        .map(|l| l.split('\t').map(str::to_string).collect())
        .unwrap_or_default();
    let rows = lines
        .map(|l| l.split('\t').map(str::to_string).collect())
        .collect();
    Ok(Table { header, rows })
}

fn artifact(path: &Path, outdir: &Path) -> Artifact {
    let rel = path
        .strip_prefix(outdir)
        .ok()
        .or_else(|| path.file_name().map(Path::new))
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/");
    match path.extension().and_then(|e| e.to_str()) {
        Some("svg") => match fs::read_to_string(path) {
            Ok(svg) => Artifact::InlineSvg(extract_svg(&svg)),
            Err(e) => {
                warn!("Could not inline {}: {}", path.display(), e);
                Artifact::Image(rel)
            }
        },
        Some("pdf") => Artifact::Embed(rel),
        _ => Artifact::Image(rel),
    }
}

fn extract_svg(s: &str) -> String {
    if let (Some(start), Some(end)) = (s.find("<svg"), s.rfind("</svg>")) {
        s[start..end + 6].to_string()
    } else {
        s.to_string()
    }
}

impl Document {
    fn render(&self) -> Result<String> {
        let mut html = String::with_capacity(256 * 1024);
        writeln!(html, "<!DOCTYPE html>")?;
        writeln!(html, "<html lang=\"en\">")?;
        writeln!(html, "<head>")?;
        writeln!(html, "<meta charset=\"utf-8\"/>")?;
        writeln!(
            html,
            "<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\"/>"
        )?;
        writeln!(html, "<title>{}</title>", escape(&self.title))?;
        writeln!(html, "<style>")?;
        for rule in STYLE {
            writeln!(html, "{}", rule)?;
        }
        writeln!(html, "</style>")?;
        writeln!(html, "</head>")?;
        writeln!(html, "<body>")?;
        writeln!(html, "<div class=\"page\">")?;

        writeln!(html, "<aside class=\"sidebar\">")?;
        writeln!(html, "<h2>Contents</h2>")?;
        writeln!(html, "<ul>")?;
        for entry in &self.toc {
            writeln!(
                html,
                "<li{}><a href=\"#{}\">{}</a></li>",
                if entry.nested { " class=\"sub\"" } else { "" },
                entry.anchor,
                escape(&entry.label)
            )?;
        }
        writeln!(html, "</ul>")?;
        writeln!(html, "</aside>")?;

        writeln!(html, "<main class=\"main\">")?;
        writeln!(html, "<h1>{}</h1>", escape(&self.title))?;
        for section in &self.stats {
            section.render(&mut html, 2)?;
        }
        writeln!(html, "<h2 id=\"plots\">Plots</h2>")?;
        for section in &self.plots {
            section.render(&mut html, 3)?;
        }
        writeln!(html, "</main>")?;
        writeln!(html, "</div>")?;
        writeln!(html, "</body></html>")?;
        Ok(html)
    }
}

impl Section {
    fn render(&self, html: &mut String, level: u8) -> Result<()> {
        writeln!(html, "<div class=\"module\">")?;
        writeln!(
            html,
            "<h{} id=\"{}\">{}</h{}>",
            level,
            self.anchor,
            escape(&self.heading),
            level
        )?;
        match &self.body {
            Body::Stats(table) => table.render(html)?,
            Body::Plot(Artifact::InlineSvg(svg)) => {
                writeln!(html, "<div class=\"plot\">")?;
                writeln!(html, "{}", svg)?;
                writeln!(html, "</div>")?;
            }
            Body::Plot(Artifact::Image(src)) => writeln!(
                html,
                "<div class=\"plot\"><img src=\"{}\" alt=\"{}\"/></div>",
                escape(src),
                escape(&self.heading)
            )?,
            Body::Plot(Artifact::Embed(src)) => writeln!(
                html,
                "<div class=\"plot\"><embed src=\"{}\" type=\"application/pdf\" width=\"720\" height=\"480\"/></div>",
                escape(src)
            )?,
        }
        writeln!(html, "</div>")?;
        Ok(())
    }
}

impl Table {
    fn render(&self, html: &mut String) -> Result<()> {
        writeln!(html, "<table class=\"table\">")?;
        write!(html, "<tr>")?;
        for h in &self.header {
            write!(html, "<th>{}</th>", escape(h))?;
        }
        writeln!(html, "</tr>")?;
        for row in &self.rows {
            write!(html, "<tr>")?;
            for cell in row {
                write!(html, "<td>{}</td>", escape(cell))?;
            }
            writeln!(html, "</tr>")?;
        }
        writeln!(html, "</table>")?;
        Ok(())
    }
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::settings::PlotFormat;
    use crate::plot::PlotFamily;

    fn stats_file(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, "Metrics\tdataset\nNumber of reads\t3\nLongest read 1\t<500>\n").unwrap();
        path
    }

    fn plot(dir: &Path, title: &str, file: &str) -> Plot {
        let path = dir.join(file);
        fs::write(&path, "<?xml version=\"1.0\"?>\n<svg xmlns=\"http://www.w3.org/2000/svg\"></svg>\n").unwrap();
        Plot {
            family: PlotFamily::ReadLength,
            title: title.to_string(),
            path,
        }
    }

    fn hrefs_and_ids(html: &str) -> (Vec<String>, Vec<String>) {
        let grab = |marker: &str| -> Vec<String> {
            html.match_indices(marker)
                .map(|(i, _)| {
                    let rest = &html[i + marker.len()..];
                    rest[..rest.find('"').unwrap()].to_string()
                })
                .collect()
        };
        (grab("href=\"#"), grab(" id=\""))
    }

    #[test]
    fn sanitize_replaces_non_alphanumerics() {
        assert_eq!(
            sanitize("Read lengths vs Average read quality plot using dots"),
            "Read_lengths_vs_Average_read_quality_plot_using_dots"
        );
        assert_eq!(sanitize("BC01: Histogram (log)"), "BC01__Histogram__log_");
        assert_eq!(sanitize(""), "plot");
    }

    #[test]
    fn toc_links_resolve_and_anchors_are_unique() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::new(dir.path());
        let stats = vec![
            stats_file(dir.path(), "NanoStats.txt"),
            stats_file(dir.path(), "NanoStats_post_filtering.txt"),
        ];
        let plots = vec![
            plot(dir.path(), "Histogram of read lengths", "a.svg"),
            plot(dir.path(), "Histogram of read lengths", "b.svg"),
            plot(dir.path(), "Histogram of read-lengths", "c.svg"),
            plot(dir.path(), "plots", "d.svg"),
        ];
        let path = assemble(&plots, &stats, &settings).unwrap();
        assert_eq!(path, dir.path().join("NanoPlot-report.html"));
        let html = fs::read_to_string(&path).unwrap();

        let (hrefs, ids) = hrefs_and_ids(&html);
        assert_eq!(
            hrefs,
            vec![
                "stats0",
                "stats1",
                "plots",
                "Histogram_of_read_lengths",
                "Histogram_of_read_lengths_2",
                "Histogram_of_read_lengths_3",
                "plots_2",
            ]
        );
        let unique: HashSet<&String> = ids.iter().collect();
        assert_eq!(unique.len(), ids.len());
        for h in &hrefs {
            assert!(ids.contains(h), "dangling link #{h}");
        }
        assert!(html.contains("Summary Statistics prior to filtering"));
        assert!(html.contains("Summary Statistics after filtering"));
        assert!(html.contains("&lt;500&gt;"));
        assert!(!html.contains("<?xml"));
    }

    #[test]
    fn single_stats_file_gets_plain_label() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::new(dir.path());
        let stats = vec![stats_file(dir.path(), "NanoStats.txt")];
        let html = build(&[], &stats, &settings).unwrap().render().unwrap();
        assert!(html.contains("<a href=\"#stats0\">Summary Statistics</a>"));
        assert!(!html.contains("stats1"));
        assert!(!html.contains("prior to filtering"));
    }

    #[test]
    fn report_is_byte_identical_across_runs() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = Settings::new(dir.path());
        settings.prefix = "run_".into();
        settings.title = Some("Flow cell <A>".into());
        let stats = vec![stats_file(dir.path(), "run_NanoStats.txt")];
        let plots = vec![plot(dir.path(), "Cumulative yield", "run_y.svg")];
        let a = fs::read(assemble(&plots, &stats, &settings).unwrap()).unwrap();
        let b = fs::read(assemble(&plots, &stats, &settings).unwrap()).unwrap();
        assert_eq!(a, b);
        assert!(String::from_utf8(a).unwrap().contains("Flow cell &lt;A&gt;"));
    }

    #[test]
    fn non_svg_formats_are_referenced_by_file_name() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::new(dir.path());
        let pdf = dir.path().join(format!("x.{}", PlotFormat::Pdf.extension()));
        let svgz = dir.path().join(format!("y.{}", PlotFormat::Svgz.extension()));
        assert_eq!(artifact(&pdf, &settings.outdir), Artifact::Embed("x.pdf".into()));
        assert_eq!(artifact(&svgz, &settings.outdir), Artifact::Image("y.svgz".into()));
        let missing = dir.path().join("gone.svg");
        assert_eq!(
            artifact(&missing, &settings.outdir),
            Artifact::Image("gone.svg".into())
        );
    }
}
