pub mod barcode;
pub mod stats;

use crate::core::error::PipelineError;
use crate::core::filter::{FilterOptions, filter_and_transform};
use crate::core::ingest::{IngestOptions, ingest};
use crate::core::model::SourceKind;
use crate::core::settings::Settings;
use crate::core::snapshot;
use crate::plot::select::select;
use crate::plot::{Plot, PlotBackend};
use crate::report;
use anyhow::Result;
use log::info;
use stats::{StatsStage, compute_all};
use std::env;
use std::path::PathBuf;
use std::time::{Duration, Instant};

#[derive(Clone, Debug)]
pub enum InputSpec {
    Files {
        kind: SourceKind,
        files: Vec<PathBuf>,
    },
    /// Dataset previously saved with `--store`.
    Snapshot(PathBuf),
}

#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub input: InputSpec,
    pub ingest: IngestOptions,
    pub filter: FilterOptions,
    pub settings: Settings,
    pub store: bool,
    pub raw: bool,
}

#[derive(Debug)]
pub struct RunSummary {
    pub report: PathBuf,
    pub plots: Vec<Plot>,
    pub stats_files: Vec<PathBuf>,
    pub skipped_barcodes: Vec<(String, usize)>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Stage {
    Ingest,
    Cache,
    StatsPre,
    Filter,
    StatsPost,
    BarcodeFanOut,
    DirectPlot,
    Report,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Ingest => "ingest",
            Stage::Cache => "cache",
            Stage::StatsPre => "stats-pre",
            Stage::Filter => "filter",
            Stage::StatsPost => "stats-post",
            Stage::BarcodeFanOut => "barcode-plots",
            Stage::DirectPlot => "plots",
            Stage::Report => "report",
        }
    }
}

/// Runs ingest, optional caching, statistics, filtering, plotting and the
/// report in that order. The report is only written when every earlier stage
/// succeeded.
pub fn run<B: PlotBackend + ?Sized>(cfg: &PipelineConfig, backend: &mut B) -> Result<RunSummary> {
    let timing = timing_enabled();
    let t0 = Instant::now();

    let t = Instant::now();
    let ds = match &cfg.input {
        InputSpec::Files { kind, files } => ingest(*kind, files, &cfg.ingest)?,
        InputSpec::Snapshot(path) => {
            info!("Loading dataset from {}", path.display());
            snapshot::load(path)?
        }
    };
    ds.validate()?;
    if cfg.settings.barcoded && ds.barcode.is_none() {
        return Err(PipelineError::DataShape(
            "--barcoded requested but the input provides no barcode information".into(),
        )
        .into());
    }
    stage_done(timing, Stage::Ingest, t);

    if cfg.store || cfg.raw {
        let t = Instant::now();
        if cfg.store {
            let path = cfg.settings.prefixed("NanoPlot-data.pickle");
            snapshot::store(&ds, &path)?;
            info!("Stored dataset in {}", path.display());
        }
        if cfg.raw {
            let path = cfg.settings.outdir.join("NanoPlot-data.tsv.gz");
            snapshot::write_tsv(&ds, &path)?;
            info!("Wrote raw data to {}", path.display());
        }
        stage_done(timing, Stage::Cache, t);
    }

    let t = Instant::now();
    let mut written = Vec::new();
    let mut report_stats = Vec::new();
    let pre = compute_all(&ds, &cfg.settings, StatsStage::Pre)?;
    stage_done(timing, Stage::StatsPre, t);

    let t = Instant::now();
    let filtered = filter_and_transform(ds, &cfg.filter);
    filtered.dataset.validate()?;
    let settings = cfg
        .settings
        .clone()
        .with_lengths_pointer(filtered.lengths_pointer);
    stage_done(timing, Stage::Filter, t);

    report_stats.push(pre.barcoded.clone().unwrap_or_else(|| pre.aggregate.clone()));
    written.push(pre.aggregate);
    written.extend(pre.barcoded);
    if filtered.changed {
        let t = Instant::now();
        let post = compute_all(&filtered.dataset, &settings, StatsStage::Post)?;
        report_stats.push(post.barcoded.clone().unwrap_or_else(|| post.aggregate.clone()));
        written.push(post.aggregate);
        written.extend(post.barcoded);
        stage_done(timing, Stage::StatsPost, t);
    } else {
        info!("Filtering did not change the data; skipping post-filtering statistics");
    }

    let t = Instant::now();
    let (plots, skipped_barcodes) = if settings.barcoded {
        let outcome = barcode::run(&filtered.dataset, &settings, backend)?;
        info!(
            "Plotted {} barcode(s), skipped {}",
            outcome.included.len(),
            outcome.skipped.len()
        );
        stage_done(timing, Stage::BarcodeFanOut, t);
        (outcome.plots, outcome.skipped)
    } else {
        let plots = select(&filtered.dataset, &settings, &settings.unit(), backend)?;
        stage_done(timing, Stage::DirectPlot, t);
        (plots, Vec::new())
    };
    info!("Finished plotting, {} plots", plots.len());

    let t = Instant::now();
    let report = report::assemble(&plots, &report_stats, &settings)?;
    info!("Finished! Report written to {}", report.display());
    stage_done(timing, Stage::Report, t);
    if timing {
        eprintln!("LONGPLOT_STATS total={}", fmt_dur(t0.elapsed()));
    }

    Ok(RunSummary {
        report,
        plots,
        stats_files: written,
        skipped_barcodes,
    })
}

fn timing_enabled() -> bool {
    matches!(env::var("LONGPLOT_STATS").as_deref(), Ok("1"))
}

fn stage_done(timing: bool, stage: Stage, t: Instant) {
    if timing {
        eprintln!(
            "LONGPLOT_STATS stage={} time={}",
            stage.as_str(),
            fmt_dur(t.elapsed())
        );
    }
}

fn fmt_dur(d: Duration) -> String {
    if d.as_secs_f64() < 1.0 {
        format!("{}ms", d.as_millis())
    } else {
        format!("{:.3}s", d.as_secs_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorClass;
    use crate::core::model::ReadType;
    use crate::plot::PlotFamily;
    use crate::plot::backend::{PlotStyle, SvgBackend};
    use crate::plot::recording::RecordingBackend;
    use std::fs;
    use std::path::Path;

    fn write_fastq(dir: &Path, reads: &[(usize, char)]) -> PathBuf {
        let mut body = String::new();
        for (i, (len, q)) in reads.iter().enumerate() {
            body.push_str(&format!(
                "@read{}\n{}\n+\n{}\n",
                i,
                "ACGT".repeat(len / 4 + 1)[..*len].to_string(),
                q.to_string().repeat(*len)
            ));
        }
        let path = dir.join("reads.fastq");
        fs::write(&path, body).unwrap();
        path
    }

    fn config(dir: &Path, input: PathBuf) -> PipelineConfig {
        PipelineConfig {
            input: InputSpec::Files {
                kind: SourceKind::Fastq,
                files: vec![input],
            },
            ingest: IngestOptions {
                threads: 2,
                readtype: ReadType::OneD,
                barcoded: false,
            },
            filter: FilterOptions::default(),
            settings: Settings::new(dir.join("out")),
            store: false,
            raw: false,
        }
    }

    #[test]
    fn unchanged_data_gives_one_statistics_table() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_fastq(dir.path(), &[(120, '5'), (300, '?'), (80, '+')]);
        let cfg = config(dir.path(), input);
        fs::create_dir_all(&cfg.settings.outdir).unwrap();
        let mut backend = RecordingBackend::default();
        let summary = run(&cfg, &mut backend).unwrap();

        assert_eq!(summary.stats_files.len(), 1);
        let families: Vec<PlotFamily> = summary.plots.iter().map(|p| p.family).collect();
        assert_eq!(
            families,
            vec![PlotFamily::ReadLength, PlotFamily::LengthVsQuality]
        );
        let html = fs::read_to_string(&summary.report).unwrap();
        assert!(html.contains("Summary Statistics</a>"));
        assert!(!html.contains("prior to filtering"));
    }

    #[test]
    fn changed_data_adds_post_filtering_statistics() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_fastq(dir.path(), &[(120, '5'), (300, '?'), (80, '+')]);
        let mut cfg = config(dir.path(), input);
        cfg.filter.minqual = Some(12.0);
        cfg.store = true;
        cfg.raw = true;
        cfg.settings.prefix = "p_".into();
        fs::create_dir_all(&cfg.settings.outdir).unwrap();
        let summary = run(&cfg, &mut RecordingBackend::default()).unwrap();

        let out = &cfg.settings.outdir;
        assert_eq!(
            summary.stats_files,
            vec![
                out.join("p_NanoStats.txt"),
                out.join("p_NanoStats_post_filtering.txt")
            ]
        );
        assert!(out.join("p_NanoPlot-data.pickle").is_file());
        assert!(out.join("NanoPlot-data.tsv.gz").is_file());
        assert_eq!(summary.report, out.join("p_NanoPlot-report.html"));
        let html = fs::read_to_string(&summary.report).unwrap();
        assert!(html.contains("Summary Statistics prior to filtering"));
        assert!(html.contains("Summary Statistics after filtering"));
    }

    #[test]
    fn snapshot_input_reproduces_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_fastq(dir.path(), &[(120, '5'), (300, '?'), (80, '+')]);
        let mut cfg = config(dir.path(), input);
        cfg.store = true;
        fs::create_dir_all(&cfg.settings.outdir).unwrap();
        let first = run(&cfg, &mut RecordingBackend::default()).unwrap();
        let html_first = fs::read(&first.report).unwrap();

        cfg.input = InputSpec::Snapshot(cfg.settings.prefixed("NanoPlot-data.pickle"));
        cfg.store = false;
        let second = run(&cfg, &mut RecordingBackend::default()).unwrap();
        assert_eq!(fs::read(&second.report).unwrap(), html_first);
    }

    #[test]
    fn failed_ingest_writes_no_report() {
        let dir = tempfile::tempdir().unwrap();
        let bad = dir.path().join("bad.fastq");
        fs::write(&bad, "not a fastq record\n").unwrap();
        let cfg = config(dir.path(), bad);
        fs::create_dir_all(&cfg.settings.outdir).unwrap();
        let err = run(&cfg, &mut RecordingBackend::default()).unwrap_err();
        assert_eq!(ErrorClass::of(&err), ErrorClass::Ingest);
        assert!(!cfg.settings.prefixed("NanoPlot-report.html").exists());
    }

    #[test]
    fn barcoded_flag_without_labels_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_fastq(dir.path(), &[(120, '5')]);
        let mut cfg = config(dir.path(), input);
        cfg.settings.barcoded = true;
        fs::create_dir_all(&cfg.settings.outdir).unwrap();
        let err = run(&cfg, &mut RecordingBackend::default()).unwrap_err();
        assert_eq!(ErrorClass::of(&err), ErrorClass::DataShape);
    }

    #[test]
    fn svg_backend_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let reads: Vec<(usize, char)> = (0..60)
            .map(|i| (100 + i * 13, ['+', '5', '?'][i % 3]))
            .collect();
        let input = write_fastq(dir.path(), &reads);
        let mut cfg = config(dir.path(), input);
        cfg.settings.n50 = true;
        fs::create_dir_all(&cfg.settings.outdir).unwrap();
        let mut backend = SvgBackend::new(PlotStyle::from_settings(&cfg.settings));
        let summary = run(&cfg, &mut backend).unwrap();
        // four histograms plus dot and kde scatter plots
        assert_eq!(summary.plots.len(), 6);
        for p in &summary.plots {
            assert!(p.path.is_file(), "{}", p.path.display());
        }
        let html = fs::read_to_string(&summary.report).unwrap();
        assert!(html.contains("<svg xmlns="));
    }
}
