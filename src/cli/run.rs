use crate::cli::args::{Cli, FormatArg, PlotArg, ReadTypeArg};
use crate::core::error::{ErrorClass, PipelineError};
use crate::core::filter::FilterOptions;
use crate::core::ingest::IngestOptions;
use crate::core::model::{ReadType, SourceKind};
use crate::core::settings::{PlotFormat, PlotKinds, Settings};
use crate::core::time;
use crate::pipeline::{self, InputSpec, PipelineConfig};
use crate::plot::backend::{PlotStyle, SvgBackend};
use crate::plot::color;
use anyhow::{Context, Result};
use chrono::Local;
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use log::{error, info, warn};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

pub fn entry() -> Result<()> {
    let cli = Cli::parse();
    match launch(&cli) {
        Ok(res) => res,
        Err(usage) => usage.exit(),
    }
}

/// Validates the options, then runs. Usage errors come back in the outer
/// `Err` before the output directory or the log file is created; the inner
/// result is the outcome of the run itself.
pub fn launch(cli: &Cli) -> std::result::Result<Result<()>, clap::Error> {
    if cli.listcolors {
        for name in color::color_names() {
            println!("{}", name);
        }
        return Ok(Ok(()));
    }
    if let Some((kind, msg)) = usage_problem(cli) {
        return Err(Cli::command().error(kind, msg));
    }
    Ok(execute(cli))
}

fn execute(cli: &Cli) -> Result<()> {
    fs::create_dir_all(&cli.outdir)
        .with_context(|| format!("failed to create output dir {}", cli.outdir.display()))?;
    let log_path = cli.outdir.join(format!(
        "{}NanoPlot_{}.log",
        cli.prefix,
        time::file_stamp(Local::now().naive_local())
    ));
    init_logging(&log_path, cli.verbose)?;
    info!(
        "longplot {} started with arguments {:?}",
        env!("CARGO_PKG_VERSION"),
        std::env::args().skip(1).collect::<Vec<_>>()
    );

    let res = build_config(cli).and_then(|cfg| {
        let mut backend = SvgBackend::new(PlotStyle::from_settings(&cfg.settings));
        pipeline::run(&cfg, &mut backend)
    });
    match res {
        Ok(summary) => {
            info!(
                "Wrote {} plots, {} statistics file(s) and {}",
                summary.plots.len(),
                summary.stats_files.len(),
                summary.report.display()
            );
            if !summary.skipped_barcodes.is_empty() {
                info!(
                    "{} barcode(s) had too few reads to plot",
                    summary.skipped_barcodes.len()
                );
            }
            Ok(())
        }
        Err(e) => {
            let class = ErrorClass::of(&e);
            error!("{} error: {:#}", class.as_str(), e);
            eprintln!("\n\n\nIf you read this then longplot {} has crashed :-(", env!("CARGO_PKG_VERSION"));
            eprintln!("Please try updating longplot and see if that helps...\n");
            eprintln!("If not, please report this issue and include the log file:");
            eprintln!("{}", log_path.display());
            eprintln!("Thanks!\n\n\n");
            Err(e)
        }
    }
}

/// Option combinations clap cannot express on its own.
fn usage_problem(cli: &Cli) -> Option<(ErrorKind, String)> {
    let Some(input) = source(cli) else {
        return Some((
            ErrorKind::MissingRequiredArgument,
            "no input given: use one of --fastq, --fasta, --fastq_rich, --fastq_minimal, \
             --summary, --bam, --ubam, --cram or --pickle"
                .into(),
        ));
    };
    if cli.threads == 0 {
        return Some((ErrorKind::ValueValidation, "--threads must be >= 1".into()));
    }
    if let (Some(min), Some(max)) = (cli.minlength, cli.maxlength)
        && min > max
    {
        return Some((
            ErrorKind::ArgumentConflict,
            format!("--minlength {} is larger than --maxlength {}", min, max),
        ));
    }
    if cli.downsample == Some(0) {
        return Some((ErrorKind::ValueValidation, "--downsample must be >= 1".into()));
    }
    if cli.barcoded && matches!(&input, InputSpec::Files { kind, .. } if !supports_barcodes(*kind)) {
        return Some((
            ErrorKind::ArgumentConflict,
            "--barcoded requires --fastq_rich, --fastq_minimal, --summary or --pickle input".into(),
        ));
    }
    None
}

/// Translates parsed arguments into the immutable pipeline configuration.
pub fn build_config(cli: &Cli) -> Result<PipelineConfig> {
    if let Some((_, msg)) = usage_problem(cli) {
        return Err(PipelineError::Config(msg).into());
    }
    let input = source(cli).ok_or_else(|| PipelineError::Config("no input given".into()))?;
    if cli.no_n50 {
        warn!("--no-N50 is deprecated: N50 marks are only drawn with --N50");
        eprintln!("--no-N50 is deprecated: N50 marks are only drawn with --N50");
    }

    let mut settings = Settings::new(&cli.outdir);
    settings.prefix = cli.prefix.clone();
    settings.format = plot_format(cli.format);
    settings.color = color::check_valid_color(&cli.color);
    settings.kinds = plot_kinds(&cli.plots);
    settings.n50 = cli.n50 && !cli.no_n50;
    settings.log_length = cli.loglength;
    settings.font_scale = cli.font_scale;
    settings.dpi = cli.dpi;
    settings.title = cli.title.clone();
    settings.barcoded = cli.barcoded;

    Ok(PipelineConfig {
        input,
        ingest: IngestOptions {
            threads: cli.threads,
            readtype: match cli.readtype {
                ReadTypeArg::OneD => ReadType::OneD,
                ReadTypeArg::TwoD => ReadType::TwoD,
                ReadTypeArg::OneD2 => ReadType::OneD2,
            },
            barcoded: cli.barcoded,
        },
        filter: FilterOptions {
            maxlength: cli.maxlength,
            minlength: cli.minlength,
            drop_outliers: cli.drop_outliers,
            downsample: cli.downsample,
            percentqual: cli.percentqual,
            alength: cli.alength,
            minqual: cli.minqual,
            runtime_until: cli.runtime_until,
        },
        settings,
        store: cli.store,
        raw: cli.raw,
    })
}

fn source(cli: &Cli) -> Option<InputSpec> {
    if let Some(path) = &cli.pickle {
        return Some(InputSpec::Snapshot(path.clone()));
    }
    let candidates: [(SourceKind, &Vec<PathBuf>); 8] = [
        (SourceKind::Fastq, &cli.fastq),
        (SourceKind::Fasta, &cli.fasta),
        (SourceKind::FastqRich, &cli.fastq_rich),
        (SourceKind::FastqMinimal, &cli.fastq_minimal),
        (SourceKind::Summary, &cli.summary),
        (SourceKind::Bam, &cli.bam),
        (SourceKind::Ubam, &cli.ubam),
        (SourceKind::Cram, &cli.cram),
    ];
    candidates
        .into_iter()
        .find(|(_, files)| !files.is_empty())
        .map(|(kind, files)| InputSpec::Files {
            kind,
            files: files.clone(),
        })
}

fn supports_barcodes(kind: SourceKind) -> bool {
    matches!(
        kind,
        SourceKind::FastqRich | SourceKind::FastqMinimal | SourceKind::Summary
    )
}

fn plot_format(format: FormatArg) -> PlotFormat {
    match format {
        FormatArg::Svg => PlotFormat::Svg,
        FormatArg::Svgz => PlotFormat::Svgz,
        FormatArg::Pdf => PlotFormat::Pdf,
        FormatArg::Png => PlotFormat::Png,
        FormatArg::Jpeg => PlotFormat::Jpeg,
        FormatArg::Jpg => PlotFormat::Jpg,
        FormatArg::Tiff => PlotFormat::Tiff,
        FormatArg::Tif => PlotFormat::Tif,
        FormatArg::Raw => PlotFormat::Raw,
        FormatArg::Rgba => PlotFormat::Rgba,
        FormatArg::Eps | FormatArg::Ps | FormatArg::Pgf => {
            warn!(
                "Plot format {:?} is not supported, writing svg instead.",
                format
            );
            PlotFormat::Svg
        }
    }
}

fn plot_kinds(plots: &[PlotArg]) -> PlotKinds {
    let mut kinds = PlotKinds::default();
    for p in plots {
        match p {
            PlotArg::Kde => kinds.kde = true,
            PlotArg::Hex => kinds.hex = true,
            PlotArg::Dot => kinds.dot = true,
            PlotArg::Pauvre => kinds.pauvre = true,
        }
    }
    kinds
}

/// Log file always, stderr as well with `--verbose`.
struct Tee {
    file: File,
    echo: bool,
}

impl Write for Tee {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write_all(buf)?;
        if self.echo {
            io::stderr().write_all(buf)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()?;
        if self.echo {
            io::stderr().flush()?;
        }
        Ok(())
    }
}

fn init_logging(path: &Path, verbose: bool) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("failed to create log file {}", path.display()))?;
    let mut builder = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    builder.write_style(env_logger::WriteStyle::Never);
    builder.format(|buf, record| {
        writeln!(
            buf,
            "{} {} {}",
            buf.timestamp_seconds(),
            record.level(),
            record.args()
        )
    });
    builder.target(env_logger::Target::Pipe(Box::new(Tee {
        file,
        echo: verbose,
    })));
    builder
        .try_init()
        .context("failed to initialize logging")?;
    Ok(())
}
