use clap::{ArgGroup, Parser, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "longplot",
    version,
    about = "Plotting and summary statistics for long-read sequencing data",
    group(
        ArgGroup::new("source")
            .multiple(false)
            .args([
                "fastq",
                "fasta",
                "fastq_rich",
                "fastq_minimal",
                "summary",
                "bam",
                "ubam",
                "cram",
                "pickle",
            ])
    )
)]
pub struct Cli {
    /// Number of threads for reading and decompressing input files
    #[arg(short = 't', long, default_value_t = num_cpus::get(), help_heading = "General")]
    pub threads: usize,

    /// Also write log records to the terminal
    #[arg(long, help_heading = "General")]
    pub verbose: bool,

    /// Store the extracted data in a snapshot for future plotting
    #[arg(long, help_heading = "General")]
    pub store: bool,

    /// Store the extracted data in a gzip-compressed tab separated file
    #[arg(long, help_heading = "General")]
    pub raw: bool,

    #[arg(short = 'o', long, default_value = ".", help_heading = "General")]
    pub outdir: PathBuf,

    /// Prefix for every output file
    #[arg(short = 'p', long, default_value = "", help_heading = "General")]
    pub prefix: String,

    /// Print the accepted color names and exit
    #[arg(long, help_heading = "General")]
    pub listcolors: bool,

    /// Hide reads longer than this length in length plots
    #[arg(long, help_heading = "Filtering")]
    pub maxlength: Option<u64>,

    /// Hide reads shorter than this length in length plots
    #[arg(long, help_heading = "Filtering")]
    pub minlength: Option<u64>,

    /// Hide length outliers in length plots
    #[arg(long = "drop_outliers", help_heading = "Filtering")]
    pub drop_outliers: bool,

    /// Reduce the dataset to this many randomly chosen reads
    #[arg(long, help_heading = "Filtering")]
    pub downsample: Option<usize>,

    /// Log-transform read lengths in scatter and time plots
    #[arg(long, help_heading = "Filtering")]
    pub loglength: bool,

    /// Convert quality scores to percent accuracy
    #[arg(long, help_heading = "Filtering")]
    pub percentqual: bool,

    /// Use aligned read lengths instead of sequenced lengths
    #[arg(long, help_heading = "Filtering")]
    pub alength: bool,

    /// Drop reads with an average quality at or below this value
    #[arg(long, help_heading = "Filtering")]
    pub minqual: Option<f64>,

    /// Only keep reads sequenced in the first N hours
    #[arg(long = "runtime_until", value_name = "HOURS", help_heading = "Filtering")]
    pub runtime_until: Option<f64>,

    /// Which read type to take from a sequencing summary
    #[arg(long, value_enum, default_value_t = ReadTypeArg::OneD, help_heading = "Filtering")]
    pub readtype: ReadTypeArg,

    /// Split plots and statistics by barcode
    #[arg(long, help_heading = "Filtering")]
    pub barcoded: bool,

    #[arg(short = 'c', long, default_value = "#4CB391", help_heading = "Visual")]
    pub color: String,

    #[arg(short = 'f', long, value_enum, default_value_t = FormatArg::Png, help_heading = "Visual")]
    pub format: FormatArg,

    /// Bivariate plot kinds to draw
    #[arg(
        long,
        value_enum,
        num_args = 0..,
        default_values_t = [PlotArg::Kde, PlotArg::Dot],
        help_heading = "Visual"
    )]
    pub plots: Vec<PlotArg>,

    /// Mark the read length N50 in the histograms
    #[arg(long = "N50", help_heading = "Visual")]
    pub n50: bool,

    /// Deprecated; N50 marks are off unless --N50 is given
    #[arg(long = "no-N50", help_heading = "Visual")]
    pub no_n50: bool,

    /// Title drawn above every plot
    #[arg(long, help_heading = "Visual")]
    pub title: Option<String>,

    #[arg(long = "font_scale", default_value_t = 1.0, help_heading = "Visual")]
    pub font_scale: f64,

    #[arg(long, default_value_t = 100, help_heading = "Visual")]
    pub dpi: u32,

    #[arg(long, num_args = 1.., value_name = "FILE", help_heading = "Input")]
    pub fastq: Vec<PathBuf>,

    #[arg(long, num_args = 1.., value_name = "FILE", help_heading = "Input")]
    pub fasta: Vec<PathBuf>,

    /// FASTQ with `ch=`, `start_time=` (and `barcode=`) header fields
    #[arg(long = "fastq_rich", num_args = 1.., value_name = "FILE", help_heading = "Input")]
    pub fastq_rich: Vec<PathBuf>,

    /// FASTQ with `ch=` and `start_time=` header fields, qualities ignored
    #[arg(long = "fastq_minimal", num_args = 1.., value_name = "FILE", help_heading = "Input")]
    pub fastq_minimal: Vec<PathBuf>,

    /// Sequencing summary text files
    #[arg(long, num_args = 1.., value_name = "FILE", help_heading = "Input")]
    pub summary: Vec<PathBuf>,

    #[arg(long, num_args = 1.., value_name = "FILE", help_heading = "Input")]
    pub bam: Vec<PathBuf>,

    #[arg(long, num_args = 1.., value_name = "FILE", help_heading = "Input")]
    pub ubam: Vec<PathBuf>,

    #[arg(long, num_args = 1.., value_name = "FILE", help_heading = "Input")]
    pub cram: Vec<PathBuf>,

    /// Snapshot written by a previous run with --store
    #[arg(long, value_name = "FILE", help_heading = "Input")]
    pub pickle: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum ReadTypeArg {
    #[value(name = "1D")]
    OneD,
    #[value(name = "2D")]
    TwoD,
    #[value(name = "1D2")]
    OneD2,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum FormatArg {
    Eps,
    Jpeg,
    Jpg,
    Pdf,
    Pgf,
    Png,
    Ps,
    Raw,
    Rgba,
    Svg,
    Svgz,
    Tif,
    Tiff,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum PlotArg {
    Kde,
    Hex,
    Dot,
    Pauvre,
}
