#[cfg(feature = "hts")]
pub mod bam;
pub mod error;
pub mod fastq;
pub mod filter;
pub mod ingest;
pub mod io;
pub mod model;
pub mod settings;
pub mod snapshot;
pub mod stats;
pub mod summary;
pub mod time;
