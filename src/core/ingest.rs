use crate::core::error::ingest_error;
use crate::core::fastq::{self, FastqFlavor};
use crate::core::model::{Dataset, ReadType, SourceKind};
use crate::core::summary;
use anyhow::{Context, Result, anyhow};
use crossbeam_channel as channel;
use log::{info, warn};
use std::path::{Path, PathBuf};
use std::thread;

#[derive(Clone, Copy, Debug)]
pub struct IngestOptions {
    pub threads: usize,
    pub readtype: ReadType,
    pub barcoded: bool,
}

/// Reads every input file of one source kind and concatenates the results in
/// input order. Files are parsed concurrently, `threads` workers at most;
/// leftover threads go to parallel gzip decompression.
pub fn ingest(kind: SourceKind, files: &[PathBuf], opts: &IngestOptions) -> Result<Dataset> {
    if files.is_empty() {
        return Err(anyhow!("no input files given for source {}", kind.as_str()));
    }
    let threads = opts.threads.max(1);
    let workers = threads.min(files.len());
    let per_file_threads = (threads / workers).max(1);
    info!(
        "Reading {} {} file(s) with {} worker(s)",
        files.len(),
        kind.as_str(),
        workers
    );

    let (job_tx, job_rx) = channel::bounded::<(usize, PathBuf)>(files.len());
    let (result_tx, result_rx) = channel::unbounded::<(usize, Result<Dataset>)>();
    for (i, f) in files.iter().enumerate() {
        job_tx
            .send((i, f.clone()))
            .context("failed to queue input file")?;
    }
    drop(job_tx);

    let mut handles = Vec::with_capacity(workers);
    for _ in 0..workers {
        let rx = job_rx.clone();
        let tx = result_tx.clone();
        let opts = *opts;
        handles.push(thread::spawn(move || {
            for (index, path) in rx.iter() {
                let res = read_one(kind, &path, &opts, per_file_threads)
                    .with_context(|| format!("failed to ingest {}", path.display()));
                let failed = res.is_err();
                if tx.send((index, res)).is_err() || failed {
                    break;
                }
            }
        }));
    }
    drop(result_tx);

    let mut parts: Vec<Option<Dataset>> = vec![None; files.len()];
    for (index, res) in result_rx.iter() {
        let ds = res?;
        if index >= parts.len() {
            return Err(anyhow!("invalid file index {}", index));
        }
        parts[index] = Some(ds);
    }
    for handle in handles {
        if handle.join().is_err() {
            return Err(anyhow!("ingestion worker panicked"));
        }
    }

    let mut merged: Option<Dataset> = None;
    for (i, part) in parts.into_iter().enumerate() {
        let part = part.ok_or_else(|| anyhow!("no result for input {}", files[i].display()))?;
        match merged.as_mut() {
            None => merged = Some(part),
            Some(acc) => {
                let before = acc.columns();
                acc.append(part);
                if acc.columns() != before {
                    warn!(
                        "{} lacks columns present in earlier files; keeping only shared columns",
                        files[i].display()
                    );
                }
            }
        }
    }
    let mut ds = merged.ok_or_else(|| anyhow!("no input files were read"))?;

    if matches!(kind, SourceKind::FastqRich | SourceKind::FastqMinimal) {
        rebase_start_times(&mut ds);
    }
    info!(
        "Collected {} reads with columns: {}",
        ds.len(),
        ds.columns().names().join(", ")
    );
    Ok(ds)
}

fn read_one(
    kind: SourceKind,
    path: &Path,
    opts: &IngestOptions,
    threads: usize,
) -> Result<Dataset> {
    if !path.is_file() {
        return Err(ingest_error(path, "file not found").into());
    }
    match kind {
        SourceKind::Fastq => fastq::read_fastq(path, FastqFlavor::Plain, false, threads),
        SourceKind::FastqRich => {
            fastq::read_fastq(path, FastqFlavor::Rich, opts.barcoded, threads)
        }
        SourceKind::FastqMinimal => {
            fastq::read_fastq(path, FastqFlavor::Minimal, opts.barcoded, threads)
        }
        SourceKind::Fasta => fastq::read_fasta(path, threads),
        SourceKind::Summary => summary::read_summary(path, opts.readtype, opts.barcoded, threads),
        SourceKind::Bam | SourceKind::Cram | SourceKind::Ubam => read_alignments(kind, path, threads),
    }
}

#[cfg(feature = "hts")]
fn read_alignments(kind: SourceKind, path: &Path, threads: usize) -> Result<Dataset> {
    match kind {
        SourceKind::Ubam => crate::core::bam::read_unaligned(path, threads),
        _ => crate::core::bam::read_aligned(path, threads),
    }
}

#[cfg(not(feature = "hts"))]
fn read_alignments(kind: SourceKind, path: &Path, _threads: usize) -> Result<Dataset> {
    Err(ingest_error(
        path,
        format!(
            "{} input requires a build with the `hts` feature enabled",
            kind.as_str()
        ),
    )
    .into())
}

/// Turns absolute timestamps into seconds since the earliest read.
fn rebase_start_times(ds: &mut Dataset) {
    let Some(times) = ds.start_time.as_mut() else {
        return;
    };
    let t0 = times
        .iter()
        .copied()
        .filter(|t| t.is_finite())
        .fold(f64::INFINITY, f64::min);
    if !t0.is_finite() {
        warn!("No read carried a parseable start_time");
        return;
    }
    for t in times.iter_mut() {
        *t -= t0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorClass;

    fn opts(threads: usize) -> IngestOptions {
        IngestOptions {
            threads,
            readtype: ReadType::OneD,
            barcoded: false,
        }
    }

    fn fastq(dir: &tempfile::TempDir, name: &str, lens: &[usize]) -> PathBuf {
        let mut body = String::new();
        for (i, &l) in lens.iter().enumerate() {
            body.push_str(&format!(
                "@r{} ch={} start_time=2019-01-01T0{}:00:00Z\n{}\n+\n{}\n",
                i,
                i + 1,
                i,
                "A".repeat(l),
                "5".repeat(l)
            ));
        }
        let path = dir.path().join(name);
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn files_are_merged_in_input_order() {
        let dir = tempfile::tempdir().unwrap();
        let files = vec![
            fastq(&dir, "a.fq", &[10, 20]),
            fastq(&dir, "b.fq", &[30]),
            fastq(&dir, "c.fq", &[40, 50, 60]),
        ];
        for threads in [1, 4] {
            let ds = ingest(SourceKind::Fastq, &files, &opts(threads)).unwrap();
            assert_eq!(ds.lengths, vec![10, 20, 30, 40, 50, 60]);
            assert!(ds.validate().is_ok());
        }
    }

    #[test]
    fn rich_start_times_are_rebased() {
        let dir = tempfile::tempdir().unwrap();
        let files = vec![fastq(&dir, "a.fq", &[10, 20, 30])];
        let ds = ingest(SourceKind::FastqRich, &files, &opts(1)).unwrap();
        assert_eq!(ds.start_time.unwrap(), vec![0.0, 3600.0, 7200.0]);
        assert_eq!(ds.channel_ids.unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn missing_file_is_an_ingest_error() {
        let err = ingest(
            SourceKind::Fastq,
            &[PathBuf::from("/nonexistent/reads.fq")],
            &opts(2),
        )
        .unwrap_err();
        assert_eq!(ErrorClass::of(&err), ErrorClass::Ingest);
    }

    #[cfg(not(feature = "hts"))]
    #[test]
    fn alignment_sources_need_the_hts_feature() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.bam");
        std::fs::write(&path, b"BAM").unwrap();
        let err = ingest(SourceKind::Bam, &[path], &opts(1)).unwrap_err();
        assert_eq!(ErrorClass::of(&err), ErrorClass::Ingest);
    }
}
