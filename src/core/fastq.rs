use crate::core::error::ingest_error;
use crate::core::io;
use crate::core::model::{Columns, Dataset, ReadRecord};
use crate::core::time::parse_iso8601;
use aho_corasick::{AhoCorasick, AhoCorasickBuilder};
use anyhow::Result;
use std::path::Path;
use std::sync::OnceLock;

const PHRED_OFFSET: u8 = 33;

const HEADER_KEYS: [&str; 3] = ["ch=", "start_time=", "barcode="];
const KEY_CHANNEL: usize = 0;
const KEY_START: usize = 1;
const KEY_BARCODE: usize = 2;

/// Which fields to pull out of a FASTQ file.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FastqFlavor {
    /// Length and mean quality.
    Plain,
    /// Length, quality and the MinKNOW header fields.
    Rich,
    /// Length plus channel and start time, no quality parsing.
    Minimal,
}

fn header_matcher() -> &'static AhoCorasick {
    static AC: OnceLock<AhoCorasick> = OnceLock::new();
    AC.get_or_init(|| {
        AhoCorasickBuilder::new()
            .build(HEADER_KEYS)
            .expect("header key automaton")
    })
}

fn error_prob_table() -> &'static [f64; 256] {
    static TABLE: OnceLock<[f64; 256]> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut t = [0.0; 256];
        for (b, p) in t.iter_mut().enumerate() {
            let q = (b as i32 - PHRED_OFFSET as i32).max(0) as f64;
            *p = 10f64.powf(-q / 10.0);
        }
        t
    })
}

/// Mean basecall quality, averaged in error-probability space.
pub fn mean_quality(qual: &[u8]) -> Option<f64> {
    if qual.is_empty() {
        return None;
    }
    let table = error_prob_table();
    let sum: f64 = qual.iter().map(|&b| table[b as usize]).sum();
    Some(-10.0 * (sum / qual.len() as f64).log10())
}

/// Same as [`mean_quality`] for already decoded phred scores.
pub fn mean_quality_phred(qual: &[u8]) -> Option<f64> {
    if qual.is_empty() {
        return None;
    }
    let sum: f64 = qual
        .iter()
        .map(|&q| 10f64.powf(-(q as f64) / 10.0))
        .sum();
    Some(-10.0 * (sum / qual.len() as f64).log10())
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct HeaderFields {
    pub channel: Option<u32>,
    pub start_time: Option<f64>,
    pub barcode: Option<String>,
}

/// Extracts `ch=`, `start_time=` and `barcode=` tokens from a read header.
/// Keys only count at the start of a whitespace separated token.
pub fn parse_header(header: &[u8]) -> HeaderFields {
    let mut fields = HeaderFields::default();
    for mat in header_matcher().find_iter(header) {
        if mat.start() > 0 && !header[mat.start() - 1].is_ascii_whitespace() {
            continue;
        }
        let rest = &header[mat.end()..];
        let end = rest
            .iter()
            .position(|b| b.is_ascii_whitespace())
            .unwrap_or(rest.len());
        let Ok(value) = std::str::from_utf8(&rest[..end]) else {
            continue;
        };
        match mat.pattern().as_usize() {
            KEY_CHANNEL => fields.channel = value.parse().ok(),
            KEY_START => fields.start_time = parse_iso8601(value),
            KEY_BARCODE => fields.barcode = Some(value.to_string()),
            _ => {}
        }
    }
    fields
}

pub fn fastq_columns(flavor: FastqFlavor, barcoded: bool) -> Columns {
    match flavor {
        FastqFlavor::Plain => Columns {
            quals: true,
            ..Default::default()
        },
        FastqFlavor::Rich => Columns {
            quals: true,
            channel_ids: true,
            start_time: true,
            barcode: barcoded,
            ..Default::default()
        },
        FastqFlavor::Minimal => Columns {
            channel_ids: true,
            start_time: true,
            barcode: barcoded,
            ..Default::default()
        },
    }
}

/// Parses a four-line-record FASTQ file. Start times are left as absolute
/// unix seconds; the caller rebases them once all files are merged.
pub fn read_fastq(
    path: &Path,
    flavor: FastqFlavor,
    barcoded: bool,
    threads: usize,
) -> Result<Dataset> {
    let mut ds = Dataset::with_columns(fastq_columns(flavor, barcoded));
    let mut line_no = 0u64;
    let mut pending = ReadRecord::default();
    let mut seq_len = 0usize;

    io::for_each_line(path, threads, |line| {
        let slot = line_no % 4;
        line_no += 1;
        match slot {
            0 => {
                if line.is_empty() {
                    // Tolerate trailing blank lines.
                    line_no -= 1;
                    return Ok(());
                }
                if line[0] != b'@' {
                    return Err(ingest_error(
                        path,
                        format!("line {}: expected '@' header", line_no),
                    )
                    .into());
                }
                pending = ReadRecord::default();
                if flavor != FastqFlavor::Plain {
                    let fields = parse_header(&line[1..]);
                    pending.channel = fields.channel;
                    pending.start_time = fields.start_time;
                    pending.barcode = fields.barcode;
                }
            }
            1 => {
                seq_len = line.len();
                pending.length = seq_len as u64;
            }
            2 => {
                if line.first() != Some(&b'+') {
                    return Err(ingest_error(
                        path,
                        format!("line {}: expected '+' separator", line_no),
                    )
                    .into());
                }
            }
            _ => {
                if line.len() != seq_len {
                    return Err(ingest_error(
                        path,
                        format!(
                            "line {}: quality length {} does not match sequence length {}",
                            line_no,
                            line.len(),
                            seq_len
                        ),
                    )
                    .into());
                }
                if flavor != FastqFlavor::Minimal {
                    pending.qual = mean_quality(line);
                }
                ds.push(std::mem::take(&mut pending));
            }
        }
        Ok(())
    })?;

    if line_no % 4 != 0 {
        return Err(ingest_error(path, "truncated FASTQ record at end of file").into());
    }
    Ok(ds)
}

/// Parses a (possibly multi-line) FASTA file into read lengths.
pub fn read_fasta(path: &Path, threads: usize) -> Result<Dataset> {
    let mut ds = Dataset::with_columns(Columns::default());
    let mut current: Option<u64> = None;
    io::for_each_line(path, threads, |line| {
        if line.first() == Some(&b'>') {
            if let Some(len) = current.take() {
                ds.push(ReadRecord {
                    length: len,
                    ..Default::default()
                });
            }
            current = Some(0);
        } else if !line.is_empty() {
            match current.as_mut() {
                Some(len) => *len += line.len() as u64,
                None => {
                    return Err(ingest_error(path, "sequence data before first '>' header").into());
                }
            }
        }
        Ok(())
    })?;
    if let Some(len) = current {
        ds.push(ReadRecord {
            length: len,
            ..Default::default()
        });
    }
    Ok(ds)
}
