use crate::core::error::ingest_error;
use crate::core::fastq::mean_quality_phred;
use crate::core::model::{Columns, Dataset, ReadRecord};
use anyhow::Result;
use rust_htslib::bam::record::{Aux, Cigar};
use rust_htslib::bam::{self, Read, Record};
use std::path::Path;

const FLAG_UNMAPPED: u16 = 0x4;
const FLAG_SECONDARY: u16 = 0x100;
const FLAG_SUPPLEMENTARY: u16 = 0x800;

pub fn aligned_columns() -> Columns {
    Columns {
        quals: true,
        aligned_lengths: true,
        mapq: true,
        percent_identity: true,
        aligned_quals: true,
        ..Default::default()
    }
}

/// Primary mapped alignments of a coordinate-sorted BAM or CRAM file.
pub fn read_aligned(path: &Path, threads: usize) -> Result<Dataset> {
    let mut reader = bam::Reader::from_path(path)
        .map_err(|e| ingest_error(path, format!("cannot open alignment file: {}", e)))?;
    if threads > 1 {
        reader
            .set_threads(threads)
            .map_err(|e| ingest_error(path, e.to_string()))?;
    }
    let mut ds = Dataset::with_columns(aligned_columns());
    let mut record = Record::new();
    while let Some(res) = reader.read(&mut record) {
        res.map_err(|e| ingest_error(path, e.to_string()))?;
        let flags = record.flags();
        if flags & (FLAG_UNMAPPED | FLAG_SECONDARY | FLAG_SUPPLEMENTARY) != 0 {
            continue;
        }
        ds.push(aligned_record(&record));
    }
    Ok(ds)
}

/// Every primary record of an unaligned BAM.
pub fn read_unaligned(path: &Path, threads: usize) -> Result<Dataset> {
    let mut reader = bam::Reader::from_path(path)
        .map_err(|e| ingest_error(path, format!("cannot open uBAM file: {}", e)))?;
    if threads > 1 {
        reader
            .set_threads(threads)
            .map_err(|e| ingest_error(path, e.to_string()))?;
    }
    let mut ds = Dataset::with_columns(Columns {
        quals: true,
        ..Default::default()
    });
    let mut record = Record::new();
    while let Some(res) = reader.read(&mut record) {
        res.map_err(|e| ingest_error(path, e.to_string()))?;
        if record.flags() & (FLAG_SECONDARY | FLAG_SUPPLEMENTARY) != 0 {
            continue;
        }
        ds.push(ReadRecord {
            length: record.seq_len() as u64,
            qual: mean_quality_phred(record.qual()),
            ..Default::default()
        });
    }
    Ok(ds)
}

fn aligned_record(record: &Record) -> ReadRecord {
    let cigar = record.cigar();
    let mut aligned_len = 0u64;
    let mut edit_span = 0u64;
    let mut lead_clip = 0usize;
    let mut tail_clip = 0usize;
    let mut seen_match = false;
    for op in cigar.iter() {
        match *op {
            Cigar::Match(n) | Cigar::Equal(n) | Cigar::Diff(n) => {
                aligned_len += n as u64;
                edit_span += n as u64;
                seen_match = true;
            }
            Cigar::Ins(n) => {
                aligned_len += n as u64;
                edit_span += n as u64;
            }
            Cigar::Del(n) => edit_span += n as u64,
            Cigar::SoftClip(n) => {
                if seen_match {
                    tail_clip += n as usize;
                } else {
                    lead_clip += n as usize;
                }
            }
            _ => {}
        }
    }

    let qual = record.qual();
    let qend = qual.len().saturating_sub(tail_clip);
    let aligned_qual = if lead_clip < qend {
        mean_quality_phred(&qual[lead_clip..qend])
    } else {
        None
    };
    let nm = match record.aux(b"NM") {
        Ok(Aux::U8(v)) => Some(v as u64),
        Ok(Aux::U16(v)) => Some(v as u64),
        Ok(Aux::U32(v)) => Some(v as u64),
        Ok(Aux::I8(v)) => Some(v.max(0) as u64),
        Ok(Aux::I16(v)) => Some(v.max(0) as u64),
        Ok(Aux::I32(v)) => Some(v.max(0) as u64),
        _ => None,
    };
    let percent_identity = match nm {
        Some(nm) if edit_span > 0 => Some((1.0 - nm as f64 / edit_span as f64) * 100.0),
        _ => None,
    };

    ReadRecord {
        length: record.seq_len() as u64,
        qual: mean_quality_phred(qual),
        aligned_length: Some(aligned_len),
        mapq: Some(record.mapq()),
        percent_identity,
        aligned_qual,
        ..Default::default()
    }
}
