use crate::core::error::ingest_error;
use crate::core::io;
use crate::core::model::{Columns, Dataset, ReadRecord, ReadType};
use anyhow::Result;
use std::path::Path;

struct Layout {
    length: usize,
    qual: Option<usize>,
    channel: Option<usize>,
    start_time: Option<usize>,
    barcode: Option<usize>,
}

fn column_names(readtype: ReadType) -> (&'static str, &'static str) {
    match readtype {
        ReadType::OneD => ("sequence_length_template", "mean_qscore_template"),
        ReadType::TwoD => ("sequence_length_2d", "mean_qscore_2d"),
        ReadType::OneD2 => ("sequence_length_1d2", "mean_qscore_1d2"),
    }
}

fn layout(path: &Path, header: &[&str], readtype: ReadType, barcoded: bool) -> Result<Layout> {
    let find = |name: &str| header.iter().position(|h| *h == name);
    let (len_col, qual_col) = column_names(readtype);
    let length = find(len_col).ok_or_else(|| {
        ingest_error(path, format!("summary file lacks column {}", len_col))
    })?;
    let barcode = if barcoded {
        let idx = find("barcode_arrangement").ok_or_else(|| {
            ingest_error(
                path,
                "barcode splitting requested but summary has no barcode_arrangement column",
            )
        })?;
        Some(idx)
    } else {
        None
    };
    Ok(Layout {
        length,
        qual: find(qual_col),
        channel: find("channel"),
        start_time: find("start_time"),
        barcode,
    })
}

/// Parses an albacore/guppy sequencing summary. The first line is the header;
/// `start_time` is already seconds since the start of the run.
pub fn read_summary(
    path: &Path,
    readtype: ReadType,
    barcoded: bool,
    threads: usize,
) -> Result<Dataset> {
    let mut cols: Option<Layout> = None;
    let mut ds = Dataset::default();
    let mut line_no = 0u64;

    io::for_each_line(path, threads, |line| {
        line_no += 1;
        if line.is_empty() {
            return Ok(());
        }
        let text = std::str::from_utf8(line)
            .map_err(|_| ingest_error(path, format!("line {}: not valid UTF-8", line_no)))?;
        let fields: Vec<&str> = text.split('\t').collect();
        let Some(l) = cols.as_ref() else {
            let l = layout(path, &fields, readtype, barcoded)?;
            ds = Dataset::with_columns(Columns {
                quals: l.qual.is_some(),
                channel_ids: l.channel.is_some(),
                start_time: l.start_time.is_some(),
                barcode: l.barcode.is_some(),
                ..Default::default()
            });
            cols = Some(l);
            return Ok(());
        };
        let get = |idx: usize| fields.get(idx).copied().unwrap_or("");
        let length = get(l.length).parse::<u64>().map_err(|_| {
            ingest_error(
                path,
                format!("line {}: invalid read length '{}'", line_no, get(l.length)),
            )
        })?;
        ds.push(ReadRecord {
            length,
            qual: l.qual.and_then(|i| get(i).parse().ok()),
            channel: l.channel.and_then(|i| get(i).parse().ok()),
            start_time: l.start_time.and_then(|i| get(i).parse().ok()),
            barcode: l.barcode.map(|i| get(i).to_string()),
            ..Default::default()
        });
        Ok(())
    })?;

    if cols.is_none() {
        return Err(ingest_error(path, "summary file is empty").into());
    }
    Ok(ds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::{ErrorClass, PipelineError};

    const SUMMARY: &str = "read_id\tchannel\tstart_time\tsequence_length_template\tmean_qscore_template\tsequence_length_2d\tbarcode_arrangement\n\
r1\t12\t3.5\t1500\t9.5\t1400\tbarcode01\n\
r2\t40\t7200.0\t800\t11.2\t\tbarcode02\n";

    fn write(dir: &tempfile::TempDir) -> std::path::PathBuf {
        let path = dir.path().join("sequencing_summary.txt");
        std::fs::write(&path, SUMMARY).unwrap();
        path
    }

    #[test]
    fn template_columns_are_read() {
        let dir = tempfile::tempdir().unwrap();
        let ds = read_summary(&write(&dir), ReadType::OneD, false, 1).unwrap();
        assert_eq!(ds.lengths, vec![1500, 800]);
        assert_eq!(ds.quals.as_deref(), Some(&[9.5, 11.2][..]));
        assert_eq!(ds.channel_ids.as_deref(), Some(&[12, 40][..]));
        assert_eq!(ds.start_time.as_deref(), Some(&[3.5, 7200.0][..]));
        assert!(ds.barcode.is_none());
    }

    #[test]
    fn barcodes_come_from_the_arrangement_column() {
        let dir = tempfile::tempdir().unwrap();
        let ds = read_summary(&write(&dir), ReadType::OneD, true, 1).unwrap();
        assert_eq!(ds.barcode.unwrap(), vec!["barcode01", "barcode02"]);
    }

    #[test]
    fn readtype_selects_length_column() {
        let dir = tempfile::tempdir().unwrap();
        // r2 has an empty 2D length, which is malformed for that read type.
        let err = read_summary(&write(&dir), ReadType::TwoD, false, 1).unwrap_err();
        assert_eq!(ErrorClass::of(&err), ErrorClass::Ingest);

        let err = read_summary(&write(&dir), ReadType::OneD2, false, 1).unwrap_err();
        match err.downcast_ref::<PipelineError>() {
            Some(PipelineError::Ingest { reason, .. }) => {
                assert!(reason.contains("sequence_length_1d2"))
            }
            other => panic!("unexpected error {:?}", other),
        }
    }
}
