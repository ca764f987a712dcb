use crate::core::error::ingest_error;
use crate::core::model::Dataset;
use anyhow::{Context, Result};
use flate2::Compression;
use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

const SNAPSHOT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    dataset: Dataset,
}

pub fn store(ds: &Dataset, path: &Path) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let snapshot = Snapshot {
        version: SNAPSHOT_VERSION,
        dataset: ds.clone(),
    };
    let mut w = BufWriter::new(file);
    bincode::serialize_into(&mut w, &snapshot)
        .with_context(|| format!("failed to serialize dataset to {}", path.display()))?;
    w.flush()?;
    Ok(())
}

pub fn load(path: &Path) -> Result<Dataset> {
    let file = File::open(path).map_err(|e| ingest_error(path, e.to_string()))?;
    let snapshot: Snapshot = bincode::deserialize_from(BufReader::new(file))
        .map_err(|e| ingest_error(path, format!("not a valid data snapshot: {}", e)))?;
    if snapshot.version != SNAPSHOT_VERSION {
        return Err(ingest_error(
            path,
            format!(
                "snapshot version {} is not supported (expected {})",
                snapshot.version, SNAPSHOT_VERSION
            ),
        )
        .into());
    }
    Ok(snapshot.dataset)
}

/// Gzip-compressed tab separated export: header plus every present column.
pub fn write_tsv(ds: &Dataset, path: &Path) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut w = BufWriter::new(GzEncoder::new(file, Compression::default()));
    writeln!(w, "{}", ds.columns().names().join("\t"))?;
    for i in 0..ds.len() {
        write!(w, "{}", ds.lengths[i])?;
        if let Some(v) = &ds.quals {
            write!(w, "\t{}", v[i])?;
        }
        if let Some(v) = &ds.channel_ids {
            write!(w, "\t{}", v[i])?;
        }
        if let Some(v) = &ds.start_time {
            write!(w, "\t{}", v[i])?;
        }
        if let Some(v) = &ds.aligned_lengths {
            write!(w, "\t{}", v[i])?;
        }
        if let Some(v) = &ds.mapq {
            write!(w, "\t{}", v[i])?;
        }
        if let Some(v) = &ds.percent_identity {
            write!(w, "\t{}", v[i])?;
        }
        if let Some(v) = &ds.aligned_quals {
            write!(w, "\t{}", v[i])?;
        }
        if let Some(v) = &ds.barcode {
            write!(w, "\t{}", v[i])?;
        }
        writeln!(w)?;
    }
    let gz = w
        .into_inner()
        .map_err(|e| anyhow::anyhow!("failed to flush {}: {}", path.display(), e.error()))?;
    gz.finish()
        .with_context(|| format!("failed to finish {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorClass;
    use crate::core::model::{Columns, ReadRecord};
    use flate2::read::GzDecoder;
    use std::io::Read;

    fn dataset() -> Dataset {
        let mut ds = Dataset::with_columns(Columns {
            quals: true,
            barcode: true,
            ..Default::default()
        });
        ds.push(ReadRecord {
            length: 1200,
            qual: Some(9.5),
            barcode: Some("BC01".into()),
            ..Default::default()
        });
        ds.push(ReadRecord {
            length: 800,
            qual: Some(12.0),
            barcode: Some("BC02".into()),
            ..Default::default()
        });
        ds
    }

    #[test]
    fn snapshot_restores_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("NanoPlot-data.pickle");
        store(&dataset(), &path).unwrap();
        let back = load(&path).unwrap();
        assert_eq!(back.lengths, vec![1200, 800]);
        assert_eq!(back.columns(), dataset().columns());
        assert_eq!(back.barcode.unwrap(), vec!["BC01", "BC02"]);
    }

    #[test]
    fn garbage_snapshot_is_an_ingest_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("junk.pickle");
        std::fs::write(&path, b"\x80\x04not bincode").unwrap();
        let err = load(&path).unwrap_err();
        assert_eq!(ErrorClass::of(&err), ErrorClass::Ingest);
    }

    #[test]
    fn tsv_export_has_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("NanoPlot-data.tsv.gz");
        write_tsv(&dataset(), &path).unwrap();
        let mut text = String::new();
        GzDecoder::new(File::open(&path).unwrap())
            .read_to_string(&mut text)
            .unwrap();
        assert_eq!(text, "lengths\tquals\tbarcode\n1200\t9.5\tBC01\n800\t12\tBC02\n");
    }
}
