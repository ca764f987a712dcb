use crate::core::error::PipelineError;
use crate::core::model::Dataset;
use crate::core::settings::Settings;
use crate::plot::select::select;
use crate::plot::{Plot, PlotBackend};
use anyhow::Result;
use log::{info, warn};

/// Labels with at most this many reads get no plots.
pub const MIN_READS: usize = 5;

#[derive(Debug, Default)]
pub struct BarcodeOutcome {
    pub plots: Vec<Plot>,
    /// `(label, reads)` for labels that were plotted, first-occurrence order.
    pub included: Vec<(String, usize)>,
    pub skipped: Vec<(String, usize)>,
}

/// Plots every barcode label separately, each under its own file prefix and title.
pub fn run<B: PlotBackend + ?Sized>(
    ds: &Dataset,
    settings: &Settings,
    backend: &mut B,
) -> Result<BarcodeOutcome> {
    if ds.barcode.is_none() {
        return Err(PipelineError::DataShape(
            "barcode mode requested but the data has no barcode column".into(),
        )
        .into());
    }
    let mut outcome = BarcodeOutcome::default();
    for (label, idx) in ds.barcode_groups() {
        if idx.len() <= MIN_READS {
            warn!(
                "Found barcode {} with {} reads, ignoring it for plotting",
                label,
                idx.len()
            );
            eprintln!(
                "Found barcode {} less than {}x, ignoring...",
                label,
                MIN_READS + 1
            );
            outcome.skipped.push((label, idx.len()));
            continue;
        }
        info!("Plotting barcode {} ({} reads)", label, idx.len());
        let unit = settings.barcode_unit(&label);
        let sub = ds.subset(&idx);
        outcome.plots.extend(select(&sub, settings, &unit, backend)?);
        outcome.included.push((label, idx.len()));
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorClass;
    use crate::core::model::{Columns, ReadRecord};
    use crate::plot::recording::RecordingBackend;
    use std::sync::{Mutex, Once};

    static LINES: Mutex<Vec<String>> = Mutex::new(Vec::new());

    struct Capture;

    impl log::Log for Capture {
        fn enabled(&self, _: &log::Metadata) -> bool {
            true
        }

        fn log(&self, record: &log::Record) {
            LINES
                .lock()
                .unwrap()
                .push(format!("{} {}", record.level(), record.args()));
        }

        fn flush(&self) {}
    }

    fn captured_logs() -> &'static Mutex<Vec<String>> {
        static INIT: Once = Once::new();
        INIT.call_once(|| {
            log::set_logger(&Capture).unwrap();
            log::set_max_level(log::LevelFilter::Info);
        });
        &LINES
    }

    fn barcoded(labels: &[(&str, usize)]) -> Dataset {
        let mut ds = Dataset::with_columns(Columns {
            quals: true,
            barcode: true,
            ..Default::default()
        });
        for (label, n) in labels {
            for i in 0..*n {
                ds.push(ReadRecord {
                    length: 500 + i as u64,
                    qual: Some(9.0),
                    barcode: Some(label.to_string()),
                    ..Default::default()
                });
            }
        }
        ds
    }

    #[test]
    fn small_labels_are_skipped() {
        let ds = barcoded(&[("BC01", 3), ("BC02", 42)]);
        let settings = Settings::new("/out");
        let mut backend = RecordingBackend::default();
        let out = run(&ds, &settings, &mut backend).unwrap();
        assert_eq!(out.skipped, vec![("BC01".to_string(), 3)]);
        assert_eq!(out.included, vec![("BC02".to_string(), 42)]);
        assert!(!out.plots.is_empty());
        assert!(backend.calls.iter().all(|c| c.prefix == "BC02_"));
        assert!(out.plots.iter().all(|p| p.title.starts_with("BC02: ")));
        assert_eq!(backend.calls[0].points, 42);
    }

    #[test]
    fn skipped_label_is_logged() {
        let logs = captured_logs();
        let ds = barcoded(&[("BCSKIP7", 2), ("BC09", 30)]);
        run(&ds, &Settings::new("/out"), &mut RecordingBackend::default()).unwrap();

        let lines = logs.lock().unwrap();
        assert!(
            lines
                .iter()
                .any(|l| l.starts_with("WARN") && l.contains("BCSKIP7") && l.contains("ignoring")),
            "{:?}",
            lines
        );
        assert!(!lines.iter().any(|l| l.contains("Plotting barcode BCSKIP7")));
        assert!(lines.iter().any(|l| l.contains("Plotting barcode BC09")));
    }

    #[test]
    fn labels_partition_the_dataset() {
        let ds = barcoded(&[
            ("BC03", 6),
            ("unclassified", 5),
            ("BC01", 20),
            ("BC02", 1),
        ]);
        let mut settings = Settings::new("/out");
        settings.prefix = "x_".into();
        let mut backend = RecordingBackend::default();
        let out = run(&ds, &settings, &mut backend).unwrap();

        let included: Vec<&str> = out.included.iter().map(|(l, _)| l.as_str()).collect();
        assert_eq!(included, vec!["BC03", "BC01"]);
        let skipped: Vec<&str> = out.skipped.iter().map(|(l, _)| l.as_str()).collect();
        assert_eq!(skipped, vec!["unclassified", "BC02"]);
        let total: usize = out
            .included
            .iter()
            .chain(&out.skipped)
            .map(|(_, n)| n)
            .sum();
        assert_eq!(total, ds.len());

        let prefixes: Vec<&str> = backend.calls.iter().map(|c| c.prefix.as_str()).collect();
        assert_eq!(prefixes, vec!["x_BC03_", "x_BC03_", "x_BC01_", "x_BC01_"]);
    }

    #[test]
    fn missing_barcode_column_is_a_data_shape_error() {
        let mut ds = Dataset::with_columns(Columns::default());
        ds.push(ReadRecord {
            length: 10,
            ..Default::default()
        });
        let err = run(&ds, &Settings::new("/out"), &mut RecordingBackend::default()).unwrap_err();
        assert_eq!(ErrorClass::of(&err), ErrorClass::DataShape);
    }
}
