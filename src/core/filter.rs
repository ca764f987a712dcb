use crate::core::model::{Dataset, LengthColumn};
use crate::core::stats;
use log::{info, warn};
use rand::SeedableRng;
// StdRng output may change between rand releases
use rand_chacha::ChaCha20Rng;

const DOWNSAMPLE_SEED: u64 = 0x5EED_1234;

#[derive(Clone, Debug, Default)]
pub struct FilterOptions {
    pub maxlength: Option<u64>,
    pub minlength: Option<u64>,
    pub drop_outliers: bool,
    pub downsample: Option<usize>,
    pub percentqual: bool,
    pub alength: bool,
    pub minqual: Option<f64>,
    pub runtime_until: Option<f64>,
}

#[derive(Debug)]
pub struct Filtered {
    pub dataset: Dataset,
    /// True when rows were removed, i.e. post-filter statistics differ.
    pub changed: bool,
    pub lengths_pointer: LengthColumn,
}

/// Applies the length/quality/runtime filters and downsampling.
///
/// Length limits and outlier removal only clear `length_filter` (the rows stay
/// for channel and time plots); quality, runtime and downsampling drop rows.
pub fn filter_and_transform(mut ds: Dataset, opts: &FilterOptions) -> Filtered {
    ds.length_filter = vec![true; ds.len()];
    let mut changed = false;

    let lengths_pointer = if opts.alength && ds.aligned_lengths.is_some() {
        LengthColumn::Aligned
    } else {
        if opts.alength {
            warn!("--alength requested but the data has no aligned lengths; using sequenced lengths");
        }
        LengthColumn::Sequenced
    };
    info!("Using the {} column for length plots.", lengths_pointer.as_str());

    if opts.drop_outliers {
        let before = passing(&ds);
        let lengths: Vec<f64> = ds
            .length_column(lengths_pointer)
            .iter()
            .map(|&l| l as f64)
            .collect();
        let cutoff = stats::median(&lengths) + 3.0 * stats::stdev_population(&lengths);
        flag(&mut ds, lengths_pointer, |l| l as f64 > cutoff);
        info!("Hiding {} length outliers in length plots.", before - passing(&ds));
    }
    if let Some(max) = opts.maxlength {
        let before = passing(&ds);
        flag(&mut ds, lengths_pointer, |l| l > max);
        info!(
            "Hiding {} reads longer than {}bp in length plots.",
            before - passing(&ds),
            max
        );
    }
    if let Some(min) = opts.minlength {
        let before = passing(&ds);
        flag(&mut ds, lengths_pointer, |l| l < min);
        info!(
            "Hiding {} reads shorter than {}bp in length plots.",
            before - passing(&ds),
            min
        );
    }

    if let Some(minqual) = opts.minqual {
        match ds.quals.as_deref() {
            Some(quals) => {
                let keep: Vec<usize> = (0..quals.len()).filter(|&i| quals[i] > minqual).collect();
                info!(
                    "Removing {} reads with quality at or below {}.",
                    ds.len() - keep.len(),
                    minqual
                );
                ds = ds.subset(&keep);
                changed = true;
            }
            None => warn!("--minqual ignored: the data has no quality column"),
        }
    }
    if let Some(hours) = opts.runtime_until {
        match ds.start_time.as_deref() {
            Some(times) => {
                let limit = hours * 3_600.0;
                let keep: Vec<usize> = (0..times.len()).filter(|&i| times[i] < limit).collect();
                info!(
                    "Removing {} reads sequenced after {} hours.",
                    ds.len() - keep.len(),
                    hours
                );
                ds = ds.subset(&keep);
                changed = true;
            }
            None => warn!("--runtime_until ignored: the data has no start_time column"),
        }
    }
    if let Some(n) = opts.downsample {
        let size = n.min(ds.len());
        let mut rng = ChaCha20Rng::seed_from_u64(DOWNSAMPLE_SEED);
        let mut keep = rand::seq::index::sample(&mut rng, ds.len(), size).into_vec();
        keep.sort_unstable();
        info!("Downsampling from {} to {} reads.", ds.len(), size);
        ds = ds.subset(&keep);
        changed = true;
    }

    if opts.percentqual {
        if let Some(quals) = ds.quals.as_mut() {
            for q in quals.iter_mut() {
                *q = phred_to_percent(*q);
            }
        }
    }

    Filtered {
        dataset: ds,
        changed,
        lengths_pointer,
    }
}

pub fn phred_to_percent(phred: f64) -> f64 {
    100.0 * (1.0 - 10f64.powf(phred / -10.0))
}

fn passing(ds: &Dataset) -> usize {
    ds.length_filter.iter().filter(|&&k| k).count()
}

fn flag<F: Fn(u64) -> bool>(ds: &mut Dataset, which: LengthColumn, drop: F) {
    let lengths = match which {
        LengthColumn::Sequenced => &ds.lengths,
        LengthColumn::Aligned => ds.aligned_lengths.as_ref().unwrap_or(&ds.lengths),
    };
    for (keep, &l) in ds.length_filter.iter_mut().zip(lengths.iter()) {
        if drop(l) {
            *keep = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::{Columns, ReadRecord};

    fn dataset(n: u64) -> Dataset {
        let mut ds = Dataset::with_columns(Columns {
            quals: true,
            start_time: true,
            ..Default::default()
        });
        for i in 0..n {
            ds.push(ReadRecord {
                length: (i + 1) * 100,
                qual: Some(i as f64),
                start_time: Some(i as f64 * 1_800.0),
                ..Default::default()
            });
        }
        ds
    }

    #[test]
    fn length_limits_only_flag_rows() {
        let opts = FilterOptions {
            maxlength: Some(500),
            minlength: Some(200),
            ..Default::default()
        };
        let out = filter_and_transform(dataset(10), &opts);
        assert!(!out.changed);
        assert_eq!(out.dataset.len(), 10);
        assert_eq!(out.dataset.passing(), vec![1, 2, 3, 4]);
        assert_eq!(out.lengths_pointer, LengthColumn::Sequenced);
    }

    #[test]
    fn quality_and_runtime_drop_rows() {
        let opts = FilterOptions {
            minqual: Some(2.0),
            runtime_until: Some(3.0),
            ..Default::default()
        };
        let out = filter_and_transform(dataset(10), &opts);
        assert!(out.changed);
        // quals 3..=9 survive, then start_time < 10800 s keeps indices 3..=5.
        assert_eq!(out.dataset.lengths, vec![400, 500, 600]);
    }

    #[test]
    fn downsample_is_reproducible_and_order_preserving() {
        let opts = FilterOptions {
            downsample: Some(5),
            ..Default::default()
        };
        let a = filter_and_transform(dataset(50), &opts);
        let b = filter_and_transform(dataset(50), &opts);
        assert!(a.changed);
        assert_eq!(a.dataset.len(), 5);
        assert_eq!(a.dataset.lengths, b.dataset.lengths);
        assert!(a.dataset.lengths.windows(2).all(|w| w[0] < w[1]));

        let all = filter_and_transform(dataset(3), &opts);
        assert_eq!(all.dataset.len(), 3);
    }

    #[test]
    fn outliers_are_hidden_from_length_plots() {
        let mut ds = Dataset::with_columns(Columns::default());
        for _ in 0..50 {
            ds.push(ReadRecord {
                length: 1_000,
                ..Default::default()
            });
        }
        ds.push(ReadRecord {
            length: 1_000_000,
            ..Default::default()
        });
        let opts = FilterOptions {
            drop_outliers: true,
            ..Default::default()
        };
        let out = filter_and_transform(ds, &opts);
        assert!(!out.changed);
        assert_eq!(out.dataset.passing().len(), 50);
        assert!(!out.dataset.length_filter[50]);
    }

    #[test]
    fn percentqual_converts_scores() {
        assert!((phred_to_percent(10.0) - 90.0).abs() < 1e-9);
        assert!((phred_to_percent(20.0) - 99.0).abs() < 1e-9);
        let opts = FilterOptions {
            percentqual: true,
            ..Default::default()
        };
        let out = filter_and_transform(dataset(2), &opts);
        assert_eq!(out.dataset.quals.unwrap()[0], 0.0);
    }

    #[test]
    fn alength_needs_aligned_column() {
        let opts = FilterOptions {
            alength: true,
            ..Default::default()
        };
        let out = filter_and_transform(dataset(2), &opts);
        assert_eq!(out.lengths_pointer, LengthColumn::Sequenced);

        let mut ds = Dataset::with_columns(Columns {
            aligned_lengths: true,
            ..Default::default()
        });
        ds.push(ReadRecord {
            length: 10,
            aligned_length: Some(8),
            ..Default::default()
        });
        let out = filter_and_transform(ds, &opts);
        assert_eq!(out.lengths_pointer, LengthColumn::Aligned);
    }
}
