use crate::core::model::Dataset;
use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

const QUAL_CUTOFFS: [u8; 5] = [5, 7, 10, 12, 15];
const TOP_N: usize = 5;

pub fn mean(v: &[f64]) -> f64 {
    if v.is_empty() {
        return f64::NAN;
    }
    v.iter().sum::<f64>() / v.len() as f64
}

pub fn median(v: &[f64]) -> f64 {
    percentile(v, 50.0)
}

/// Linear-interpolated percentile (`p` in 0..=100), NaN values skipped.
pub fn percentile(v: &[f64], p: f64) -> f64 {
    let mut sorted: Vec<f64> = v.iter().copied().filter(|x| !x.is_nan()).collect();
    if sorted.is_empty() {
        return f64::NAN;
    }
    sorted.sort_by(f64::total_cmp);
    let rank = (p.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64)
}

pub fn stdev_population(v: &[f64]) -> f64 {
    if v.is_empty() {
        return f64::NAN;
    }
    let m = mean(v);
    (v.iter().map(|x| (x - m).powi(2)).sum::<f64>() / v.len() as f64).sqrt()
}

pub fn stdev_sample(v: &[f64]) -> f64 {
    if v.len() < 2 {
        return f64::NAN;
    }
    let m = mean(v);
    (v.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (v.len() - 1) as f64).sqrt()
}

/// Length such that reads at least this long hold half of all bases.
pub fn n50(lengths: &[u64]) -> u64 {
    let mut sorted = lengths.to_vec();
    sorted.sort_unstable_by(|a, b| b.cmp(a));
    let total: u64 = sorted.iter().sum();
    let mut acc = 0u64;
    for l in sorted {
        acc += l;
        if acc * 2 >= total {
            return l;
        }
    }
    0
}

/// Pearson correlation over pairs where both values are finite.
pub fn pearson(x: &[f64], y: &[f64]) -> Option<f64> {
    let pairs: Vec<(f64, f64)> = x
        .iter()
        .zip(y)
        .filter(|(a, b)| a.is_finite() && b.is_finite())
        .map(|(a, b)| (*a, *b))
        .collect();
    if pairs.len() < 2 {
        return None;
    }
    let n = pairs.len() as f64;
    let mx = pairs.iter().map(|p| p.0).sum::<f64>() / n;
    let my = pairs.iter().map(|p| p.1).sum::<f64>() / n;
    let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    for (a, b) in &pairs {
        sxy += (a - mx) * (b - my);
        sxx += (a - mx).powi(2);
        syy += (b - my).powi(2);
    }
    if sxx == 0.0 || syy == 0.0 {
        return None;
    }
    Some(sxy / (sxx * syy).sqrt())
}

#[derive(Clone, Debug)]
pub struct CutoffRow {
    pub q: u8,
    pub reads: u64,
    pub percent: f64,
    pub megabases: f64,
}

#[derive(Clone, Debug)]
pub struct AlignedStats {
    pub aligned_bases: u64,
    pub median_identity: Option<f64>,
    pub average_identity: Option<f64>,
}

#[derive(Clone, Debug)]
pub struct ReadStats {
    pub number_of_reads: u64,
    pub number_of_bases: u64,
    pub mean_read_length: f64,
    pub median_read_length: f64,
    pub read_length_stdev: f64,
    pub n50: u64,
    pub mean_qual: Option<f64>,
    pub median_qual: Option<f64>,
    pub cutoffs: Vec<CutoffRow>,
    pub longest: Vec<(u64, Option<f64>)>,
    pub best_quality: Vec<(f64, u64)>,
    pub aligned: Option<AlignedStats>,
}

pub fn compute(ds: &Dataset) -> ReadStats {
    let lengths_f: Vec<f64> = ds.lengths.iter().map(|&l| l as f64).collect();
    let total: u64 = ds.lengths.iter().sum();
    let quals = ds.quals.as_deref();

    let mut cutoffs = Vec::new();
    let mut best_quality = Vec::new();
    if let Some(q) = quals {
        for cut in QUAL_CUTOFFS {
            let mut reads = 0u64;
            let mut bases = 0u64;
            for (i, &v) in q.iter().enumerate() {
                if v > cut as f64 {
                    reads += 1;
                    bases += ds.lengths[i];
                }
            }
            cutoffs.push(CutoffRow {
                q: cut,
                reads,
                percent: if ds.is_empty() {
                    0.0
                } else {
                    reads as f64 * 100.0 / ds.len() as f64
                },
                megabases: bases as f64 / 1e6,
            });
        }
        let mut order: Vec<usize> = (0..q.len()).filter(|&i| !q[i].is_nan()).collect();
        order.sort_by(|&a, &b| q[b].total_cmp(&q[a]).then(a.cmp(&b)));
        best_quality = order
            .into_iter()
            .take(TOP_N)
            .map(|i| (q[i], ds.lengths[i]))
            .collect();
    }

    let mut order: Vec<usize> = (0..ds.len()).collect();
    order.sort_by(|&a, &b| ds.lengths[b].cmp(&ds.lengths[a]).then(a.cmp(&b)));
    let longest = order
        .into_iter()
        .take(TOP_N)
        .map(|i| (ds.lengths[i], quals.map(|q| q[i])))
        .collect();

    let aligned = ds.aligned_lengths.as_deref().map(|al| AlignedStats {
        aligned_bases: al.iter().sum(),
        median_identity: ds.percent_identity.as_deref().map(median),
        average_identity: ds.percent_identity.as_deref().map(|p| {
            let finite: Vec<f64> = p.iter().copied().filter(|x| x.is_finite()).collect();
            mean(&finite)
        }),
    });

    ReadStats {
        number_of_reads: ds.len() as u64,
        number_of_bases: total,
        mean_read_length: mean(&lengths_f),
        median_read_length: median(&lengths_f),
        read_length_stdev: stdev_sample(&lengths_f),
        n50: n50(&ds.lengths),
        mean_qual: quals.map(|q| {
            let finite: Vec<f64> = q.iter().copied().filter(|x| x.is_finite()).collect();
            mean(&finite)
        }),
        median_qual: quals.map(median),
        cutoffs,
        longest,
        best_quality,
        aligned,
    }
}

impl ReadStats {
    /// Metric name/value rows in report order.
    pub fn rows(&self) -> Vec<(String, String)> {
        let mut rows = vec![
            ("Number of reads".to_string(), fmt_int(self.number_of_reads)),
            ("Number of bases".to_string(), fmt_int(self.number_of_bases)),
            ("Mean read length".to_string(), fmt_float(self.mean_read_length)),
            ("Median read length".to_string(), fmt_float(self.median_read_length)),
            ("Read length stdev".to_string(), fmt_float(self.read_length_stdev)),
            ("Read length N50".to_string(), fmt_int(self.n50)),
        ];
        if let Some(q) = self.mean_qual {
            rows.push(("Mean read quality".to_string(), fmt_float(q)));
        }
        if let Some(q) = self.median_qual {
            rows.push(("Median read quality".to_string(), fmt_float(q)));
        }
        if let Some(a) = &self.aligned {
            rows.push(("Total aligned bases".to_string(), fmt_int(a.aligned_bases)));
            if let Some(v) = a.median_identity {
                rows.push(("Median percent identity".to_string(), fmt_float(v)));
            }
            if let Some(v) = a.average_identity {
                rows.push(("Average percent identity".to_string(), fmt_float(v)));
            }
        }
        for c in &self.cutoffs {
            rows.push((
                format!("Reads >Q{}", c.q),
                format!("{} ({:.1}%) {:.1}Mb", c.reads, c.percent, c.megabases),
            ));
        }
        for (i, (len, q)) in self.longest.iter().enumerate() {
            let value = match q {
                Some(q) if q.is_finite() => format!("{} ({:.1})", len, q),
                _ => len.to_string(),
            };
            rows.push((format!("Longest read {}", i + 1), value));
        }
        for (i, (q, len)) in self.best_quality.iter().enumerate() {
            rows.push((
                format!("Highest Q read {}", i + 1),
                format!("{:.1} ({})", q, len),
            ));
        }
        rows
    }
}

/// Writes a tab separated statistics table, one column per dataset.
pub fn write_stats(datasets: &[Dataset], names: &[String], path: &Path) -> Result<()> {
    let per: Vec<Vec<(String, String)>> = datasets.iter().map(|d| compute(d).rows()).collect();

    let mut metrics: Vec<String> = Vec::new();
    for rows in &per {
        for (name, _) in rows {
            if !metrics.contains(name) {
                metrics.push(name.clone());
            }
        }
    }

    let mut w = BufWriter::new(
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?,
    );
    write!(w, "Metrics")?;
    for (i, _) in datasets.iter().enumerate() {
        let name = names.get(i).map(String::as_str).unwrap_or("dataset");
        write!(w, "\t{}", name)?;
    }
    writeln!(w)?;
    for metric in &metrics {
        write!(w, "{}", metric)?;
        for rows in &per {
            let value = rows
                .iter()
                .find(|(n, _)| n == metric)
                .map(|(_, v)| v.as_str())
                .unwrap_or("");
            write!(w, "\t{}", value)?;
        }
        writeln!(w)?;
    }
    w.flush()?;
    Ok(())
}

fn fmt_float(v: f64) -> String {
    if v.is_finite() {
        format!("{:.1}", v)
    } else {
        "NA".to_string()
    }
}

pub fn fmt_int(v: u64) -> String {
    let s = v.to_string();
    let mut out = String::with_capacity(s.len() + s.len() / 3);
    let len = s.len();
    for (i, ch) in s.chars().enumerate() {
        if i != 0 && (len - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}
