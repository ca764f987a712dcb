use crate::core::error::PipelineError;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SourceKind {
    Fastq,
    Fasta,
    FastqRich,
    FastqMinimal,
    Summary,
    Bam,
    Ubam,
    Cram,
}

impl SourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SourceKind::Fastq => "fastq",
            SourceKind::Fasta => "fasta",
            SourceKind::FastqRich => "fastq_rich",
            SourceKind::FastqMinimal => "fastq_minimal",
            SourceKind::Summary => "summary",
            SourceKind::Bam => "bam",
            SourceKind::Ubam => "ubam",
            SourceKind::Cram => "cram",
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ReadType {
    OneD,
    TwoD,
    OneD2,
}

/// Which length column the length-dependent scatter plots use.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum LengthColumn {
    #[default]
    Sequenced,
    Aligned,
}

impl LengthColumn {
    pub fn as_str(self) -> &'static str {
        match self {
            LengthColumn::Sequenced => "lengths",
            LengthColumn::Aligned => "aligned_lengths",
        }
    }
}

/// Presence markers for the optional columns, computed once per dataset.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Columns {
    pub quals: bool,
    pub channel_ids: bool,
    pub start_time: bool,
    pub aligned_lengths: bool,
    pub mapq: bool,
    pub percent_identity: bool,
    pub aligned_quals: bool,
    pub barcode: bool,
}

impl Columns {
    pub fn names(&self) -> Vec<&'static str> {
        let mut names = vec!["lengths"];
        let flags = [
            (self.quals, "quals"),
            (self.channel_ids, "channelIDs"),
            (self.start_time, "start_time"),
            (self.aligned_lengths, "aligned_lengths"),
            (self.mapq, "mapQ"),
            (self.percent_identity, "percentIdentity"),
            (self.aligned_quals, "aligned_quals"),
            (self.barcode, "barcode"),
        ];
        names.extend(flags.iter().filter(|(on, _)| *on).map(|(_, n)| *n));
        names
    }
}

/// One parsed read. Fields a source does not provide stay `None`.
#[derive(Clone, Debug, Default)]
pub struct ReadRecord {
    pub length: u64,
    pub qual: Option<f64>,
    pub channel: Option<u32>,
    pub start_time: Option<f64>,
    pub aligned_length: Option<u64>,
    pub mapq: Option<u8>,
    pub percent_identity: Option<f64>,
    pub aligned_qual: Option<f64>,
    pub barcode: Option<String>,
}

/// Columnar table of reads.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Dataset {
    pub lengths: Vec<u64>,
    pub length_filter: Vec<bool>,
    pub quals: Option<Vec<f64>>,
    pub channel_ids: Option<Vec<u32>>,
    pub start_time: Option<Vec<f64>>,
    pub aligned_lengths: Option<Vec<u64>>,
    pub mapq: Option<Vec<u8>>,
    pub percent_identity: Option<Vec<f64>>,
    pub aligned_quals: Option<Vec<f64>>,
    pub barcode: Option<Vec<String>>,
}

impl Dataset {
    /// Empty dataset carrying exactly the given optional columns.
    pub fn with_columns(cols: Columns) -> Self {
        Self {
            lengths: Vec::new(),
            length_filter: Vec::new(),
            quals: cols.quals.then(Vec::new),
            channel_ids: cols.channel_ids.then(Vec::new),
            start_time: cols.start_time.then(Vec::new),
            aligned_lengths: cols.aligned_lengths.then(Vec::new),
            mapq: cols.mapq.then(Vec::new),
            percent_identity: cols.percent_identity.then(Vec::new),
            aligned_quals: cols.aligned_quals.then(Vec::new),
            barcode: cols.barcode.then(Vec::new),
        }
    }

    pub fn len(&self) -> usize {
        self.lengths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lengths.is_empty()
    }

    pub fn columns(&self) -> Columns {
        Columns {
            quals: self.quals.is_some(),
            channel_ids: self.channel_ids.is_some(),
            start_time: self.start_time.is_some(),
            aligned_lengths: self.aligned_lengths.is_some(),
            mapq: self.mapq.is_some(),
            percent_identity: self.percent_identity.is_some(),
            aligned_quals: self.aligned_quals.is_some(),
            barcode: self.barcode.is_some(),
        }
    }

    /// Appends a row. Columns the dataset carries but the record lacks get a
    /// placeholder (`NaN` for floats, 0 for integers, "unclassified" for
    /// barcodes); fields for absent columns are ignored.
    pub fn push(&mut self, rec: ReadRecord) {
        self.lengths.push(rec.length);
        self.length_filter.push(true);
        if let Some(v) = self.quals.as_mut() {
            v.push(rec.qual.unwrap_or(f64::NAN));
        }
        if let Some(v) = self.channel_ids.as_mut() {
            v.push(rec.channel.unwrap_or(0));
        }
        if let Some(v) = self.start_time.as_mut() {
            v.push(rec.start_time.unwrap_or(f64::NAN));
        }
        if let Some(v) = self.aligned_lengths.as_mut() {
            v.push(rec.aligned_length.unwrap_or(0));
        }
        if let Some(v) = self.mapq.as_mut() {
            v.push(rec.mapq.unwrap_or(0));
        }
        if let Some(v) = self.percent_identity.as_mut() {
            v.push(rec.percent_identity.unwrap_or(f64::NAN));
        }
        if let Some(v) = self.aligned_quals.as_mut() {
            v.push(rec.aligned_qual.unwrap_or(f64::NAN));
        }
        if let Some(v) = self.barcode.as_mut() {
            v.push(rec.barcode.unwrap_or_else(|| "unclassified".to_string()));
        }
    }

    /// Concatenates `other` below `self`. An optional column survives only if
    /// both parts carry it.
    pub fn append(&mut self, other: Dataset) {
        self.lengths.extend(other.lengths);
        self.length_filter.extend(other.length_filter);
        concat(&mut self.quals, other.quals);
        concat(&mut self.channel_ids, other.channel_ids);
        concat(&mut self.start_time, other.start_time);
        concat(&mut self.aligned_lengths, other.aligned_lengths);
        concat(&mut self.mapq, other.mapq);
        concat(&mut self.percent_identity, other.percent_identity);
        concat(&mut self.aligned_quals, other.aligned_quals);
        concat(&mut self.barcode, other.barcode);
    }

    /// Row selection keeping every column. `idx` must be in bounds.
    pub fn subset(&self, idx: &[usize]) -> Dataset {
        Dataset {
            lengths: pick(&self.lengths, idx),
            length_filter: pick(&self.length_filter, idx),
            quals: self.quals.as_deref().map(|v| pick(v, idx)),
            channel_ids: self.channel_ids.as_deref().map(|v| pick(v, idx)),
            start_time: self.start_time.as_deref().map(|v| pick(v, idx)),
            aligned_lengths: self.aligned_lengths.as_deref().map(|v| pick(v, idx)),
            mapq: self.mapq.as_deref().map(|v| pick(v, idx)),
            percent_identity: self.percent_identity.as_deref().map(|v| pick(v, idx)),
            aligned_quals: self.aligned_quals.as_deref().map(|v| pick(v, idx)),
            barcode: self.barcode.as_deref().map(|v| pick(v, idx)),
        }
    }

    /// Indices of rows that passed the length filters.
    pub fn passing(&self) -> Vec<usize> {
        self.length_filter
            .iter()
            .enumerate()
            .filter_map(|(i, &keep)| keep.then_some(i))
            .collect()
    }

    pub fn length_column(&self, which: LengthColumn) -> &[u64] {
        match which {
            LengthColumn::Sequenced => &self.lengths,
            LengthColumn::Aligned => self.aligned_lengths.as_deref().unwrap_or(&self.lengths),
        }
    }

    /// Values of the chosen length column for rows passing the length filters.
    pub fn filtered_lengths(&self, which: LengthColumn) -> Vec<u64> {
        let lengths = self.length_column(which);
        self.passing().into_iter().map(|i| lengths[i]).collect()
    }

    /// Distinct barcode labels in first-occurrence order with their row indices.
    pub fn barcode_groups(&self) -> Vec<(String, Vec<usize>)> {
        let Some(labels) = self.barcode.as_deref() else {
            return Vec::new();
        };
        let mut groups: Vec<(String, Vec<usize>)> = Vec::new();
        let mut slot: std::collections::HashMap<&str, usize> = std::collections::HashMap::new();
        for (i, label) in labels.iter().enumerate() {
            match slot.get(label.as_str()) {
                Some(&g) => groups[g].1.push(i),
                None => {
                    slot.insert(label.as_str(), groups.len());
                    groups.push((label.clone(), vec![i]));
                }
            }
        }
        groups
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        let n = self.lengths.len();
        if n == 0 {
            return Err(PipelineError::DataShape("dataset contains no reads".into()));
        }
        let sizes = [
            ("length_filter", Some(self.length_filter.len())),
            ("quals", self.quals.as_ref().map(Vec::len)),
            ("channelIDs", self.channel_ids.as_ref().map(Vec::len)),
            ("start_time", self.start_time.as_ref().map(Vec::len)),
            ("aligned_lengths", self.aligned_lengths.as_ref().map(Vec::len)),
            ("mapQ", self.mapq.as_ref().map(Vec::len)),
            ("percentIdentity", self.percent_identity.as_ref().map(Vec::len)),
            ("aligned_quals", self.aligned_quals.as_ref().map(Vec::len)),
            ("barcode", self.barcode.as_ref().map(Vec::len)),
        ];
        for (name, len) in sizes {
            if let Some(len) = len {
                if len != n {
                    return Err(PipelineError::DataShape(format!(
                        "column {} has {} rows, expected {}",
                        name, len, n
                    )));
                }
            }
        }
        Ok(())
    }
}

fn pick<T: Clone>(v: &[T], idx: &[usize]) -> Vec<T> {
    idx.iter().map(|&i| v[i].clone()).collect()
}

fn concat<T>(dst: &mut Option<Vec<T>>, src: Option<Vec<T>>) {
    match (dst.as_mut(), src) {
        (Some(d), Some(s)) => d.extend(s),
        _ => *dst = None,
    }
}
