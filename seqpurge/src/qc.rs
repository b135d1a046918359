use std::fmt::Display;
use std::ops::{Deref, DerefMut};
use std::path::Path;

use anyhow::{Context, Result};
use indexmap::IndexMap;
use noodles::fastq;
use serde::Serialize;

#[derive(Debug, Default, Clone, Serialize)]
pub struct Metrics(IndexMap<String, f64>);

impl Deref for Metrics {
    type Target = IndexMap<String, f64>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for Metrics {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl Display for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (key, value) in &self.0 {
            writeln!(f, "{}\t{}", key, value)?;
        }
        Ok(())
    }
}

impl Metrics {
    /// Write the metrics as a JSON object.
    pub fn write_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = std::fs::File::create(path.as_ref())
            .with_context(|| format!("cannot create file: {}", path.as_ref().display()))?;
        serde_json::to_writer_pretty(std::io::BufWriter::new(file), self)?;
        Ok(())
    }
}

/// Raw (untrimmed) read statistics of one mate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct MateStat {
    reads: u64,
    bases: u64,
    min_len: usize,
    max_len: usize,
    gc_bases: u64,
    n_bases: u64,
    q20_bases: u64,
    q30_bases: u64,
}

impl Default for MateStat {
    fn default() -> Self {
        Self {
            reads: 0,
            bases: 0,
            min_len: usize::MAX,
            max_len: 0,
            gc_bases: 0,
            n_bases: 0,
            q20_bases: 0,
            q30_bases: 0,
        }
    }
}

impl MateStat {
    fn add(&mut self, record: &fastq::Record, qoff: u8) {
        let len = record.sequence().len();
        self.reads += 1;
        self.bases += len as u64;
        self.min_len = self.min_len.min(len);
        self.max_len = self.max_len.max(len);
        for base in record.sequence() {
            match base {
                b'G' | b'C' => self.gc_bases += 1,
                b'N' => self.n_bases += 1,
                _ => {}
            }
        }
        for q in record.quality_scores() {
            let q = q.saturating_sub(qoff);
            if q >= 20 {
                self.q20_bases += 1;
            }
            if q >= 30 {
                self.q30_bases += 1;
            }
        }
    }

    fn combine(&mut self, other: &Self) {
        self.reads += other.reads;
        self.bases += other.bases;
        self.min_len = self.min_len.min(other.min_len);
        self.max_len = self.max_len.max(other.max_len);
        self.gc_bases += other.gc_bases;
        self.n_bases += other.n_bases;
        self.q20_bases += other.q20_bases;
        self.q30_bases += other.q30_bases;
    }

    fn report(&self, prefix: &str, metric: &mut Metrics) {
        metric.insert(format!("{}_read_count", prefix), self.reads as f64);
        metric.insert(format!("{}_base_count", prefix), self.bases as f64);
        if self.reads > 0 {
            metric.insert(format!("{}_min_read_length", prefix), self.min_len as f64);
            metric.insert(format!("{}_max_read_length", prefix), self.max_len as f64);
            metric.insert(format!("{}_mean_read_length", prefix), self.bases as f64 / self.reads as f64);
        }
        if self.bases > 0 {
            let bases = self.bases as f64;
            metric.insert(format!("{}_frac_gc", prefix), self.gc_bases as f64 / bases);
            metric.insert(format!("{}_frac_n", prefix), self.n_bases as f64 / bases);
            metric.insert(format!("{}_frac_q20_bases", prefix), self.q20_bases as f64 / bases);
            metric.insert(format!("{}_frac_q30_bases", prefix), self.q30_bases as f64 / bases);
        }
    }
}

/// QC of the input reads before trimming.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReadQc {
    read1: MateStat,
    read2: MateStat,
}

impl ReadQc {
    pub fn add_pair(&mut self, read1: &fastq::Record, read2: &fastq::Record, qoff: u8) {
        self.read1.add(read1, qoff);
        self.read2.add(read2, qoff);
    }

    pub fn merge(&mut self, other: &Self) {
        self.read1.combine(&other.read1);
        self.read2.combine(&other.read2);
    }

    pub fn report(&self, metric: &mut Metrics) {
        self.read1.report("read1", metric);
        self.read2.report("read2", metric);
    }
}
